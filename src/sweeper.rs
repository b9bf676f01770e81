// src/sweeper.rs - Expiry sweeper module
use std::sync::{Arc, Mutex as StdMutex, Weak};

use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};

use crate::{
    format_lead, preview_text, Alert, Clock, Config, MemoError, NoteId, NoteStore, Result,
};

/// Tunables for one sweep tick, taken from [`Config`].
#[derive(Debug, Clone)]
pub struct SweepSettings {
    /// Warn this long before expiry
    pub warning_lead_ms: i64,
    /// Width of the window above `warning_lead_ms` in which the warning is scheduled
    pub warning_window_ms: i64,
    /// Characters of note text quoted in the alert body
    pub preview_chars: usize,
    pub notification_title: String,
}

impl From<&Config> for SweepSettings {
    fn from(config: &Config) -> Self {
        Self {
            warning_lead_ms: i64::try_from(config.warning_lead_ms).unwrap_or(i64::MAX),
            warning_window_ms: i64::try_from(config.warning_window_ms).unwrap_or(i64::MAX),
            preview_chars: config.preview_chars,
            notification_title: config.notification_title.clone(),
        }
    }
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Notes whose pre-expiry warning was scheduled on this tick
    pub warned: Vec<NoteId>,
    /// Notes removed because they expired
    pub evicted: Vec<NoteId>,
    /// Blank note created because the collection ended up empty
    pub synthesized: Option<NoteId>,
    /// The write at the end of the tick was refused for lack of space
    pub storage_full: bool,
}

/// Builds the alert body quoting the start of the note and saying how long
/// before deletion the alert fires.
pub fn warning_body(text: &str, preview_chars: usize, lead_ms: i64) -> String {
    format!(
        "\"{}\" will be deleted in {}",
        preview_text(text, preview_chars),
        format_lead(lead_ms)
    )
}

/// Runs one sweep over `store` at instant `now_ms`.
///
/// Schedules at most one warning per arming, evicts expired notes, keeps the
/// collection non-empty and persists the result.
pub fn sweep_once(store: &mut NoteStore, now_ms: i64, settings: &SweepSettings) -> SweepReport {
    let mut report = SweepReport::default();
    let lead = settings.warning_lead_ms;
    let window_end = lead.saturating_add(settings.warning_window_ms);

    let due: Vec<(NoteId, Alert)> = store
        .list()
        .iter()
        .filter(|note| !store.is_warned(note.id))
        .filter_map(|note| {
            let expires = note.expiration_instant()?;
            let time_left = expires.saturating_sub(now_ms);
            if time_left <= lead || time_left > window_end {
                return None;
            }
            let alert = Alert {
                id: note.id.to_string(),
                fire_at: expires.saturating_sub(lead),
                title: settings.notification_title.clone(),
                body: warning_body(&note.text, settings.preview_chars, lead),
            };
            Some((note.id, alert))
        })
        .collect();

    for (id, alert) in due {
        match store.notifier().schedule(alert) {
            Ok(()) => {
                info!("Scheduled pre-expiry warning for note {}", id);
                store.mark_warned(id);
                report.warned.push(id);
            }
            Err(e) => warn!("Failed to schedule warning for note {}: {}", id, e),
        }
    }

    let evicted = store.evict_where(|note| match note.expiration_instant() {
        Some(expires) => now_ms < expires,
        None => true,
    });
    for note in &evicted {
        info!("Note {} expired and was removed", note.id);
    }
    report.evicted = evicted.into_iter().map(|n| n.id).collect();

    report.synthesized = store.ensure_not_empty();

    if let Err(e) = store.persist() {
        report.storage_full = e.is_storage_full();
    }

    trace!(
        "Sweep at {}: {} warned, {} evicted, {} remaining",
        now_ms,
        report.warned.len(),
        report.evicted.len(),
        store.len()
    );
    report
}

#[derive(Debug, Clone, Default)]
pub struct SweeperStatus {
    /// Whether the sweeper task is running
    pub is_running: bool,
    /// Ticks performed since start
    pub ticks: u64,
    /// When the last tick ran
    pub last_sweep_at: Option<DateTime<Utc>>,
    /// Notes evicted since start
    pub total_evicted: u64,
    /// Warnings scheduled since start
    pub total_warnings: u64,
}

#[derive(Debug, Clone)]
pub enum SweepCommand {
    /// Run a tick immediately
    SweepNow,
    /// Stop the sweeper
    Stop,
}

/// Periodically sweeps the note store.
pub struct ExpirySweeper {
    /// Tick period
    interval: Duration,

    settings: SweepSettings,

    clock: Arc<dyn Clock>,

    /// Channel to send commands to the sweeper task
    command_tx: Option<mpsc::Sender<SweepCommand>>,

    /// Handle to the sweeper task
    sweeper_task: Option<JoinHandle<()>>,

    /// Shared with the task
    status: Arc<StdMutex<SweeperStatus>>,

    /// Weak reference to the store
    store: Option<Weak<Mutex<NoteStore>>>,
}

impl ExpirySweeper {
    /// Create a new sweeper with the provided config
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        debug!(
            "Initializing expiry sweeper, interval={}ms",
            config.sweep_interval_ms
        );
        Self {
            interval: Duration::from_millis(config.sweep_interval_ms),
            settings: SweepSettings::from(config),
            clock,
            command_tx: None,
            sweeper_task: None,
            status: Arc::new(StdMutex::new(SweeperStatus::default())),
            store: None,
        }
    }

    /// Set the weak reference to the store
    pub fn set_store(&mut self, store: &Arc<Mutex<NoteStore>>) {
        self.store = Some(Arc::downgrade(store));
    }

    /// Start the sweeper task. Starting twice is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.sweeper_task.is_some() {
            debug!("Expiry sweeper already running");
            return Ok(());
        }

        let store = self.store.clone().ok_or_else(|| {
            error!("No store reference found in ExpirySweeper.");
            MemoError::SchedulerError {
                message: "ExpirySweeper does not have a store reference.".to_string(),
            }
        })?;

        let (command_tx, mut command_rx) = mpsc::channel(10);
        self.command_tx = Some(command_tx);

        let period = self.interval;
        let settings = self.settings.clone();
        let clock = Arc::clone(&self.clock);
        let status = Arc::clone(&self.status);

        let task = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // Initial tick

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !run_tick(&store, &clock, &settings, &status).await {
                            break;
                        }
                    }
                    cmd = command_rx.recv() => match cmd {
                        Some(SweepCommand::SweepNow) => {
                            if !run_tick(&store, &clock, &settings, &status).await {
                                break;
                            }
                        }
                        Some(SweepCommand::Stop) | None => {
                            debug!("Expiry sweeper stopping...");
                            break;
                        }
                    }
                }
            }
        });

        self.sweeper_task = Some(task);
        self.set_running(true);
        info!("Expiry sweeper started");
        Ok(())
    }

    /// Stop the sweeper if it's running
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.sweeper_task.take() {
            if let Some(tx) = self.command_tx.take() {
                if let Err(e) = tx.send(SweepCommand::Stop).await {
                    debug!("Sweeper task already gone: {}", e);
                }
            }

            if let Err(e) = task.await {
                let error_msg = format!("Failed to stop expiry sweeper: {}", e);
                error!("{}", error_msg);
                return Err(MemoError::SchedulerError { message: error_msg });
            }

            self.set_running(false);
            info!("Expiry sweeper stopped");
        } else {
            debug!("Expiry sweeper is not running");
        }

        Ok(())
    }

    /// Ask the running task to sweep immediately
    pub async fn sweep_now(&self) -> Result<()> {
        let tx = self.command_tx.as_ref().ok_or_else(|| MemoError::SchedulerError {
            message: "Expiry sweeper is not running".to_string(),
        })?;

        tx.send(SweepCommand::SweepNow)
            .await
            .map_err(|e| MemoError::SchedulerError {
                message: format!("Failed to send sweep command: {}", e),
            })
    }

    /// Get the current status of the sweeper
    pub fn status(&self) -> SweeperStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    fn set_running(&self, running: bool) {
        if let Ok(mut status) = self.status.lock() {
            status.is_running = running;
        }
    }
}

/// Returns false once the store is gone.
async fn run_tick(
    store: &Weak<Mutex<NoteStore>>,
    clock: &Arc<dyn Clock>,
    settings: &SweepSettings,
    status: &Arc<StdMutex<SweeperStatus>>,
) -> bool {
    let Some(store) = store.upgrade() else {
        warn!("Note store dropped, expiry sweeper exiting");
        return false;
    };

    let report = {
        let mut store = store.lock().await;
        sweep_once(&mut store, clock.now_millis(), settings)
    };

    if let Ok(mut status) = status.lock() {
        status.ticks += 1;
        status.last_sweep_at = Some(Utc::now());
        status.total_evicted += report.evicted.len() as u64;
        status.total_warnings += report.warned.len() as u64;
    }
    true
}
