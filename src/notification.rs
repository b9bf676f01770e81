//! Pre-expiry notification delivery.
//!
//! The sweeper hands one [`Alert`] per armed note to a
//! [`NotificationScheduler`]. The alert id is the note id, so a note never has
//! more than one outstanding alert.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{TimeZone, Utc};
use log::{debug, info, warn};
use tokio::{runtime::Handle, task::JoinHandle};

use crate::{Clock, MemoError, Result};

/// A one-shot alert to deliver at `fire_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub id: String,
    /// Epoch milliseconds
    pub fire_at: i64,
    pub title: String,
    pub body: String,
}

/// Service that delivers alerts at a point in time.
pub trait NotificationScheduler: Send + Sync {
    /// Schedules `alert`, replacing any pending alert with the same id.
    fn schedule(&self, alert: Alert) -> Result<()>;

    /// Cancels the pending alert with `id`. Unknown ids are ignored.
    fn cancel(&self, id: &str) -> Result<()>;
}

/// Delivers alerts from tokio timers inside the running process.
///
/// Fired alerts are logged and printed to stdout. Alerts do not survive the
/// process.
pub struct LocalNotifier {
    clock: Arc<dyn Clock>,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl LocalNotifier {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Number of alerts that have not fired or been canceled yet.
    pub fn pending_count(&self) -> usize {
        self.lock()
            .map(|pending| pending.values().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, JoinHandle<()>>>> {
        self.pending
            .lock()
            .map_err(|e| MemoError::LockAcquisitionFailed {
                message: format!("Failed to lock pending alerts: {}", e),
            })
    }
}

impl NotificationScheduler for LocalNotifier {
    fn schedule(&self, alert: Alert) -> Result<()> {
        let handle = Handle::try_current().map_err(|e| MemoError::NotificationFailed {
            message: format!("no async runtime to deliver alert {}: {}", alert.id, e),
        })?;

        let delay_ms = (alert.fire_at - self.clock.now_millis()).max(0) as u64;
        let fire_at = Utc
            .timestamp_millis_opt(alert.fire_at)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| alert.fire_at.to_string());
        debug!("Scheduling alert {} at {} (in {}ms)", alert.id, fire_at, delay_ms);

        let id = alert.id.clone();
        let task = handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            info!("Delivering alert {}: {}", alert.id, alert.body);
            println!("[{}] {}", console::style(&alert.title).bold(), alert.body);
        });

        if let Some(previous) = self.lock()?.insert(id, task) {
            previous.abort();
        }
        Ok(())
    }

    fn cancel(&self, id: &str) -> Result<()> {
        if let Some(task) = self.lock()?.remove(id) {
            if !task.is_finished() {
                debug!("Canceling alert {}", id);
            }
            task.abort();
        }
        Ok(())
    }
}

impl Drop for LocalNotifier {
    fn drop(&mut self) {
        match self.pending.get_mut() {
            Ok(pending) => {
                let outstanding = pending.values().filter(|h| !h.is_finished()).count();
                if outstanding > 0 {
                    warn!("{} scheduled alert(s) dropped with the process", outstanding);
                }
            }
            Err(e) => warn!("Pending alerts lock poisoned on drop: {}", e),
        }
    }
}

/// Scheduled/canceled event seen by a [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvent {
    Scheduled(Alert),
    Canceled(String),
}

/// Keeps alerts in memory instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    state: Mutex<RecordingState>,
}

#[derive(Debug, Default)]
struct RecordingState {
    pending: HashMap<String, Alert>,
    history: Vec<AlertEvent>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts scheduled and not canceled, ordered by fire time.
    pub fn pending(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .state
            .lock()
            .map(|s| s.pending.values().cloned().collect())
            .unwrap_or_default();
        alerts.sort_by_key(|a| a.fire_at);
        alerts
    }

    pub fn history(&self) -> Vec<AlertEvent> {
        self.state
            .lock()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// How many times an alert was scheduled for `id`.
    pub fn scheduled_count(&self, id: &str) -> usize {
        self.history()
            .iter()
            .filter(|e| matches!(e, AlertEvent::Scheduled(a) if a.id == id))
            .count()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecordingState>> {
        self.state
            .lock()
            .map_err(|e| MemoError::LockAcquisitionFailed {
                message: format!("Failed to lock recorded alerts: {}", e),
            })
    }
}

impl NotificationScheduler for RecordingNotifier {
    fn schedule(&self, alert: Alert) -> Result<()> {
        let mut state = self.lock()?;
        state.history.push(AlertEvent::Scheduled(alert.clone()));
        state.pending.insert(alert.id.clone(), alert);
        Ok(())
    }

    fn cancel(&self, id: &str) -> Result<()> {
        let mut state = self.lock()?;
        state.history.push(AlertEvent::Canceled(id.to_string()));
        state.pending.remove(id);
        Ok(())
    }
}
