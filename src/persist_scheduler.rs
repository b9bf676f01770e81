// src/persist_scheduler.rs - Debounced persistence of the note store
use std::sync::{Arc, Weak};

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::{Config, MemoError, NoteStore, Result};

#[derive(Debug, Clone)]
pub enum PersistCommand {
    /// Flush immediately, skipping the quiet window
    FlushNow,
    /// Stop the scheduler without writing pending changes
    Stop,
}

/// Writes the note store after a burst of edits has gone quiet.
///
/// Each store mutation wakes the task; further mutations inside the window
/// restart it, so rapid keystrokes produce a single write.
pub struct PersistScheduler {
    /// Quiet period before a write
    debounce: Duration,

    command_tx: Option<mpsc::Sender<PersistCommand>>,

    task: Option<JoinHandle<()>>,

    store: Option<Weak<Mutex<NoteStore>>>,

    signal: Option<Arc<Notify>>,
}

enum Wake {
    Changed,
    FlushNow,
    Stop,
}

impl PersistScheduler {
    pub fn new(config: &Config) -> Self {
        Self {
            debounce: Duration::from_millis(config.persist_debounce_ms),
            command_tx: None,
            task: None,
            store: None,
            signal: None,
        }
    }

    /// Set the weak reference to the store and take its mutation signal.
    pub fn set_store(&mut self, store: &Arc<Mutex<NoteStore>>, signal: Arc<Notify>) {
        self.store = Some(Arc::downgrade(store));
        self.signal = Some(signal);
    }

    pub fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            debug!("Persist scheduler already running");
            return Ok(());
        }

        let (Some(store), Some(signal)) = (self.store.clone(), self.signal.clone()) else {
            error!("No store reference found in PersistScheduler.");
            return Err(MemoError::SchedulerError {
                message: "PersistScheduler does not have a store reference.".to_string(),
            });
        };

        let (command_tx, mut command_rx) = mpsc::channel(10);
        self.command_tx = Some(command_tx);
        let debounce = self.debounce;

        let task = tokio::spawn(async move {
            loop {
                let wake = tokio::select! {
                    _ = signal.notified() => Wake::Changed,
                    cmd = command_rx.recv() => match cmd {
                        Some(PersistCommand::FlushNow) => Wake::FlushNow,
                        Some(PersistCommand::Stop) | None => Wake::Stop,
                    },
                };

                let wake = match wake {
                    Wake::Changed => {
                        // Restart the quiet window on every further change.
                        loop {
                            tokio::select! {
                                _ = time::sleep(debounce) => break Wake::Changed,
                                _ = signal.notified() => continue,
                                cmd = command_rx.recv() => match cmd {
                                    Some(PersistCommand::FlushNow) => break Wake::FlushNow,
                                    Some(PersistCommand::Stop) | None => break Wake::Stop,
                                },
                            }
                        }
                    }
                    other => other,
                };

                if let Wake::Stop = wake {
                    debug!("Persist scheduler stopping...");
                    break;
                }

                let Some(strong) = store.upgrade() else {
                    warn!("Note store dropped, persist scheduler exiting");
                    break;
                };
                let result = strong.lock().await.flush();
                match result {
                    Ok(()) => {}
                    Err(e) if e.is_storage_full() => warn!("Debounced write dropped: {}", e),
                    Err(e) => error!("Debounced write failed: {}", e),
                }
            }
        });

        self.task = Some(task);
        info!("Persist scheduler started, debounce={}ms", self.debounce.as_millis());
        Ok(())
    }

    /// Ask the running task to flush without waiting for the quiet window.
    pub async fn flush_now(&self) -> Result<()> {
        let tx = self.command_tx.as_ref().ok_or_else(|| MemoError::SchedulerError {
            message: "Persist scheduler is not running".to_string(),
        })?;
        tx.send(PersistCommand::FlushNow)
            .await
            .map_err(|e| MemoError::SchedulerError {
                message: format!("Failed to send flush command: {}", e),
            })
    }

    /// Stop the task. A pending quiet window is dropped without writing.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            if let Some(tx) = self.command_tx.take() {
                if let Err(e) = tx.send(PersistCommand::Stop).await {
                    debug!("Persist task already gone: {}", e);
                }
            }
            task.await.map_err(|e| {
                let error_msg = format!("Failed to stop persist scheduler: {}", e);
                error!("{}", error_msg);
                MemoError::SchedulerError { message: error_msg }
            })?;
            info!("Persist scheduler stopped");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}
