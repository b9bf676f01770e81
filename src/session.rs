//! One app session: the restored store plus its background tasks.
use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::Mutex;

use crate::{
    sweep_once, Clock, Config, ExpirySweeper, KeyValueStore, NoteStore, NotificationScheduler,
    PersistScheduler, Result, SweepReport,
};

/// Owns the note store, the expiry sweeper and the persist scheduler.
///
/// Construct once per session. Background tasks only hold weak references to
/// the store.
pub struct MemoSession {
    store: Arc<Mutex<NoteStore>>,
    sweeper: ExpirySweeper,
    persister: PersistScheduler,
    clock: Arc<dyn Clock>,
    started: bool,
}

impl MemoSession {
    /// Restores the store from `kv`. Nothing runs until [`MemoSession::start`].
    pub fn open(
        config: &Config,
        kv: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn NotificationScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let store = NoteStore::restore(config, kv, notifier, Arc::clone(&clock))?;
        let signal = store.persist_signal();
        let store = Arc::new(Mutex::new(store));

        let mut sweeper = ExpirySweeper::new(config, Arc::clone(&clock));
        sweeper.set_store(&store);
        let mut persister = PersistScheduler::new(config);
        persister.set_store(&store, signal);

        Ok(Self {
            store,
            sweeper,
            persister,
            clock,
            started: false,
        })
    }

    /// Starts the persist scheduler and the sweeper.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.persister.start()?;
        if let Err(e) = self.sweeper.start() {
            error!("Failed to start expiry sweeper: {}", e);
            return Err(e);
        }
        self.started = true;
        info!("Session started");
        Ok(())
    }

    pub fn store(&self) -> Arc<Mutex<NoteStore>> {
        Arc::clone(&self.store)
    }

    pub fn sweeper(&self) -> &ExpirySweeper {
        &self.sweeper
    }

    pub fn persister(&self) -> &PersistScheduler {
        &self.persister
    }

    /// Runs one sweep tick inline at the session clock's current instant.
    pub async fn sweep_now(&self) -> SweepReport {
        let mut store = self.store.lock().await;
        sweep_once(&mut store, self.clock.now_millis(), self.sweeper.settings())
    }

    /// Stops the background tasks and writes whatever is pending.
    ///
    /// Scheduled notifications stay scheduled; only deleting a note cancels
    /// its alert.
    pub async fn shutdown(&mut self) -> Result<()> {
        debug!("Shutting down session");
        self.sweeper.stop().await?;
        self.persister.stop().await?;
        self.started = false;

        self.store.lock().await.flush()?;
        info!("Session shut down");
        Ok(())
    }
}
