//! The note collection: the single source of truth during a session.
//!
//! Every mutation marks the collection dirty and wakes the persist scheduler,
//! which coalesces bursts of edits into one write.
use std::{collections::HashSet, sync::Arc};

use log::{debug, error, info, trace, warn};
use tokio::sync::Notify;

use crate::{
    note::truncate_chars, validate_magnitude, Clock, Config, KeyValueStore, MemoError, Note,
    NoteId, NotePatch, Notice, NotificationScheduler, Result, MAX_TEXT_CHARS,
};

/// Manages the in-memory notes and their persistence.
pub struct NoteStore {
    /// Key the serialized collection is stored under
    storage_key: String,

    /// Notes in insertion order
    notes: Vec<Note>,

    /// Notes whose pre-expiry warning is already scheduled for the current arming
    warned: HashSet<NoteId>,

    /// Last id handed out, keeps ids unique under rapid creation
    last_issued_id: NoteId,

    /// Whether the in-memory collection differs from the last successful write
    dirty: bool,

    /// Woken on every mutation
    persist_signal: Arc<Notify>,

    /// Messages waiting to be shown to the user
    notices: Vec<Notice>,

    kv: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn NotificationScheduler>,
    clock: Arc<dyn Clock>,
}

impl NoteStore {
    /// Loads the collection persisted under `config.storage_key`.
    ///
    /// Missing optional fields are back-filled, legacy records migrated and
    /// duplicate ids re-keyed. An absent, empty or unreadable entry starts
    /// the session with a single blank note.
    ///
    /// # Errors
    ///
    /// Only an I/O failure while reading the key-value store is returned;
    /// malformed data is recovered locally.
    pub fn restore(
        config: &Config,
        kv: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn NotificationScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut store = Self {
            storage_key: config.storage_key.clone(),
            notes: Vec::new(),
            warned: HashSet::new(),
            last_issued_id: 0,
            dirty: false,
            persist_signal: Arc::new(Notify::new()),
            notices: Vec::new(),
            kv,
            notifier,
            clock,
        };

        let persisted = store.kv.get(&store.storage_key)?;
        match persisted {
            Some(raw) => match serde_json::from_str::<Vec<Note>>(&raw) {
                Ok(notes) => {
                    store.load(notes);
                    info!("Restored {} note(s)", store.notes.len());
                }
                Err(e) => {
                    error!(
                        "Persisted notes under `{}` are unreadable, starting fresh: {}",
                        store.storage_key, e
                    );
                    let backup_key = format!("{}.corrupt", store.storage_key);
                    if let Err(e) = store.kv.set(&backup_key, &raw) {
                        warn!("Failed to keep unreadable notes under `{}`: {}", backup_key, e);
                    }
                }
            },
            None => debug!("No persisted notes under `{}`", store.storage_key),
        }

        if store.notes.is_empty() {
            store.create();
        }

        Ok(store)
    }

    fn load(&mut self, notes: Vec<Note>) {
        self.last_issued_id = notes.iter().map(|n| n.id).max().unwrap_or(0);
        self.notes = notes;

        let mut seen = HashSet::with_capacity(self.notes.len());
        for index in 0..self.notes.len() {
            if self.notes[index].migrate() {
                self.dirty = true;
            }
            let id = self.notes[index].id;
            if !seen.insert(id) {
                let new_id = self.next_id();
                warn!("Duplicate note id {} re-keyed to {}", id, new_id);
                self.notes[index].id = new_id;
                seen.insert(new_id);
                self.dirty = true;
            }
        }
    }

    fn next_id(&mut self) -> NoteId {
        match self.last_issued_id.checked_add(1) {
            Some(next) => {
                let id = self.clock.now_millis().max(next);
                self.last_issued_id = id;
                id
            }
            // The top of the id range is taken; count down below every note.
            None => {
                let lowest = self.notes.iter().map(|n| n.id).min().unwrap_or(0);
                warn!("Note ids exhausted upwards, issuing below {}", lowest);
                lowest.saturating_sub(1)
            }
        }
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.persist_signal.notify_one();
    }

    fn cancel_alert(&self, id: NoteId) {
        if let Err(e) = self.notifier.cancel(&id.to_string()) {
            warn!("Failed to cancel alert for note {}: {}", id, e);
        }
    }

    /// Appends a blank note and returns its id.
    pub fn create(&mut self) -> NoteId {
        let id = self.next_id();
        self.notes.push(Note::new(id));
        self.mark_dirty();
        debug!("Created note {}", id);
        id
    }

    /// Applies `patch` to the note with `id`.
    ///
    /// Returns `Ok(false)` when no such note exists. A rejected duration
    /// leaves the store unchanged and queues a [`Notice::InvalidDuration`].
    pub fn update(&mut self, id: NoteId, patch: NotePatch) -> Result<bool> {
        let Some(index) = self.notes.iter().position(|n| n.id == id) else {
            debug!("Update ignored, note {} not found", id);
            return Ok(false);
        };

        let target_unit = patch.duration_unit.unwrap_or(self.notes[index].duration_unit);
        let magnitude = patch.duration_magnitude.as_deref().map(str::trim);
        if let Some(magnitude) = magnitude.filter(|m| !m.is_empty()) {
            if let Err(e) = validate_magnitude(magnitude, target_unit) {
                if let MemoError::InvalidDuration { message } = &e {
                    self.notices.push(Notice::InvalidDuration {
                        message: message.clone(),
                    });
                }
                warn!("Rejected duration for note {}: {}", id, e);
                return Err(e);
            }
        }

        let now = self.clock.now_millis();
        let mut cancel = false;
        let note = &mut self.notes[index];

        if let Some(unit) = patch.duration_unit {
            if unit != note.duration_unit {
                debug!("Note {} unit {} -> {}, countdown cleared", id, note.duration_unit, unit);
                note.duration_unit = unit;
                note.duration_magnitude.clear();
                note.last_armed_at = None;
                cancel = true;
            }
        }

        if let Some(magnitude) = magnitude {
            if magnitude.is_empty() {
                note.duration_magnitude.clear();
                note.last_armed_at = None;
                debug!("Note {} disarmed", id);
            } else {
                note.duration_magnitude = magnitude.to_string();
                note.last_armed_at = Some(now);
                info!("Note {} armed for {} {}", id, magnitude, note.duration_unit);
            }
            cancel = true;
        }

        if let Some(mut text) = patch.text {
            if truncate_chars(&mut text, MAX_TEXT_CHARS) {
                debug!("Note {} text truncated to {} characters", id, MAX_TEXT_CHARS);
            }
            note.text = text;
        }

        if cancel {
            self.warned.remove(&id);
            self.cancel_alert(id);
        }
        self.mark_dirty();
        Ok(true)
    }

    /// Removes the note with `id` and cancels its alert.
    ///
    /// Leaving the collection empty is allowed here; the next observation
    /// ([`NoteStore::ensure_not_empty`]) puts a blank note back.
    pub fn delete(&mut self, id: NoteId) -> bool {
        let before = self.notes.len();
        self.notes.retain(|n| n.id != id);
        if self.notes.len() == before {
            debug!("Delete ignored, note {} not found", id);
            return false;
        }

        self.warned.remove(&id);
        self.cancel_alert(id);
        self.mark_dirty();
        info!("Deleted note {}", id);
        true
    }

    /// Notes in insertion order.
    pub fn list(&self) -> &[Note] {
        &self.notes
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Synthesizes a blank note if the collection is empty.
    pub fn ensure_not_empty(&mut self) -> Option<NoteId> {
        if self.notes.is_empty() {
            let id = self.create();
            info!("Collection was empty, created blank note {}", id);
            Some(id)
        } else {
            None
        }
    }

    /// Writes the full collection to the key-value store.
    ///
    /// # Errors
    ///
    /// [`MemoError::StorageFull`] when the store is over capacity; a
    /// [`Notice::StorageFull`] is queued and the collection stays dirty so
    /// the write is retried on the next mutation or sweep.
    pub fn persist(&mut self) -> Result<()> {
        let json = serde_json::to_string(&self.notes)?;
        match self.kv.set(&self.storage_key, &json) {
            Ok(()) => {
                trace!("Persisted {} note(s), {} bytes", self.notes.len(), json.len());
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                if e.is_storage_full() {
                    warn!("Storage full, keeping notes in memory only: {}", e);
                    if !self.notices.contains(&Notice::StorageFull) {
                        self.notices.push(Notice::StorageFull);
                    }
                } else {
                    error!("Failed to persist notes: {}", e);
                }
                Err(e)
            }
        }
    }

    /// Observation step run by the persist scheduler: repairs emptiness and
    /// writes pending changes.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_not_empty();
        if self.dirty {
            self.persist()?;
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Drains the notices waiting to be shown.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Signal the persist scheduler waits on.
    pub fn persist_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.persist_signal)
    }

    pub fn is_warned(&self, id: NoteId) -> bool {
        self.warned.contains(&id)
    }

    pub(crate) fn mark_warned(&mut self, id: NoteId) {
        self.warned.insert(id);
    }

    pub(crate) fn notifier(&self) -> &Arc<dyn NotificationScheduler> {
        &self.notifier
    }

    /// Drops every note for which `keep` returns false, canceling alerts.
    /// Returns the removed notes.
    pub(crate) fn evict_where<F>(&mut self, mut keep: F) -> Vec<Note>
    where
        F: FnMut(&Note) -> bool,
    {
        let (kept, evicted): (Vec<Note>, Vec<Note>) =
            std::mem::take(&mut self.notes).into_iter().partition(|n| keep(n));
        self.notes = kept;

        for note in &evicted {
            self.warned.remove(&note.id);
            self.cancel_alert(note.id);
        }
        if !evicted.is_empty() {
            self.mark_dirty();
        }
        evicted
    }
}
