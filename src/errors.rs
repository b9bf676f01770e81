//! Error types for the blipnote application.
//!
//! This module defines the error type shared by the note store, the
//! background schedulers and the storage/notification adapters.

use std::io;

use thiserror::Error;

use crate::NoteId;

/// The main error type for the blipnote application.
#[derive(Error, Debug)]
pub enum MemoError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A duration entry was rejected before being committed.
    #[error("Invalid duration: {message}")]
    InvalidDuration { message: String },

    /// The key-value store refused a write because it is over capacity.
    #[error("Storage full: writing {size} bytes under `{key}` exceeds capacity of {capacity} bytes")]
    StorageFull {
        key: String,
        size: u64,
        capacity: u64,
    },

    /// Note was not found when performing an operation.
    #[error("Note not found: {id}")]
    NoteNotFound { id: NoteId },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Errors related to the background sweeper or persist scheduler.
    #[error("Scheduler error: {message}")]
    SchedulerError { message: String },

    /// The notification service could not schedule or cancel an alert.
    #[error("Notification failed: {message}")]
    NotificationFailed { message: String },

    /// for mutex lock acquisition issues
    #[error("{message}")]
    LockAcquisitionFailed { message: String },
}

impl MemoError {
    /// Whether this error is the "storage full" condition callers surface
    /// as a dismissible warning.
    pub fn is_storage_full(&self) -> bool {
        matches!(self, MemoError::StorageFull { .. })
    }
}
