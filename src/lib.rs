//! Expiring memo library
//!
//! This library keeps short text notes that can delete themselves after a
//! countdown, warns one minute before deletion, and persists the collection
//! in a key-value store.

mod cli;
mod clock;
mod config;
mod duration;
mod errors;
mod helper;
mod kv_store;
mod note;
mod notification;
mod persist_scheduler;
mod session;
mod sort;
mod storage;
mod sweeper;
mod types;

// Re-export key components
pub use cli::*;
pub use clock::*;
pub use config::*;
pub use duration::*;
pub use errors::*;
pub use helper::*;
pub use kv_store::*;
pub use note::*;
pub use notification::*;
pub use persist_scheduler::*;
pub use session::*;
pub use sort::*;
pub use storage::*;
pub use sweeper::*;
pub use types::*;
