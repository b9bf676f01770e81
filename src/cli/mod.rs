//! CLI module for the blipnote application
//!
//! This module handles the command-line interface for interacting with a
//! memo session.
mod app;
mod args;

pub use app::*;
pub use args::*;
