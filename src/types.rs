//! Shared types for the blipnote application.
//!
//! This module contains the Result alias, the partial-update type used by the
//! note store, user-facing notices and the CLI subcommands.
use std::fmt;

use clap::Subcommand;

use crate::{DurationUnit, MemoError, NoteId, SortPolicy};

/// A specialized Result type for blipnote operations.
pub type Result<T> = std::result::Result<T, MemoError>;

/// A partial change to a note. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    /// Replacement text
    pub text: Option<String>,
    /// New magnitude; an empty string disarms the note
    pub duration_magnitude: Option<String>,
    /// New unit; a change always clears the magnitude first
    pub duration_unit: Option<DurationUnit>,
}

impl NotePatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn arm(magnitude: impl Into<String>) -> Self {
        Self {
            duration_magnitude: Some(magnitude.into()),
            ..Self::default()
        }
    }

    pub fn disarm() -> Self {
        Self::arm(String::new())
    }

    pub fn unit(unit: DurationUnit) -> Self {
        Self {
            duration_unit: Some(unit),
            ..Self::default()
        }
    }

    /// Sets the unit and arms with the magnitude in one step.
    pub fn arm_with_unit(magnitude: impl Into<String>, unit: DurationUnit) -> Self {
        Self {
            duration_magnitude: Some(magnitude.into()),
            duration_unit: Some(unit),
            ..Self::default()
        }
    }
}

/// A dismissible message for the user. Failures in the core never crash the
/// session; they are queued here instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A duration entry was rejected and nothing was stored
    InvalidDuration { message: String },
    /// The last write to the key-value store was dropped
    StorageFull,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::InvalidDuration { message } => write!(f, "{}", message),
            Notice::StorageFull => write!(
                f,
                "Storage is full. Recent changes are kept in memory but could not be saved."
            ),
        }
    }
}

/// Available subcommands for the blipnote application
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    New {
        /// Initial text of the note (500 characters max)
        #[clap(short, long)]
        text: Option<String>,
    },

    /// List notes
    List {
        /// Ordering of the listed notes
        #[clap(short, long, value_enum, default_value_t = SortPolicy::Latest)]
        sort: SortPolicy,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Replace the text of a note
    Edit {
        /// ID of the note to edit
        id: NoteId,

        /// New text for the note
        #[clap(short, long)]
        text: String,
    },

    /// Start (or restart) the self-delete countdown of a note
    Arm {
        /// ID of the note to arm
        id: NoteId,

        /// How many units until the note deletes itself
        magnitude: String,

        /// Unit of the magnitude (keeps the note's current unit if omitted)
        #[clap(short, long, value_enum)]
        unit: Option<DurationUnit>,
    },

    /// Clear the countdown of a note so it never expires
    Disarm {
        /// ID of the note to disarm
        id: NoteId,
    },

    /// Change the duration unit of a note (clears its countdown)
    Unit {
        /// ID of the note
        id: NoteId,

        /// New duration unit
        #[clap(value_enum)]
        unit: DurationUnit,
    },

    /// Delete a note by ID
    Delete {
        /// ID of the note to delete
        id: NoteId,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Keep the session running so notes expire and warnings fire
    Watch {
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[clap(short, long)]
        seconds: Option<u64>,

        /// Ordering used when printing the notes on each change
        #[clap(long, value_enum, default_value_t = SortPolicy::Urgent)]
        sort: SortPolicy,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[clap(short = 'S', long)]
        show: bool,

        /// Reset configuration to defaults
        #[clap(short, long)]
        reset: bool,
    },
}
