//! Display orderings for the note collection.
use std::cmp::Ordering;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::Note;

/// How the notes are ordered for display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortPolicy {
    /// Most recently created first
    #[default]
    Latest,
    /// Oldest first
    Oldest,
    /// Closest to expiry first, notes without a countdown last
    Urgent,
    /// Furthest from expiry first, notes without a countdown first
    Relaxed,
}

/// Returns a sorted copy of `notes`. Equal keys keep their input order.
pub fn sort_notes(notes: &[Note], policy: SortPolicy, now_ms: i64) -> Vec<Note> {
    let mut sorted = notes.to_vec();
    match policy {
        SortPolicy::Latest => sorted.sort_by(|a, b| b.id.cmp(&a.id)),
        SortPolicy::Oldest => sorted.sort_by(|a, b| a.id.cmp(&b.id)),
        SortPolicy::Urgent => sorted.sort_by(|a, b| {
            compare_expiry(a.minutes_to_expiry(now_ms), b.minutes_to_expiry(now_ms))
        }),
        SortPolicy::Relaxed => sorted.sort_by(|a, b| {
            compare_expiry(b.minutes_to_expiry(now_ms), a.minutes_to_expiry(now_ms))
        }),
    }
    sorted
}

// `None` is +infinity.
fn compare_expiry(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
