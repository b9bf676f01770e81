//! The note record and its derived expiry values.
//!
//! Notes are persisted as camelCase JSON. Records written by the older,
//! preset-only schema (`time`/`unit`/`updatedAt`) load through serde aliases
//! and default back-fill.
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{is_sentinel, to_minutes, validate_magnitude, DurationUnit};

/// Note identifier: the creation timestamp in epoch milliseconds.
pub type NoteId = i64;

/// Maximum number of characters a note's text may hold.
pub const MAX_TEXT_CHARS: usize = 500;

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// Represents a single note in our system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier, doubles as the creation-order key
    pub id: NoteId,
    /// Free-form content
    #[serde(default)]
    pub text: String,
    /// Numeric literal, or empty when the note never expires
    #[serde(default, alias = "time", deserialize_with = "deserialize_magnitude")]
    pub duration_magnitude: String,
    /// Unit of `duration_magnitude`
    #[serde(default, alias = "unit")]
    pub duration_unit: DurationUnit,
    /// When the countdown was last (re)started, in epoch milliseconds
    #[serde(default, alias = "updatedAt")]
    pub last_armed_at: Option<i64>,
}

impl Note {
    /// Creates a blank, unarmed note.
    pub fn new(id: NoteId) -> Self {
        Note {
            id,
            text: String::new(),
            duration_magnitude: String::new(),
            duration_unit: DurationUnit::default(),
            last_armed_at: None,
        }
    }

    /// Countdown length in minutes, `0.0` when no duration is set.
    pub fn duration_minutes(&self) -> f64 {
        if is_sentinel(&self.duration_magnitude) {
            return 0.0;
        }
        to_minutes(&self.duration_magnitude, self.duration_unit)
    }

    /// Whether the note carries a countdown at all.
    pub fn has_duration(&self) -> bool {
        self.duration_minutes() > 0.0
    }

    /// The instant (epoch ms) at which the note expires, if it is armed.
    ///
    /// `None` also when the instant falls outside the representable range.
    pub fn expiration_instant(&self) -> Option<i64> {
        let armed_at = self.last_armed_at?;
        let minutes = self.duration_minutes();
        if minutes <= 0.0 {
            return None;
        }
        armed_at.checked_add((minutes * MILLIS_PER_MINUTE).round() as i64)
    }

    /// Milliseconds left before expiry at `now_ms`. Negative once expired.
    pub fn time_left(&self, now_ms: i64) -> Option<i64> {
        self.expiration_instant()
            .map(|expires| expires.saturating_sub(now_ms))
    }

    /// Minutes left before expiry, used as the urgency sort key.
    pub fn minutes_to_expiry(&self, now_ms: i64) -> Option<f64> {
        self.time_left(now_ms)
            .map(|left| left as f64 / MILLIS_PER_MINUTE)
    }

    /// First `max_chars` characters of the text, with `...` when cut.
    pub fn preview(&self, max_chars: usize) -> String {
        preview_text(&self.text, max_chars)
    }

    /// Normalizes fields loaded from disk. A magnitude that would not pass
    /// commit validation is dropped along with its countdown.
    ///
    /// Returns true when anything changed.
    pub(crate) fn migrate(&mut self) -> bool {
        let before = (self.duration_magnitude.clone(), self.last_armed_at);

        if is_sentinel(&self.duration_magnitude) {
            self.duration_magnitude.clear();
        } else {
            let trimmed = self.duration_magnitude.trim().to_string();
            match validate_magnitude(&trimmed, self.duration_unit) {
                Ok(_) => self.duration_magnitude = trimmed,
                Err(e) => {
                    warn!("Note {} duration `{}` dropped: {}", self.id, trimmed, e);
                    self.duration_magnitude.clear();
                    self.last_armed_at = None;
                }
            }
        }
        let truncated = truncate_chars(&mut self.text, MAX_TEXT_CHARS);

        truncated || before != (self.duration_magnitude.clone(), self.last_armed_at)
    }
}

/// Truncates to `max_chars` characters, appending `...` when anything was cut.
pub fn preview_text(text: &str, max_chars: usize) -> String {
    let mut preview: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        preview.push_str("...");
    }
    preview
}

/// Cuts `text` down to at most `max_chars` characters in place.
/// Returns true when something was removed.
pub(crate) fn truncate_chars(text: &mut String, max_chars: usize) -> bool {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            text.truncate(byte_idx);
            true
        }
        None => false,
    }
}

// Preset-era records stored the duration as a bare number.
fn deserialize_magnitude<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_note_never_expires() {
        let note = Note::new(1_000);
        assert!(!note.has_duration());
        assert_eq!(note.expiration_instant(), None);
    }

    #[test]
    fn expiration_is_armed_at_plus_duration() {
        let mut note = Note::new(1_000);
        note.duration_magnitude = "2".to_string();
        note.duration_unit = DurationUnit::Minutes;
        note.last_armed_at = Some(10_000);
        assert_eq!(note.expiration_instant(), Some(130_000));
        assert_eq!(note.time_left(69_000), Some(61_000));
    }

    #[test]
    fn duration_without_arming_does_not_expire() {
        let mut note = Note::new(1_000);
        note.duration_magnitude = "5".to_string();
        assert!(note.has_duration());
        assert_eq!(note.expiration_instant(), None);
    }

    #[test]
    fn loads_legacy_preset_record() {
        let raw = r#"{"id": 42, "text": "old", "time": 5}"#;
        let note: Note = serde_json::from_str(raw).unwrap();
        assert_eq!(note.duration_magnitude, "5");
        assert_eq!(note.duration_unit, DurationUnit::Minutes);
        assert_eq!(note.last_armed_at, None);
    }

    #[test]
    fn loads_previous_field_names() {
        let raw = r#"{"id": 7, "text": "x", "time": "3", "unit": "hours", "updatedAt": 99}"#;
        let note: Note = serde_json::from_str(raw).unwrap();
        assert_eq!(note.duration_magnitude, "3");
        assert_eq!(note.duration_unit, DurationUnit::Hours);
        assert_eq!(note.last_armed_at, Some(99));
    }

    #[test]
    fn missing_optional_fields_default() {
        let note: Note = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert_eq!(note, Note::new(3));

        let note: Note =
            serde_json::from_str(r#"{"id": 3, "unit": "weeks", "updatedAt": null}"#).unwrap();
        assert_eq!(note.duration_unit, DurationUnit::Minutes);
    }

    #[test]
    fn migrate_drops_durations_over_the_cap() {
        let mut note: Note = serde_json::from_str(
            r#"{"id": 1, "durationMagnitude": "99999999999999999999",
                "durationUnit": "days", "lastArmedAt": 1700000000000}"#,
        )
        .unwrap();
        assert!(note.migrate());
        assert_eq!(note.duration_magnitude, "");
        assert_eq!(note.last_armed_at, None);
        assert_eq!(note.expiration_instant(), None);

        let mut note: Note =
            serde_json::from_str(r#"{"id": 2, "time": "1e3", "updatedAt": 5}"#).unwrap();
        assert!(note.migrate());
        assert!(!note.has_duration());
    }

    #[test]
    fn migrate_keeps_valid_records() {
        let mut note: Note =
            serde_json::from_str(r#"{"id": 3, "time": " 60 ", "updatedAt": 1000}"#).unwrap();
        assert!(note.migrate());
        assert_eq!(note.duration_magnitude, "60");

        let before = note.clone();
        assert!(!note.migrate());
        assert_eq!(note, before);
    }

    #[test]
    fn expiration_past_the_end_of_time_is_none() {
        let mut note = Note::new(1);
        note.duration_magnitude = "365".to_string();
        note.duration_unit = DurationUnit::Days;
        note.last_armed_at = Some(i64::MAX - 10);
        assert_eq!(note.expiration_instant(), None);
        assert_eq!(note.time_left(0), None);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(Note::new(5)).unwrap();
        assert!(json.get("durationMagnitude").is_some());
        assert!(json.get("durationUnit").is_some());
        assert!(json.get("lastArmedAt").is_some());
        assert_eq!(json["durationUnit"], "minutes");
    }

    #[test]
    fn preview_truncates_with_ellipsis() {
        assert_eq!(preview_text("buy milk", 20), "buy milk");
        assert_eq!(
            preview_text("abcdefghijklmnopqrstuvwxyz", 20),
            "abcdefghijklmnopqrst..."
        );
        assert_eq!(preview_text("가나다라", 2), "가나...");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let mut text = "가나다".to_string();
        assert!(truncate_chars(&mut text, 2));
        assert_eq!(text, "가나");
        assert!(!truncate_chars(&mut text, 2));
    }
}
