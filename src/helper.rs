use chrono::{Local, TimeZone};

/// Renders a remaining duration such as `2d 03h`, `1h 05m`, `4m 09s` or `12s`.
pub fn format_time_left(millis: i64) -> String {
    if millis <= 0 {
        return "expired".to_string();
    }
    let secs = millis / 1_000;
    let (days, hours, minutes, seconds) = (
        secs / 86_400,
        (secs % 86_400) / 3_600,
        (secs % 3_600) / 60,
        secs % 60,
    );

    if days > 0 {
        format!("{}d {:02}h", days, hours)
    } else if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Spells out a lead time in its largest whole unit: `1 minute`, `2 hours`,
/// `90 seconds`.
pub fn format_lead(millis: i64) -> String {
    const UNITS: [(i64, &str); 4] = [
        (86_400_000, "day"),
        (3_600_000, "hour"),
        (60_000, "minute"),
        (1_000, "second"),
    ];

    let (count, unit) = UNITS
        .iter()
        .find(|(size, _)| millis >= *size && millis % size == 0)
        .map(|&(size, unit)| (millis / size, unit))
        .unwrap_or((millis, "millisecond"));
    format!("{} {}{}", count, unit, if count == 1 { "" } else { "s" })
}

/// Formats epoch milliseconds in local time, `-` if out of range.
pub fn format_instant(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}
