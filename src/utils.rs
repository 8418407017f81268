//! Small display helpers shared by the view and the renderers.

use chrono::{Local, TimeZone};

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Unix seconds as local `YYYY-MM-DD HH:MM:SS`. Out-of-range values print raw.
pub fn format_unix(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).earliest() {
        Some(dt) => dt.format(TIME_FORMAT).to_string(),
        None => ts.to_string(),
    }
}

/// First 8 characters of a report id followed by `...`.
pub fn short_id(id: &str) -> String {
    let prefix: String = id.chars().take(8).collect();
    format!("{}...", prefix)
}

/// Truncate to `max_chars` characters, marking the cut with `...`.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else if max_chars <= 3 {
        s.chars().take(max_chars).collect()
    } else {
        let head: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", head)
    }
}

/// Terminal columns taken by `s`: CJK and fullwidth characters count twice.
pub fn display_width(s: &str) -> usize {
    s.chars().map(|c| if is_wide(c) { 2 } else { 1 }).sum()
}

/// Left-align `s` in `width` terminal columns.
pub fn pad_right(s: &str, width: usize) -> String {
    let used = display_width(s);
    if used >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - used))
    }
}

fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6)
}
