//! Time-window canonicalization.
//!
//! Stored windows come in two encodings: a legacy `[hour, hour]` pair (both
//! values <= 24) and the current `[minute, minute]` pair (minutes of day,
//! 0-1439). Canonical form is always minutes. An end past 1440 denotes a
//! window wrapping midnight, e.g. 23:00-01:00 is stored as `[1380, 1500]`.

/// Canonicalize a stored window to `(start_minutes, end_minutes)`.
/// Returns `None` for malformed input (fewer than two elements).
pub fn resolve(window: &[i64]) -> Option<(u32, u32)> {
    if window.len() < 2 {
        return None;
    }
    let (start, end) = (window[0], window[1]);
    if start < 0 || end < 0 {
        return None;
    }
    // Both values <= 24 means the legacy hours encoding.
    if start < 24 && end <= 24 {
        Some((start as u32 * 60, end as u32 * 60))
    } else {
        Some((start as u32, end as u32))
    }
}

/// Whether `now` (minute of day) falls inside a canonical window,
/// accounting for windows that wrap past midnight.
pub fn contains(start: u32, end: u32, now: u32) -> bool {
    if end > 1440 {
        (start <= now && now < 1440) || now < end - 1440
    } else {
        start <= now && now < end
    }
}

/// Render a canonical minute-of-day as "HH:MM".
pub fn format_minutes(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_legacy_hours() {
        assert_eq!(resolve(&[9, 11]), Some((540, 660)));
        assert_eq!(resolve(&[0, 24]), Some((0, 1440)));
    }

    #[test]
    fn test_resolve_minutes_passthrough() {
        assert_eq!(resolve(&[540, 660]), Some((540, 660)));
        assert_eq!(resolve(&[1380, 1500]), Some((1380, 1500)));
        // One value above 24 forces the minutes reading
        assert_eq!(resolve(&[10, 90]), Some((10, 90)));
    }

    #[test]
    fn test_resolve_malformed() {
        assert_eq!(resolve(&[]), None);
        assert_eq!(resolve(&[540]), None);
        assert_eq!(resolve(&[-1, 60]), None);
    }

    #[test]
    fn test_contains_plain_window() {
        assert!(contains(540, 660, 540));
        assert!(contains(540, 660, 659));
        assert!(!contains(540, 660, 660));
        assert!(!contains(540, 660, 539));
    }

    #[test]
    fn test_contains_overnight_window() {
        // 23:00-01:00 stored as [1380, 1500]
        assert!(contains(1380, 1500, 1410)); // 23:30
        assert!(contains(1380, 1500, 30)); // 00:30
        assert!(!contains(1380, 1500, 700)); // 11:40
        assert!(!contains(1380, 1500, 60)); // 01:00 is exclusive
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0), "00:00");
        assert_eq!(format_minutes(845), "14:05");
    }
}
