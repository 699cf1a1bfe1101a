//! Human-readable duration formatting for progress output

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Format a number of seconds compactly.
///
/// Picks the two most significant units:
///
/// ```
/// use doubleplay_common::human_time::format_duration;
///
/// assert_eq!(format_duration(45), "45s");
/// assert_eq!(format_duration(330), "5m 30s");
/// assert_eq!(format_duration(3_720), "1h 02m");
/// assert_eq!(format_duration(190_800), "2d 05h");
/// ```
pub fn format_duration(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let s = seconds.abs();

    let body = if s < MINUTE {
        format!("{}s", s)
    } else if s < HOUR {
        format!("{}m {:02}s", s / MINUTE, s % MINUTE)
    } else if s < DAY {
        format!("{}h {:02}m", s / HOUR, (s % HOUR) / MINUTE)
    } else {
        format!("{}d {:02}h", s / DAY, (s % DAY) / HOUR)
    };

    format!("{}{}", sign, body)
}

/// Format an optional ETA, `"unknown"` when not yet estimable
pub fn format_eta(seconds: Option<i64>) -> String {
    match seconds {
        Some(s) => format_duration(s),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_only() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
    }

    #[test]
    fn test_minutes_pad_seconds() {
        assert_eq!(format_duration(60), "1m 00s");
        assert_eq!(format_duration(605), "10m 05s");
    }

    #[test]
    fn test_hours_and_days() {
        assert_eq!(format_duration(HOUR), "1h 00m");
        assert_eq!(format_duration(DAY + 3 * HOUR + 59), "1d 03h");
        assert_eq!(format_duration(400 * DAY), "400d 00h");
    }

    #[test]
    fn test_negative_values_keep_sign() {
        assert_eq!(format_duration(-90), "-1m 30s");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(None), "unknown");
        assert_eq!(format_eta(Some(125)), "2m 05s");
    }
}
