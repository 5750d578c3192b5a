//! Small helpers shared by the bot handlers: UTF-8 safe truncation and
//! duration formatting.

use std::time::Duration;

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use rfp_responder_bot::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Seconds with one decimal, e.g. `12.3s`.
#[must_use]
pub fn format_seconds(elapsed: Duration) -> String {
    format!("{:.1}s", elapsed.as_secs_f64())
}

/// Whole hours and minutes, e.g. `1h 5m`.
#[must_use]
pub fn format_hours_minutes(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_seconds(Duration::from_millis(12_340)), "12.3s");
        assert_eq!(format_seconds(Duration::ZERO), "0.0s");
        assert_eq!(format_hours_minutes(Duration::from_secs(3_900)), "1h 5m");
        assert_eq!(format_hours_minutes(Duration::from_secs(59)), "0h 0m");
    }
}
