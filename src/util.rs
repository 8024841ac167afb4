//! Shared utility functions

/// Safely truncate a string to at most `max_bytes` while respecting UTF-8 boundaries.
///
/// If the string is already shorter than `max_bytes`, returns it unchanged.
/// Otherwise, finds the last valid UTF-8 character boundary at or before `max_bytes`
/// and returns a slice up to that point.
///
/// # Examples
///
/// ```
/// use cerberus_console::util::truncate_utf8_safe;
///
/// // ASCII: straightforward truncation
/// assert_eq!(truncate_utf8_safe("hello world", 5), "hello");
///
/// // UTF-8: respects character boundaries
/// // "cafe\u{0301}" is "café" where the accent is a combining character
/// let s = "cafe\u{0301}";  // 6 bytes total
/// let truncated = truncate_utf8_safe(s, 5);
/// assert!(truncated.len() <= 5);
/// assert!(truncated.is_char_boundary(truncated.len()));
/// ```
pub fn truncate_utf8_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Display names longer than this are shortened
const REPORT_NAME_MAX_CHARS: usize = 20;
/// Characters kept from a shortened name
const REPORT_NAME_KEEP_CHARS: usize = 16;

/// Shorten a report file name for list display
///
/// Names of at most 20 characters are shown as-is; longer ones keep their
/// first 16 characters followed by `....pdf`.
///
/// ```
/// use cerberus_console::util::shorten_report_name;
///
/// assert_eq!(shorten_report_name("short.pdf"), "short.pdf");
/// assert_eq!(
///     shorten_report_name("example.com_2024-01-15_full.pdf"),
///     "example.com_2024....pdf"
/// );
/// ```
pub fn shorten_report_name(name: &str) -> String {
    if name.chars().count() <= REPORT_NAME_MAX_CHARS {
        return name.to_string();
    }
    let head: String = name.chars().take(REPORT_NAME_KEEP_CHARS).collect();
    format!("{}....pdf", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_shorter_than_max() {
        assert_eq!(truncate_utf8_safe("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_at_ascii_boundary() {
        assert_eq!(truncate_utf8_safe("hello world", 5), "hello");
    }

    #[test]
    fn test_truncate_at_utf8_boundary() {
        // 3-byte UTF-8 character: "日" = 0xE6 0x97 0xA5
        let s = "日本語";
        // Each character is 3 bytes, so 9 bytes total
        // Truncating at 4 should give us just "日" (3 bytes)
        assert_eq!(truncate_utf8_safe(s, 4), "日");
        assert_eq!(truncate_utf8_safe(s, 6), "日本");
    }

    #[test]
    fn test_truncate_empty_string() {
        assert_eq!(truncate_utf8_safe("", 5), "");
    }

    #[test]
    fn test_truncate_to_zero() {
        assert_eq!(truncate_utf8_safe("hello", 0), "");
    }

    #[test]
    fn test_report_name_at_limit_unchanged() {
        let name = "a".repeat(16) + ".pdf";
        assert_eq!(name.len(), 20);
        assert_eq!(shorten_report_name(&name), name);
    }

    #[test]
    fn test_report_name_shortened_by_chars() {
        let name = "日本語のレポート_2024_full_scan.pdf";
        let short = shorten_report_name(name);
        assert!(short.ends_with("....pdf"));
        assert_eq!(short.chars().count(), 16 + 7);
    }
}
