//! Shared utility functions

/// Truncate a string to a maximum length, appending "..." if truncated.
/// Handles multi-byte characters by finding a valid char boundary.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let suffix = "...";
    let target = max_len.saturating_sub(suffix.len());
    // Find a valid char boundary at or before target
    let mut end = target;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], suffix)
}

/// Truncate a string for display, collapsing newlines to spaces.
/// Handles multi-byte characters by finding a valid char boundary.
pub fn truncate_for_display(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ");
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Short content-derived digest of a string: xxh3, truncated to 8 hex digits.
///
/// Used to fold query strings into filenames and to shorten over-long path
/// segments. Stable across runs for the same input.
pub fn short_digest(input: &str) -> String {
    let hash = xxhash_rust::xxh3::xxh3_64(input.as_bytes());
    format!("{:08x}", hash & 0xffff_ffff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
    }

    #[test]
    fn test_truncate_for_display_collapses_newlines() {
        assert_eq!(truncate_for_display("a\nb", 10), "a b");
    }

    #[test]
    fn test_short_digest_is_stable() {
        let a = short_digest("q=1&r=2");
        let b = short_digest("q=1&r=2");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(a, short_digest("q=1&r=3"));
    }
}
