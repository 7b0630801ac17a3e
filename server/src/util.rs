use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;

pub fn now_fixed() -> DateTimeWithTimeZone {
    Utc::now().fixed_offset()
}

/// Truncate on a char boundary, appending an ellipsis when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// Rough token estimate for rate-limit bucket acquisition. ~4 chars/token
/// holds well enough for English email text.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4).max(1)
}

/// Collapse a subject/body fragment to a single prompt-safe line.
pub fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string_untouched() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "héllo wörld, this is a test";
        let out = truncate_chars(s, 11);
        assert!(out.starts_with("héllo wörld"));
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_single_line_collapses_whitespace() {
        assert_eq!(single_line("a\n b\t\tc\r\n"), "a b c");
    }

    #[test]
    fn test_estimate_tokens_never_zero() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
