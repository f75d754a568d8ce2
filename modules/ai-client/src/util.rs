/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip a surrounding markdown fence from a model response.
///
/// Models sometimes wrap plain answers in ```text fences; the language tag
/// (if any) is dropped along with the fence.
pub fn strip_code_blocks(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) if !rest[..idx].contains(' ') => &rest[idx + 1..],
        _ => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_multibyte_chars() {
        let text = "Gold 黄金 rally";
        let truncated = truncate_to_char_boundary(text, 7);
        assert!(truncated.len() <= 7);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn truncate_within_bounds_is_identity() {
        assert_eq!(truncate_to_char_boundary("bullish", 100), "bullish");
    }

    #[test]
    fn strip_fence_with_language_tag() {
        assert_eq!(strip_code_blocks("```text\nOutput: bullish\n```"), "Output: bullish");
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
    }

    #[test]
    fn strip_fence_without_tag_and_plain_text() {
        assert_eq!(strip_code_blocks("```\nbearish\n```"), "bearish");
        assert_eq!(strip_code_blocks("  neutral  "), "neutral");
    }
}
