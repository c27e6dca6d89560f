//! Token estimation and usage reporting for the context window.
//!
//! The estimate is a fixed heuristic, not a tokenizer: one token per four
//! characters, plus one. It errs on the high side for short strings and is
//! fully deterministic, which is what budget accounting and tests need.

use serde::Serialize;

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token cost of `text` as `floor(chars / 4) + 1`.
///
/// Counts Unicode scalar values, not bytes, so multi-byte text is not
/// overcharged.
///
/// ```
/// use cinch_memory::context::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 1);
/// assert_eq!(estimate_tokens("abc"), 1);
/// assert_eq!(estimate_tokens("abcd"), 2);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN + 1
}

/// Point-in-time token accounting for a context window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    /// System message plus rolling messages.
    pub total: usize,
    /// Rolling messages only.
    pub messages: usize,
    /// System message only (0 when unset).
    pub system: usize,
    /// Room left for new rolling messages.
    pub available: usize,
    /// Configured context size.
    pub max: usize,
}

impl TokenUsage {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({} system + {} messages, {} free of {})",
            self.total, self.system, self.messages, self.available, self.max,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_floor_quarter_plus_one() {
        assert_eq!(estimate_tokens(&"a".repeat(7)), 2);
        assert_eq!(estimate_tokens(&"a".repeat(8)), 3);
        assert_eq!(estimate_tokens(&"a".repeat(116)), 30);
        assert_eq!(estimate_tokens(&"a".repeat(119)), 30);
    }

    #[test]
    fn estimate_counts_chars_not_bytes() {
        // Four 3-byte characters.
        assert_eq!(estimate_tokens("日本語字"), 2);
    }

    #[test]
    fn usage_log_string_format() {
        let usage = TokenUsage {
            total: 50,
            messages: 40,
            system: 10,
            available: 30,
            max: 100,
        };
        let log = usage.to_log_string();
        assert!(log.starts_with("context: ~50 tokens"));
        assert!(log.contains("30 free of 100"));
    }
}
