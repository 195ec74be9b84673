// ── omem Engine: Unified Tokenizer ──────────────────────────────────────────
//
// Single source of truth for token estimation. The engine operates on text
// (not raw tokens), so counts are estimated from character length at a
// fixed 4 chars/token — all callers go through `count_tokens()`, no manual
// division anywhere else.

/// Heuristic token estimator.
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    /// Average characters per token.
    chars_per_token: f32,
}

impl Tokenizer {
    /// The default estimator: 4 characters per token, rounded up.
    pub fn heuristic() -> Self {
        Tokenizer {
            chars_per_token: 4.0,
        }
    }

    /// Estimate the number of tokens in a string: `ceil(chars / 4)`.
    ///
    /// Character count (not byte count) keeps the estimate stable for
    /// CJK/emoji text.
    pub fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let char_count = text.chars().count();
        (char_count as f32 / self.chars_per_token).ceil() as usize
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::heuristic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(Tokenizer::heuristic().count_tokens(""), 0);
    }

    #[test]
    fn rounds_up() {
        let tok = Tokenizer::heuristic();
        assert_eq!(tok.count_tokens("a"), 1);
        assert_eq!(tok.count_tokens("abcd"), 1);
        assert_eq!(tok.count_tokens("abcde"), 2);
    }

    #[test]
    fn four_hundred_chars_is_one_hundred_tokens() {
        let tok = Tokenizer::heuristic();
        let text = "x".repeat(400);
        assert_eq!(tok.count_tokens(&text), 100);
    }

    #[test]
    fn counts_chars_not_bytes() {
        let tok = Tokenizer::heuristic();
        // 4 CJK chars = 12 bytes but 4 chars → 1 token.
        assert_eq!(tok.count_tokens("你好世界"), 1);
    }
}
