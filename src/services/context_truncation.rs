//! Token estimation and text truncation for the conversation context.
//!
//! Uses a 4 chars/token heuristic and preserves newline boundaries when
//! truncating.

/// Approximate characters per token (conservative heuristic).
pub const CHARS_PER_TOKEN: usize = 4;

/// Maximum share of the usable context a single tool result may occupy.
const DEFAULT_MAX_RESULT_SHARE: f32 = 0.3;

/// Minimum characters any condensed result is allowed.
const DEFAULT_MIN_KEEP_CHARS: usize = 400;

/// Context window arithmetic for one conversation.
#[derive(Debug, Clone)]
pub struct ContextBudget {
    /// Model context window size in tokens.
    pub context_window_tokens: usize,
    /// Tokens kept free for the model's answer.
    pub response_reserve_tokens: usize,
    /// Maximum share of usable context per tool result (0.0-1.0).
    pub max_result_share: f32,
    /// Floor for condensed results.
    pub min_keep_chars: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::new(128_000, 8_000)
    }
}

impl ContextBudget {
    pub fn new(context_window_tokens: usize, response_reserve_tokens: usize) -> Self {
        Self {
            context_window_tokens,
            response_reserve_tokens,
            max_result_share: DEFAULT_MAX_RESULT_SHARE,
            min_keep_chars: DEFAULT_MIN_KEEP_CHARS,
        }
    }

    /// Characters available for messages.
    pub fn usable_chars(&self) -> usize {
        self.context_window_tokens
            .saturating_sub(self.response_reserve_tokens)
            .saturating_mul(CHARS_PER_TOKEN)
    }

    /// Largest single tool result, in characters.
    pub fn max_result_chars(&self) -> usize {
        ((self.usable_chars() as f32 * self.max_result_share) as usize).max(self.min_keep_chars)
    }

    /// Whether `incoming` more characters fit next to `current`.
    pub fn fits(&self, current_chars: usize, incoming_chars: usize) -> bool {
        current_chars.saturating_add(incoming_chars) <= self.usable_chars()
    }
}

/// Estimate the number of tokens in a string using the chars/token heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Truncate text so the result, marker included, is at most `max_chars` bytes.
///
/// Cuts at the last newline before the limit when there is one.
pub fn truncate_to_chars(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }

    let marker = format!(
        "\n[... truncated: ~{} tokens omitted ...]",
        estimate_tokens(text)
    );
    if max_chars <= marker.len() {
        return text[..floor_char_boundary(text, max_chars)].to_string();
    }

    let limit = floor_char_boundary(text, max_chars - marker.len());
    let cut = text[..limit].rfind('\n').filter(|&i| i > 0).unwrap_or(limit);
    format!("{}{}", &text[..cut], marker)
}

/// Truncate text to a specific token budget.
pub fn truncate_to_token_budget(text: &str, token_budget: usize) -> String {
    truncate_to_chars(text, token_budget.saturating_mul(CHARS_PER_TOKEN))
}
