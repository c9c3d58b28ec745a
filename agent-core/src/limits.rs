//! Context-budget configuration shared by the Context Manager and Scaffold.

use serde::{Deserialize, Serialize};

/// Token and internal-action budgets for one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextLimits {
    /// Tokens reserved for the model's own reply, added on top of the
    /// counted prompt when checking against `context_length`.
    pub max_tokens: u32,
    /// Prompt-token threshold that triggers summarization.
    pub summary_threshold: u32,
    /// The model's hard context-window cap.
    pub context_length: u32,
    /// Cap on think/summarize calls within a single `step()`; `-1` means
    /// unbounded.
    pub max_internal_action_times: i32,
}

impl ContextLimits {
    /// Whether summarization should trigger: `total_tokens >=
    /// summary_threshold`, or `total_tokens - max_tokens >= context_length`.
    pub fn should_summarize(&self, total_tokens: u32) -> bool {
        total_tokens >= self.summary_threshold
            || total_tokens.saturating_sub(self.max_tokens) >= self.context_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ContextLimits {
        ContextLimits {
            max_tokens: 1000,
            summary_threshold: 50_000,
            context_length: 100_000,
            max_internal_action_times: 20,
        }
    }

    #[test]
    fn triggers_on_threshold() {
        assert!(limits().should_summarize(50_000));
        assert!(!limits().should_summarize(49_999));
    }

    #[test]
    fn triggers_on_context_length_overflow() {
        let l = limits();
        assert!(l.should_summarize(l.context_length + l.max_tokens));
    }
}
