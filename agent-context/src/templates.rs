//! String templates used when assembling prompts. Kept as plain
//! functions rather than a templating engine — every template here is a
//! handful of interpolated tags, not worth a dependency.

/// Wraps the task description for the root user turn.
pub fn task_description(description: &str) -> String {
    format!("<task_description>{description}</task_description>")
}

/// Wraps the remaining working-time budget for the root user turn.
pub fn remaining_working_time(remaining_seconds: i64) -> String {
    format!("<remaining_working_time>{remaining_seconds}</remaining_working_time>")
}

/// Wraps a human interjection so the model can distinguish it from the
/// agent's own tool-result turns.
pub fn real_user(text: &str) -> String {
    format!("<real_user>{text}</real_user>")
}

/// The assistant-message prefix for an inlined SUMMARY node, where `k` is
/// the depth span the summary covers.
pub fn summary_prefix(k: u32) -> String {
    format!(
        "After the last action, I have also made {k} actions and get {k} observations. Here is a summary:"
    )
}

/// The user acknowledgement following an inlined SUMMARY node, reminding
/// the model to check on any sessions it left running.
pub const SUMMARY_ACK: &str =
    "Understood. Before continuing, check whether any previous sessions are still running.";

/// Opening tag for the inlined history section of a SUMMARY-turn prompt.
pub const HISTORY_OPEN: &str = "<history>";

/// Closing tag for the inlined history section of a SUMMARY-turn prompt.
pub const HISTORY_CLOSE: &str = "</history>";

/// The final user turn of a SUMMARY-turn prompt, forcing the model's next
/// tool call.
pub const FORCE_INTERNAL_SUMMARIZE: &str =
    "Summarize the history above. You MUST use the internal_summarize action this turn.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_wrap_exactly() {
        assert_eq!(
            task_description("do X"),
            "<task_description>do X</task_description>"
        );
        assert_eq!(
            remaining_working_time(120),
            "<remaining_working_time>120</remaining_working_time>"
        );
    }

    #[test]
    fn summary_prefix_interpolates_k() {
        assert_eq!(
            summary_prefix(5),
            "After the last action, I have also made 5 actions and get 5 observations. Here is a summary:"
        );
    }
}
