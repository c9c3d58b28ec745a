//! Action: a typed tool call the agent emits, converted from the model's
//! raw tool-use content part via the Action/Observation Registry.

use crate::id::ToolCallId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of action tags the core itself knows about.
///
/// File I/O, web browsing, search, and PDF/media parsing are deliberately
/// absent: those are pluggable handler territory (§4.2), registered by the
/// embedding application, not fixed members of this enum. Extending the
/// catalog is a registry concern ([`crate::action::ActionType::Custom`]),
/// not an enum-variant concern, so third-party action kinds never require
/// a change here.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Run a shell command in a broker session.
    Run,
    /// Write stdin to a session that is waiting for input.
    InputInSession,
    /// Check whether a session is idle (no active descendant process).
    CheckSessionIdle,
    /// Fetch a slice of a session's output buffer.
    GetSessionOutput,
    /// Internal: record a thought without touching the outside world.
    Think,
    /// Internal: deterministically triggered tree summarization.
    Summarize,
    /// Internal: the model's summary-turn response, restricted to this tag.
    InternalSummarize,
    /// Declare the task finished.
    Finish,
    /// Opaque evaluation hook (`validate() -> score`); handler is pluggable.
    Eval,
    /// Pause for a fixed duration.
    Sleep,
    /// A malformed or unrecognized tool call, carrying the reason.
    Null,
    /// An action kind registered by the embedding application at startup,
    /// identified by name (e.g. `read_file`, `web_search`).
    Custom(String),
}

impl ActionType {
    /// The wire name used as the tool name in the registry and the model's
    /// tool-call `name` field.
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Run => "run",
            ActionType::InputInSession => "input_in_session",
            ActionType::CheckSessionIdle => "check_session_idle",
            ActionType::GetSessionOutput => "get_session_output",
            ActionType::Think => "think",
            ActionType::Summarize => "summarize",
            ActionType::InternalSummarize => "internal_summarize",
            ActionType::Finish => "finish",
            ActionType::Eval => "eval",
            ActionType::Sleep => "sleep",
            ActionType::Null => "null",
            ActionType::Custom(name) => name,
        }
    }

    /// Whether this action type is handled entirely within the tree/context
    /// (never dispatched to the Environment).
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ActionType::Think | ActionType::Summarize | ActionType::InternalSummarize
        )
    }

    /// Recover an `ActionType` from a tool-call's wire name (the inverse of
    /// [`ActionType::as_str`]). Unrecognized names become `Custom`, since
    /// the registry — not this enum — is the source of truth for which
    /// custom actions actually exist; the caller checks that separately.
    pub fn from_wire_name(name: &str) -> Self {
        match name {
            "run" => ActionType::Run,
            "input_in_session" => ActionType::InputInSession,
            "check_session_idle" => ActionType::CheckSessionIdle,
            "get_session_output" => ActionType::GetSessionOutput,
            "think" => ActionType::Think,
            "summarize" => ActionType::Summarize,
            "internal_summarize" => ActionType::InternalSummarize,
            "finish" => ActionType::Finish,
            "eval" => ActionType::Eval,
            "sleep" => ActionType::Sleep,
            "null" => ActionType::Null,
            other => ActionType::Custom(other.to_string()),
        }
    }
}

/// Coarse security classification surfaced to tooling as an `x-risk`
/// schema annotation. Not enforced by the core itself — there is no
/// human-in-the-loop confirmation UI in this spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No special handling.
    Safe,
    /// Worth a second look before running (e.g. destructive-looking `rm`).
    NeedsConfirmation,
    /// Can destroy data or processes outside the declared sandbox.
    Destructive,
}

/// A typed tool call: the agent's chosen action for this turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Which action kind this is.
    pub action_type: ActionType,
    /// Correlates this call with its eventual observation.
    pub call_id: ToolCallId,
    /// Typed argument record, as a JSON value (schema-validated by the
    /// registry at construction time).
    pub args: Value,
    /// Human-readable description of intent (the model's rationale, if any).
    pub description: Option<String>,
    /// Coarse risk classification.
    pub risk: RiskLevel,
}

impl Action {
    /// Construct a `Null` action carrying an explanatory error message.
    /// Used when the model emits a malformed or unrecognized tool call;
    /// per §4.2 this never has side effects.
    pub fn null(call_id: ToolCallId, reason: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Null,
            call_id,
            args: serde_json::json!({ "reason": reason.into() }),
            description: None,
            risk: RiskLevel::Safe,
        }
    }

    /// Construct a `Finish` action.
    pub fn finish(call_id: ToolCallId, task_completed: bool, reason: impl Into<String>) -> Self {
        Self {
            action_type: ActionType::Finish,
            call_id,
            args: serde_json::json!({
                "task_completed": task_completed,
                "reason": reason.into(),
            }),
            description: None,
            risk: RiskLevel::Safe,
        }
    }

    /// Construct the deterministic `Summarize` action synthesized by
    /// `should_summarize()` (§4.4): `start_summary_depth=1`,
    /// `end_summary_depth=(current_depth+1)/2` (integer division).
    pub fn synthesized_summarize(call_id: ToolCallId, current_depth: u32) -> Self {
        let end_summary_depth = (current_depth + 1) / 2;
        Self {
            action_type: ActionType::Summarize,
            call_id,
            args: serde_json::json!({
                "start_summary_depth": 1,
                "end_summary_depth": end_summary_depth,
            }),
            description: None,
            risk: RiskLevel::Safe,
        }
    }

    /// Read `start_summary_depth`/`end_summary_depth` out of a `Summarize`
    /// action's args. Returns `None` if either field is missing or not a
    /// non-negative integer.
    pub fn summarize_depths(&self) -> Option<(u32, u32)> {
        let d1 = self.args.get("start_summary_depth")?.as_u64()? as u32;
        let d2 = self.args.get("end_summary_depth")?.as_u64()? as u32;
        Some((d1, d2))
    }

    /// Build an `Action` from a raw tool-use content part, looking up its
    /// risk level in the registry-reported set of known action names. A
    /// name the registry doesn't recognize still parses — whether it's
    /// actually dispatchable is the caller's problem (§4.2's "invalid tool
    /// call" category), not this constructor's.
    pub fn from_tool_use(call_id: ToolCallId, name: &str, input: Value) -> Self {
        Self {
            action_type: ActionType::from_wire_name(name),
            call_id,
            args: input,
            description: None,
            risk: RiskLevel::Safe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_wire_names() {
        assert_eq!(ActionType::Run.as_str(), "run");
        assert_eq!(ActionType::InternalSummarize.as_str(), "internal_summarize");
        assert_eq!(ActionType::Custom("web_search".into()).as_str(), "web_search");
    }

    #[test]
    fn from_wire_name_round_trips_known_actions() {
        for known in ["run", "think", "summarize", "internal_summarize", "finish", "sleep", "eval"] {
            assert_eq!(ActionType::from_wire_name(known).as_str(), known);
        }
        assert_eq!(
            ActionType::from_wire_name("web_search"),
            ActionType::Custom("web_search".into())
        );
    }

    #[test]
    fn internal_action_classification() {
        assert!(ActionType::Think.is_internal());
        assert!(ActionType::Summarize.is_internal());
        assert!(ActionType::InternalSummarize.is_internal());
        assert!(!ActionType::Run.is_internal());
        assert!(!ActionType::Finish.is_internal());
    }

    #[test]
    fn synthesized_summarize_integer_division() {
        // current.depth+1 = 13, //2 = 6
        let action = Action::synthesized_summarize(ToolCallId::new(), 12);
        assert_eq!(action.summarize_depths(), Some((1, 6)));
    }

    #[test]
    fn null_action_carries_reason() {
        let action = Action::null(ToolCallId::new(), "unknown tool: frobnicate");
        assert_eq!(action.action_type, ActionType::Null);
        assert_eq!(action.args["reason"], "unknown tool: frobnicate");
    }
}
