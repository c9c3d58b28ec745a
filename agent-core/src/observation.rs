//! Observation: the result fed back to the model after an action executes.

use crate::id::ToolCallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The result of executing (or rejecting) an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// The call this observation answers.
    pub tool_call_id: ToolCallId,
    /// Name of the action that produced this observation (mirrors
    /// `ActionType::as_str()`).
    pub tool_name: String,
    /// Whether the action succeeded.
    pub success: bool,
    /// Human-readable result text shown to the model, on success.
    pub message: Option<String>,
    /// Human-readable error text shown to the model, on failure.
    pub error_message: Option<String>,
    /// When the observation was recorded.
    pub timestamp: DateTime<Utc>,
    /// Action-specific structured payload (stdout/exit code, idle state,
    /// buffer slice, etc.), kept as JSON since its shape varies per action.
    #[serde(default)]
    pub payload: Value,
}

impl Observation {
    /// Build a success observation.
    pub fn success(tool_call_id: ToolCallId, tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_call_id,
            tool_name: tool_name.into(),
            success: true,
            message: Some(message.into()),
            error_message: None,
            timestamp: Utc::now(),
            payload: Value::Null,
        }
    }

    /// Build a failure observation.
    pub fn failure(tool_call_id: ToolCallId, tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id,
            tool_name: tool_name.into(),
            success: false,
            message: None,
            error_message: Some(error.into()),
            timestamp: Utc::now(),
            payload: Value::Null,
        }
    }

    /// Attach a structured payload, builder-style.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// The exact acceptance text for a logged `Think` action. The model's
    /// own longer variant ("... Do not think more until you generate
    /// tools and interact with the real environment") is not used here;
    /// this is the fixed, shorter wording the scaffold emits.
    pub const THINK_ACK: &'static str = "OK, your thought has been logged. Go ahead.";

    /// Build the standard `Think` acknowledgement observation.
    pub fn think_ack(tool_call_id: ToolCallId) -> Self {
        Self::success(tool_call_id, "think", Self::THINK_ACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_observation_has_no_error() {
        let obs = Observation::success(ToolCallId::new(), "run", "exit 0");
        assert!(obs.success);
        assert!(obs.error_message.is_none());
        assert_eq!(obs.message.as_deref(), Some("exit 0"));
    }

    #[test]
    fn failure_observation_has_no_message() {
        let obs = Observation::failure(ToolCallId::new(), "run", "session busy");
        assert!(!obs.success);
        assert!(obs.message.is_none());
        assert_eq!(obs.error_message.as_deref(), Some("session busy"));
    }

    #[test]
    fn think_ack_uses_exact_wording() {
        let obs = Observation::think_ack(ToolCallId::new());
        assert_eq!(
            obs.message.as_deref(),
            Some("OK, your thought has been logged. Go ahead.")
        );
    }
}
