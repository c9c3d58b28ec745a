//! Object-safe trait every action handler implements.

use agent_core::{Action, ActionError, Observation, RiskLevel};
use std::future::Future;
use std::pin::Pin;

/// A handler for one action tag.
///
/// Mirrors the object-safe tool-dispatch shape used elsewhere in this
/// ecosystem: a handler is stored as `Arc<dyn ActionHandler>` in the
/// [`crate::registry::ActionRegistry`] and invoked by name.
pub trait ActionHandler: Send + Sync {
    /// The wire name this handler answers to (matches `ActionType::as_str()`).
    fn name(&self) -> &str;

    /// Human-readable description surfaced to the model as the tool's
    /// `description` field.
    fn description(&self) -> &str;

    /// JSON Schema for this action's `args`.
    fn input_schema(&self) -> serde_json::Value;

    /// Coarse risk classification surfaced as a schema annotation.
    fn risk(&self) -> RiskLevel {
        RiskLevel::Safe
    }

    /// Execute the action and produce its observation.
    fn call(
        &self,
        action: &Action,
    ) -> Pin<Box<dyn Future<Output = Result<Observation, ActionError>> + Send + '_>>;
}
