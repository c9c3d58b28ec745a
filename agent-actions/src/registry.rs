//! Registry of action handlers, keyed by wire name.

use crate::handler::ActionHandler;
use agent_core::{Action, ActionError, ActionType, Observation};
use agent_provider::ToolSchema;
use std::collections::HashMap;
use std::sync::Arc;

/// The maximum length of a tool/action name accepted from configuration
/// or a dynamically-registered handler (§4.2).
const MAX_ACTION_NAME_LEN: usize = 64;

/// Holds every action handler available to a task run and dispatches
/// incoming actions to them.
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, overwriting any existing one with the same name.
    ///
    /// Rejects names over [`MAX_ACTION_NAME_LEN`] characters or containing
    /// anything outside `[a-zA-Z0-9_-]`, mirroring the same constraint the
    /// provider-facing tool schema enforces.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) -> Result<(), ActionError> {
        let name = handler.name();
        if name.len() > MAX_ACTION_NAME_LEN {
            return Err(ActionError::NameTooLong(name.to_string()));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(ActionError::NameTooLong(format!(
                "invalid characters in action name: {name}"
            )));
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    /// Look up a handler by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(name)
    }

    /// Dispatch an action to its handler. An unrecognized `action_type`
    /// never reaches a handler — the caller should have already converted
    /// it to `ActionType::Null` (see §4.2's malformed-tool-call handling).
    pub async fn dispatch(&self, action: &Action) -> Result<Observation, ActionError> {
        let name = action.action_type.as_str();
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))?;
        handler.call(action).await
    }

    /// Build the provider-facing tool schema list for every registered
    /// handler except the internal ones (`think`, `summarize`,
    /// `internal_summarize`), which are never offered to the model as an
    /// ordinary callable tool — `think` and `internal_summarize` are
    /// accepted through dedicated turn logic instead, and `summarize` is
    /// synthesized by the context manager, never chosen by the model.
    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.handlers
            .values()
            .filter(|h| !is_hidden_from_schema(h.name()))
            .map(|h| ToolSchema {
                name: h.name().to_string(),
                description: h.description().to_string(),
                input_schema: h.input_schema(),
            })
            .collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the registry has no handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn is_hidden_from_schema(name: &str) -> bool {
    matches!(
        name,
        "summarize" | "internal_summarize"
    ) || name == ActionType::Think.as_str()
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{FinishHandler, ThinkHandler};

    #[test]
    fn register_and_get() {
        let mut reg = ActionRegistry::new();
        reg.register(Arc::new(ThinkHandler)).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.get("think").is_some());
    }

    #[test]
    fn overlong_name_is_rejected() {
        struct LongHandler;
        impl crate::handler::ActionHandler for LongHandler {
            fn name(&self) -> &str {
                "x_really_quite_unnecessarily_long_action_name_past_sixty_four_chars_total"
            }
            fn description(&self) -> &str {
                "n/a"
            }
            fn input_schema(&self) -> serde_json::Value {
                serde_json::json!({})
            }
            fn call(
                &self,
                _action: &Action,
            ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Observation, ActionError>> + Send + '_>>
            {
                Box::pin(async { unreachable!() })
            }
        }
        let mut reg = ActionRegistry::new();
        assert!(reg.register(Arc::new(LongHandler)).is_err());
    }

    #[test]
    fn think_and_summarize_are_hidden_from_tool_schemas() {
        let mut reg = ActionRegistry::new();
        reg.register(Arc::new(ThinkHandler)).unwrap();
        reg.register(Arc::new(FinishHandler)).unwrap();
        let schemas = reg.tool_schemas();
        assert!(schemas.iter().all(|s| s.name != "think"));
        assert!(schemas.iter().any(|s| s.name == "finish"));
    }
}
