//! The Environment: hands an `Action` to the Action/Observation Registry
//! and turns any dispatch failure into a failure `Observation` — per §7's
//! propagation policy, `ActionError` never reaches the turn loop.

use agent_actions::registry::ActionRegistry;
use agent_core::{Action, Observation};

/// Thin dispatch adapter around a borrowed registry.
pub struct Environment<'a> {
    registry: &'a ActionRegistry,
}

impl<'a> Environment<'a> {
    /// Wrap a registry for one turn's dispatch.
    pub fn new(registry: &'a ActionRegistry) -> Self {
        Self { registry }
    }

    /// Dispatch `action` and always return an `Observation` — unknown
    /// actions and handler errors are captured here, never unwound.
    pub async fn dispatch(&self, action: &Action) -> Observation {
        match self.registry.dispatch(action).await {
            Ok(observation) => observation,
            Err(e) => {
                tracing::warn!(action = action.action_type.as_str(), error = %e, "action dispatch failed");
                Observation::failure(action.call_id.clone(), action.action_type.as_str(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_actions::builtin::FinishHandler;
    use agent_core::{ActionType, RiskLevel, ToolCallId};
    use std::sync::Arc;

    #[tokio::test]
    async fn unknown_action_becomes_failure_observation() {
        let registry = ActionRegistry::new();
        let env = Environment::new(&registry);
        let action = Action {
            action_type: ActionType::Custom("nonexistent".into()),
            call_id: ToolCallId::new(),
            args: serde_json::json!({}),
            description: None,
            risk: RiskLevel::Safe,
        };
        let obs = env.dispatch(&action).await;
        assert!(!obs.success);
    }

    #[tokio::test]
    async fn known_action_dispatches_through_registry() {
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(FinishHandler)).unwrap();
        let env = Environment::new(&registry);
        let action = Action::finish(ToolCallId::new(), true, "done");
        let obs = env.dispatch(&action).await;
        assert!(obs.success);
    }
}
