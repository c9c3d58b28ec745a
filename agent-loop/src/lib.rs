#![deny(missing_docs)]
//! ReAct Agent Loop — one turn of observation-in, action-out.
//!
//! `AgentLoop::step` implements the 8-step algorithm: attach the incoming
//! observation, advance the tree, decide whether to summarize, call the
//! model, and route `think`/`summarize` through the internal-action
//! sub-loop before handing back an externally dispatchable action.

use agent_actions::registry::ActionRegistry;
use agent_actions::schema;
use agent_core::{Action, ActionType, NodeType, Observation, ScaffoldError, ToolCallId};
use agent_context::ContextManager;
use agent_provider::{ContentPart, Provider, ProviderRequest, ProviderResponse, ToolSchema};
use std::time::Duration;

/// What `AgentLoop::step` hands back to the Scaffold.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// The action to dispatch (or that was already handled internally).
    pub action: Action,
    /// Whether the task is now finished.
    pub completed: bool,
}

/// Retry policy for the provider call, per §7: randomized 3-30s backoff,
/// up to `max_retries` attempts.
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Ties together the context manager, the action registry, and a model
/// provider to run one ReAct turn at a time.
pub struct AgentLoop<P: Provider> {
    provider: P,
    registry: ActionRegistry,
    context: ContextManager,
    retry: RetryPolicy,
    model: Option<String>,
    max_tokens: u32,
}

impl<P: Provider> AgentLoop<P> {
    /// Assemble a loop around a provider, a populated action registry, and
    /// a context manager.
    pub fn new(provider: P, registry: ActionRegistry, context: ContextManager) -> Self {
        Self {
            provider,
            registry,
            context,
            retry: RetryPolicy::default(),
            model: None,
            max_tokens: 4096,
        }
    }

    /// Override the retry policy (default: 3 attempts).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the model identifier sent with every request.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Borrow the context manager (e.g. for checkpointing).
    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    /// Mutably borrow the context manager (e.g. to restore from a
    /// checkpoint).
    pub fn context_mut(&mut self) -> &mut ContextManager {
        &mut self.context
    }

    /// Borrow the action registry, so the Scaffold can dispatch the
    /// returned `Action` to the Environment without this crate owning
    /// that responsibility itself (§2: Agent Loop vs. Registry are
    /// separate components).
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    fn external_tool_schemas(&self) -> Vec<ToolSchema> {
        let mut tools = self.registry.tool_schemas();
        if !self.context.think_cooldown() {
            tools.push(ToolSchema {
                name: ActionType::Think.as_str().to_string(),
                description: "Log a thought with no side effects.".into(),
                input_schema: schema::think_schema(),
            });
        }
        tools
    }

    fn internal_summarize_tool_schema() -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: ActionType::InternalSummarize.as_str().to_string(),
            description: "Produce the synopsis text for the summarized turns.".into(),
            input_schema: schema::internal_summarize_schema(),
        }]
    }

    async fn call_model(&self, messages: Vec<agent_provider::ProviderMessage>, tools: Vec<ToolSchema>) -> Result<ProviderResponse, ScaffoldError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens: Some(self.max_tokens),
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let backoff_secs = 3 + (rand::random::<u64>() % 28);
                    tracing::warn!(attempt, %e, backoff_secs, "retrying provider call");
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => {
                    let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(e);
                    return Err(ScaffoldError::Other(boxed));
                }
            }
        }
    }

    /// Parse a provider response into a typed `Action`: the first
    /// `ToolUse` content part, or `Action::null` if the model emitted none
    /// (§4.2's "invalid tool call" category — no side effects, just an
    /// observation telling the model what happened).
    fn parse_action(response: &ProviderResponse) -> Action {
        response
            .content
            .iter()
            .find_map(|part| match part {
                ContentPart::ToolUse { id, name, input } => {
                    Some(Action::from_tool_use(ToolCallId(id.clone()), name, input.clone()))
                }
                _ => None,
            })
            .unwrap_or_else(|| Action::null(ToolCallId::new(), "model did not call a tool"))
    }

    /// Run one turn of the ReAct loop.
    pub async fn step(&mut self, observation: Option<Observation>) -> Result<StepOutcome, ScaffoldError> {
        // 1. Already done.
        if self.context.tree().current().node_type == NodeType::Done {
            let action = Action::finish(ToolCallId::new(), true, "already complete");
            self.context.end_of_step();
            return Ok(StepOutcome { action, completed: true });
        }

        // 2. Attach the incoming observation to the current REACT node.
        if let Some(observation) = observation {
            self.context.add_observation(observation);
        }

        // 3. Append a fresh REACT child and make it current.
        self.context.append_react_turn();

        // 4. Deterministic summarization trigger bypasses the model entirely.
        let mut action = if self.context.should_summarize() {
            self.context.synthesize_summarize_action(ToolCallId::new())
        } else {
            // 5/6. Normal REACT turn: build the prompt, call the model, parse.
            let messages = self.context.get_messages();
            let tools = self.external_tool_schemas();
            let response = self.call_model(messages, tools).await?;
            let action = Self::parse_action(&response);
            self.context
                .add_response(response, action)
                .map_err(ScaffoldError::Context)?
        };

        // 7. Internal-action sub-loop for SUMMARIZE/THINK.
        let mut internal_attempts: i32 = 0;
        while action.action_type == ActionType::Summarize
            || action.action_type == ActionType::Think
            || self.context.tree().current().node_type == NodeType::Summary
        {
            let bound = self.context.max_internal_action_times();
            if bound >= 0 && internal_attempts >= bound {
                self.context.force_done();
                let finish = Action::finish(ToolCallId::new(), false, "Internal action count exceeded");
                self.context.end_of_step();
                return Ok(StepOutcome { action: finish, completed: true });
            }
            internal_attempts += 1;

            action = match &action.action_type {
                ActionType::Summarize => self.handle_summarize(action).await?,
                ActionType::Think => self.handle_think(action).await?,
                _ => self.handle_summary_node_reply(action).await?,
            };
        }

        // 8. Hand back the action.
        let completed = self.context.tree().current().node_type == NodeType::Done
            || action.action_type == ActionType::Finish;
        self.context.end_of_step();
        Ok(StepOutcome { action, completed })
    }

    async fn handle_summarize(&mut self, action: Action) -> Result<Action, ScaffoldError> {
        match self.context.check_internal_actions_validation(&action) {
            Ok(()) => {
                let (d1, _d2) = action.summarize_depths().expect("validated above");
                let summarized_ancestor = self
                    .context
                    .ancestor_id_at_depth(d1)
                    .expect("validated above");
                let summary_node = self
                    .context
                    .begin_summary_node(action)
                    .map_err(ScaffoldError::Context)?;

                let messages = self.context.get_messages();
                let response = self.call_model(messages, Self::internal_summarize_tool_schema()).await?;
                let inner_action = Self::parse_action(&response);
                self.context
                    .add_response(response, inner_action)
                    .map_err(ScaffoldError::Context)?;

                self.context.graft_continuation(summarized_ancestor, summary_node);

                // Restart as a normal REACT turn from the grafted node.
                let messages = self.context.get_messages();
                let tools = self.external_tool_schemas();
                let response = self.call_model(messages, tools).await?;
                let next_action = Self::parse_action(&response);
                self.context
                    .add_response(response, next_action)
                    .map_err(ScaffoldError::Context)
            }
            Err(e) => {
                let failure = Observation::failure(action.call_id.clone(), action.action_type.as_str(), e.to_string());
                self.context.add_observation(failure);
                self.retry_as_react().await
            }
        }
    }

    async fn handle_think(&mut self, action: Action) -> Result<Action, ScaffoldError> {
        match self.context.check_internal_actions_validation(&action) {
            Ok(()) => {
                let ack = Observation::think_ack(action.call_id.clone());
                self.context.add_observation(ack);
                self.context.mark_think_accepted();
                self.retry_as_react().await
            }
            Err(e) => {
                let failure = Observation::failure(action.call_id.clone(), action.action_type.as_str(), e.to_string());
                self.context.add_observation(failure);
                self.retry_as_react().await
            }
        }
    }

    /// A SUMMARY node's response came back without `internal_summarize`:
    /// re-issue the restricted call.
    async fn handle_summary_node_reply(&mut self, action: Action) -> Result<Action, ScaffoldError> {
        let failure = Observation::failure(
            action.call_id.clone(),
            action.action_type.as_str(),
            "a summary turn must use internal_summarize",
        );
        self.context.add_observation(failure);
        let messages = self.context.get_messages();
        let response = self.call_model(messages, Self::internal_summarize_tool_schema()).await?;
        let inner_action = Self::parse_action(&response);
        self.context
            .add_response(response, inner_action)
            .map_err(ScaffoldError::Context)
    }

    async fn retry_as_react(&mut self) -> Result<Action, ScaffoldError> {
        let messages = self.context.get_messages();
        let tools = self.external_tool_schemas();
        let response = self.call_model(messages, tools).await?;
        let action = Self::parse_action(&response);
        self.context
            .add_response(response, action)
            .map_err(ScaffoldError::Context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_actions::builtin::{FinishHandler, ThinkHandler};
    use agent_context::{ApproxTokenizer, ComputerDescriptor, SystemPromptContext};
    use agent_core::ContextLimits;
    use agent_provider::{ContentPart, StopReason, TokenUsage};
    use agent_provider_mock::MockProvider;
    use std::sync::Arc;

    fn limits() -> ContextLimits {
        ContextLimits {
            max_tokens: 100_000,
            summary_threshold: 1_000_000,
            context_length: 2_000_000,
            max_internal_action_times: 5,
        }
    }

    fn context() -> ContextManager {
        ContextManager::new(
            "write a report",
            3600,
            limits(),
            SystemPromptContext {
                workspace_path: "/workspace".into(),
                max_eval_attempts: 3,
                computers: vec![ComputerDescriptor {
                    ip: "10.0.0.1".into(),
                    port: 8080,
                    kind: "cpu".into(),
                    internet_accessible: false,
                }],
            },
            Box::new(ApproxTokenizer::default()),
        )
    }

    fn registry() -> ActionRegistry {
        let mut reg = ActionRegistry::new();
        reg.register(Arc::new(ThinkHandler)).unwrap();
        reg.register(Arc::new(FinishHandler)).unwrap();
        reg
    }

    fn tool_use_response(name: &str, input: serde_json::Value) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::ToolUse {
                id: "tc1".into(),
                name: name.into(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
            model: "mock".into(),
            cost: None,
            truncated: None,
        }
    }

    #[tokio::test]
    async fn finish_action_marks_completed() {
        let mock = MockProvider::new(vec![tool_use_response(
            "finish",
            serde_json::json!({"task_completed": true, "reason": "done"}),
        )]);
        let mut loop_ = AgentLoop::new(mock, registry(), context());
        let outcome = loop_.step(None).await.unwrap();
        assert_eq!(outcome.action.action_type, ActionType::Finish);
        assert!(outcome.completed);
    }

    #[tokio::test]
    async fn think_is_handled_internally_then_returns_the_next_action() {
        let mock = MockProvider::new(vec![
            tool_use_response("think", serde_json::json!({"thought": "let's see"})),
            tool_use_response("finish", serde_json::json!({"task_completed": true, "reason": "ok"})),
        ]);
        let mut loop_ = AgentLoop::new(mock, registry(), context());
        let outcome = loop_.step(None).await.unwrap();
        // think was absorbed internally; the returned action is the follow-up.
        assert_eq!(outcome.action.action_type, ActionType::Finish);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_null_action() {
        let mock = MockProvider::new(vec![ProviderResponse {
            content: vec![ContentPart::Text { text: "no tool call".into() }],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
            model: "mock".into(),
            cost: None,
            truncated: None,
        }]);
        let mut loop_ = AgentLoop::new(mock, registry(), context());
        let outcome = loop_.step(None).await.unwrap();
        assert_eq!(outcome.action.action_type, ActionType::Null);
        assert!(!outcome.completed);
    }
}
