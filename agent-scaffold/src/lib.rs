#![deny(missing_docs)]
//! Scaffold (task driver): owns the global step counter, runs the turn
//! loop to completion, and checkpoints/restores state.
//!
//! Per-turn responsibility is split the way §2 describes it: `agent-loop`
//! decides what to do next, [`environment::Environment`] dispatches it,
//! and this crate decides *whether there should be a next turn at all*.

pub mod checkpoint;
pub mod config;
pub mod environment;

use agent_actions::registry::ActionRegistry;
use agent_core::{Action, ActionType, NodeType, Observation, ScaffoldError, ToolCallId};
use agent_loop::AgentLoop;
use agent_provider::Provider;
use chrono::Utc;
use config::{LaunchType, ScaffoldConfig};
use environment::Environment;

/// The call id the Scaffold stamps onto the forced final evaluation.
const FORCED_EVAL_CALL_ID: &str = "00000002";

/// Why the turn loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The wall-clock working-time budget ran out.
    WorkingTimeExceeded,
    /// The last observation answered a `Finish` action.
    FinishObserved,
    /// The agent loop itself reported the turn as completed.
    AgentReportedCompleted,
    /// The current tree node is `Done`.
    CurrentNodeDone,
    /// Too many consecutive `eval` attempts without success.
    EvalAttemptsExceeded,
    /// `max_steps` turns ran with no other termination condition met.
    StepBudgetExhausted,
}

/// Drives one task to completion: calls `Agent.step`, dispatches the
/// resulting action through the Environment, and decides when to stop.
pub struct Scaffold<P: Provider> {
    agent: AgentLoop<P>,
    config: ScaffoldConfig,
    global_step: u64,
    eval_attempts: u32,
    last_observation: Option<Observation>,
}

impl<P: Provider> Scaffold<P> {
    /// Start a fresh run (`launch_type = Fresh` in `config`).
    pub fn new(agent: AgentLoop<P>, config: ScaffoldConfig) -> Self {
        Self {
            agent,
            config,
            global_step: 0,
            eval_attempts: 0,
            last_observation: None,
        }
    }

    /// Resume a run from a restored checkpoint: the agent's context was
    /// already rebuilt from `tree_data.json` by the caller (via
    /// `ContextManager::from_tree`), and `restored` carries the rest.
    pub fn resume(
        agent: AgentLoop<P>,
        config: ScaffoldConfig,
        global_step: u64,
        last_observation: Option<Observation>,
    ) -> Self {
        Self {
            agent,
            config,
            global_step,
            eval_attempts: 0,
            last_observation,
        }
    }

    /// Borrow the agent loop (e.g. to inspect context stats for logging).
    pub fn agent(&self) -> &AgentLoop<P> {
        &self.agent
    }

    fn registry(&self) -> &ActionRegistry {
        self.agent.registry()
    }

    fn termination_reason(&self, completed: bool, start_time: chrono::DateTime<Utc>) -> Option<TerminationReason> {
        // Checked in the same order §4.6 lists them.
        let elapsed = Utc::now().signed_duration_since(start_time).num_seconds();
        if elapsed >= self.config_max_working_time_secs() {
            return Some(TerminationReason::WorkingTimeExceeded);
        }
        if let Some(obs) = &self.last_observation {
            if obs.tool_name == ActionType::Finish.as_str() {
                return Some(TerminationReason::FinishObserved);
            }
        }
        if completed {
            return Some(TerminationReason::AgentReportedCompleted);
        }
        if self.agent.context().tree().current().node_type == NodeType::Done {
            return Some(TerminationReason::CurrentNodeDone);
        }
        if let Some(obs) = &self.last_observation {
            if obs.tool_name == ActionType::Eval.as_str() && self.eval_attempts > self.config.max_eval_num {
                return Some(TerminationReason::EvalAttemptsExceeded);
            }
        }
        if self.global_step >= self.config.max_steps as u64 {
            return Some(TerminationReason::StepBudgetExhausted);
        }
        None
    }

    fn config_max_working_time_secs(&self) -> i64 {
        self.agent.context().max_working_time_secs()
    }

    /// Run turns until a termination condition fires, then force the
    /// final evaluation action and return why the run ended.
    pub async fn run(&mut self) -> Result<TerminationReason, ScaffoldError> {
        let start_time = self.agent.context().start_time();

        loop {
            let outcome = self.agent.step(self.last_observation.take()).await?;

            if outcome.action.action_type == ActionType::Eval {
                self.eval_attempts += 1;
            } else {
                self.eval_attempts = 0;
            }

            let observation = Environment::new(self.registry()).dispatch(&outcome.action).await;
            self.last_observation = Some(observation);
            self.global_step += 1;

            if self.config.save_freq > 0 && self.global_step % self.config.save_freq as u64 == 0 {
                self.checkpoint().await?;
            }

            if let Some(reason) = self.termination_reason(outcome.completed, start_time) {
                self.force_final_eval().await;
                if self.config.save_freq > 0 {
                    self.checkpoint().await?;
                }
                return Ok(reason);
            }
        }
    }

    /// Issue the forced final `eval` action (call id `00000002`) per
    /// §4.6, appending its result as the last observation.
    async fn force_final_eval(&mut self) {
        let action = Action {
            action_type: ActionType::Eval,
            call_id: ToolCallId(FORCED_EVAL_CALL_ID.to_string()),
            args: serde_json::json!({}),
            description: Some("forced final evaluation".into()),
            risk: agent_core::RiskLevel::Safe,
        };
        let observation = Environment::new(self.registry()).dispatch(&action).await;
        self.agent.context_mut().add_observation(observation.clone());
        self.last_observation = Some(observation);
    }

    async fn checkpoint(&self) -> Result<(), ScaffoldError> {
        checkpoint::write_checkpoint(
            &self.config.checkpoint_base_path,
            self.global_step,
            &self.config.agent_type,
            self.agent.context(),
            self.last_observation.as_ref(),
            &self.config.workspace_path,
        )
        .await
    }

    /// Restore the filesystem half of a checkpoint (workspace unpack) for
    /// `config.launch_type = LoadCheckpoint { step }`. The tree/context
    /// half is rebuilt by the caller via [`checkpoint::restore_checkpoint`]
    /// before constructing the `AgentLoop` this `Scaffold` wraps.
    pub async fn restore_workspace_for(config: &ScaffoldConfig) -> Result<checkpoint::RestoredCheckpoint, ScaffoldError> {
        let step = match config.launch_type {
            LaunchType::LoadCheckpoint { step } => step,
            LaunchType::Fresh => {
                return Err(ScaffoldError::CheckpointCorrupt(
                    "restore requested for a Fresh launch".into(),
                ))
            }
        };
        checkpoint::restore_checkpoint(&config.checkpoint_base_path, step, &config.workspace_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_actions::builtin::{FinishHandler, ThinkHandler};
    use agent_context::{ApproxTokenizer, ComputerDescriptor, ContextManager, SystemPromptContext};
    use agent_core::ContextLimits;
    use agent_provider::{ContentPart, ProviderResponse, StopReason, TokenUsage};
    use agent_provider_mock::MockProvider;
    use std::sync::Arc;

    fn limits(max_internal: i32) -> ContextLimits {
        ContextLimits {
            max_tokens: 100_000,
            summary_threshold: 1_000_000,
            context_length: 2_000_000,
            max_internal_action_times: max_internal,
        }
    }

    fn context(max_working_time_secs: i64) -> ContextManager {
        ContextManager::new(
            "write a report",
            max_working_time_secs,
            limits(5),
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

    fn test_config(tmp: &std::path::Path) -> ScaffoldConfig {
        ScaffoldConfig {
            max_steps: 10,
            max_eval_num: 3,
            save_freq: 0,
            checkpoint_base_path: tmp.join("checkpoints"),
            workspace_path: tmp.join("workspace"),
            agent_type: "research".into(),
            launch_type: LaunchType::Fresh,
        }
    }

    #[tokio::test]
    async fn finish_action_terminates_the_run() {
        let mock = MockProvider::new(vec![tool_use_response(
            "finish",
            serde_json::json!({"task_completed": true, "reason": "done"}),
        )]);
        let agent = AgentLoop::new(mock, registry(), context(3600));
        let tmp = tempfile::tempdir().unwrap();
        let mut scaffold = Scaffold::new(agent, test_config(tmp.path()));
        let reason = scaffold.run().await.unwrap();
        assert_eq!(reason, TerminationReason::FinishObserved);
    }

    #[tokio::test]
    async fn working_time_budget_terminates_the_run() {
        // `think` triggers the internal sub-loop's own extra model call
        // within one `step()`, so a second response must be queued even
        // though the outer run loop only calls `step()` once here.
        let mock = MockProvider::new(vec![
            tool_use_response("think", serde_json::json!({"thought": "still going"})),
            tool_use_response("finish", serde_json::json!({"task_completed": false, "reason": "ran out of time"})),
        ]);
        let agent = AgentLoop::new(mock, registry(), context(-1));
        let tmp = tempfile::tempdir().unwrap();
        let mut scaffold = Scaffold::new(agent, test_config(tmp.path()));
        let reason = scaffold.run().await.unwrap();
        assert_eq!(reason, TerminationReason::WorkingTimeExceeded);
    }
}
