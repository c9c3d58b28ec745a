//! Handlers the runtime itself owns: internal bookkeeping actions and the
//! ones that drive the Remote Session Broker.

use crate::handler::ActionHandler;
use crate::schema;
use agent_broker::{Broker, RunOutcome};
use agent_core::{Action, ActionError, ActionType, Backend, Observation, RiskLevel, SessionId};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

fn arg_str<'a>(action: &'a Action, field: &str) -> Result<&'a str, ActionError> {
    action
        .args
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ActionError::InvalidArgs {
            action: action.action_type.as_str().to_string(),
            reason: format!("missing or non-string field: {field}"),
        })
}

/// A missing `computer_ip`, or one naming the local host, selects the
/// local pty backend; anything else names a remote worker (§4.1's
/// `_is_local_ip` check, simplified to the common local spellings).
fn backend_from_computer_ip(computer_ip: Option<&str>) -> Backend {
    match computer_ip {
        None => Backend::Local,
        Some(ip) if ip.is_empty() || ip == "localhost" || ip == "127.0.0.1" => Backend::Local,
        Some(ip) => Backend::Remote { computer_ip: ip.to_string() },
    }
}

/// Logs a thought with no side effects; always accepted with the fixed
/// acknowledgement text.
pub struct ThinkHandler;

impl ActionHandler for ThinkHandler {
    fn name(&self) -> &str {
        "think"
    }
    fn description(&self) -> &str {
        "Record a thought without taking any action in the environment."
    }
    fn input_schema(&self) -> serde_json::Value {
        schema::think_schema()
    }
    fn call(
        &self,
        action: &Action,
    ) -> Pin<Box<dyn Future<Output = Result<Observation, ActionError>> + Send + '_>> {
        let call_id = action.call_id.clone();
        Box::pin(async move { Ok(Observation::think_ack(call_id)) })
    }
}

/// Declares the task finished. Has no effect beyond producing an
/// observation — the scaffold inspects the originating `Action` to decide
/// whether to stop the run.
pub struct FinishHandler;

impl ActionHandler for FinishHandler {
    fn name(&self) -> &str {
        "finish"
    }
    fn description(&self) -> &str {
        "Declare the task finished, successfully or not."
    }
    fn input_schema(&self) -> serde_json::Value {
        schema::finish_schema()
    }
    fn call(
        &self,
        action: &Action,
    ) -> Pin<Box<dyn Future<Output = Result<Observation, ActionError>> + Send + '_>> {
        let call_id = action.call_id.clone();
        let reason = action
            .args
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("task finished")
            .to_string();
        Box::pin(async move { Ok(Observation::success(call_id, "finish", reason)) })
    }
}

/// Pauses for a fixed duration.
pub struct SleepHandler {
    /// Hard ceiling on how long a single `sleep` action may pause for,
    /// regardless of what the model asks for.
    pub max_seconds: f64,
}

impl Default for SleepHandler {
    fn default() -> Self {
        Self { max_seconds: 300.0 }
    }
}

impl ActionHandler for SleepHandler {
    fn name(&self) -> &str {
        "sleep"
    }
    fn description(&self) -> &str {
        "Pause for a number of seconds before continuing."
    }
    fn input_schema(&self) -> serde_json::Value {
        schema::sleep_schema()
    }
    fn call(
        &self,
        action: &Action,
    ) -> Pin<Box<dyn Future<Output = Result<Observation, ActionError>> + Send + '_>> {
        let call_id = action.call_id.clone();
        let requested = action.args.get("seconds").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let clamped = requested.clamp(0.0, self.max_seconds);
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs_f64(clamped)).await;
            Ok(Observation::success(
                call_id,
                "sleep",
                format!("slept {clamped:.1}s"),
            ))
        })
    }
}

/// Dispatches a shell command to a broker session.
pub struct RunHandler {
    broker: Arc<Broker>,
}

impl RunHandler {
    /// Build a handler bound to a specific broker instance.
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

impl ActionHandler for RunHandler {
    fn name(&self) -> &str {
        "run"
    }
    fn description(&self) -> &str {
        "Execute a shell command in a session."
    }
    fn input_schema(&self) -> serde_json::Value {
        schema::run_schema()
    }
    fn risk(&self) -> RiskLevel {
        RiskLevel::NeedsConfirmation
    }
    fn call(
        &self,
        action: &Action,
    ) -> Pin<Box<dyn Future<Output = Result<Observation, ActionError>> + Send + '_>> {
        let call_id = action.call_id.clone();
        let session_id = arg_str(action, "session_id").map(SessionId::from);
        let command = arg_str(action, "command").map(str::to_string);
        let computer_ip = action
            .args
            .get("computer_ip")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let wait_for_completion = action
            .args
            .get("wait_for_completion")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let broker = Arc::clone(&self.broker);
        Box::pin(async move {
            let session_id = session_id?;
            let command = command?;
            let backend = backend_from_computer_ip(computer_ip.as_deref());
            match broker.run(&session_id, &command, backend, wait_for_completion).await {
                Ok(RunOutcome::Dispatched) => {
                    Ok(Observation::success(call_id, "run", "command dispatched"))
                }
                Ok(RunOutcome::Completed) => {
                    let output = broker
                        .get_output(&session_id, None, None, None)
                        .await
                        .unwrap_or_default();
                    Ok(Observation::success(call_id, "run", output))
                }
                Ok(RunOutcome::Killed) => {
                    let message = format!(
                        "Command '{command}' killed. If you want to run long commands, \
                         use wait_for_completion=false"
                    );
                    Ok(Observation::failure(call_id, "run", message))
                }
                Err(e) => Ok(Observation::failure(call_id, "run", e.to_string())),
            }
        })
    }
}

/// Writes stdin to a session that is waiting for input.
pub struct InputInSessionHandler {
    broker: Arc<Broker>,
}

impl InputInSessionHandler {
    /// Build a handler bound to a specific broker instance.
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

impl ActionHandler for InputInSessionHandler {
    fn name(&self) -> &str {
        "input_in_session"
    }
    fn description(&self) -> &str {
        "Write text to the stdin of a session that is currently waiting for input."
    }
    fn input_schema(&self) -> serde_json::Value {
        schema::input_in_session_schema()
    }
    fn call(
        &self,
        action: &Action,
    ) -> Pin<Box<dyn Future<Output = Result<Observation, ActionError>> + Send + '_>> {
        let call_id = action.call_id.clone();
        let session_id = arg_str(action, "session_id").map(SessionId::from);
        let text = arg_str(action, "text").map(str::to_string);
        let broker = Arc::clone(&self.broker);
        Box::pin(async move {
            let session_id = session_id?;
            let text = text?;
            match broker.send_input(&session_id, &text).await {
                Ok(()) => Ok(Observation::success(call_id, "input_in_session", "input sent")),
                Err(e) => Ok(Observation::failure(call_id, "input_in_session", e.to_string())),
            }
        })
    }
}

/// Checks whether a session's in-flight command has completed.
pub struct CheckSessionIdleHandler {
    broker: Arc<Broker>,
}

impl CheckSessionIdleHandler {
    /// Build a handler bound to a specific broker instance.
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

impl ActionHandler for CheckSessionIdleHandler {
    fn name(&self) -> &str {
        "check_session_idle"
    }
    fn description(&self) -> &str {
        "Check whether a session's current command has finished running."
    }
    fn input_schema(&self) -> serde_json::Value {
        schema::check_session_idle_schema()
    }
    fn call(
        &self,
        action: &Action,
    ) -> Pin<Box<dyn Future<Output = Result<Observation, ActionError>> + Send + '_>> {
        let call_id = action.call_id.clone();
        let session_id = arg_str(action, "session_id").map(SessionId::from);
        let broker = Arc::clone(&self.broker);
        Box::pin(async move {
            let session_id = session_id?;
            match broker.check_idle(&session_id).await {
                Ok(completed) => Ok(Observation::success(
                    call_id,
                    "check_session_idle",
                    if completed { "idle" } else { "still running" },
                )
                .with_payload(serde_json::json!({ "completed": completed }))),
                Err(e) => Ok(Observation::failure(call_id, "check_session_idle", e.to_string())),
            }
        })
    }
}

/// Fetches the output buffer of a session.
pub struct GetSessionOutputHandler {
    broker: Arc<Broker>,
}

impl GetSessionOutputHandler {
    /// Build a handler bound to a specific broker instance.
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }
}

impl ActionHandler for GetSessionOutputHandler {
    fn name(&self) -> &str {
        "get_session_output"
    }
    fn description(&self) -> &str {
        "Fetch a session's accumulated output (truncated to the last 30,000 characters)."
    }
    fn input_schema(&self) -> serde_json::Value {
        schema::get_session_output_schema()
    }
    fn call(
        &self,
        action: &Action,
    ) -> Pin<Box<dyn Future<Output = Result<Observation, ActionError>> + Send + '_>> {
        let call_id = action.call_id.clone();
        let session_id = arg_str(action, "session_id").map(SessionId::from);
        let start_lines = action.args.get("start_lines").and_then(|v| v.as_u64()).map(|n| n as usize);
        let end_lines = action.args.get("end_lines").and_then(|v| v.as_u64()).map(|n| n as usize);
        let since_timestamp: Option<DateTime<Utc>> = action
            .args
            .get("since_timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let broker = Arc::clone(&self.broker);
        Box::pin(async move {
            let session_id = session_id?;
            match broker.get_output(&session_id, start_lines, end_lines, since_timestamp).await {
                Ok(output) => Ok(Observation::success(call_id, "get_session_output", output)),
                Err(e) => Ok(Observation::failure(call_id, "get_session_output", e.to_string())),
            }
        })
    }
}

/// Opaque evaluation hook: scores the current state via an
/// application-supplied callback. The callback's implementation (running
/// a benchmark harness, grading a sandboxed program) is out of scope.
pub struct EvalHandler<F> {
    validate: F,
}

impl<F> EvalHandler<F>
where
    F: Fn(&serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync,
{
    /// Wrap an application-supplied `validate(args) -> result` callback.
    pub fn new(validate: F) -> Self {
        Self { validate }
    }
}

impl<F> ActionHandler for EvalHandler<F>
where
    F: Fn(&serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync,
{
    fn name(&self) -> &str {
        "eval"
    }
    fn description(&self) -> &str {
        "Invoke the task's evaluation hook."
    }
    fn input_schema(&self) -> serde_json::Value {
        schema::eval_schema()
    }
    fn call(
        &self,
        action: &Action,
    ) -> Pin<Box<dyn Future<Output = Result<Observation, ActionError>> + Send + '_>> {
        let call_id = action.call_id.clone();
        let result = (self.validate)(&action.args);
        Box::pin(async move {
            match result {
                Ok(payload) => Ok(Observation::success(call_id, "eval", "evaluated")
                    .with_payload(payload)),
                Err(e) => Ok(Observation::failure(call_id, "eval", e)),
            }
        })
    }
}

/// Builds a registry populated with every built-in handler described in
/// this module, wired to the given broker.
pub fn register_builtins(
    registry: &mut crate::registry::ActionRegistry,
    broker: Arc<Broker>,
) -> Result<(), ActionError> {
    registry.register(Arc::new(ThinkHandler))?;
    registry.register(Arc::new(FinishHandler))?;
    registry.register(Arc::new(SleepHandler::default()))?;
    registry.register(Arc::new(RunHandler::new(Arc::clone(&broker))))?;
    registry.register(Arc::new(InputInSessionHandler::new(Arc::clone(&broker))))?;
    registry.register(Arc::new(CheckSessionIdleHandler::new(Arc::clone(&broker))))?;
    registry.register(Arc::new(GetSessionOutputHandler::new(broker)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::ToolCallId;

    #[tokio::test]
    async fn think_handler_returns_fixed_ack() {
        let handler = ThinkHandler;
        let action = Action {
            action_type: ActionType::Think,
            call_id: ToolCallId::new(),
            args: serde_json::json!({"thought": "let's try X"}),
            description: None,
            risk: RiskLevel::Safe,
        };
        let obs = handler.call(&action).await.unwrap();
        assert_eq!(obs.message.as_deref(), Some(Observation::THINK_ACK));
    }

    #[tokio::test]
    async fn sleep_handler_clamps_to_max() {
        let handler = SleepHandler { max_seconds: 0.05 };
        let action = Action {
            action_type: ActionType::Sleep,
            call_id: ToolCallId::new(),
            args: serde_json::json!({"seconds": 1000.0}),
            description: None,
            risk: RiskLevel::Safe,
        };
        let start = std::time::Instant::now();
        handler.call(&action).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn run_handler_reports_broker_errors_as_failed_observation() {
        let broker = Arc::new(Broker::new().unwrap());
        let handler = RunHandler::new(broker);
        let action = Action {
            action_type: ActionType::Run,
            call_id: ToolCallId::new(),
            args: serde_json::json!({"session_id": "s1", "command": "rm -rf /"}),
            description: None,
            risk: RiskLevel::NeedsConfirmation,
        };
        let obs = handler.call(&action).await.unwrap();
        assert!(!obs.success);
    }

    #[tokio::test]
    async fn run_handler_auto_creates_an_absent_session() {
        let broker = Arc::new(Broker::new().unwrap());
        let handler = RunHandler::new(broker);
        let action = Action {
            action_type: ActionType::Run,
            call_id: ToolCallId::new(),
            args: serde_json::json!({"session_id": "missing", "command": "echo hi"}),
            description: None,
            risk: RiskLevel::NeedsConfirmation,
        };
        let obs = handler.call(&action).await.unwrap();
        assert!(obs.success);
    }

    #[tokio::test]
    async fn run_handler_returns_output_on_synchronous_completion() {
        let broker = Arc::new(Broker::new().unwrap());
        let handler = RunHandler::new(broker);
        let action = Action {
            action_type: ActionType::Run,
            call_id: ToolCallId::new(),
            args: serde_json::json!({
                "session_id": "s1",
                "command": "echo ok",
                "wait_for_completion": true
            }),
            description: None,
            risk: RiskLevel::NeedsConfirmation,
        };
        let obs = handler.call(&action).await.unwrap();
        assert!(obs.success);
        assert!(obs.message.as_deref().unwrap_or_default().contains("ok"));
    }
}
