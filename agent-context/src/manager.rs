//! Owns the tree; turns tree state into LLM-ready prompts, decides when
//! to summarize, and validates the internal actions (`think`,
//! `summarize`, `internal_summarize`).

use crate::templates;
use crate::tokenizer::Tokenizer;
use crate::tree::Tree;
use agent_core::{Action, ActionType, ContextError, ContextLimits, Node, NodeId, NodeType, Observation};
use agent_provider::{ContentPart, ProviderMessage, ProviderResponse, Role};
use chrono::{DateTime, Utc};

/// A worker host the system prompt advertises to the model.
#[derive(Debug, Clone)]
pub struct ComputerDescriptor {
    /// Host IP or hostname.
    pub ip: String,
    /// Port the session protocol listens on.
    pub port: u16,
    /// `"cpu"` or `"gpu"`.
    pub kind: String,
    /// Whether this host has outbound internet access.
    pub internet_accessible: bool,
}

/// Constants the system prompt is templated with.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SystemPromptContext {
    /// Root path commands execute under.
    pub workspace_path: String,
    /// Cap on `eval` attempts, surfaced so the model can budget them.
    pub max_eval_attempts: u32,
    /// Hosts available for `run`.
    pub computers: Vec<ComputerDescriptor>,
}

/// Token accounting for the current prompt.
#[derive(Debug, Clone, Copy)]
pub struct ContextStats {
    /// Counted prompt tokens plus the fixed reserve.
    pub total_tokens: u32,
}

/// A 1000-token fixed reserve added on top of the counted prompt, per the
/// original implementation's `calculate_context_stats`.
const TOKEN_RESERVE: u32 = 1000;

/// Owns the conversation tree and turns it into LLM input.
pub struct ContextManager {
    tree: Tree,
    tokenizer: Box<dyn Tokenizer>,
    limits: ContextLimits,
    prompt_ctx: SystemPromptContext,
    task_description: String,
    start_time: DateTime<Utc>,
    max_working_time_secs: i64,
    think_cooldown: bool,
    think_cooldown_active: bool,
}

impl ContextManager {
    /// Construct a manager around a brand-new tree seeded with a root node.
    pub fn new(
        task_description: impl Into<String>,
        max_working_time_secs: i64,
        limits: ContextLimits,
        prompt_ctx: SystemPromptContext,
        tokenizer: Box<dyn Tokenizer>,
    ) -> Self {
        let task_description = task_description.into();
        let root = Node::root(vec![]);
        Self {
            tree: Tree::new(root),
            tokenizer,
            limits,
            prompt_ctx,
            task_description,
            start_time: Utc::now(),
            max_working_time_secs,
            think_cooldown: false,
            think_cooldown_active: false,
        }
    }

    /// Resume a manager around an already-loaded tree.
    pub fn from_tree(
        tree: Tree,
        task_description: impl Into<String>,
        start_time: DateTime<Utc>,
        max_working_time_secs: i64,
        limits: ContextLimits,
        prompt_ctx: SystemPromptContext,
        tokenizer: Box<dyn Tokenizer>,
    ) -> Self {
        Self {
            tree,
            tokenizer,
            limits,
            prompt_ctx,
            task_description: task_description.into(),
            start_time,
            max_working_time_secs,
            think_cooldown: false,
            think_cooldown_active: false,
        }
    }

    /// Borrow the underlying tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Mutably borrow the underlying tree.
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// Whether `think` is currently off the tool list.
    pub fn think_cooldown(&self) -> bool {
        self.think_cooldown
    }

    /// The task description the root node was seeded with.
    pub fn task_description(&self) -> &str {
        &self.task_description
    }

    /// When this run started, for `remaining_working_time` and checkpoint
    /// `start_time` persistence.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// The wall-clock working-time budget, in seconds.
    pub fn max_working_time_secs(&self) -> i64 {
        self.max_working_time_secs
    }

    /// The token/internal-action budget this manager enforces.
    pub fn limits(&self) -> &ContextLimits {
        &self.limits
    }

    /// The system-prompt constants this manager was built with.
    pub fn prompt_ctx(&self) -> &SystemPromptContext {
        &self.prompt_ctx
    }

    /// Bound on the internal-action sub-loop; `-1` means unbounded.
    pub fn max_internal_action_times(&self) -> i32 {
        self.limits.max_internal_action_times
    }

    /// Ancestor id at the given depth along the current spine, for
    /// grafting the live continuation back under a new SUMMARY node.
    pub fn ancestor_id_at_depth(&self, depth: u32) -> Option<NodeId> {
        self.tree.ancestor_at_depth(depth).map(|n| n.id.clone())
    }

    /// Force the current node to `Done`, used when the internal-action
    /// sub-loop exceeds its budget.
    pub fn force_done(&mut self) {
        self.tree.current_mut().node_type = NodeType::Done;
    }

    fn remaining_working_time(&self) -> i64 {
        let elapsed = Utc::now().signed_duration_since(self.start_time).num_seconds();
        (self.max_working_time_secs - elapsed).max(0)
    }

    fn system_prompt(&self) -> String {
        let computers = self
            .prompt_ctx
            .computers
            .iter()
            .map(|c| {
                format!(
                    "{}:{} ({}, internet={})",
                    c.ip, c.port, c.kind, c.internet_accessible
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "You are an autonomous research agent. Workspace: {}. \
             Available computers: [{}]. Maximum eval attempts: {}.",
            self.prompt_ctx.workspace_path, computers, self.prompt_ctx.max_eval_attempts
        )
    }

    fn summary_system_prompt(&self) -> String {
        "You are summarizing the conversation history above so it can be \
         replaced with a compact synopsis."
            .to_string()
    }

    fn text_message(role: Role, text: impl Into<String>) -> ProviderMessage {
        ProviderMessage {
            role,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// Inline one ancestor node (Summary or React) into a message list the
    /// way both the REACT and SUMMARY prompt paths do.
    fn inline_node(&self, node: &Node, out: &mut Vec<ProviderMessage>) {
        match node.node_type {
            NodeType::Root => {
                let text = format!(
                    "{}{}",
                    templates::task_description(&self.task_description),
                    templates::remaining_working_time(self.remaining_working_time())
                );
                out.push(Self::text_message(Role::User, text));
            }
            NodeType::Summary => {
                if let Some((d1, d2)) = node.action.as_ref().and_then(Action::summarize_depths) {
                    let k = d2.saturating_sub(d1);
                    out.push(Self::text_message(Role::Assistant, templates::summary_prefix(k)));
                }
                out.push(Self::text_message(Role::User, templates::SUMMARY_ACK));
            }
            NodeType::React => {
                if let (Some(response), Some(action)) = (&node.response, &node.action) {
                    out.push(ProviderMessage {
                        role: Role::Assistant,
                        content: response.content.clone(),
                    });
                    if let Some(observation) = &node.observation {
                        out.push(tool_result_message(action, observation));
                    }
                }
            }
            NodeType::Done => {}
        }
    }

    /// Build the messages for the current node, dispatching on its type.
    pub fn get_messages(&self) -> Vec<ProviderMessage> {
        match self.tree.current().node_type {
            NodeType::Root => {
                let mut out = vec![Self::text_message(Role::System, self.system_prompt())];
                self.inline_node(self.tree.current(), &mut out);
                out
            }
            NodeType::React | NodeType::Done => {
                let mut out = vec![Self::text_message(Role::System, self.system_prompt())];
                let path = self.tree.path_from_root(self.tree.current_id());
                for node in path.iter().take(path.len().saturating_sub(1)) {
                    self.inline_node(node, &mut out);
                }
                out
            }
            NodeType::Summary => self.build_summary_prompt(),
        }
    }

    fn build_summary_prompt(&self) -> Vec<ProviderMessage> {
        let mut out = vec![Self::text_message(Role::System, self.summary_system_prompt())];
        out.push(Self::text_message(
            Role::User,
            format!(
                "{}{}",
                templates::task_description(&self.task_description),
                templates::HISTORY_OPEN
            ),
        ));

        let current = self.tree.current();
        if let Some((_, end_summary_depth)) = current.action.as_ref().and_then(Action::summarize_depths) {
            let path = self.tree.path_from_root(self.tree.current_id());
            for node in &path {
                if node.depth >= 1 && node.depth < end_summary_depth {
                    self.inline_node(node, &mut out);
                }
            }
        }

        out.push(Self::text_message(Role::User, templates::HISTORY_CLOSE));
        out.push(Self::text_message(Role::User, templates::FORCE_INTERNAL_SUMMARIZE));
        out
    }

    /// Re-derive the prompt and count its tokens, including the fixed reserve.
    pub fn calculate_context_stats(&self) -> ContextStats {
        let mut total = TOKEN_RESERVE;
        for message in self.get_messages() {
            for part in &message.content {
                total += self.tokenizer.count(&content_part_text(part)) as u32;
            }
        }
        ContextStats { total_tokens: total }
    }

    /// Whether the next turn should bypass the model and synthesize a
    /// deterministic `Summarize` action instead.
    pub fn should_summarize(&self) -> bool {
        self.limits.should_summarize(self.calculate_context_stats().total_tokens)
    }

    /// Build the deterministic `Summarize` action for the current depth.
    pub fn synthesize_summarize_action(&self, call_id: agent_core::ToolCallId) -> Action {
        Action::synthesized_summarize(call_id, self.tree.current().depth)
    }

    /// Validate a `Summarize(d1, d2)` or `Think` action per §4.4's rules.
    pub fn check_internal_actions_validation(&self, action: &Action) -> Result<(), ContextError> {
        match action.action_type {
            ActionType::Summarize => {
                let (d1, d2) = action.summarize_depths().ok_or_else(|| {
                    ContextError::InvalidSummarizeRange {
                        d1: 0,
                        d2: 0,
                        reason: "missing start_summary_depth/end_summary_depth".into(),
                    }
                })?;
                let max_depth = self.tree.current().depth + 1;
                if d1 == 0 || d2 == 0 || d1 >= d2 || d2 > max_depth {
                    return Err(ContextError::InvalidSummarizeRange {
                        d1,
                        d2,
                        reason: format!("require 0 < d1 < d2 <= {max_depth}"),
                    });
                }
                let ancestor = self
                    .tree
                    .ancestor_at_depth(d1)
                    .ok_or_else(|| ContextError::InvalidSummarizeRange {
                        d1,
                        d2,
                        reason: "no ancestor at start_summary_depth".into(),
                    })?;
                if self.tree.parent_of(&ancestor.id).is_none() {
                    return Err(ContextError::InvalidSummarizeRange {
                        d1,
                        d2,
                        reason: "ancestor at start_summary_depth has no parent".into(),
                    });
                }
                Ok(())
            }
            ActionType::Think => {
                if self.tree.current().node_type != NodeType::React {
                    return Err(ContextError::TreeCorrupt(
                        "think is only valid from a react node".into(),
                    ));
                }
                if self.think_cooldown {
                    return Err(ContextError::TreeCorrupt(
                        "think was just used; cannot think twice in a row".into(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Append a fresh REACT child under the current node and make it
    /// current (step 3 of the ReAct loop's `step()`).
    pub fn append_react_turn(&mut self) -> NodeId {
        let depth = self.tree.current().depth + 1;
        let node = Node {
            id: NodeId::new(),
            node_type: NodeType::React,
            depth,
            timestamp: Utc::now(),
            source: agent_core::Source::Normal,
            messages: Vec::new(),
            response: None,
            action: None,
            observation: None,
            summary_content: None,
        };
        let parent = self.tree.current_id().clone();
        self.tree.append_child(&parent, node)
    }

    /// Attach a response and its parsed action to the current node. If the
    /// current node is a SUMMARY node, the action must be
    /// `internal_summarize` and its `summary_content` is stored.
    pub fn add_response(&mut self, response: ProviderResponse, action: Action) -> Result<Action, ContextError> {
        let is_summary = self.tree.current().node_type == NodeType::Summary;
        if is_summary && action.action_type != ActionType::InternalSummarize {
            return Err(ContextError::TreeCorrupt(
                "summary node requires an internal_summarize action".into(),
            ));
        }
        if is_summary {
            let content = action
                .args
                .get("summary_content")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            self.tree.current_mut().summary_content = Some(content);
        }
        self.tree.current_mut().action = Some(action.clone());
        self.tree.current_mut().messages = vec![ProviderMessage {
            role: Role::Assistant,
            content: response.content.clone(),
        }];
        self.tree.current_mut().response = Some(response);
        Ok(action)
    }

    /// Store an observation (and an optional real-user interjection) on
    /// the current REACT node.
    pub fn add_observation(&mut self, observation: Observation) {
        self.tree.current_mut().observation = Some(observation);
    }

    /// Begin a SUMMARY node: append it under the parent of the ancestor at
    /// `d1`, carrying the triggering action so prompt assembly can read
    /// the depth range back out of it.
    pub fn begin_summary_node(&mut self, action: Action) -> Result<NodeId, ContextError> {
        let (d1, _d2) = action
            .summarize_depths()
            .ok_or_else(|| ContextError::InvalidSummarizeRange { d1: 0, d2: 0, reason: "missing depths".into() })?;
        let ancestor_id = self
            .tree
            .ancestor_at_depth(d1)
            .ok_or_else(|| ContextError::InvalidSummarizeRange { d1, d2: 0, reason: "no ancestor".into() })?
            .id
            .clone();
        let parent = self
            .tree
            .parent_of(&ancestor_id)
            .cloned()
            .ok_or_else(|| ContextError::InvalidSummarizeRange { d1, d2: 0, reason: "ancestor has no parent".into() })?;

        let mut node = Node::summary(self.tree.current().depth + 1, "");
        node.action = Some(action);
        Ok(self.tree.append_child(&parent, node))
    }

    /// After a SUMMARY node's `internal_summarize` response is recorded,
    /// graft the live continuation (the rightmost-child chain from the
    /// summarized ancestor, skipping `Summarize`-tagged children) under
    /// the new summary node, and resume as a REACT turn from there.
    pub fn graft_continuation(&mut self, summarized_ancestor: NodeId, summary_node: NodeId) {
        let grafted = self.tree.duplicate(&summarized_ancestor, &summary_node);
        self.tree.set_current(grafted);
    }

    /// Mark that a `Think` action was just accepted: suppress `think`
    /// from the tool list starting immediately, but don't clear the
    /// suppression until the *following* `step()` call ends — see
    /// [`Self::end_of_step`].
    pub fn mark_think_accepted(&mut self) {
        self.think_cooldown = true;
        self.think_cooldown_active = true;
    }

    /// Call once at the very end of every top-level `step()`. Clears the
    /// cooldown exactly one turn after it was set, matching the original
    /// implementation's one-turn-late clear: cooldown suppresses THINK for
    /// the immediately-next turn's tool list, and is only cleared when
    /// that turn's own `step()` is about to return.
    pub fn end_of_step(&mut self) {
        if self.think_cooldown_active {
            self.think_cooldown_active = false;
        } else {
            self.think_cooldown = false;
        }
    }
}

fn tool_result_message(action: &Action, observation: &Observation) -> ProviderMessage {
    let payload = serde_json::json!({
        "tool_name": action.action_type.as_str(),
        "tool_call_id": action.call_id.as_str(),
        "success": observation.success,
        "message": observation.message,
        "error_message": observation.error_message,
    });
    ProviderMessage {
        role: Role::User,
        content: vec![ContentPart::ToolResult {
            tool_use_id: action.call_id.as_str().to_string(),
            content: payload.to_string(),
            is_error: !observation.success,
        }],
    }
}

fn content_part_text(part: &ContentPart) -> String {
    match part {
        ContentPart::Text { text } => text.clone(),
        ContentPart::ToolUse { name, input, .. } => format!("{name}{input}"),
        ContentPart::ToolResult { content, .. } => content.clone(),
        ContentPart::Image { .. } => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::ApproxTokenizer;

    fn limits() -> ContextLimits {
        ContextLimits {
            max_tokens: 1000,
            summary_threshold: 1_000_000,
            context_length: 2_000_000,
            max_internal_action_times: 20,
        }
    }

    fn manager() -> ContextManager {
        ContextManager::new(
            "write a report",
            3600,
            limits(),
            SystemPromptContext {
                workspace_path: "/workspace".into(),
                max_eval_attempts: 3,
                computers: vec![],
            },
            Box::new(ApproxTokenizer::default()),
        )
    }

    #[test]
    fn root_messages_contain_task_description() {
        let mgr = manager();
        let messages = mgr.get_messages();
        let has_task_tag = messages.iter().any(|m| {
            m.content.iter().any(|c| matches!(c, ContentPart::Text { text } if text.contains("<task_description>")))
        });
        assert!(has_task_tag);
    }

    #[test]
    fn think_is_rejected_back_to_back() {
        let mut mgr = manager();
        mgr.append_react_turn();
        let think = Action {
            action_type: ActionType::Think,
            call_id: agent_core::ToolCallId::new(),
            args: serde_json::json!({"thought": "hm"}),
            description: None,
            risk: agent_core::RiskLevel::Safe,
        };
        assert!(mgr.check_internal_actions_validation(&think).is_ok());
        mgr.mark_think_accepted();
        assert!(mgr.check_internal_actions_validation(&think).is_err());
    }

    #[test]
    fn think_cooldown_clears_one_step_later() {
        let mut mgr = manager();
        mgr.append_react_turn();
        mgr.mark_think_accepted();
        assert!(mgr.think_cooldown());
        // end of the *same* step it was set in: still active next turn
        mgr.end_of_step();
        assert!(mgr.think_cooldown());
        // end of the following step: now cleared
        mgr.end_of_step();
        assert!(!mgr.think_cooldown());
    }

    #[test]
    fn summarize_range_must_be_increasing_and_in_bounds() {
        let mut mgr = manager();
        mgr.append_react_turn();
        mgr.append_react_turn();
        let bad = Action {
            action_type: ActionType::Summarize,
            call_id: agent_core::ToolCallId::new(),
            args: serde_json::json!({"start_summary_depth": 3, "end_summary_depth": 1}),
            description: None,
            risk: agent_core::RiskLevel::Safe,
        };
        assert!(mgr.check_internal_actions_validation(&bad).is_err());
    }
}
