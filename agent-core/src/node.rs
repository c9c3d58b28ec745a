//! Node: one vertex of the conversation tree.

use crate::action::Action;
use crate::id::NodeId;
use crate::observation::Observation;
use agent_provider::{ProviderMessage, ProviderResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of turn this node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// The task's initial framing — no action/observation, only messages.
    Root,
    /// A normal reason-act-observe turn.
    React,
    /// A synthesized summary turn replacing a depth range.
    Summary,
    /// Terminal node recording the agent's `finish` call.
    Done,
}

/// How a node came to exist, for conversation-tree de-duplication bookkeeping
/// (see [`Node::duplicate`] at the tree level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Created directly by a turn of the control loop.
    Normal,
    /// Created by duplicating an ancestor's child chain during summarization.
    Duplicate,
}

/// One turn in the conversation tree.
///
/// Nodes form a singly-rooted tree via parent links held by the tree
/// structure itself (`agent-context`), not by the node — `Node` only
/// carries its own identity and turn content, so it serializes and
/// compares independently of its position in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable identifier.
    pub id: NodeId,
    /// What kind of node this is.
    pub node_type: NodeType,
    /// Distance from the root (root is depth 0).
    pub depth: u32,
    /// When this node was created.
    pub timestamp: DateTime<Utc>,
    /// Provenance, for summarization's duplicate-chain bookkeeping.
    pub source: Source,
    /// The messages sent to the provider to produce this turn (prompt
    /// assembly's output for this node, i.e. the context as of this turn).
    pub messages: Vec<ProviderMessage>,
    /// The provider's raw response for this turn, if one was requested.
    /// `None` for a `Root` node, which only seeds messages.
    pub response: Option<ProviderResponse>,
    /// The action extracted from `response`, for `React` nodes.
    pub action: Option<Action>,
    /// The observation produced by executing `action`, for `React` nodes.
    pub observation: Option<Observation>,
    /// Synthesized summary text, for `Summary` nodes.
    pub summary_content: Option<String>,
}

impl Node {
    /// Construct the root node seeding a new conversation tree.
    pub fn root(messages: Vec<ProviderMessage>) -> Self {
        Self {
            id: NodeId::new(),
            node_type: NodeType::Root,
            depth: 0,
            timestamp: Utc::now(),
            source: Source::Normal,
            messages,
            response: None,
            action: None,
            observation: None,
            summary_content: None,
        }
    }

    /// Construct a React node: one reason-act-observe turn.
    pub fn react(
        depth: u32,
        messages: Vec<ProviderMessage>,
        response: ProviderResponse,
        action: Action,
        observation: Observation,
    ) -> Self {
        Self {
            id: NodeId::new(),
            node_type: NodeType::React,
            depth,
            timestamp: Utc::now(),
            source: Source::Normal,
            messages,
            response: Some(response),
            action: Some(action),
            observation: Some(observation),
            summary_content: None,
        }
    }

    /// Construct a Summary node replacing the turns between two depths.
    pub fn summary(depth: u32, summary_content: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            node_type: NodeType::Summary,
            depth,
            timestamp: Utc::now(),
            source: Source::Normal,
            messages: Vec::new(),
            response: None,
            action: None,
            observation: None,
            summary_content: Some(summary_content.into()),
        }
    }

    /// Construct the terminal Done node recording a `finish` call.
    pub fn done(depth: u32, action: Action, observation: Observation) -> Self {
        Self {
            id: NodeId::new(),
            node_type: NodeType::Done,
            depth,
            timestamp: Utc::now(),
            source: Source::Normal,
            messages: Vec::new(),
            response: None,
            action: Some(action),
            observation: Some(observation),
            summary_content: None,
        }
    }

    /// Whether this node's action is the internal `Summarize` tag — such
    /// children are skipped when duplicating an ancestor's child chain.
    pub fn is_summarize_action(&self) -> bool {
        self.action
            .as_ref()
            .is_some_and(|a| a.action_type == crate::action::ActionType::Summarize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_provider::Role;

    #[test]
    fn root_node_has_no_action_or_observation() {
        let node = Node::root(vec![ProviderMessage {
            role: Role::System,
            content: vec![],
        }]);
        assert_eq!(node.node_type, NodeType::Root);
        assert_eq!(node.depth, 0);
        assert!(node.action.is_none());
        assert!(node.observation.is_none());
    }

    #[test]
    fn summary_node_carries_content_only() {
        let node = Node::summary(3, "did X then Y");
        assert_eq!(node.node_type, NodeType::Summary);
        assert_eq!(node.summary_content.as_deref(), Some("did X then Y"));
        assert!(node.messages.is_empty());
    }
}
