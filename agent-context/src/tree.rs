//! The conversation tree: a rooted, append-only (except for summarization
//! grafting) tree of [`Node`]s, kept as an arena rather than `Rc<RefCell>`
//! so it stays trivially `Send` across the loop's await points.

use agent_core::{ContextError, Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

struct Entry {
    node: Node,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// The conversation tree.
pub struct Tree {
    entries: HashMap<NodeId, Entry>,
    root: NodeId,
    current: NodeId,
}

impl Tree {
    /// Start a fresh tree with the given node as its root and current node.
    pub fn new(root_node: Node) -> Self {
        let root = root_node.id.clone();
        let mut entries = HashMap::new();
        entries.insert(
            root.clone(),
            Entry {
                node: root_node,
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            entries,
            root: root.clone(),
            current: root,
        }
    }

    /// The root node's id.
    pub fn root_id(&self) -> &NodeId {
        &self.root
    }

    /// The current node's id.
    pub fn current_id(&self) -> &NodeId {
        &self.current
    }

    /// Borrow the current node.
    pub fn current(&self) -> &Node {
        &self.entries[&self.current].node
    }

    /// Mutably borrow the current node.
    pub fn current_mut(&mut self) -> &mut Node {
        &mut self.entries.get_mut(&self.current).unwrap().node
    }

    /// Borrow an arbitrary node by id.
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.entries.get(id).map(|e| &e.node)
    }

    /// The parent of a node, if any.
    pub fn parent_of(&self, id: &NodeId) -> Option<&NodeId> {
        self.entries.get(id).and_then(|e| e.parent.as_ref())
    }

    /// The children of a node, left to right.
    pub fn children_of(&self, id: &NodeId) -> &[NodeId] {
        self.entries
            .get(id)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    /// Append `node` as the new rightmost child of `parent`, and make it
    /// the tree's current node.
    pub fn append_child(&mut self, parent: &NodeId, node: Node) -> NodeId {
        let id = node.id.clone();
        self.entries.insert(
            id.clone(),
            Entry {
                node,
                parent: Some(parent.clone()),
                children: Vec::new(),
            },
        );
        self.entries.get_mut(parent).unwrap().children.push(id.clone());
        self.current = id.clone();
        id
    }

    /// Make an existing node the current node (used when the internal-
    /// action sub-loop restarts a REACT turn from a newly grafted node).
    pub fn set_current(&mut self, id: NodeId) {
        self.current = id;
    }

    /// Ancestors of `node_id` in root-to-node order, including `node_id`
    /// itself. Callers that want "excluding current" drop the last entry.
    pub fn path_from_root(&self, node_id: &NodeId) -> Vec<&Node> {
        let mut chain = Vec::new();
        let mut cursor = Some(node_id.clone());
        while let Some(id) = cursor {
            let entry = &self.entries[&id];
            chain.push(&entry.node);
            cursor = entry.parent.clone();
        }
        chain.reverse();
        chain
    }

    /// The node at a given depth along the current spine (root to current
    /// via rightmost children), if the spine reaches that deep.
    pub fn ancestor_at_depth(&self, depth: u32) -> Option<&Node> {
        self.path_from_root(&self.current)
            .into_iter()
            .find(|n| n.depth == depth)
    }

    /// Deep-copy `subtree_root` (and only its rightmost-child chain,
    /// recursively, skipping any child whose action is `Summarize`) under
    /// `new_parent`. Returns the id of the copied subtree root.
    pub fn duplicate(&mut self, subtree_root: &NodeId, new_parent: &NodeId) -> NodeId {
        let mut copy = self.entries[subtree_root].node.clone();
        copy.id = NodeId::new();
        copy.source = agent_core::Source::Duplicate;
        let new_id = copy.id.clone();

        self.entries.insert(
            new_id.clone(),
            Entry {
                node: copy,
                parent: Some(new_parent.clone()),
                children: Vec::new(),
            },
        );
        self.entries.get_mut(new_parent).unwrap().children.push(new_id.clone());

        if let Some(rightmost) = self.entries[subtree_root].children.last().cloned() {
            let skip = self.entries[&rightmost].node.is_summarize_action();
            if !skip {
                self.duplicate(&rightmost, &new_id);
            }
        }

        new_id
    }

    /// Serialize the whole tree to the on-disk `tree_data.json` shape.
    pub fn to_tree_data(&self) -> TreeData {
        self.to_tree_data_from(&self.root)
    }

    fn to_tree_data_from(&self, id: &NodeId) -> TreeData {
        let entry = &self.entries[id];
        TreeData {
            node: entry.node.clone(),
            children: entry
                .children
                .iter()
                .map(|c| self.to_tree_data_from(c))
                .collect(),
        }
    }

    /// Rebuild a tree from its on-disk shape, choosing as `current` the
    /// latest node with both non-empty messages and a response, tie-
    /// broken by timestamp.
    pub fn from_tree_data(data: TreeData) -> Result<Self, ContextError> {
        let mut entries = HashMap::new();
        let root = data.node.id.clone();
        let mut best: Option<NodeId> = None;

        fn insert(
            entries: &mut HashMap<NodeId, Entry>,
            data: TreeData,
            parent: Option<NodeId>,
            best: &mut Option<NodeId>,
        ) {
            let id = data.node.id.clone();
            let is_complete = !data.node.messages.is_empty() && data.node.response.is_some();
            if is_complete {
                let replace = match best {
                    None => true,
                    Some(current_best) => {
                        let current_ts = entries[current_best].node.timestamp;
                        data.node.timestamp >= current_ts
                    }
                };
                if replace {
                    *best = Some(id.clone());
                }
            }
            let children_ids: Vec<NodeId> = data.children.iter().map(|c| c.node.id.clone()).collect();
            entries.insert(
                id.clone(),
                Entry {
                    node: data.node,
                    parent,
                    children: children_ids,
                },
            );
            for child in data.children {
                insert(entries, child, Some(id.clone()), best);
            }
        }

        insert(&mut entries, data, None, &mut best);

        let current = best.ok_or_else(|| {
            ContextError::TreeCorrupt("no complete node found to resume from".into())
        })?;

        Ok(Self { entries, root, current })
    }
}

/// Recursive on-disk shape for a tree: a node plus its children, in the
/// same left-to-right order as the live tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeData {
    /// This node's payload.
    pub node: Node,
    /// Its children, recursively.
    pub children: Vec<TreeData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Action, ActionType, Observation, RiskLevel, ToolCallId};
    use agent_provider::{ProviderMessage, Role};

    fn react_child(tree: &mut Tree, parent: &NodeId, depth: u32) -> NodeId {
        let action = Action {
            action_type: ActionType::Run,
            call_id: ToolCallId::new(),
            args: serde_json::json!({}),
            description: None,
            risk: RiskLevel::Safe,
        };
        let obs = Observation::success(action.call_id.clone(), "run", "ok");
        let messages = vec![ProviderMessage { role: Role::User, content: vec![] }];
        let node = Node::react(depth, messages, fake_response(), action, obs);
        tree.append_child(parent, node)
    }

    fn fake_response() -> agent_provider::ProviderResponse {
        agent_provider::ProviderResponse {
            content: vec![],
            stop_reason: agent_provider::StopReason::ToolUse,
            usage: Default::default(),
            model: "test".into(),
            cost: None,
            truncated: None,
        }
    }

    #[test]
    fn append_child_updates_current() {
        let root = Node::root(vec![ProviderMessage { role: Role::System, content: vec![] }]);
        let root_id = root.id.clone();
        let mut tree = Tree::new(root);
        let child = react_child(&mut tree, &root_id, 1);
        assert_eq!(tree.current_id(), &child);
    }

    #[test]
    fn path_from_root_is_root_to_node() {
        let root = Node::root(vec![]);
        let root_id = root.id.clone();
        let mut tree = Tree::new(root);
        let c1 = react_child(&mut tree, &root_id, 1);
        let c2 = react_child(&mut tree, &c1, 2);
        let path = tree.path_from_root(&c2);
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].id, root_id);
        assert_eq!(path[2].id, c2);
    }

    #[test]
    fn duplicate_skips_summarize_children() {
        let root = Node::root(vec![]);
        let root_id = root.id.clone();
        let mut tree = Tree::new(root);
        let c1 = react_child(&mut tree, &root_id, 1);

        let summarize_action = Action {
            action_type: ActionType::Summarize,
            call_id: ToolCallId::new(),
            args: serde_json::json!({}),
            description: None,
            risk: RiskLevel::Safe,
        };
        let summarize_obs = Observation::success(summarize_action.call_id.clone(), "summarize", "ok");
        let summarize_node = Node::react(2, vec![], fake_response(), summarize_action, summarize_obs);
        tree.append_child(&c1, summarize_node);

        let target_parent = react_child(&mut tree, &root_id, 1);
        let dup_root = tree.duplicate(&root_id, &target_parent);
        // root has one child (c1); c1's only child is a SUMMARIZE node, so
        // duplication must not descend past c1.
        assert_eq!(tree.children_of(&dup_root).len(), 1);
        let dup_c1 = tree.children_of(&dup_root)[0].clone();
        assert!(tree.children_of(&dup_c1).is_empty());
    }

    #[test]
    fn roundtrip_through_tree_data() {
        let root = Node::root(vec![]);
        let root_id = root.id.clone();
        let mut tree = Tree::new(root);
        react_child(&mut tree, &root_id, 1);

        let data = tree.to_tree_data();
        let json = serde_json::to_string(&data).unwrap();
        let back: TreeData = serde_json::from_str(&json).unwrap();
        let reloaded = Tree::from_tree_data(back).unwrap();
        assert_eq!(reloaded.root_id(), &root_id);
    }
}
