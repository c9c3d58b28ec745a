//! Typed ID wrappers for node, session, and task identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Typed ID wrappers prevent mixing up node IDs, session IDs, etc.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(NodeId, "Stable identifier for a conversation-tree node.");
typed_id!(SessionId, "Identifier for a remote or local shell session.");
typed_id!(ToolCallId, "Correlates a tool call with its tool result.");
typed_id!(TaskId, "Identifier for a task run (used in checkpoint paths).");

impl NodeId {
    /// Generate a fresh random node id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCallId {
    /// Generate a fresh random tool-call id (8 hex chars, matching the
    /// short ids used throughout the wire protocol).
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string()[..8].to_string())
    }
}

impl Default for ToolCallId {
    fn default() -> Self {
        Self::new()
    }
}
