#![deny(missing_docs)]
//! Core wire types for the research-agent runtime.
//!
//! Three subsystems share this vocabulary: the Conversation Tree /
//! Context Manager (`Node`, `NodeType`), the ReAct Control Loop (`Action`,
//! `Observation`), and the Remote Session Broker (`Session`, `Backend`).
//! None of them are implemented here — this crate only fixes the shapes
//! they pass between each other, the way `agent-provider` fixes the
//! shapes a turn passes to an LLM provider.

pub mod action;
pub mod error;
pub mod id;
pub mod limits;
pub mod node;
pub mod observation;
pub mod session;

pub use action::{Action, ActionType, RiskLevel};
pub use error::{ActionError, BrokerError, ContextError, ScaffoldError};
pub use id::{NodeId, SessionId, TaskId, ToolCallId};
pub use limits::ContextLimits;
pub use node::{Node, NodeType, Source};
pub use observation::Observation;
pub use session::{Backend, Session, SessionState, MAX_OUTPUT_LENGTH};
