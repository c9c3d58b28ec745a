#![deny(missing_docs)]
//! # agent — umbrella crate
//!
//! A single import surface over the research-agent runtime's subsystems:
//! the Conversation Tree / Context Manager, the ReAct Control Loop, and
//! the Remote Session Broker. Re-exports each subsystem crate behind a
//! feature flag, plus a `prelude` for the happy path.

#[cfg(feature = "broker")]
pub use agent_broker;
#[cfg(feature = "config")]
pub use agent_config;
#[cfg(feature = "core")]
pub use agent_actions;
#[cfg(feature = "core")]
pub use agent_context;
#[cfg(feature = "core")]
pub use agent_core;
#[cfg(feature = "core")]
pub use agent_provider;
#[cfg(feature = "test-provider")]
pub use agent_provider_mock;
#[cfg(feature = "loop")]
pub use agent_loop;
#[cfg(feature = "scaffold")]
pub use agent_scaffold;

/// Happy-path imports for driving a task from scratch.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use agent_core::{
        Action, ActionType, Backend, ContextLimits, Node, NodeType, Observation, RiskLevel,
        Session, SessionId,
    };

    #[cfg(feature = "core")]
    pub use agent_context::{ComputerDescriptor, ContextManager, SystemPromptContext, Tokenizer};

    #[cfg(feature = "core")]
    pub use agent_actions::{ActionHandler, ActionRegistry};

    #[cfg(feature = "core")]
    pub use agent_provider::{Provider, ProviderError};

    #[cfg(feature = "loop")]
    pub use agent_loop::{AgentLoop, RetryPolicy, StepOutcome};

    #[cfg(feature = "scaffold")]
    pub use agent_scaffold::{checkpoint, config::ScaffoldConfig, Scaffold, TerminationReason};

    #[cfg(feature = "broker")]
    pub use agent_broker::Broker;

    #[cfg(feature = "config")]
    pub use agent_config::{load_agent_config, load_task_config, AgentConfig, TaskConfig};
}
