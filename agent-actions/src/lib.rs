#![deny(missing_docs)]
//! Action/Observation Registry: dispatches a model-issued [`Action`] to a
//! handler and returns the resulting [`Observation`].
//!
//! File I/O, web browsing, search, and PDF parsing are deliberately not
//! built in here — those are pluggable [`ActionHandler`] impls the
//! embedding application registers at startup under a [`ActionType::Custom`]
//! name. This crate ships the handlers the runtime itself is responsible
//! for: the internal bookkeeping actions (`think`, `summarize`, `finish`,
//! `sleep`, `null`) and the ones that drive the broker (`run`,
//! `input_in_session`, `check_session_idle`, `get_session_output`).

pub mod builtin;
pub mod handler;
pub mod registry;
pub mod schema;

pub use agent_core::{Action, ActionType, Observation};
pub use handler::ActionHandler;
pub use registry::ActionRegistry;
