#![deny(missing_docs)]
//! Remote Session Broker: owns shell sessions the agent drives, whether
//! they run in a local pty or on a remote worker reached over HTTP.
//!
//! The worker-side HTTP server is out of scope for this crate (§6 names
//! only the wire protocol); [`remote::RemoteClient`] is the client half.
//! Safety validation of destructive commands ([`validate`]) runs in front
//! of both backends, so a rejected command never reaches either one.

pub mod broker;
pub mod local;
pub mod process;
pub mod remote;
pub mod validate;

pub use broker::{Broker, KillOutcome, RunOutcome};
pub use local::LocalSession;
pub use remote::RemoteClient;
