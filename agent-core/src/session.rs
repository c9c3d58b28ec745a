//! Session: a remote or local shell the broker owns and the agent drives.

use crate::id::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Where a session's shell actually runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backend {
    /// A pty spawned in-process on the machine running the scaffold.
    Local,
    /// A shell on a remote worker host, reached over the HTTP session
    /// protocol (§6). The worker-side HTTP server is out of scope; this
    /// only names the peer the broker's client talks to.
    Remote {
        /// The worker host's IP or hostname.
        computer_ip: String,
    },
}

/// Lifecycle state of a session, independent of whether a command is
/// currently running inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created but no command has been sent yet.
    New,
    /// Shell process is alive and idle.
    Alive,
    /// Shell process is alive and a command is in progress.
    Busy,
    /// Shell was closed cleanly (all descendants reaped).
    Closed,
    /// Shell process itself has exited or was force-killed.
    Dead,
}

/// Maximum number of bytes of output retained per session (§4.1);
/// `get_session_output` truncates to the trailing slice of this size.
pub const MAX_OUTPUT_LENGTH: usize = 30_000;

/// A shell session tracked by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Identifier, unique within its backend.
    pub session_id: SessionId,
    /// Where the shell actually runs.
    pub backend: Backend,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Accumulated stdout/stderr, bounded to `MAX_OUTPUT_LENGTH` bytes.
    #[serde(skip)]
    pub output_buffer: VecDeque<u8>,
    /// Whether a command is currently running (distinct from `state` —
    /// used by `check_waiting_for_input` alongside the last-output clock).
    pub command_in_progress: bool,
    /// Opaque marker a command can emit to signal its own completion
    /// (e.g. a sentinel echoed after the real command), cleared whenever
    /// `command_in_progress` clears.
    pub completion_marker: Option<String>,
    /// Set when a command was force-killed for exceeding the
    /// `wait_for_completion` hard cap; surfaced in `get_session_output`
    /// so the "Killed" marker is visible to the agent. Cleared when the
    /// next command is dispatched.
    #[serde(default)]
    pub kill_notice: Option<String>,
    /// Timestamp of the most recent output byte received, used by the
    /// 20-second waiting-for-input heuristic.
    pub last_output_at: DateTime<Utc>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Construct a freshly created, not-yet-started session.
    pub fn new(session_id: SessionId, backend: Backend) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            backend,
            state: SessionState::New,
            output_buffer: VecDeque::new(),
            command_in_progress: false,
            completion_marker: None,
            kill_notice: None,
            last_output_at: now,
            created_at: now,
        }
    }

    /// Append output, truncating the retained buffer to the trailing
    /// `MAX_OUTPUT_LENGTH` bytes and refreshing the activity clock.
    pub fn push_output(&mut self, bytes: &[u8]) {
        self.output_buffer.extend(bytes.iter().copied());
        while self.output_buffer.len() > MAX_OUTPUT_LENGTH {
            self.output_buffer.pop_front();
        }
        self.last_output_at = Utc::now();
    }

    /// Whether the session appears to be waiting on stdin: alive, a
    /// command is in progress, and no output has arrived for at least
    /// `no_output_seconds` (default 20, per the original implementation).
    pub fn is_waiting_for_input(&self, no_output_seconds: i64) -> bool {
        if self.state != SessionState::Alive && self.state != SessionState::Busy {
            return false;
        }
        if !self.command_in_progress {
            return false;
        }
        let elapsed = Utc::now().signed_duration_since(self.last_output_at);
        elapsed.num_seconds() >= no_output_seconds
    }

    /// Clear in-progress bookkeeping once a command is known to have
    /// completed (all descendants reaped or the shell itself died).
    pub fn mark_completed(&mut self) {
        self.command_in_progress = false;
        self.completion_marker = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_session() -> Session {
        Session::new(SessionId::from("sess-1"), Backend::Local)
    }

    #[test]
    fn new_session_is_not_waiting() {
        let session = local_session();
        assert!(!session.is_waiting_for_input(20));
    }

    #[test]
    fn busy_without_recent_output_is_waiting() {
        let mut session = local_session();
        session.state = SessionState::Busy;
        session.command_in_progress = true;
        session.last_output_at = Utc::now() - chrono::Duration::seconds(25);
        assert!(session.is_waiting_for_input(20));
    }

    #[test]
    fn busy_with_recent_output_is_not_waiting() {
        let mut session = local_session();
        session.state = SessionState::Busy;
        session.command_in_progress = true;
        assert!(!session.is_waiting_for_input(20));
    }

    #[test]
    fn push_output_truncates_to_max_length() {
        let mut session = local_session();
        session.push_output(&vec![b'x'; MAX_OUTPUT_LENGTH + 100]);
        assert_eq!(session.output_buffer.len(), MAX_OUTPUT_LENGTH);
    }

    #[test]
    fn mark_completed_clears_progress_and_marker() {
        let mut session = local_session();
        session.command_in_progress = true;
        session.completion_marker = Some("DONE_abc123".into());
        session.mark_completed();
        assert!(!session.command_in_progress);
        assert!(session.completion_marker.is_none());
    }
}
