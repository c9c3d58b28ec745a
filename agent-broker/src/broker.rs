//! The broker: routes session operations to the local or remote backend,
//! running every command through safety validation first.

use crate::local::{signal_pid, LocalSession};
use crate::process::check_shell_children;
use crate::remote::RemoteClient;
use crate::validate::validate_command;
use agent_core::{Backend, BrokerError, Session, SessionId, SessionState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration, Instant};

/// Commands longer than this are written to a local pty in chunks, so a
/// single `write` syscall never blocks on a full pty ring buffer.
const CHUNK_THRESHOLD: usize = 500;
const CHUNK_SIZE: usize = 512;
const CHUNK_PAUSE: Duration = Duration::from_millis(20);

const WAITING_FOR_INPUT_SECONDS: i64 = 20;

/// Hard cap on a blocking `run_command(wait_for_completion=true)` (§5).
const RUN_WAIT_HARD_CAP: Duration = Duration::from_millis(10_500);
/// Poll interval while waiting for a synchronous command to finish.
const RUN_WAIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

struct LocalEntry {
    pty: LocalSession,
}

/// Owns every session this process has created, local or remote.
pub struct Broker {
    sessions: RwLock<HashMap<SessionId, Session>>,
    local: RwLock<HashMap<SessionId, LocalEntry>>,
    remote: RemoteClient,
}

impl Broker {
    /// Construct a broker with no sessions yet.
    pub fn new() -> Result<Self, BrokerError> {
        Ok(Self {
            sessions: RwLock::new(HashMap::new()),
            local: RwLock::new(HashMap::new()),
            remote: RemoteClient::new()?,
        })
    }

    /// Open a new session on the given backend.
    pub async fn create_session(&self, backend: Backend) -> Result<SessionId, BrokerError> {
        match &backend {
            Backend::Local => {
                let pty = LocalSession::spawn()?;
                let session_id = SessionId::from(uuid::Uuid::new_v4().to_string());
                let mut session = Session::new(session_id.clone(), backend);
                session.state = SessionState::Alive;
                self.sessions.write().await.insert(session_id.clone(), session);
                self.local.write().await.insert(session_id.clone(), LocalEntry { pty });
                tracing::debug!(%session_id, "opened local session");
                Ok(session_id)
            }
            Backend::Remote { computer_ip } => {
                let handle = self.remote.create_session(computer_ip).await?;
                let session_id = SessionId::from(handle.session_id);
                let mut session = Session::new(session_id.clone(), backend.clone());
                session.state = SessionState::Alive;
                self.sessions.write().await.insert(session_id.clone(), session);
                tracing::debug!(%session_id, %computer_ip, "opened remote session");
                Ok(session_id)
            }
        }
    }

    async fn get_backend(&self, session_id: &SessionId) -> Result<Backend, BrokerError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.backend.clone())
            .ok_or_else(|| BrokerError::SessionNotFound {
                computer_ip: "local".into(),
                session_id: session_id.to_string(),
            })
    }

    /// Create `session_id` on `backend` if it doesn't exist yet, keyed by
    /// the caller-supplied id rather than a freshly generated one — used
    /// by `run`'s auto-create path (§4.1).
    async fn ensure_session(&self, session_id: &SessionId, backend: &Backend) -> Result<(), BrokerError> {
        if self.sessions.read().await.contains_key(session_id) {
            return Ok(());
        }

        match backend {
            Backend::Local => {
                let pty = LocalSession::spawn()?;
                let mut session = Session::new(session_id.clone(), backend.clone());
                session.state = SessionState::Alive;
                self.sessions.write().await.insert(session_id.clone(), session);
                self.local.write().await.insert(session_id.clone(), LocalEntry { pty });
                tracing::debug!(%session_id, "auto-created local session");
            }
            Backend::Remote { computer_ip } => {
                self.remote.create_session(computer_ip).await?;
                let mut session = Session::new(session_id.clone(), backend.clone());
                session.state = SessionState::Alive;
                self.sessions.write().await.insert(session_id.clone(), session);
                tracing::debug!(%session_id, %computer_ip, "auto-created remote session");
            }
        }
        Ok(())
    }

    /// Validate and dispatch a command to a session, marking it busy.
    /// Auto-creates `session_id` on `backend` if it doesn't exist yet. If
    /// `wait_for_completion` is set, blocks up to [`RUN_WAIT_HARD_CAP`]
    /// for the command to finish, force-killing the session's descendant
    /// processes on expiry.
    pub async fn run(
        &self,
        session_id: &SessionId,
        command: &str,
        backend: Backend,
        wait_for_completion: bool,
    ) -> Result<RunOutcome, BrokerError> {
        if let Err(e) = validate_command(command) {
            tracing::warn!(%session_id, %e, "rejected unsafe command");
            return Err(e);
        }

        self.ensure_session(session_id, &backend).await?;

        {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| BrokerError::SessionNotFound {
                    computer_ip: "local".into(),
                    session_id: session_id.to_string(),
                })?;
            if session.command_in_progress {
                return Err(BrokerError::SessionBusy(session_id.to_string()));
            }
        }

        match self.get_backend(session_id).await? {
            Backend::Local => {
                let local = self.local.read().await;
                let entry = local.get(session_id).ok_or_else(|| BrokerError::SessionNotFound {
                    computer_ip: "local".into(),
                    session_id: session_id.to_string(),
                })?;
                self.send_long_command(&entry.pty, command).await?;
            }
            Backend::Remote { computer_ip } => {
                let ack = self.remote.run(&computer_ip, session_id.as_str(), command).await?;
                if !ack.accepted {
                    return Err(BrokerError::SessionBusy(session_id.to_string()));
                }
            }
        }

        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(session_id) {
                session.state = SessionState::Busy;
                session.command_in_progress = true;
                session.kill_notice = None;
            }
        }

        if !wait_for_completion {
            return Ok(RunOutcome::Dispatched);
        }

        self.wait_or_kill(session_id, command).await
    }

    /// Poll [`Broker::check_idle`] until the command finishes or
    /// [`RUN_WAIT_HARD_CAP`] elapses; on expiry, force-kills the
    /// session's process tree and records a "Killed" notice for
    /// `get_output` to surface.
    async fn wait_or_kill(&self, session_id: &SessionId, command: &str) -> Result<RunOutcome, BrokerError> {
        let deadline = Instant::now() + RUN_WAIT_HARD_CAP;
        loop {
            if self.check_idle(session_id).await? {
                // Let the pty reader thread flush the command's trailing
                // output before we report it as ready to fetch.
                sleep(Duration::from_millis(100)).await;
                return Ok(RunOutcome::Completed);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(RUN_WAIT_POLL_INTERVAL.min(deadline - now)).await;
        }

        self.kill(session_id, true).await?;

        let notice = format!(
            "[Killed] Command '{command}' killed after exceeding the wait_for_completion \
             timeout. If you want to run long commands, use wait_for_completion=false"
        );
        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(session_id) {
                session.kill_notice = Some(notice);
            }
        }

        Ok(RunOutcome::Killed)
    }

    /// Commands over [`CHUNK_THRESHOLD`] bytes are written in
    /// [`CHUNK_SIZE`]-byte pieces with a short pause between, so a long
    /// heredoc or base64 blob doesn't overrun the pty's input buffer.
    async fn send_long_command(&self, pty: &LocalSession, command: &str) -> Result<(), BrokerError> {
        let bytes = command.as_bytes();
        if bytes.len() <= CHUNK_THRESHOLD {
            pty.send(command).await
        } else {
            for chunk in bytes.chunks(CHUNK_SIZE) {
                pty.send_raw(chunk).await?;
                sleep(CHUNK_PAUSE).await;
            }
            pty.send_raw(b"\n").await
        }
    }

    /// Write text to a session's stdin (used when a command is waiting
    /// for input, not to start a new command). Refuses unless the
    /// session is currently detected as waiting on stdin (§4.1).
    pub async fn send_input(&self, session_id: &SessionId, text: &str) -> Result<(), BrokerError> {
        if !self.is_waiting_for_input(session_id).await? {
            return Err(BrokerError::NotWaitingForInput(session_id.to_string()));
        }

        match self.get_backend(session_id).await? {
            Backend::Local => {
                let local = self.local.read().await;
                let entry = local.get(session_id).ok_or_else(|| BrokerError::SessionNotFound {
                    computer_ip: "local".into(),
                    session_id: session_id.to_string(),
                })?;
                entry.pty.send(text).await
            }
            Backend::Remote { computer_ip } => {
                self.remote.send_input(&computer_ip, session_id.as_str(), text).await
            }
        }
    }

    /// Check whether a session's in-flight command has completed,
    /// clearing `command_in_progress`/`completion_marker` if so.
    pub async fn check_idle(&self, session_id: &SessionId) -> Result<bool, BrokerError> {
        match self.get_backend(session_id).await? {
            Backend::Local => {
                let (alive, pid) = {
                    let local = self.local.read().await;
                    let entry = local.get(session_id).ok_or_else(|| BrokerError::SessionNotFound {
                        computer_ip: "local".into(),
                        session_id: session_id.to_string(),
                    })?;
                    (entry.pty.is_alive().await, entry.pty.pid().await)
                };
                let check = match pid {
                    Some(pid) => check_shell_children(pid, alive).await,
                    None => check_shell_children(0, false).await,
                };
                let mut sessions = self.sessions.write().await;
                if let Some(session) = sessions.get_mut(session_id) {
                    if !alive {
                        session.state = SessionState::Dead;
                    }
                    if check.completed {
                        session.mark_completed();
                        if session.state != SessionState::Dead {
                            session.state = SessionState::Alive;
                        }
                    }
                }
                Ok(check.completed)
            }
            Backend::Remote { computer_ip } => {
                let status = self.remote.status(&computer_ip, session_id.as_str()).await?;
                let mut sessions = self.sessions.write().await;
                if let Some(session) = sessions.get_mut(session_id) {
                    if !status.alive {
                        session.state = SessionState::Dead;
                    }
                    if status.completed {
                        session.mark_completed();
                    }
                }
                Ok(status.completed)
            }
        }
    }

    /// Whether the session looks like it's blocked on stdin: alive,
    /// busy, not completed, and silent for at least 20 seconds.
    pub async fn is_waiting_for_input(&self, session_id: &SessionId) -> Result<bool, BrokerError> {
        let completed = self.check_idle(session_id).await?;
        if completed {
            return Ok(false);
        }
        let sessions = self.sessions.read().await;
        let session = sessions.get(session_id).ok_or_else(|| BrokerError::SessionNotFound {
            computer_ip: "local".into(),
            session_id: session_id.to_string(),
        })?;
        Ok(session.is_waiting_for_input(WAITING_FOR_INPUT_SECONDS))
    }

    /// Fetch a slice of a session's output buffer (§4.1). Without
    /// `end_lines`, returns the last `start_lines` lines; with both,
    /// returns the lines between the two offsets counted from the end
    /// (auto-swapped so `start_lines >= end_lines`). `since_timestamp`,
    /// when set, overrides line slicing entirely. The result is always
    /// truncated to [`agent_core::MAX_OUTPUT_LENGTH`] bytes, keeping the
    /// tail, with an explicit marker when truncation happened.
    pub async fn get_output(
        &self,
        session_id: &SessionId,
        start_lines: Option<usize>,
        end_lines: Option<usize>,
        since_timestamp: Option<DateTime<Utc>>,
    ) -> Result<String, BrokerError> {
        let raw = match self.get_backend(session_id).await? {
            Backend::Local => {
                let local = self.local.read().await;
                let entry = local.get(session_id).ok_or_else(|| BrokerError::SessionNotFound {
                    computer_ip: "local".into(),
                    session_id: session_id.to_string(),
                })?;
                String::from_utf8_lossy(&entry.pty.output_tail().await).into_owned()
            }
            Backend::Remote { computer_ip } => {
                self.remote.output(&computer_ip, session_id.as_str()).await?
            }
        };

        let (last_output_at, kill_notice) = {
            let sessions = self.sessions.read().await;
            let session = sessions.get(session_id).ok_or_else(|| BrokerError::SessionNotFound {
                computer_ip: "local".into(),
                session_id: session_id.to_string(),
            })?;
            (session.last_output_at, session.kill_notice.clone())
        };

        let mut text = raw;
        if let Some(notice) = kill_notice {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&notice);
            text.push('\n');
        }

        let sliced = match since_timestamp {
            Some(since) if last_output_at <= since => String::new(),
            Some(_) => text,
            None => slice_lines(&text, start_lines, end_lines),
        };

        Ok(truncate_output(sliced.as_bytes()))
    }

    /// Terminate a session's process tree. Non-forceful: SIGTERM every
    /// descendant, wait a second, SIGKILL survivors. Forceful: SIGKILL
    /// everything immediately. Always clears `command_in_progress`.
    pub async fn kill(&self, session_id: &SessionId, force: bool) -> Result<KillOutcome, BrokerError> {
        tracing::debug!(%session_id, force, "killing session process tree");
        let outcome = match self.get_backend(session_id).await? {
            Backend::Local => self.kill_local(session_id, force).await?,
            Backend::Remote { computer_ip } => {
                let report = self.remote.kill(&computer_ip, session_id.as_str(), force).await?;
                KillOutcome {
                    killed: report.killed,
                    failed: report.failed,
                    force_killed: report.force_killed,
                }
            }
        };

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.mark_completed();
        }
        Ok(outcome)
    }

    async fn kill_local(&self, session_id: &SessionId, force: bool) -> Result<KillOutcome, BrokerError> {
        let pid = {
            let local = self.local.read().await;
            let entry = local.get(session_id).ok_or_else(|| BrokerError::SessionNotFound {
                computer_ip: "local".into(),
                session_id: session_id.to_string(),
            })?;
            entry.pty.pid().await
        };
        let Some(shell_pid) = pid else {
            return Ok(KillOutcome { killed: vec![], failed: vec![], force_killed: force });
        };

        let rows = crate::process::descendants(shell_pid).await.unwrap_or_default();
        let targets = crate::process::filter_relevant(rows);

        if force {
            let mut killed = Vec::new();
            let mut failed = Vec::new();
            for row in &targets {
                match signal_pid(row.pid, "-KILL").await {
                    Ok(true) => killed.push(row.pid),
                    _ => failed.push(row.pid),
                }
            }
            return Ok(KillOutcome { killed, failed, force_killed: true });
        }

        let mut killed = Vec::new();
        for row in &targets {
            if signal_pid(row.pid, "-TERM").await.unwrap_or(false) {
                killed.push(row.pid);
            }
        }

        sleep(Duration::from_secs(1)).await;

        let survivors = crate::process::filter_relevant(
            crate::process::descendants(shell_pid).await.unwrap_or_default(),
        );
        let mut failed = Vec::new();
        let mut force_killed = false;
        for row in &survivors {
            match signal_pid(row.pid, "-KILL").await {
                Ok(true) => {
                    killed.push(row.pid);
                    force_killed = true;
                }
                _ => failed.push(row.pid),
            }
        }

        Ok(KillOutcome { killed, failed, force_killed })
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new().expect("broker construction cannot fail on its default config")
    }
}

/// Outcome of [`Broker::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// `wait_for_completion` was false; the command is running in the
    /// background.
    Dispatched,
    /// `wait_for_completion` was true and the command finished within
    /// the hard cap.
    Completed,
    /// `wait_for_completion` was true and the command was force-killed
    /// after exceeding the hard cap.
    Killed,
}

/// Outcome of [`Broker::kill`].
#[derive(Debug, Clone)]
pub struct KillOutcome {
    /// Pids successfully signaled.
    pub killed: Vec<u32>,
    /// Pids a signal could not be delivered to.
    pub failed: Vec<u32>,
    /// Whether a forceful second pass was needed (always true when
    /// `force` was requested up front).
    pub force_killed: bool,
}

/// Return the subset of `text`'s lines selected by `start_lines`/
/// `end_lines`, both counted back from the end of the buffer. With no
/// `end_lines`, returns the last `start_lines` lines. With both, swaps
/// them first so `start_lines >= end_lines`, then returns the window
/// between those two offsets from the end.
fn slice_lines(text: &str, start_lines: Option<usize>, end_lines: Option<usize>) -> String {
    let Some(start) = start_lines else {
        return text.to_string();
    };
    let lines: Vec<&str> = text.lines().collect();
    let n = lines.len();

    match end_lines {
        None => {
            let from = n.saturating_sub(start);
            lines[from..].join("\n")
        }
        Some(end) => {
            let (start, end) = if start < end { (end, start) } else { (start, end) };
            let from = n.saturating_sub(start);
            let to = n.saturating_sub(end);
            lines[from..to.max(from)].join("\n")
        }
    }
}

fn truncate_output(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= agent_core::MAX_OUTPUT_LENGTH {
        text.into_owned()
    } else {
        let total = text.len();
        let mut boundary = text.len() - agent_core::MAX_OUTPUT_LENGTH;
        while boundary < text.len() && !text.is_char_boundary(boundary) {
            boundary += 1;
        }
        format!(
            "...[truncated, {total} bytes total, showing last {}]...\n{}",
            agent_core::MAX_OUTPUT_LENGTH,
            &text[boundary..]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_run_local_session() {
        let broker = Broker::new().unwrap();
        let session_id = broker.create_session(Backend::Local).await.unwrap();
        let outcome = broker
            .run(&session_id, "echo hi_from_broker", Backend::Local, false)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Dispatched);
        tokio::time::sleep(Duration::from_millis(300)).await;
        let output = broker.get_output(&session_id, None, None, None).await.unwrap();
        assert!(output.contains("hi_from_broker"));
    }

    #[tokio::test]
    async fn rejects_unsafe_command() {
        let broker = Broker::new().unwrap();
        let session_id = broker.create_session(Backend::Local).await.unwrap();
        let err = broker.run(&session_id, "rm -rf /", Backend::Local, false).await.unwrap_err();
        assert!(matches!(err, BrokerError::SafetyRejected(_)));
    }

    #[tokio::test]
    async fn run_auto_creates_an_absent_session() {
        let broker = Broker::new().unwrap();
        let session_id = SessionId::from("s1");
        let outcome = broker.run(&session_id, "echo ok", Backend::Local, false).await.unwrap();
        assert_eq!(outcome, RunOutcome::Dispatched);
        tokio::time::sleep(Duration::from_millis(300)).await;
        let output = broker.get_output(&session_id, None, None, None).await.unwrap();
        assert!(output.contains("ok"));
    }

    #[tokio::test]
    async fn synchronous_run_completes_and_reports_output() {
        let broker = Broker::new().unwrap();
        let session_id = SessionId::from("s1");
        let outcome = broker.run(&session_id, "echo ok", Backend::Local, true).await.unwrap();
        assert_eq!(outcome, RunOutcome::Completed);
        let output = broker.get_output(&session_id, None, None, None).await.unwrap();
        assert!(output.contains("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_run_kills_on_hard_cap() {
        let broker = Broker::new().unwrap();
        let session_id = SessionId::from("s1");
        let outcome = broker.run(&session_id, "sleep 30", Backend::Local, true).await.unwrap();
        assert_eq!(outcome, RunOutcome::Killed);
        let output = broker.get_output(&session_id, None, None, None).await.unwrap();
        assert!(output.contains("Killed"));
    }

    #[tokio::test]
    async fn send_input_rejected_when_not_waiting() {
        let broker = Broker::new().unwrap();
        let session_id = broker.create_session(Backend::Local).await.unwrap();
        let err = broker.send_input(&session_id, "y").await.unwrap_err();
        assert!(matches!(err, BrokerError::NotWaitingForInput(_)));
    }

    #[test]
    fn slice_lines_swaps_inverted_offsets() {
        let text = (1..=10).map(|n| format!("line{n}")).collect::<Vec<_>>().join("\n");
        let inverted = slice_lines(&text, Some(2), Some(8));
        let ordered = slice_lines(&text, Some(8), Some(2));
        assert_eq!(inverted, ordered);
        assert_eq!(ordered, "line3\nline4\nline5\nline6\nline7\nline8");
    }

    #[test]
    fn slice_lines_without_end_lines_takes_the_tail() {
        let text = (1..=5).map(|n| format!("line{n}")).collect::<Vec<_>>().join("\n");
        assert_eq!(slice_lines(&text, Some(2), None), "line4\nline5");
    }
}
