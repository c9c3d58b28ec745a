//! HTTP client for remote worker sessions.
//!
//! The worker-side server is out of scope (§6 names only the wire
//! protocol); this is the client half, talking to whatever implements it.

use agent_core::BrokerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the remote worker's HTTP session protocol.
pub struct RemoteClient {
    http: reqwest::Client,
}

impl RemoteClient {
    /// Build a client with the runtime's default timeout and no proxying
    /// of credentials between hosts (each request carries its own
    /// worker-scoped auth header, set per call).
    pub fn new() -> Result<Self, BrokerError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::Other(Box::new(e)))?;
        Ok(Self { http })
    }

    fn base_url(computer_ip: &str) -> String {
        format!("http://{computer_ip}:8080")
    }

    /// `POST /session` — create a new remote shell.
    pub async fn create_session(&self, computer_ip: &str) -> Result<RemoteSessionHandle, BrokerError> {
        let url = format!("{}/session", Self::base_url(computer_ip));
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        resp.error_for_status_ref().map_err(map_reqwest_err)?;
        resp.json().await.map_err(|e| BrokerError::Other(Box::new(e)))
    }

    /// `POST /session/{id}/run` — dispatch a command.
    pub async fn run(
        &self,
        computer_ip: &str,
        session_id: &str,
        command: &str,
    ) -> Result<RunAck, BrokerError> {
        let url = format!("{}/session/{session_id}/run", Self::base_url(computer_ip));
        let resp = self
            .http
            .post(&url)
            .json(&RunRequest { command: command.to_string() })
            .send()
            .await
            .map_err(map_reqwest_err)?;
        resp.error_for_status_ref().map_err(map_reqwest_err)?;
        resp.json().await.map_err(|e| BrokerError::Other(Box::new(e)))
    }

    /// `POST /session/{id}/input` — write stdin to a waiting command.
    pub async fn send_input(
        &self,
        computer_ip: &str,
        session_id: &str,
        text: &str,
    ) -> Result<(), BrokerError> {
        let url = format!("{}/session/{session_id}/input", Self::base_url(computer_ip));
        let resp = self
            .http
            .post(&url)
            .json(&InputRequest { text: text.to_string() })
            .send()
            .await
            .map_err(map_reqwest_err)?;
        resp.error_for_status().map_err(map_reqwest_err)?;
        Ok(())
    }

    /// `GET /session/{id}/status` — poll completion/waiting state.
    pub async fn status(
        &self,
        computer_ip: &str,
        session_id: &str,
    ) -> Result<SessionStatus, BrokerError> {
        let url = format!("{}/session/{session_id}/status", Self::base_url(computer_ip));
        let resp = self.http.get(&url).send().await.map_err(map_reqwest_err)?;
        if resp.status().as_u16() == 404 {
            return Err(BrokerError::SessionNotFound {
                computer_ip: computer_ip.to_string(),
                session_id: session_id.to_string(),
            });
        }
        resp.error_for_status_ref().map_err(map_reqwest_err)?;
        resp.json().await.map_err(|e| BrokerError::Other(Box::new(e)))
    }

    /// `GET /session/{id}/output` — fetch (possibly truncated) output.
    pub async fn output(
        &self,
        computer_ip: &str,
        session_id: &str,
    ) -> Result<String, BrokerError> {
        let url = format!("{}/session/{session_id}/output", Self::base_url(computer_ip));
        let resp = self.http.get(&url).send().await.map_err(map_reqwest_err)?;
        resp.error_for_status_ref().map_err(map_reqwest_err)?;
        resp.text().await.map_err(|e| BrokerError::Other(Box::new(e)))
    }

    /// `POST /session/{id}/kill` — terminate the session's process tree.
    pub async fn kill(
        &self,
        computer_ip: &str,
        session_id: &str,
        force: bool,
    ) -> Result<KillReport, BrokerError> {
        let url = format!("{}/session/{session_id}/kill", Self::base_url(computer_ip));
        let resp = self
            .http
            .post(&url)
            .json(&KillRequest { force })
            .send()
            .await
            .map_err(map_reqwest_err)?;
        resp.error_for_status_ref().map_err(map_reqwest_err)?;
        resp.json().await.map_err(|e| BrokerError::Other(Box::new(e)))
    }
}

fn map_reqwest_err(e: reqwest::Error) -> BrokerError {
    if e.is_timeout() {
        BrokerError::Timeout(e.to_string())
    } else if e.is_connect() {
        BrokerError::Unreachable(e.to_string())
    } else {
        BrokerError::Other(Box::new(e))
    }
}

#[derive(Debug, Serialize)]
struct RunRequest {
    command: String,
}

#[derive(Debug, Serialize)]
struct InputRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct KillRequest {
    force: bool,
}

/// Response to session creation.
#[derive(Debug, Deserialize)]
pub struct RemoteSessionHandle {
    /// The worker-assigned session id.
    pub session_id: String,
}

/// Acknowledgement that a command was accepted for execution.
#[derive(Debug, Deserialize)]
pub struct RunAck {
    /// Whether the worker accepted the command (false if e.g. busy).
    pub accepted: bool,
}

/// Worker-reported session status.
#[derive(Debug, Deserialize)]
pub struct SessionStatus {
    /// Whether the shell process is still alive.
    pub alive: bool,
    /// Whether a command is currently running.
    pub command_in_progress: bool,
    /// Whether the most recent command has completed.
    pub completed: bool,
    /// Whether the session appears to be waiting on stdin.
    pub waiting_for_input: bool,
}

/// Result of a kill request.
#[derive(Debug, Deserialize)]
pub struct KillReport {
    /// Pids that were signaled successfully.
    pub killed: Vec<u32>,
    /// Pids that a signal could not be delivered to.
    pub failed: Vec<u32>,
    /// Whether a second, forceful pass was needed.
    pub force_killed: bool,
}
