#![deny(missing_docs)]
//! `TaskConfig`/`AgentConfig` loading: a TOML file overlaid with
//! environment variables (`AGENT_` prefix, `__` as the nesting separator),
//! via the `config` crate — the same layered-source pattern the teacher
//! uses for its own server configuration.

use agent_core::ContextLimits;
use agent_scaffold::config::LaunchType;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// A worker host entry in the computer pool.
#[derive(Debug, Clone, Deserialize)]
pub struct ComputerPoolEntry {
    /// Host IP or hostname.
    pub ip: String,
    /// Port the session protocol listens on.
    pub port: u16,
    /// Worker kind.
    pub kind: ComputerKind,
    /// Whether this host has outbound internet access.
    pub internet_accessible: bool,
    /// Whether requests to this host should be routed through a proxy
    /// (sets `X-TARGET-HOST`, per §6).
    #[serde(default)]
    pub use_proxy: bool,
}

/// The two worker host flavors this runtime drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputerKind {
    /// A CPU-only host.
    Cpu,
    /// A GPU-equipped host.
    Gpu,
}

/// Per-task configuration, immutable after the task starts.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Stable identifier for this task run.
    pub task_id: String,
    /// Wall-clock working-time budget, in seconds.
    pub max_working_time_secs: i64,
    /// Hard cap on the number of turns.
    pub max_steps: u32,
    /// Cap on `eval` attempts before forced termination.
    pub max_eval_num: u32,
    /// Checkpoint cadence, in steps; `0` disables checkpointing.
    pub save_freq: u32,
    /// The tokenizer identifier used for prompt token counting.
    pub tokenizer_id: String,
    /// Worker hosts available to the broker.
    pub computer_pool: Vec<ComputerPoolEntry>,
    /// Root path commands execute under.
    #[serde(default = "default_workspace_path")]
    pub workspace_path: PathBuf,
    /// Root directory checkpoints are written under and restored from.
    pub checkpoint_base_path: PathBuf,
}

fn default_workspace_path() -> PathBuf {
    PathBuf::from("/workspace")
}

/// Per-agent configuration: the ReAct loop's own knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Model identifier sent with every provider request.
    pub model: String,
    /// Maximum LLM call attempts (including the first).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Randomized retry backoff bounds, in seconds (3..30 per §7).
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: (u64, u64),
    /// Tag used in checkpoint filenames and logs.
    pub agent_type: String,
    /// Token and internal-action budgets.
    pub limits: ContextLimits,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> (u64, u64) {
    (3, 30)
}

/// Errors loading or validating configuration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The `config` crate failed to build or deserialize the layered source.
    #[error("config error: {0}")]
    Source(#[from] config::ConfigError),
}

/// Load a `TaskConfig` from a TOML file at `path`, overlaid with any
/// `AGENT_TASK__*` environment variables (`__` nests into struct fields,
/// e.g. `AGENT_TASK__MAX_STEPS=50`).
pub fn load_task_config(path: &std::path::Path) -> Result<TaskConfig, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("AGENT_TASK").separator("__"))
        .build()?;
    Ok(settings.try_deserialize()?)
}

/// Load an `AgentConfig` from a TOML file at `path`, overlaid with any
/// `AGENT_AGENT__*` environment variables.
pub fn load_agent_config(path: &std::path::Path) -> Result<AgentConfig, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("AGENT_AGENT").separator("__"))
        .build()?;
    Ok(settings.try_deserialize()?)
}

/// Build the `agent-scaffold` launch type the CLI's `--checkpoint` flag
/// selects: `Some(step)` for a resume, `None` for a fresh run.
pub fn launch_type(checkpoint_step: Option<u64>) -> LaunchType {
    match checkpoint_step {
        Some(step) => LaunchType::LoadCheckpoint { step },
        None => LaunchType::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_task_config_from_toml() {
        let file = write_toml(
            r#"
            task_id = "t-1"
            max_working_time_secs = 3600
            max_steps = 50
            max_eval_num = 3
            save_freq = 10
            tokenizer_id = "cl100k_base"
            checkpoint_base_path = "/tmp/checkpoints"

            [[computer_pool]]
            ip = "10.0.0.1"
            port = 8080
            kind = "cpu"
            internet_accessible = false
            "#,
        );
        let cfg = load_task_config(file.path()).unwrap();
        assert_eq!(cfg.task_id, "t-1");
        assert_eq!(cfg.computer_pool.len(), 1);
        assert_eq!(cfg.workspace_path, PathBuf::from("/workspace"));
    }

    #[test]
    fn loads_agent_config_with_default_retry_backoff() {
        let file = write_toml(
            r#"
            model = "claude-opus"
            agent_type = "research"

            [limits]
            max_tokens = 1000
            summary_threshold = 50000
            context_length = 100000
            max_internal_action_times = 20
            "#,
        );
        let cfg = load_agent_config(file.path()).unwrap();
        assert_eq!(cfg.retry_backoff, (3, 30));
        assert_eq!(cfg.max_retries, 3);
    }

    #[test]
    fn checkpoint_flag_selects_launch_type() {
        assert_eq!(launch_type(None), LaunchType::Fresh);
        assert_eq!(launch_type(Some(7)), LaunchType::LoadCheckpoint { step: 7 });
    }
}
