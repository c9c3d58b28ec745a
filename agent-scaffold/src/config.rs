//! Per-run configuration the Scaffold itself needs. Task/agent config
//! *loading* (TOML + env overlay) lives in `agent-config`; this struct is
//! the shape that loader ultimately produces.

use std::path::PathBuf;

/// How this run was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchType {
    /// Start a brand-new tree at `global_step = 0`.
    Fresh,
    /// Resume from `{checkpoint_base}/global_step_{step}/`.
    LoadCheckpoint {
        /// The checkpoint directory's step number.
        step: u64,
    },
}

/// The Scaffold's own configuration: budgets, checkpoint cadence, and
/// filesystem roots. Everything the Context Manager needs is threaded in
/// separately (it owns its own `ContextLimits`/`SystemPromptContext`).
#[derive(Debug, Clone)]
pub struct ScaffoldConfig {
    /// Hard cap on the number of turns, regardless of wall-clock time.
    pub max_steps: u32,
    /// Cap on consecutive `eval` attempts before forced termination.
    pub max_eval_num: u32,
    /// Checkpoint every `save_freq` steps; `0` disables checkpointing.
    pub save_freq: u32,
    /// Root directory checkpoints are written under and restored from.
    pub checkpoint_base_path: PathBuf,
    /// The live workspace directory snapshotted into each checkpoint.
    pub workspace_path: PathBuf,
    /// Tag used in checkpoint filenames (`{agent_type}_agent_params.json`).
    pub agent_type: String,
    /// Whether this run starts fresh or resumes a prior checkpoint.
    pub launch_type: LaunchType,
}
