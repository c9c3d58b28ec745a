//! Checkpoint write/restore: `{checkpoint_base}/global_step_{N}/` holds a
//! full tree snapshot, auxiliary params, the last observation, and a
//! best-effort copy of the live workspace.
//!
//! The workspace's `conda/` subtree is archived to a tar before the rest
//! of the directory is copied, and unpacked before the rest is restored
//! on load — the same archive-then-copy ordering on both ends keeps the
//! conda environment's many small files from appearing half-written if a
//! checkpoint is interrupted partway through.

use agent_context::{ContextManager, SystemPromptContext, Tree, TreeData};
use agent_core::{ContextLimits, Observation, ScaffoldError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONDA_DIR_NAME: &str = "conda";
const CONDA_TAR_NAME: &str = "conda.tar";

/// Scaffold-owned bookkeeping saved alongside the context manager's own
/// state — the global step counter and agent tag don't belong to
/// `ContextManager` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentParams {
    /// Tag used in checkpoint filenames and logs.
    pub agent_type: String,
    /// The step this checkpoint was written at.
    pub global_step: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContextManagerParams {
    task_description: String,
    start_time: DateTime<Utc>,
    max_working_time_secs: i64,
    limits: ContextLimits,
    prompt_ctx: SystemPromptContext,
}

/// Everything `restore` needs to rebuild a `ContextManager` and resume the
/// Scaffold's own counters.
pub struct RestoredCheckpoint {
    /// The rehydrated conversation tree.
    pub tree: Tree,
    /// The task description the tree's root was seeded with.
    pub task_description: String,
    /// When the original run started (preserved, not reset on resume).
    pub start_time: DateTime<Utc>,
    /// The wall-clock working-time budget, in seconds.
    pub max_working_time_secs: i64,
    /// The token/internal-action budget.
    pub limits: ContextLimits,
    /// The system-prompt constants.
    pub prompt_ctx: SystemPromptContext,
    /// The observation to feed as the next `Agent.step()`'s input.
    pub last_observation: Option<Observation>,
    /// The step number the checkpoint directory was named for.
    pub global_step: u64,
}

fn step_dir(checkpoint_base: &Path, step: u64) -> PathBuf {
    checkpoint_base.join(format!("global_step_{step}"))
}

/// Write a full checkpoint for `context` at `global_step`.
pub async fn write_checkpoint(
    checkpoint_base: &Path,
    global_step: u64,
    agent_type: &str,
    context: &ContextManager,
    last_observation: Option<&Observation>,
    workspace_path: &Path,
) -> Result<(), ScaffoldError> {
    let dir = step_dir(checkpoint_base, global_step);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;

    let tree_data = context.tree().to_tree_data();
    write_json(&dir.join("tree_data.json"), &tree_data).await?;

    let params = AgentParams {
        agent_type: agent_type.to_string(),
        global_step,
    };
    write_json(&dir.join(format!("{agent_type}_agent_params.json")), &params).await?;

    let ctx_params = ContextManagerParams {
        task_description: context.task_description().to_string(),
        start_time: context.start_time(),
        max_working_time_secs: context.max_working_time_secs(),
        limits: context.limits().clone(),
        prompt_ctx: context.prompt_ctx().clone(),
    };
    write_json(
        &dir.join(format!("{agent_type}_context_manager_params.json")),
        &ctx_params,
    )
    .await?;

    write_json(&dir.join("last_observation.json"), &last_observation).await?;

    if workspace_path.exists() {
        let dest = dir.join("workspace");
        let workspace_path = workspace_path.to_path_buf();
        tokio::task::spawn_blocking(move || archive_workspace(&workspace_path, &dest))
            .await
            .map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))??;
    }

    tracing::info!(global_step, %agent_type, "wrote checkpoint");
    Ok(())
}

/// Restore a checkpoint at `global_step`, unpacking the archived workspace
/// back onto `workspace_path`.
pub async fn restore_checkpoint(
    checkpoint_base: &Path,
    global_step: u64,
    workspace_path: &Path,
) -> Result<RestoredCheckpoint, ScaffoldError> {
    let dir = step_dir(checkpoint_base, global_step);
    if !dir.is_dir() {
        return Err(ScaffoldError::CheckpointCorrupt(format!(
            "no checkpoint directory at {}",
            dir.display()
        )));
    }

    let tree_data: TreeData = read_json(&dir.join("tree_data.json")).await?;
    let tree = Tree::from_tree_data(tree_data).map_err(ScaffoldError::Context)?;

    let ctx_params_path = find_suffixed(&dir, "_context_manager_params.json")?;
    let ctx_params: ContextManagerParams = read_json(&ctx_params_path).await?;

    let last_observation: Option<Observation> = read_json(&dir.join("last_observation.json")).await?;

    let workspace_src = dir.join("workspace");
    if workspace_src.is_dir() {
        let workspace_path = workspace_path.to_path_buf();
        tokio::task::spawn_blocking(move || restore_workspace(&workspace_src, &workspace_path))
            .await
            .map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))??;
    }

    tracing::info!(global_step, "restored checkpoint");
    Ok(RestoredCheckpoint {
        tree,
        task_description: ctx_params.task_description,
        start_time: ctx_params.start_time,
        max_working_time_secs: ctx_params.max_working_time_secs,
        limits: ctx_params.limits,
        prompt_ctx: ctx_params.prompt_ctx,
        last_observation,
        global_step,
    })
}

fn find_suffixed(dir: &Path, suffix: &str) -> Result<PathBuf, ScaffoldError> {
    std::fs::read_dir(dir)
        .map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(suffix)))
        .ok_or_else(|| ScaffoldError::CheckpointCorrupt(format!("no *{suffix} file in {}", dir.display())))
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ScaffoldError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ScaffoldError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ScaffoldError::CheckpointCorrupt(format!("{}: {e}", path.display())))?;
    serde_json::from_slice(&bytes).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))
}

/// Archive-then-copy: tar `workspace/conda` first, then walk the rest of
/// the tree into `dest`, so a crash mid-checkpoint never leaves a
/// half-copied conda environment sitting next to a complete tar.
fn archive_workspace(workspace_path: &Path, dest: &Path) -> Result<(), ScaffoldError> {
    std::fs::create_dir_all(dest).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;

    let conda_dir = workspace_path.join(CONDA_DIR_NAME);
    if conda_dir.is_dir() {
        let tar_path = dest.join(CONDA_TAR_NAME);
        let tar_file = std::fs::File::create(&tar_path).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
        let mut builder = tar::Builder::new(tar_file);
        builder
            .append_dir_all(CONDA_DIR_NAME, &conda_dir)
            .map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
        builder.finish().map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
    }

    for entry in walkdir::WalkDir::new(workspace_path).min_depth(1) {
        let entry = entry.map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
        if entry.path().starts_with(&conda_dir) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(workspace_path)
            .expect("walkdir yields paths under its root");
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
        }
    }
    Ok(())
}

/// Unpack `conda.tar` before copying the rest of the checkpoint's
/// `workspace/` back, mirroring the write-side ordering.
fn restore_workspace(checkpoint_workspace: &Path, workspace_path: &Path) -> Result<(), ScaffoldError> {
    std::fs::create_dir_all(workspace_path).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;

    let tar_path = checkpoint_workspace.join(CONDA_TAR_NAME);
    if tar_path.is_file() {
        let tar_file = std::fs::File::open(&tar_path).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
        let mut archive = tar::Archive::new(tar_file);
        archive
            .unpack(workspace_path)
            .map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
    }

    for entry in walkdir::WalkDir::new(checkpoint_workspace).min_depth(1) {
        let entry = entry.map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
        if entry.file_name() == CONDA_TAR_NAME {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(checkpoint_workspace)
            .expect("walkdir yields paths under its root");
        let target = workspace_path.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| ScaffoldError::CheckpointCorrupt(e.to_string()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_context::{ApproxTokenizer, ComputerDescriptor};
    use std::fs;

    fn limits() -> ContextLimits {
        ContextLimits {
            max_tokens: 1000,
            summary_threshold: 1_000_000,
            context_length: 2_000_000,
            max_internal_action_times: 5,
        }
    }

    fn prompt_ctx() -> SystemPromptContext {
        SystemPromptContext {
            workspace_path: "/workspace".into(),
            max_eval_attempts: 3,
            computers: vec![ComputerDescriptor {
                ip: "10.0.0.1".into(),
                port: 8080,
                kind: "cpu".into(),
                internet_accessible: false,
            }],
        }
    }

    #[tokio::test]
    async fn round_trips_tree_and_observation() {
        let tmp = tempfile::tempdir().unwrap();
        let workspace = tmp.path().join("workspace");
        fs::create_dir_all(workspace.join("conda")).unwrap();
        fs::write(workspace.join("conda").join("env.yml"), b"name: base").unwrap();
        fs::write(workspace.join("notes.txt"), b"hello").unwrap();

        let mut context = ContextManager::new(
            "write a report",
            3600,
            limits(),
            prompt_ctx(),
            Box::new(ApproxTokenizer::default()),
        );
        // A tree with only a root node has nothing "complete" to resume
        // from, so give it one finished react turn first.
        context.append_react_turn();
        let response = agent_provider::ProviderResponse {
            content: vec![],
            stop_reason: agent_provider::StopReason::ToolUse,
            usage: Default::default(),
            model: "test".into(),
            cost: None,
            truncated: None,
        };
        let action = agent_core::Action::finish(agent_core::ToolCallId::new(), true, "done");
        context.add_response(response, action).unwrap();
        let last_obs = Observation::success(agent_core::ToolCallId::new(), "run", "ok");

        let checkpoint_base = tmp.path().join("checkpoints");
        write_checkpoint(&checkpoint_base, 3, "research", &context, Some(&last_obs), &workspace)
            .await
            .unwrap();

        let restore_into = tmp.path().join("restored_workspace");
        let restored = restore_checkpoint(&checkpoint_base, 3, &restore_into).await.unwrap();

        assert_eq!(restored.global_step, 3);
        assert_eq!(restored.task_description, "write a report");
        assert!(restored.last_observation.is_some());
        assert!(restore_into.join("conda").join("env.yml").is_file());
        assert!(restore_into.join("notes.txt").is_file());
    }

    #[tokio::test]
    async fn missing_checkpoint_dir_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let err = restore_checkpoint(&tmp.path().join("nope"), 0, &tmp.path().join("ws")).await;
        assert!(err.is_err());
    }
}
