//! Binary entry point: wires a task/agent config, a broker, the built-in
//! action registry and a provider together, then runs the Scaffold to
//! completion or resumes one from a checkpoint.

mod http_provider;

use agent_actions::builtin::register_builtins;
use agent_actions::registry::ActionRegistry;
use agent_broker::Broker;
use agent_context::{ApproxTokenizer, ComputerDescriptor, ContextManager, SystemPromptContext};
use agent_loop::{AgentLoop, RetryPolicy};
use agent_scaffold::config::ScaffoldConfig;
use agent_scaffold::Scaffold;
use clap::Parser;
use http_provider::HttpProvider;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Run a research-agent task to completion.
#[derive(Debug, Parser)]
#[command(name = "agent-runtime", version, about)]
struct Cli {
    /// Path to the task's TOML config.
    #[arg(long)]
    task_config: PathBuf,

    /// Path to the agent's TOML config.
    #[arg(long)]
    agent_config: PathBuf,

    /// Endpoint the provider adapter POSTs `ProviderRequest` JSON to.
    #[arg(long)]
    provider_endpoint: String,

    /// Resume from `{checkpoint_base_path}/global_step_{N}/` instead of
    /// starting a fresh run.
    #[arg(long)]
    checkpoint: Option<u64>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The non-blocking file writer's guard must outlive the whole run, or
    // buffered log lines are lost on exit.
    let _guard = match &cli.log_path {
        Some(path) => {
            let (dir, file_name) = split_log_path(path);
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .init();
            None
        }
    };

    match run(cli).await {
        Ok(reason) => {
            tracing::info!(?reason, "run finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn split_log_path(path: &std::path::Path) -> (PathBuf, PathBuf) {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(std::path::Path::new("."));
    let file_name = path.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("agent-runtime.log"));
    (dir.to_path_buf(), file_name)
}

async fn run(cli: Cli) -> Result<agent_scaffold::TerminationReason, Box<dyn std::error::Error>> {
    let task_config = agent_config::load_task_config(&cli.task_config)?;
    let agent_config = agent_config::load_agent_config(&cli.agent_config)?;

    let broker = Arc::new(Broker::new()?);
    let mut registry = ActionRegistry::new();
    register_builtins(&mut registry, broker)?;

    let provider = HttpProvider::new(cli.provider_endpoint)?;

    let prompt_ctx = SystemPromptContext {
        workspace_path: task_config.workspace_path.display().to_string(),
        max_eval_attempts: task_config.max_eval_num,
        computers: task_config
            .computer_pool
            .iter()
            .map(|c| ComputerDescriptor {
                ip: c.ip.clone(),
                port: c.port,
                kind: match c.kind {
                    agent_config::ComputerKind::Cpu => "cpu".to_string(),
                    agent_config::ComputerKind::Gpu => "gpu".to_string(),
                },
                internet_accessible: c.internet_accessible,
            })
            .collect(),
    };

    let scaffold_config = ScaffoldConfig {
        max_steps: task_config.max_steps,
        max_eval_num: task_config.max_eval_num,
        save_freq: task_config.save_freq,
        checkpoint_base_path: task_config.checkpoint_base_path.clone(),
        workspace_path: task_config.workspace_path.clone(),
        agent_type: agent_config.agent_type.clone(),
        launch_type: agent_config::launch_type(cli.checkpoint),
    };

    let tokenizer = Box::new(ApproxTokenizer::default());

    let mut scaffold = match cli.checkpoint {
        None => {
            let context = ContextManager::new(
                task_config.task_id.clone(),
                task_config.max_working_time_secs,
                agent_config.limits.clone(),
                prompt_ctx,
                tokenizer,
            );
            let agent = AgentLoop::new(provider, registry, context)
                .with_retry_policy(RetryPolicy {
                    max_retries: agent_config.max_retries,
                })
                .with_model(agent_config.model.clone());
            Scaffold::new(agent, scaffold_config)
        }
        Some(_) => {
            let restored = Scaffold::<HttpProvider>::restore_workspace_for(&scaffold_config).await?;
            let context = ContextManager::from_tree(
                restored.tree,
                restored.task_description,
                restored.start_time,
                restored.max_working_time_secs,
                restored.limits,
                restored.prompt_ctx,
                tokenizer,
            );
            let agent = AgentLoop::new(provider, registry, context)
                .with_retry_policy(RetryPolicy {
                    max_retries: agent_config.max_retries,
                })
                .with_model(agent_config.model.clone());
            Scaffold::resume(agent, scaffold_config, restored.global_step, restored.last_observation)
        }
    };

    Ok(scaffold.run().await?)
}
