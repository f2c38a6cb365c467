use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use modelgate_ai::{AgentTask, Provider};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "modelgate")]
#[command(version, about = "ModelGate - resilient model routing for agent tasks")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/modelgate/config.toml)
    #[arg(long, global = true, env = "MODELGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the ordered candidate list for a task
    Resolve(ResolveArgs),

    /// Inspect or reset circuit breaker state
    Health(HealthArgs),

    /// Invoke a task with a single prompt
    Invoke(InvokeArgs),

    /// Compact a JSON transcript if it is over budget
    Compact(CompactArgs),
}

#[derive(Args)]
pub struct ResolveArgs {
    /// Task: planner, programmer, reviewer, router, summarizer
    pub task: AgentTask,

    /// Explicit model (provider:model[:extended-thinking])
    #[arg(long)]
    pub model: Option<String>,

    /// Pin a provider for this resolution
    #[arg(long)]
    pub provider: Option<Provider>,
}

#[derive(Args)]
pub struct HealthArgs {
    /// Model key (provider:model). Omit to list every tracked key.
    pub model_key: Option<String>,

    /// Reset the given key, or every key when none is given
    #[arg(long)]
    pub reset: bool,
}

#[derive(Args)]
pub struct InvokeArgs {
    pub task: AgentTask,

    pub prompt: String,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub provider: Option<Provider>,

    /// Per-attempt timeout in seconds
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,
}

#[derive(Args)]
pub struct CompactArgs {
    /// Transcript file: a JSON array of messages or {"messages": [...]}
    pub transcript: PathBuf,

    /// Use this token count instead of the local estimate
    #[arg(long)]
    pub tokens: Option<usize>,

    /// Override the configured token ceiling
    #[arg(long)]
    pub ceiling: Option<usize>,

    /// Write the resulting transcript here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
