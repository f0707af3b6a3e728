use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "upup")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Plan and apply declarative infrastructure tasks", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory the local backend keeps its objects in
    #[arg(long, global = true, env = "UPUP_STATE_DIR")]
    pub state_dir: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Preview the changes a plan would make
    Plan(PlanArgs),

    /// Make the local state match a plan
    Apply(ApplyArgs),

    /// Fill in the defaulted values of a cluster spec
    Defaults(DefaultsArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Plan file (TOML)
    pub plan: PathBuf,

    /// Treat every object as missing instead of reading it from the state
    #[arg(long)]
    pub no_check_existing: bool,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Plan file (TOML)
    pub plan: PathBuf,

    /// Record changes without applying them
    #[arg(long)]
    pub dry_run: bool,

    /// Time budget for each task (e.g. 30s, 5m)
    #[arg(long, default_value = "10m")]
    pub max_task_duration: humantime::Duration,

    /// Maximum number of tasks running at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Treat every object as missing instead of reading it from the state
    #[arg(long)]
    pub no_check_existing: bool,
}

#[derive(Parser)]
pub struct DefaultsArgs {
    /// Cluster spec (TOML)
    pub cluster: PathBuf,

    /// Never fetch remote documents
    #[arg(long)]
    pub offline: bool,

    /// Write the completed spec here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
