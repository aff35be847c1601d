use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "orgform")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Reconcile an organization template against recorded state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// State file (defaults to the configured or platform state file)
    #[arg(long, global = true, env = "ORGFORM_STATE_FILE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what an update would change
    Plan(PlanArgs),

    /// Apply the template to the organization
    Update(UpdateArgs),

    /// Inspect recorded state
    #[command(subcommand)]
    State(StateCommand),

    /// Deploy a plugin workload to its targets
    Workload(WorkloadArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct PlanArgs {
    /// Organization template (.json or .toml)
    pub template: PathBuf,

    /// Also list the tasks an update would run
    #[arg(long)]
    pub tasks: bool,
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Organization template (.json or .toml)
    pub template: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct WorkloadArgs {
    /// Workload definition (.json or .toml)
    pub definition: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Overrides for the configured run options
#[derive(Args)]
pub struct RunArgs {
    /// Maximum number of tasks running at once
    #[arg(long)]
    pub max_concurrent_tasks: Option<usize>,

    /// Number of failed tasks tolerated before the run stops
    #[arg(long)]
    pub failed_tasks_tolerance: Option<usize>,
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// Show recorded bindings and the simulated organization
    Show,
}
