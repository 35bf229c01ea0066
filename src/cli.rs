use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackplan")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Synthesize declarative resource stacks into ordered provisioning plans", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Synthesize a stack and show the ordered plan
    Plan(PlanArgs),

    /// Show the dependency graph and provisioning waves
    Graph(GraphArgs),

    /// Check a stack for unresolved references, cycles and duplicates
    Validate(StackArgs),

    /// Show declared outputs, resolved against recorded state
    Outputs(StateArgs),

    /// Preview what apply would change
    Diff(StateArgs),

    /// Provision the plan with the simulated provisioner and record state
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Arguments
// ============================================================================

#[derive(Args)]
pub struct StackArgs {
    /// Stack document (.toml or .json)
    pub file: PathBuf,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Only resources matching id, name, kind or kind.name (plus dependencies)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct GraphArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: GraphFormat,
}

#[derive(Args)]
pub struct StateArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// State file (default: ~/.local/state/stackplan/<stack>.json)
    #[arg(short, long, env = "STACKPLAN_STATE")]
    pub state: Option<String>,

    /// Only resources matching id, name, kind or kind.name (plus dependencies)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Show what would change without provisioning
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Resources provisioned in parallel within a wave
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Json,
    Dot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from([
            "stackplan", "-vv", "apply", "stack.toml", "--dry-run", "--jobs", "2", "-t", "rg",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.dry_run);
        assert!(!args.yes);
        assert_eq!(args.jobs, 2);
        assert_eq!(args.state.target.as_deref(), Some("rg"));
        assert_eq!(args.state.stack.file, PathBuf::from("stack.toml"));
    }
}
