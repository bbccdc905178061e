use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "osanalysis - Run design-of-experiments and multi-objective optimization studies over parametric building-energy models.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of simulation jobs that run at the same time.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an analysis until its algorithm has nothing left to evaluate.
    Run(RunArgs),
    /// Export the results of a saved analysis.
    Summary(SummaryArgs),
    /// Check an analysis definition without running anything.
    Validate(ValidateArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the analysis definition in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Directory receiving the run directories, analysis.json and summary.csv.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    /// Continue a previously saved analysis instead of starting from the definition.
    #[arg(long, value_name = "PATH")]
    pub resume: Option<PathBuf>,

    /// Override the maximum number of jobs in flight.
    #[arg(long, value_name = "INT")]
    pub queue_size: Option<usize>,

    /// Override the maximum number of algorithm iterations for this run.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<usize>,

    /// Re-run DataPoints that already have results.
    #[arg(long)]
    pub force: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S run.queue-size=4
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `summary` subcommand.
#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Path to a saved analysis (analysis.json).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Write the summary table as CSV to this path instead of standard output.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Only list the Pareto front.
    #[arg(long, conflicts_with = "curve")]
    pub pareto: bool,

    /// Only list the minimum curve of the given objective (0 or 1).
    #[arg(long, value_name = "INDEX")]
    pub curve: Option<usize>,
}

/// Arguments for the `validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the analysis definition in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,
}
