use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;

use crate::client::output::outputs::Outputs;
use crate::submit::concurrency::is_valid_safety_factor;
use crate::submit::controller::{parse_concurrency, ConcurrencySetting};
use crate::submit::scheduler::IndexMode;
use crate::TaskIndex;

fn parse_safety_factor(value: &str) -> anyhow::Result<f64> {
    let factor: f64 = value.trim().parse()?;
    if !is_valid_safety_factor(factor) {
        anyhow::bail!("safety factor has to be a positive number");
    }
    Ok(factor)
}

#[derive(clap::ValueEnum, Clone)]
pub enum ColorPolicy {
    /// Use colors if the stdout is detected to be a terminal.
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

// Common CLI options
#[derive(Parser)]
pub struct CommonOpts {
    /// Path to a TOML configuration file
    ///
    /// When not given, `<config-dir>/arraysub/config.toml` is used if it exists.
    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        global = true,
        env = "ARRAYSUB_CONFIG",
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub config: Option<PathBuf>,

    /// Sets console color policy
    #[arg(
        long,
        default_value_t = ColorPolicy::Auto,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub colors: ColorPolicy,

    /// Sets output formatting
    #[arg(
        long,
        env = "ARRAYSUB_OUTPUT_MODE",
        default_value_t = Outputs::CLI,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub output_mode: Outputs,

    /// Enables more detailed log output
    #[arg(
        long,
        env = "ARRAYSUB_DEBUG",
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub debug: bool,
}

// Root CLI options
#[derive(Parser)]
#[command(
    author,
    about,
    version(crate::ARRAYSUB_VERSION),
    disable_help_subcommand(true),
    help_expected(true)
)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[clap(subcommand)]
    pub subcmd: SubCommand,
}

#[allow(clippy::large_enum_variant)]
#[derive(Parser)]
pub enum SubCommand {
    /// Submit all tasks of a manifest as Slurm array jobs
    ///
    /// The manifest is split into chunks, every chunk is submitted as a single array job.
    /// Chunks refused by the scheduler are split in halves until they are accepted.
    Submit(SubmitOpts),
    /// Show how a manifest would be split into chunks, without submitting anything
    Plan(PlanOpts),
    /// Display free CPUs of cluster partitions
    Probe(ProbeOpts),
    /// Print the manifest line of a single task
    ///
    /// Meant to be used inside of the job template to find the input of the running array task.
    TaskLine(TaskLineOpts),
    /// Generate shell completion script
    GenerateCompletion(GenerateCompletionOpts),
}

/// Options shared by `submit` and `plan`.
#[derive(Parser)]
pub struct ChunkingOpts {
    /// Manifest file, every non-empty line not starting with `#` is one task
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub manifest: PathBuf,

    /// Maximum number of tasks in a single array job
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Maximum number of concurrently running tasks of each array job
    ///
    /// Either a positive number or `auto`. With `auto`, the value is derived from the free
    /// CPUs of the partition and the `--cpus-per-task` directive of the job template.
    #[arg(long, default_value = "auto", value_parser = parse_concurrency)]
    pub concurrency: ConcurrencySetting,

    /// Slurm partition used for submission and resource probing
    #[arg(long)]
    pub partition: Option<String>,

    /// Fraction of free CPUs that can be used by `--concurrency auto`
    #[arg(long, value_parser = parse_safety_factor)]
    pub safety_factor: Option<f64>,

    /// Sbatch script executed by every array task
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub template: Option<PathBuf>,

    /// How array indices are mapped to tasks
    #[arg(long, value_enum)]
    pub index_mode: Option<IndexMode>,
}

#[derive(Parser)]
pub struct SubmitOpts {
    #[clap(flatten)]
    pub chunking: ChunkingOpts,

    /// Only print the sbatch commands that would be executed
    #[arg(long)]
    pub dry_run: bool,

    /// File where accepted submissions are appended
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub log: Option<PathBuf>,

    /// Name of the submitted array jobs
    #[arg(long)]
    pub name: Option<String>,

    /// Maximum number of times a rejected range is split in halves
    #[arg(long)]
    pub max_bisect_depth: Option<u32>,

    /// Additional arguments passed verbatim to `sbatch`
    #[arg(last(true))]
    pub sbatch_args: Vec<String>,
}

#[derive(Parser)]
pub struct PlanOpts {
    #[clap(flatten)]
    pub chunking: ChunkingOpts,
}

#[derive(Parser)]
pub struct ProbeOpts {
    /// Partition to inspect, all partitions are displayed when missing
    pub partition: Option<String>,

    /// Job template used to compute the concurrency of the partition
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub template: Option<PathBuf>,

    /// Fraction of free CPUs that can be used by the computed concurrency
    #[arg(long, value_parser = parse_safety_factor)]
    pub safety_factor: Option<f64>,
}

#[derive(Parser)]
pub struct TaskLineOpts {
    /// Manifest file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub manifest: PathBuf,

    /// Array index of the task
    #[arg(long, env = "SLURM_ARRAY_TASK_ID")]
    pub index: TaskIndex,

    /// Offset added to the array index
    #[arg(long, env = "ARRAYSUB_OFFSET", default_value_t = 0)]
    pub offset: u64,
}

#[derive(Parser)]
pub struct GenerateCompletionOpts {
    /// Shell flavour for which the completion script should be generated
    #[arg(value_enum)]
    pub shell: Shell,
}
