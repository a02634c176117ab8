use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod bench;
pub mod check;
pub mod list;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a benchmark and print `<name> <iterations> <ns-per-op>`.
    Bench(BenchArgs),
    /// List available benchmarks.
    List(ListArgs),
    /// Compile a rule against a catalogue type and optionally evaluate it.
    Check(CheckArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Bench(args) => bench::run(args, format),
        Command::List(args) => list::run(args, format),
        Command::Check(args) => check::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct BenchArgs {
    /// Benchmark name (see `podcel list`).
    pub name: String,
    /// Number of timed iterations.
    #[arg(long, default_value_t = podcel::DEFAULT_ITERATIONS)]
    pub iterations: u64,
    /// Per-rule cost ceiling and per-iteration cost budget. Unlimited when unset.
    #[arg(long, value_name = "K")]
    pub cost_limit: Option<u64>,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Qualified type name, e.g. pods.v1.PodSpec.
    #[arg(value_name = "TYPE")]
    pub type_name: String,
    /// CEL rule with `self` bound to the type.
    pub rule: String,
    /// Message reported when the rule evaluates to false.
    #[arg(long, default_value = "")]
    pub message: String,
    /// JSON instance to evaluate the rule against.
    #[arg(long, value_name = "JSON")]
    pub instance: Option<String>,
    /// Reject the rule when its estimated cost exceeds K.
    #[arg(long, value_name = "K")]
    pub cost_limit: Option<u64>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}
