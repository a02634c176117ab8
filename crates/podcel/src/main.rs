mod cmd;
mod exit;
mod logging;
mod output;

use std::ffi::OsString;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "podcel", version, about = "PodSpec CEL-vs-native validation benchmarks")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "PODCEL_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

/// Single-dash long flags accepted for compatibility with `go test` style
/// invocations.
const SINGLE_DASH_FLAGS: &[&str] = &["-iterations", "-cost-limit"];

/// Rewrite `-iterations N` and `-cost-limit=K` to their double-dash form.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            let flag = text.split_once('=').map_or(text, |(flag, _)| flag);
            if SINGLE_DASH_FLAGS.contains(&flag) {
                OsString::from(format!("-{text}"))
            } else {
                arg
            }
        })
        .collect()
}

fn main() {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    init_logging(cli.log_format, cli.log_level);
    if cli.log_level.distorts_timings() && matches!(cli.command, Command::Bench(_)) {
        tracing::warn!(level = ?cli.log_level, "per-rule events are logged inside the timed loop");
    }

    let format = cli
        .format
        .unwrap_or_else(|| OutputFormat::default_for(&cli.command));
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(err.code);
        }
    }
}
