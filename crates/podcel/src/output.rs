use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use podcel::schema::Violation;
use podcel::BenchReport;
use serde::Serialize;

use crate::cmd::Command;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Raw,
    Json,
    Table,
}

impl OutputFormat {
    /// `bench` prints its result line unless a format is asked for.
    pub fn default_for(command: &Command) -> Self {
        match command {
            Command::Bench(_) => Self::Raw,
            _ => Self::default_for_stdout(),
        }
    }

    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Raw
        }
    }
}

#[derive(Serialize)]
pub struct ViolationOutput<'a> {
    pub path: String,
    pub kind: &'static str,
    pub message: &'a str,
}

impl<'a> From<&'a Violation> for ViolationOutput<'a> {
    fn from(violation: &'a Violation) -> Self {
        Self {
            path: violation.path.to_string(),
            kind: violation.kind.as_str(),
            message: &violation.message,
        }
    }
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    name: &'a str,
    iterations: u64,
    total_ns: u128,
    ns_per_op: u64,
    violations: Vec<ViolationOutput<'a>>,
}

pub fn print_report(report: &BenchReport, format: OutputFormat) {
    match format {
        OutputFormat::Raw => {
            println!("{} {} {}", report.name, report.iterations, report.ns_per_op);
        }
        OutputFormat::Json => {
            let out = ReportOutput {
                name: &report.name,
                iterations: report.iterations,
                total_ns: report.total.as_nanos(),
                ns_per_op: report.ns_per_op,
                violations: report.violations.iter().map(ViolationOutput::from).collect(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["BENCHMARK", "ITERATIONS", "NS/OP", "VIOLATIONS"])
                .add_row(vec![
                    report.name.clone(),
                    report.iterations.to_string(),
                    report.ns_per_op.to_string(),
                    report.violations.len().to_string(),
                ]);
            println!("{table}");
        }
    }
}

pub fn violations_table(violations: &[Violation]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["PATH", "KIND", "MESSAGE"]);
    for violation in violations {
        table.add_row(vec![
            violation.path.to_string(),
            violation.kind.to_string(),
            violation.message.clone(),
        ]);
    }
    table
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}
