use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::cmd::ListArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct TargetOutput {
    id: String,
    description: String,
    expects_violations: &'static str,
}

pub fn run(_args: ListArgs, format: OutputFormat) -> CliResult<i32> {
    let targets: Vec<TargetOutput> = podcel::all_targets()
        .iter()
        .map(|target| TargetOutput {
            id: target.id().to_string(),
            description: target.description().to_string(),
            expects_violations: target.expectation().as_str(),
        })
        .collect();

    match format {
        OutputFormat::Raw => {
            for target in &targets {
                println!("{}", target.id);
            }
        }
        OutputFormat::Json => print_json(&targets),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["BENCHMARK", "VIOLATIONS", "DESCRIPTION"]);
            for target in &targets {
                table.add_row(vec![
                    target.id.clone(),
                    target.expects_violations.to_string(),
                    target.description.clone(),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(SUCCESS)
}
