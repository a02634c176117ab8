use podcel::BenchOptions;

use crate::cmd::BenchArgs;
use crate::exit::{bench_error, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat};

pub fn run(args: BenchArgs, format: OutputFormat) -> CliResult<i32> {
    let options = BenchOptions {
        iterations: args.iterations,
        cost_limit: args.cost_limit,
    };
    tracing::info!(
        benchmark = %args.name,
        iterations = options.iterations,
        cost_limit = ?options.cost_limit,
        "running benchmark"
    );

    let report = podcel::run(&args.name, options).map_err(|err| bench_error(&args.name, err))?;
    print_report(&report, format);
    Ok(SUCCESS)
}
