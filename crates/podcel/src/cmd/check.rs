use podcel::cel::{compile, validate, CancelHandle};
use podcel::schema::{load_structural, FieldPath, Rule, SchemaRegistry, Violation};
use podcel::SetupError;
use serde::Serialize;

use crate::cmd::CheckArgs;
use crate::exit::{setup_error, CliError, CliResult, FAILURE, SETUP_FAILED, SUCCESS};
use crate::output::{print_json, violations_table, OutputFormat, ViolationOutput};

#[derive(Serialize)]
struct CheckOutput<'a> {
    type_name: &'a str,
    rule: &'a str,
    estimated_cost: u64,
    transitional: bool,
    evaluated: bool,
    violations: Vec<ViolationOutput<'a>>,
}

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let registry = SchemaRegistry::pods_v1().map_err(|err| setup_error(SetupError::from(err)))?;
    let schema = load_structural(&registry, &args.type_name)
        .map_err(|err| setup_error(SetupError::from(err)))?;

    let rules = [Rule::new(args.rule.as_str(), args.message.as_str())];
    let compiled = compile(&schema, &rules, args.cost_limit)
        .map_err(|err| setup_error(SetupError::from(err)))?;
    let Some(rule) = compiled.first() else {
        return Err(CliError::new(SETUP_FAILED, "no rule compiled"));
    };

    let instance = args
        .instance
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|err| CliError::new(SETUP_FAILED, format!("invalid --instance: {err}")))?;

    let violations: Vec<Violation> = match &instance {
        Some(instance) => {
            let budget = args.cost_limit.unwrap_or(u64::MAX);
            let (violations, remaining) = validate(
                &compiled,
                &FieldPath::new("root"),
                &schema,
                None,
                instance,
                budget,
                &CancelHandle::never(),
            );
            tracing::debug!(cost = budget - remaining, "evaluated rule");
            violations
        }
        None => Vec::new(),
    };

    let out = CheckOutput {
        type_name: &args.type_name,
        rule: &args.rule,
        estimated_cost: rule.estimated_cost,
        transitional: rule.transitional,
        evaluated: instance.is_some(),
        violations: violations.iter().map(ViolationOutput::from).collect(),
    };
    print_check(&out, &violations, format);

    if violations.is_empty() {
        Ok(SUCCESS)
    } else {
        Ok(FAILURE)
    }
}

fn print_check(out: &CheckOutput<'_>, violations: &[Violation], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Raw => {
            println!("estimated_cost: {}", out.estimated_cost);
            for violation in violations {
                println!("{violation}");
            }
        }
        OutputFormat::Table => {
            println!("Rule:           {}", out.rule);
            println!("Type:           {}", out.type_name);
            println!("Estimated cost: {}", out.estimated_cost);
            println!("Transitional:   {}", out.transitional);
            if out.evaluated {
                if violations.is_empty() {
                    println!("Result:         pass");
                } else {
                    println!("{}", violations_table(violations));
                }
            }
        }
    }
}
