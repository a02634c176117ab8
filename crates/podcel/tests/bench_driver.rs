use podcel::bench::{CelTarget, NativeTarget};
use podcel::schema::ViolationKind;
use podcel::{run, BenchError, BenchOptions, BenchTarget, Expectation};

fn options(iterations: u64) -> BenchOptions {
    BenchOptions {
        iterations,
        cost_limit: None,
    }
}

#[test]
fn cel_happy_case_passes() {
    let report = run("podspec-cel", options(25)).expect("podspec-cel should pass");
    assert_eq!(report.name, "podspec-cel");
    assert_eq!(report.iterations, 25);
    assert!(report.violations.is_empty());
}

#[test]
fn cel_invalid_restart_policy_reports_one_violation() {
    let report = run("podspec-cel-invalid", options(10)).expect("violations are expected");
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].message, "restartPolicy");
    assert_eq!(report.violations[0].kind, ViolationKind::RuleViolation);
    assert_eq!(report.violations[0].path.to_string(), "root");
}

#[test]
fn native_invalid_reports_every_iteration() {
    let report = run("podspec-native", options(100)).expect("podspec-native should pass");
    assert_eq!(report.iterations, 100);
    assert!(!report.violations.is_empty());
    assert!(report
        .violations
        .iter()
        .any(|v| v.path.to_string() == "spec.restartPolicy" && v.kind == ViolationKind::NotSupported));
}

#[test]
fn native_valid_has_no_violations() {
    let report = run("podspec-native-valid", options(10)).expect("defaulted spec is valid");
    assert!(report.violations.is_empty());
}

#[test]
fn cost_limit_below_estimate_fails_setup() {
    let err = run(
        "podspec-cel",
        BenchOptions {
            iterations: 1,
            cost_limit: Some(1),
        },
    )
    .unwrap_err();
    match err {
        BenchError::Setup(setup) => assert_eq!(setup.kind(), "cost_limit_exceeded"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn cost_limit_covering_every_rule_runs() {
    let report = run(
        "podspec-cel",
        BenchOptions {
            iterations: 5,
            cost_limit: Some(1_000),
        },
    )
    .expect("the canonical rules are cheap");
    assert!(report.violations.is_empty());
}

#[test]
fn targets_describe_themselves() {
    let cel = CelTarget::happy();
    assert_eq!(cel.id(), "podspec-cel");
    assert_eq!(cel.expectation(), Expectation::NoViolations);
    assert!(!cel.description().is_empty());

    let native = NativeTarget::invalid();
    assert_eq!(native.id(), "podspec-native");
    assert_eq!(native.expectation(), Expectation::Violations);
}
