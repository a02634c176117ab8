use podcel_cel::{compile, estimate_cost, validate, CancelHandle, CompileError};
use podcel_schema::{FieldPath, Kind, Rule, Structural, Violation, ViolationKind};
use proptest::prelude::*;
use serde_json::{json, Value};

fn scalars() -> Structural {
    let mut name = Structural::new(Kind::String);
    name.value_validation.max_length = Some(8);
    let mut tag = Structural::new(Kind::String);
    tag.value_validation.max_length = Some(4);
    let mut tags = Structural::array(tag);
    tags.value_validation.max_items = Some(3);
    Structural::object([
        ("n".to_string(), Structural::new(Kind::Integer)),
        ("d".to_string(), Structural::new(Kind::Number)),
        ("flag".to_string(), Structural::new(Kind::Boolean)),
        ("name".to_string(), name),
        ("port".to_string(), Structural::new(Kind::IntOrString)),
        ("tags".to_string(), tags),
    ])
}

/// Rules whose cost depends on the text produced by a conversion.
const CONVERSION_RULES: &[&str] = &[
    "string(dyn(self.n)) == string(dyn(self.n))",
    "string(self.n) == string(self.n)",
    "string(self.d) == string(self.d)",
    "string(dyn(self.d)) == string(dyn(self.d))",
    "string(self.flag) == string(dyn(self.flag))",
    "string(dyn(self.port)) == string(self.port)",
    "string(uint(dyn(self.n))).startsWith('1')",
    "string(int(self.d)).contains('9')",
    "bytes(string(self.n)) == bytes(string(dyn(self.n)))",
    "string(double(self.n)) + self.name == self.name + string(self.flag)",
    "string(dyn(self.n)).lowerAscii() == string(dyn(self.d)).upperAscii()",
    "string(dyn(self.n)).matches('^-?[0-9]+$')",
    "type(dyn(self.n)) == int",
    "dyn(self.tags).all(t, string(dyn(t)).size() <= 16)",
    "self.tags.exists(t, string(dyn(self.n)) + t == t)",
];

fn extreme_instances() -> Vec<Value> {
    vec![
        json!({"n": i64::MIN, "d": f64::MIN, "flag": false, "name": "ÿÿÿÿÿÿÿÿ", "port": i64::MIN, "tags": ["ÿÿ", "ab", "c"]}),
        json!({"n": i64::MAX, "d": f64::MAX, "flag": true, "name": "", "port": "http-alt", "tags": []}),
        json!({"n": 0, "d": -0.0000012345678901234567, "flag": true, "name": "x", "port": 0}),
        json!({"n": -1, "d": 1.2345678901234567e20, "flag": false, "port": i64::MAX, "tags": ["abcd"]}),
        json!({"n": 1, "d": -2.2250738585072014e-308, "flag": true, "name": "abcdefgh"}),
    ]
}

/// Evaluate `rule` against `instance` with the budget set to its estimate.
fn run_at_estimate(schema: &Structural, rule: &str, instance: &Value) -> Vec<Violation> {
    let estimate = estimate_cost(schema, rule).expect("rule compiles");
    let rules = compile(schema, &[Rule::new(rule, "m")], Some(estimate)).expect("estimate fits");
    let (violations, remaining) = validate(
        &rules,
        &FieldPath::new("root"),
        schema,
        None,
        instance,
        estimate,
        &CancelHandle::never(),
    );
    assert!(remaining <= estimate);
    violations
}

#[test]
fn conversions_stay_within_their_estimate() {
    let schema = scalars();
    for rule in CONVERSION_RULES {
        for instance in extreme_instances() {
            let violations = run_at_estimate(&schema, rule, &instance);
            assert!(
                violations
                    .iter()
                    .all(|violation| violation.kind != ViolationKind::BudgetExhausted),
                "{rule} on {instance}: {violations:?}"
            );
        }
    }
}

#[test]
fn integer_text_is_charged_at_full_length() {
    let schema = scalars();
    let rule = "string(dyn(self.n)) == string(dyn(self.n))";
    let instance = json!({"n": i64::MIN});
    assert!(run_at_estimate(&schema, rule, &instance).is_empty());
}

#[test]
fn deep_unary_chains_fail_to_compile() {
    let rule = format!("{}true", "!".repeat(200_000));
    let err = compile(&scalars(), &[Rule::new(rule, "m")], None).unwrap_err();
    assert!(
        matches!(err, CompileError::Invalid { ref diagnostic, .. } if diagnostic.contains("maximum depth")),
        "{err}"
    );
}

#[test]
fn long_operator_chains_fail_to_compile() {
    let rule = format!("{} == 1", vec!["1"; 100_000].join(" + "));
    let err = compile(&scalars(), &[Rule::new(rule, "m")], None).unwrap_err();
    assert_eq!(err.kind(), "compile_error");

    let rule = vec!["self.flag"; 100_000].join(" || ");
    assert!(compile(&scalars(), &[Rule::new(rule, "m")], None).is_err());
}

#[test]
fn moderate_chains_still_compile_and_run() {
    let rule = format!("{} == 50", vec!["1"; 50].join(" + "));
    let violations = run_at_estimate(&scalars(), &rule, &json!({}));
    assert!(violations.is_empty(), "{violations:?}");
}

fn finite_double() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn estimate_bounds_any_scalar_instance(
        n in any::<i64>(),
        d in finite_double(),
        flag in any::<bool>(),
        name in "\\PC{0,8}",
    ) {
        let schema = scalars();
        let instance = json!({"n": n, "d": d, "flag": flag, "name": name, "port": n});
        for rule in CONVERSION_RULES {
            let violations = run_at_estimate(&schema, rule, &instance);
            prop_assert!(
                violations.iter().all(|v| v.kind != ViolationKind::BudgetExhausted),
                "{} on {}: {:?}",
                rule,
                instance,
                violations
            );
        }
    }
}
