use podcel_cel::{compile, estimate_cost, validate, CancelHandle, CompileError, Validator};
use podcel_schema::{
    attach, load_structural, FieldPath, Rule, SchemaRegistry, Structural, ViolationKind,
};
use serde_json::{json, Value};

fn pod_spec() -> Structural {
    let registry = SchemaRegistry::pods_v1().expect("embedded catalogue loads");
    load_structural(&registry, "pods.v1.PodSpec").expect("PodSpec normalizes")
}

fn canonical_rules() -> Vec<Rule> {
    vec![
        Rule::new(
            "has(self.containers) && self.containers.size() > 0",
            "containers must not be empty",
        ),
        Rule::new(
            "has(self.restartPolicy) && (self.restartPolicy == 'Always' || self.restartPolicy == 'OnFailure' || self.restartPolicy == 'Never')",
            "restartPolicy",
        ),
    ]
}

fn happy_case() -> Value {
    json!({
        "containers": [{
            "name": "foo",
            "image": "debian",
            "terminationMessagePath": "/dev/termination-log",
            "terminationMessagePolicy": "File",
            "imagePullPolicy": "Always"
        }],
        "restartPolicy": "Always",
        "dnsPolicy": "ClusterFirst",
        "schedulerName": "default-scheduler",
        "terminationGracePeriodSeconds": 30,
        "securityContext": {}
    })
}

fn run_canonical(instance: &Value) -> Vec<podcel_schema::Violation> {
    let schema = attach(&pod_spec(), canonical_rules());
    let rules = compile(&schema, schema.rules(), None).expect("canonical rules compile");
    let (violations, _) = validate(
        &rules,
        &FieldPath::new("root"),
        &schema,
        None,
        instance,
        u64::MAX,
        &CancelHandle::never(),
    );
    violations
}

#[test]
fn happy_case_has_no_violations() {
    assert!(run_canonical(&happy_case()).is_empty());
}

#[test]
fn unknown_restart_policy_is_reported() {
    let instance = json!({
        "restartPolicy": "Sometimes",
        "containers": [{"name": "c", "image": "x"}]
    });
    let violations = run_canonical(&instance);
    assert_eq!(violations.len(), 1, "{violations:?}");
    assert_eq!(violations[0].message, "restartPolicy");
    assert_eq!(violations[0].kind, ViolationKind::RuleViolation);
    assert_eq!(violations[0].path.to_string(), "root");
}

#[test]
fn empty_containers_are_reported() {
    let instance = json!({"restartPolicy": "Always", "containers": []});
    let violations = run_canonical(&instance);
    assert_eq!(violations.len(), 1, "{violations:?}");
    assert_eq!(violations[0].message, "containers must not be empty");
}

#[test]
fn host_network_rule_rejects_true() {
    let schema = pod_spec();
    let rules = compile(
        &schema,
        &[Rule::new("self.hostNetwork == false", "host networking is not allowed")],
        None,
    )
    .expect("rule compiles");
    let (violations, _) = validate(
        &rules,
        &FieldPath::new("root"),
        &schema,
        None,
        &json!({"hostNetwork": true}),
        u64::MAX,
        &CancelHandle::never(),
    );
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::RuleViolation);
    assert_eq!(violations[0].message, "host networking is not allowed");
}

#[test]
fn undefined_field_fails_to_compile() {
    let err = compile(&pod_spec(), &[Rule::new("self.nope.deep.path", "m")], None).unwrap_err();
    assert_eq!(err.kind(), "compile_error");
    match err {
        CompileError::Invalid {
            index, diagnostic, ..
        } => {
            assert_eq!(index, 0);
            assert!(diagnostic.contains("nope"), "{diagnostic}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn cost_limit_equal_to_estimate_compiles() {
    let schema = pod_spec();
    for rule in canonical_rules() {
        let estimate = estimate_cost(&schema, &rule.rule).expect("estimate");
        assert!(estimate > 0);
        let rules = [rule];
        assert!(compile(&schema, &rules, Some(estimate)).is_ok());

        let err = compile(&schema, &rules, Some(estimate - 1)).unwrap_err();
        assert_eq!(err.kind(), "cost_limit_exceeded");
        assert!(matches!(
            err,
            CompileError::CostLimitExceeded { estimate: e, .. } if e == estimate
        ));
    }
}

#[test]
fn comprehension_estimate_bounds_list_size() {
    let schema = pod_spec();
    let rule = "self.containers.all(c, c.name.size() <= 63)";
    let estimate = estimate_cost(&schema, rule).expect("estimate");
    let rules = compile(&schema, &[Rule::new(rule, "m")], None).expect("compiles");

    let containers: Vec<Value> = (0..50)
        .map(|i| json!({"name": format!("container-{i}"), "image": "x"}))
        .collect();
    let instance = json!({ "containers": containers });
    let (violations, remaining) = validate(
        &rules,
        &FieldPath::new("root"),
        &schema,
        None,
        &instance,
        estimate,
        &CancelHandle::never(),
    );
    assert!(violations.is_empty(), "{violations:?}");
    assert!(remaining > 0);
}

#[test]
fn rule_lists_of_zero_and_many() {
    let schema = pod_spec();
    let instance = happy_case();

    let none = compile(&schema, &[], None).expect("empty rule list compiles");
    assert!(none.is_empty());
    let (violations, remaining) = validate(
        &none,
        &FieldPath::new("root"),
        &schema,
        None,
        &instance,
        7,
        &CancelHandle::never(),
    );
    assert!(violations.is_empty());
    assert_eq!(remaining, 7);

    let many: Vec<Rule> = (0..40)
        .map(|i| Rule::new(format!("{i} < 20"), format!("rule {i}")))
        .collect();
    let compiled = compile(&schema, &many, None).expect("40 rules compile");
    assert_eq!(compiled.len(), 40);
    let (violations, _) = validate(
        &compiled,
        &FieldPath::new("root"),
        &schema,
        None,
        &instance,
        u64::MAX,
        &CancelHandle::never(),
    );
    let messages: Vec<&str> = violations.iter().map(|v| v.message.as_str()).collect();
    let expected: Vec<String> = (20..40).map(|i| format!("rule {i}")).collect();
    assert_eq!(messages, expected);
}

#[test]
fn nested_rules_walk_containers() {
    let registry = SchemaRegistry::pods_v1().expect("catalogue");
    let mut schema = load_structural(&registry, "pods.v1.PodSpec").expect("PodSpec");
    let container = schema
        .properties
        .get_mut("containers")
        .and_then(|containers| containers.items.as_deref_mut())
        .expect("containers have an item schema");
    container.attach_rules(vec![Rule::new(
        "!has(self.image) || self.image.size() > 0",
        "image must not be empty",
    )]);
    schema.attach_rules(canonical_rules());

    let validator = Validator::new(&schema, None).expect("validator compiles");
    assert_eq!(validator.rule_count(), 3);

    let instance = json!({
        "restartPolicy": "Never",
        "containers": [{"name": "a", "image": "x"}, {"name": "b", "image": ""}]
    });
    let (violations, _) = validator.validate(
        &FieldPath::new("spec"),
        None,
        &instance,
        u64::MAX,
        &CancelHandle::never(),
    );
    assert_eq!(violations.len(), 1, "{violations:?}");
    assert_eq!(violations[0].path.to_string(), "spec.containers[1]");
    assert_eq!(violations[0].message, "image must not be empty");
}

#[test]
fn unicode_map_keys_are_iterated() {
    let schema = pod_spec();
    let rules = compile(
        &schema,
        &[Rule::new(
            "self.nodeSelector.all(k, k.size() == 2 && self.nodeSelector[k] != '')",
            "node selector",
        )],
        None,
    )
    .expect("compiles");
    let instance = json!({"nodeSelector": {"日本": "ゾーン", "ключ": "x"}});
    let (violations, _) = validate(
        &rules,
        &FieldPath::new("root"),
        &schema,
        None,
        &instance,
        u64::MAX,
        &CancelHandle::never(),
    );
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].message, "node selector");
}

#[test]
fn integer_bounds_are_preserved() {
    let schema = pod_spec();
    let rules = compile(
        &schema,
        &[Rule::new(
            "self.terminationGracePeriodSeconds == 9223372036854775807",
            "max",
        )],
        None,
    )
    .expect("compiles");
    let (violations, _) = validate(
        &rules,
        &FieldPath::new("root"),
        &schema,
        None,
        &json!({"terminationGracePeriodSeconds": i64::MAX}),
        u64::MAX,
        &CancelHandle::never(),
    );
    assert!(violations.is_empty(), "{violations:?}");
}

#[test]
fn map_values_are_selected_by_field_name() {
    let schema = attach(
        &pod_spec(),
        vec![Rule::new(
            "!has(self.nodeSelector.zone) || self.nodeSelector.zone == 'eu-1'",
            "zone must be eu-1",
        )],
    );
    let rules = compile(&schema, schema.rules(), None).expect("rule compiles");
    let run = |instance: Value| {
        validate(
            &rules,
            &FieldPath::new("root"),
            &schema,
            None,
            &instance,
            u64::MAX,
            &CancelHandle::never(),
        )
        .0
    };

    assert!(run(json!({"nodeSelector": {"zone": "eu-1"}})).is_empty());
    assert!(run(json!({"nodeSelector": {"rack": "r1"}})).is_empty());
    let violations = run(json!({"nodeSelector": {"zone": "us-2"}}));
    assert_eq!(violations.len(), 1, "{violations:?}");
    assert_eq!(violations[0].message, "zone must be eu-1");
}
