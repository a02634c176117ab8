use podcel_schema::{FieldPath, Structural, Violation, ViolationKind};
use serde_json::Value as Json;

use crate::cancel::CancelHandle;
use crate::error::{EvalError, Result};
use crate::program::{compile_at, Activation, CompiledRule};
use crate::value::Value;

const BUDGET_EXHAUSTED_MESSAGE: &str =
    "validation failed due to running out of cost budget, no further validation rules will be run";

/// Evaluate `rules` against `new` with `self` bound to `schema`.
///
/// Violations are reported at `path` in rule order. The actual cost of
/// each rule is taken from `budget`; a rule that would overrun it is
/// reported as [`ViolationKind::BudgetExhausted`] and no further rules
/// run. Transition rules are skipped when `old` is `None`.
pub fn validate(
    rules: &[CompiledRule],
    path: &FieldPath,
    schema: &Structural,
    old: Option<&Json>,
    new: &Json,
    budget: u64,
    cancel: &CancelHandle,
) -> (Vec<Violation>, u64) {
    let mut violations = Vec::new();
    let remaining = evaluate_rules(rules, path, schema, old, new, budget, cancel, &mut violations);
    (violations, remaining.unwrap_or(0))
}

/// Returns the remaining budget, or `None` once evaluation must stop.
#[allow(clippy::too_many_arguments)]
fn evaluate_rules(
    rules: &[CompiledRule],
    path: &FieldPath,
    schema: &Structural,
    old: Option<&Json>,
    new: &Json,
    mut remaining: u64,
    cancel: &CancelHandle,
    violations: &mut Vec<Violation>,
) -> Option<u64> {
    for (index, compiled) in rules.iter().enumerate() {
        if cancel.is_cancelled() {
            violations.push(Violation::new(
                path.clone(),
                ViolationKind::EvaluationError,
                EvalError::Cancelled.to_string(),
            ));
            return None;
        }

        let activation = match (compiled.transitional, old) {
            (true, None) => {
                tracing::trace!(index, %path, "skipping transition rule without old value");
                continue;
            }
            (_, Some(old)) => Activation::new(schema, new).with_old_self(old),
            (false, None) => Activation::new(schema, new),
        };

        let (result, cost) = compiled.program.evaluate(activation, remaining);
        tracing::trace!(index, %path, cost, "evaluated rule");

        let (kind, message) = match result {
            Ok(Value::Bool(true)) => {
                remaining -= cost;
                continue;
            }
            Ok(Value::Bool(false)) => (ViolationKind::RuleViolation, rule_message(compiled)),
            Ok(other) => (
                ViolationKind::EvaluationError,
                format!("rule must evaluate to bool, found '{}'", other.type_name()),
            ),
            Err(EvalError::BudgetExhausted) => {
                violations.push(Violation::new(
                    path.clone(),
                    ViolationKind::BudgetExhausted,
                    BUDGET_EXHAUSTED_MESSAGE,
                ));
                return None;
            }
            Err(err) => (ViolationKind::EvaluationError, err.to_string()),
        };
        remaining -= cost;
        violations.push(Violation::new(path.clone(), kind, message));
    }
    Some(remaining)
}

fn rule_message(compiled: &CompiledRule) -> String {
    if compiled.rule.message.is_empty() {
        format!("failed rule: {}", compiled.rule.rule)
    } else {
        compiled.rule.message.clone()
    }
}

/// Rules compiled for every node of a structural schema.
///
/// Only subtrees that carry rules are kept, so walking an instance visits
/// just the values some rule is attached to or nested under.
#[derive(Debug, Clone)]
pub struct Validator {
    schema: Structural,
    rules: Vec<CompiledRule>,
    properties: Vec<(String, Validator)>,
    additional: Option<Box<Validator>>,
    items: Option<Box<Validator>>,
    /// Keys correlating old and new items of a `map` list.
    list_map_keys: Option<Vec<String>>,
}

impl Validator {
    /// Compile the rules attached anywhere in `schema`.
    pub fn new(schema: &Structural, cost_limit: Option<u64>) -> Result<Self> {
        let validator = build(schema, cost_limit, "root")?.unwrap_or_else(|| Validator {
            schema: schema.clone(),
            rules: Vec::new(),
            properties: Vec::new(),
            additional: None,
            items: None,
            list_map_keys: None,
        });
        tracing::debug!(
            rules = validator.rule_count(),
            estimated_cost = validator.estimated_cost(),
            "compiled validator"
        );
        Ok(validator)
    }

    /// Rules attached to the root node.
    pub fn root_rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
            + self
                .properties
                .iter()
                .map(|(_, child)| child.rule_count())
                .sum::<usize>()
            + self.additional.as_deref().map_or(0, Validator::rule_count)
            + self.items.as_deref().map_or(0, Validator::rule_count)
    }

    /// Sum of the static estimates of every compiled rule.
    pub fn estimated_cost(&self) -> u64 {
        let own = self
            .rules
            .iter()
            .fold(0u64, |total, rule| total.saturating_add(rule.estimated_cost));
        let children = self
            .properties
            .iter()
            .map(|(_, child)| child)
            .chain(self.additional.as_deref())
            .chain(self.items.as_deref())
            .fold(0u64, |total, child| total.saturating_add(child.estimated_cost()));
        own.saturating_add(children)
    }

    /// Walk `new` along the schema and evaluate every node's rules.
    ///
    /// Old values are correlated by property name, map key, and for
    /// `x-kubernetes-list-type: map` lists by the list map keys. Null
    /// values are not validated.
    pub fn validate(
        &self,
        root: &FieldPath,
        old: Option<&Json>,
        new: &Json,
        budget: u64,
        cancel: &CancelHandle,
    ) -> (Vec<Violation>, u64) {
        let mut violations = Vec::new();
        let remaining = self.walk(root, old, new, budget, cancel, &mut violations);
        (violations, remaining.unwrap_or(0))
    }

    fn walk(
        &self,
        path: &FieldPath,
        old: Option<&Json>,
        new: &Json,
        budget: u64,
        cancel: &CancelHandle,
        violations: &mut Vec<Violation>,
    ) -> Option<u64> {
        if new.is_null() {
            return Some(budget);
        }

        let mut remaining = evaluate_rules(
            &self.rules,
            path,
            &self.schema,
            old,
            new,
            budget,
            cancel,
            violations,
        )?;

        if let Some(fields) = new.as_object() {
            for (name, child) in &self.properties {
                if let Some(value) = fields.get(name) {
                    let old_value = old.and_then(|old| old.get(name));
                    remaining =
                        child.walk(&path.child(name), old_value, value, remaining, cancel, violations)?;
                }
            }
            if let Some(child) = self.additional.as_deref() {
                for (key, value) in fields {
                    let old_value = old.and_then(|old| old.get(key));
                    remaining =
                        child.walk(&path.key(key), old_value, value, remaining, cancel, violations)?;
                }
            }
        }

        if let (Some(child), Some(items)) = (self.items.as_deref(), new.as_array()) {
            let old_items = old.and_then(Json::as_array);
            for (index, item) in items.iter().enumerate() {
                let old_item = match (&self.list_map_keys, old_items) {
                    (Some(keys), Some(old_items)) => correlate(keys, item, old_items),
                    _ => None,
                };
                remaining =
                    child.walk(&path.index(index), old_item, item, remaining, cancel, violations)?;
            }
        }

        Some(remaining)
    }
}

fn correlate<'j>(keys: &[String], item: &Json, old_items: &'j [Json]) -> Option<&'j Json> {
    old_items
        .iter()
        .find(|old| keys.iter().all(|key| old.get(key) == item.get(key)))
}

fn build(schema: &Structural, cost_limit: Option<u64>, path: &str) -> Result<Option<Validator>> {
    let rules = compile_at(schema, schema.rules(), cost_limit, path)?;

    let mut properties = Vec::new();
    for (name, property) in &schema.properties {
        if let Some(child) = build(property, cost_limit, &format!("{path}.{name}"))? {
            properties.push((name.clone(), child));
        }
    }
    let additional = match schema.additional.as_deref() {
        Some(values) => build(values, cost_limit, &format!("{path}[*]"))?.map(Box::new),
        None => None,
    };
    let items = match schema.items.as_deref() {
        Some(items) => build(items, cost_limit, &format!("{path}[*]"))?.map(Box::new),
        None => None,
    };

    if rules.is_empty() && properties.is_empty() && additional.is_none() && items.is_none() {
        return Ok(None);
    }

    let list_map_keys = (schema.extensions.list_type.as_deref() == Some("map"))
        .then(|| schema.extensions.list_map_keys.clone());

    Ok(Some(Validator {
        schema: schema.clone(),
        rules,
        properties,
        additional,
        items,
        list_map_keys,
    }))
}

#[cfg(test)]
mod tests {
    use podcel_schema::{attach, Kind, Rule};
    use serde_json::json;

    use super::*;
    use crate::program::compile;

    fn schema() -> Structural {
        Structural::object([
            ("name".to_string(), Structural::new(Kind::String)),
            ("replicas".to_string(), Structural::new(Kind::Integer)),
        ])
    }

    fn root() -> FieldPath {
        FieldPath::new("root")
    }

    #[test]
    fn reports_false_rules_in_order() {
        let schema = schema();
        let rules = compile(
            &schema,
            &[
                Rule::new("self.replicas > 5", "too few replicas"),
                Rule::new("self.name.size() < 2", ""),
                Rule::new("self.name == 'web'", "ok"),
            ],
            None,
        )
        .unwrap();
        let instance = json!({"name": "web", "replicas": 1});

        let (violations, remaining) = validate(
            &rules,
            &root(),
            &schema,
            None,
            &instance,
            1_000,
            &CancelHandle::never(),
        );
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].message, "too few replicas");
        assert_eq!(violations[0].kind, ViolationKind::RuleViolation);
        assert_eq!(violations[1].message, "failed rule: self.name.size() < 2");
        assert_eq!(violations[1].path.to_string(), "root");
        assert!(remaining < 1_000);
    }

    #[test]
    fn runtime_errors_are_evaluation_errors() {
        let schema = schema();
        let rules = compile(&schema, &[Rule::new("self.name == 'x'", "m")], None).unwrap();
        let (violations, _) = validate(
            &rules,
            &root(),
            &schema,
            None,
            &json!({}),
            u64::MAX,
            &CancelHandle::never(),
        );
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::EvaluationError);
        assert_eq!(violations[0].message, "no such key: name");
    }

    #[test]
    fn budget_exhaustion_stops_evaluation() {
        let schema = schema();
        let rules = compile(
            &schema,
            &[
                Rule::new("self.replicas > 0", "a"),
                Rule::new("self.replicas > 0", "b"),
                Rule::new("self.replicas < 0", "c"),
            ],
            None,
        )
        .unwrap();
        let instance = json!({"replicas": 1});

        let (violations, remaining) = validate(
            &rules,
            &root(),
            &schema,
            None,
            &instance,
            6,
            &CancelHandle::never(),
        );
        assert_eq!(remaining, 0);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::BudgetExhausted);
    }

    #[test]
    fn transition_rules_need_an_old_value() {
        let schema = schema();
        let rules = compile(
            &schema,
            &[Rule::new("self.replicas >= oldSelf.replicas", "no scale down")],
            None,
        )
        .unwrap();
        assert!(rules[0].transitional);

        let new = json!({"replicas": 1});
        let old = json!({"replicas": 3});
        let cancel = CancelHandle::never();

        let (violations, remaining) = validate(&rules, &root(), &schema, None, &new, 100, &cancel);
        assert!(violations.is_empty());
        assert_eq!(remaining, 100);

        let (violations, _) = validate(&rules, &root(), &schema, Some(&old), &new, 100, &cancel);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "no scale down");
    }

    #[test]
    fn cancelled_handle_stops_before_rules() {
        let schema = schema();
        let rules = compile(&schema, &[Rule::new("true", "m")], None).unwrap();
        let cancel = CancelHandle::new();
        cancel.cancel();

        let (violations, _) = validate(&rules, &root(), &schema, None, &json!({}), 100, &cancel);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::EvaluationError);
        assert_eq!(violations[0].message, "validation cancelled");
    }

    #[test]
    fn nested_rules_report_item_paths() {
        let mut name = Structural::new(Kind::String);
        name.attach_rules(vec![Rule::new("self.size() <= 3", "name too long")]);
        let mut items = Structural::array(Structural::object([("name".to_string(), name)]));
        items.extensions.list_type = Some("map".to_string());
        items.extensions.list_map_keys = vec!["name".to_string()];
        let schema = Structural::object([("items".to_string(), items)]);

        let validator = Validator::new(&schema, None).unwrap();
        assert_eq!(validator.rule_count(), 1);

        let instance = json!({"items": [{"name": "ok"}, {"name": "toolong"}]});
        let (violations, _) =
            validator.validate(&root(), None, &instance, u64::MAX, &CancelHandle::never());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path.to_string(), "root.items[1].name");
    }

    #[test]
    fn old_list_items_are_correlated_by_key() {
        let mut entry = Structural::object([
            ("name".to_string(), Structural::new(Kind::String)),
            ("value".to_string(), Structural::new(Kind::Integer)),
        ]);
        entry.attach_rules(vec![Rule::new("self.value >= oldSelf.value", "decreased")]);
        let mut list = Structural::array(entry);
        list.extensions.list_type = Some("map".to_string());
        list.extensions.list_map_keys = vec!["name".to_string()];
        let schema = Structural::object([("entries".to_string(), list)]);

        let validator = Validator::new(&schema, None).unwrap();
        let old = json!({"entries": [{"name": "b", "value": 5}, {"name": "a", "value": 1}]});
        let new = json!({"entries": [{"name": "a", "value": 2}, {"name": "b", "value": 4}, {"name": "c", "value": 0}]});

        let (violations, _) =
            validator.validate(&root(), Some(&old), &new, u64::MAX, &CancelHandle::never());
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path.to_string(), "root.entries[1]");
    }

    #[test]
    fn no_rules_never_report() {
        let schema = attach(&schema(), Vec::new());
        let validator = Validator::new(&schema, None).unwrap();
        assert_eq!(validator.rule_count(), 0);
        for instance in [json!({}), json!({"name": 1}), json!(null), json!([1, 2])] {
            let (violations, remaining) =
                validator.validate(&root(), None, &instance, 10, &CancelHandle::never());
            assert!(violations.is_empty());
            assert_eq!(remaining, 10);
        }
    }
}
