use std::collections::HashMap;

use podcel_schema::{Rule, Structural};
use regex::Regex;
use serde_json::Value as Json;

use crate::ast::Expr;
use crate::checker;
use crate::error::{CompileError, EvalError, Result};
use crate::eval::Interpreter;
use crate::parser;
use crate::types::CelType;
use crate::value::Value;

/// Variables visible to a rule: `self`, `oldSelf` and the schema they
/// are read through.
#[derive(Debug, Clone, Copy)]
pub struct Activation<'a> {
    pub self_value: &'a Json,
    pub old_self: Option<&'a Json>,
    pub schema: &'a Structural,
}

impl<'a> Activation<'a> {
    pub fn new(schema: &'a Structural, self_value: &'a Json) -> Self {
        Self {
            self_value,
            old_self: None,
            schema,
        }
    }

    pub fn with_old_self(mut self, old_self: &'a Json) -> Self {
        self.old_self = Some(old_self);
        self
    }
}

/// A checked expression ready to run against instances of its schema.
#[derive(Debug, Clone)]
pub struct Program {
    expr: Expr,
    regexes: HashMap<String, Regex>,
}

impl Program {
    /// Evaluate under a cost `limit`; returns the result and the actual
    /// cost spent, which never exceeds `limit`.
    pub fn evaluate<'a>(
        &'a self,
        activation: Activation<'a>,
        limit: u64,
    ) -> (std::result::Result<Value<'a>, EvalError>, u64) {
        let mut interpreter = Interpreter::new(&self.regexes, activation, limit);
        let result = interpreter.eval(&self.expr);
        (result, interpreter.cost())
    }
}

/// A rule compiled against one structural node.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    pub program: Program,
    /// Static worst-case cost of one evaluation.
    pub estimated_cost: u64,
    /// References `oldSelf`; only evaluated when an old value exists.
    pub transitional: bool,
}

/// Compile `rules` with `self` bound to `schema`.
///
/// Rules are compiled in order and the first failure is returned. A rule
/// whose estimate equals `cost_limit` is accepted.
pub fn compile(
    schema: &Structural,
    rules: &[Rule],
    cost_limit: Option<u64>,
) -> Result<Vec<CompiledRule>> {
    compile_at(schema, rules, cost_limit, "root")
}

pub(crate) fn compile_at(
    schema: &Structural,
    rules: &[Rule],
    cost_limit: Option<u64>,
    path: &str,
) -> Result<Vec<CompiledRule>> {
    let mut compiled = Vec::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        let invalid = |diagnostic: String| CompileError::Invalid {
            index,
            path: path.to_string(),
            rule: rule.rule.clone(),
            diagnostic,
        };

        let expr = parser::parse(&rule.rule).map_err(|err| invalid(err.to_string()))?;
        let checked = checker::check(&expr, schema).map_err(invalid)?;
        if !matches!(checked.ty, CelType::Bool | CelType::Dyn) {
            return Err(invalid(format!(
                "rule must evaluate to bool, found '{}'",
                checked.ty
            )));
        }

        if let Some(limit) = cost_limit {
            if checked.cost > limit {
                return Err(CompileError::CostLimitExceeded {
                    index,
                    path: path.to_string(),
                    rule: rule.rule.clone(),
                    estimate: checked.cost,
                    limit,
                });
            }
        }

        tracing::trace!(
            index,
            path,
            estimated_cost = checked.cost,
            transitional = checked.transitional,
            "compiled rule"
        );
        compiled.push(CompiledRule {
            rule: rule.clone(),
            program: Program {
                expr,
                regexes: checked.regexes,
            },
            estimated_cost: checked.cost,
            transitional: checked.transitional,
        });
    }
    Ok(compiled)
}

/// Static worst-case cost of `expression` with `self` bound to `schema`.
pub fn estimate_cost(schema: &Structural, expression: &str) -> Result<u64> {
    let rules = [Rule::new(expression, "")];
    let compiled = compile(schema, &rules, None)?;
    Ok(compiled.first().map_or(0, |rule| rule.estimated_cost))
}
