//! Tree-walking interpreter with an actual-cost meter.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use regex::Regex;

use crate::ast::{BinaryOp, ComprehensionKind, Expr, Literal, UnaryOp};
use crate::cost::{self, NODE_COST};
use crate::error::EvalError;
use crate::program::Activation;
use crate::types::CelType;
use crate::value::{List, Map, Value};

pub(crate) struct Interpreter<'a> {
    pub(crate) regexes: &'a HashMap<String, Regex>,
    activation: Activation<'a>,
    scopes: Vec<(&'a str, Value<'a>)>,
    cost: u64,
    limit: u64,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        regexes: &'a HashMap<String, Regex>,
        activation: Activation<'a>,
        limit: u64,
    ) -> Self {
        Self {
            regexes,
            activation,
            scopes: Vec::new(),
            cost: 0,
            limit,
        }
    }

    /// Actual cost accumulated so far.
    pub(crate) fn cost(&self) -> u64 {
        self.cost.min(self.limit)
    }

    pub(crate) fn charge(&mut self, amount: u64) -> Result<(), EvalError> {
        self.cost = self.cost.saturating_add(amount);
        if self.cost > self.limit {
            Err(EvalError::BudgetExhausted)
        } else {
            Ok(())
        }
    }

    pub(crate) fn eval(&mut self, expr: &'a Expr) -> Result<Value<'a>, EvalError> {
        self.charge(NODE_COST)?;
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::Ident(name) => self.lookup(name),
            Expr::Select { operand, field } => {
                let operand = self.eval(operand)?;
                select(operand, field)
            }
            Expr::Has { operand, field } => {
                let operand = self.eval(operand)?;
                has(&operand, field).map(Value::Bool)
            }
            Expr::Index { operand, index } => {
                let operand = self.eval(operand)?;
                let index = self.eval(index)?;
                index_value(operand, &index)
            }
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                unary(*op, operand)
            }
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => self.logical(left, right, false),
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => self.logical(left, right, true),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => match self.eval(condition)? {
                Value::Bool(true) => self.eval(then),
                Value::Bool(false) => self.eval(otherwise),
                other => Err(EvalError::no_overload("_?_:_", &[&other.type_name()])),
            },
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::list(values))
            }
            Expr::Map(entries) => {
                let mut values: Vec<(Value<'a>, Value<'a>)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    for (existing, _) in &values {
                        if existing.equals(&key)? {
                            return Err(EvalError::Conversion(format!(
                                "duplicate map key {key}"
                            )));
                        }
                    }
                    values.push((key, value));
                }
                Ok(Value::Map(Map::Owned(Rc::new(values))))
            }
            Expr::Call {
                function,
                target,
                args,
            } => {
                let target = match target {
                    Some(target) => Some(self.eval(target)?),
                    None => None,
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.call(function, target, values)
            }
            Expr::Comprehension {
                kind,
                range,
                var,
                filter,
                body,
            } => {
                let range = self.eval(range)?;
                let elements = match &range {
                    Value::List(list) => {
                        let mut elements = Vec::with_capacity(list.len());
                        for index in 0..list.len() {
                            elements.push(list.get(index)?);
                        }
                        elements
                    }
                    Value::Map(map) => map.keys(),
                    other => {
                        return Err(EvalError::no_overload(kind.name(), &[&other.type_name()]))
                    }
                };

                self.scopes.push((var.as_str(), Value::Null));
                let result = self.comprehension(*kind, elements, filter.as_deref(), body);
                self.scopes.pop();
                result
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value<'a>, EvalError> {
        if let Some((_, value)) = self.scopes.iter().rev().find(|(var, _)| *var == name) {
            return Ok(value.clone());
        }
        match name {
            "self" => Value::from_json(self.activation.self_value, Some(self.activation.schema)),
            "oldSelf" => match self.activation.old_self {
                Some(old) => Value::from_json(old, Some(self.activation.schema)),
                None => Err(EvalError::UndeclaredReference(name.to_string())),
            },
            _ => CelType::from_type_name(name)
                .map(Value::Type)
                .ok_or_else(|| EvalError::UndeclaredReference(name.to_string())),
        }
    }

    /// `&&` and `||`: a decisive operand wins over an error in the other.
    fn logical(
        &mut self,
        left: &'a Expr,
        right: &'a Expr,
        decisive: bool,
    ) -> Result<Value<'a>, EvalError> {
        let name = if decisive { "_||_" } else { "_&&_" };
        let left = match self.eval(left) {
            Ok(Value::Bool(flag)) if flag == decisive => return Ok(Value::Bool(decisive)),
            Ok(Value::Bool(_)) => Ok(()),
            Ok(other) => Err(EvalError::no_overload(name, &[&other.type_name()])),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => Err(err),
        };
        match self.eval(right) {
            Ok(Value::Bool(flag)) if flag == decisive => Ok(Value::Bool(decisive)),
            Ok(Value::Bool(_)) => left.map(|()| Value::Bool(!decisive)),
            Ok(other) => {
                left?;
                Err(EvalError::no_overload(name, &[&other.type_name()]))
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                left?;
                Err(err)
            }
        }
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        left: Value<'a>,
        right: Value<'a>,
    ) -> Result<Value<'a>, EvalError> {
        let name = op.function_name();
        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                self.charge(equality_cost(&left, &right))?;
                let equal = left.equals(&right)?;
                Ok(Value::Bool(equal == (op == BinaryOp::Eq)))
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = left.compare(&right, name)?;
                let result = match (op, ordering) {
                    (_, None) => false,
                    (BinaryOp::Lt, Some(ordering)) => ordering == Ordering::Less,
                    (BinaryOp::Le, Some(ordering)) => ordering != Ordering::Greater,
                    (BinaryOp::Gt, Some(ordering)) => ordering == Ordering::Greater,
                    (_, Some(ordering)) => ordering != Ordering::Less,
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::In => match &right {
                Value::List(list) => {
                    self.charge(list.len() as u64)?;
                    list.contains(&left).map(Value::Bool)
                }
                Value::Map(map) => map.contains_key(&left).map(Value::Bool),
                _ => Err(overload(name, &left, &right)),
            },
            BinaryOp::Add => self.add(left, right),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                arithmetic(op, left, right)
            }
            BinaryOp::And | BinaryOp::Or => Err(overload(name, &left, &right)),
        }
    }

    fn add(&mut self, left: Value<'a>, right: Value<'a>) -> Result<Value<'a>, EvalError> {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.checked_add(b).map(Value::Int).ok_or(EvalError::Overflow),
            (Value::Uint(a), Value::Uint(b)) => {
                a.checked_add(b).map(Value::Uint).ok_or(EvalError::Overflow)
            }
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
            (Value::String(a), Value::String(b)) => {
                self.charge(cost::concat_cost(a.len() as u64, b.len() as u64))?;
                let mut joined = a.into_owned();
                joined.push_str(&b);
                Ok(Value::String(Cow::Owned(joined)))
            }
            (Value::Bytes(a), Value::Bytes(b)) => {
                self.charge(cost::concat_cost(a.len() as u64, b.len() as u64))?;
                let mut joined = a.into_owned();
                joined.extend_from_slice(&b);
                Ok(Value::Bytes(Cow::Owned(joined)))
            }
            (Value::List(a), Value::List(b)) => {
                self.charge(cost::concat_cost(a.len() as u64, b.len() as u64))?;
                let mut joined = Vec::with_capacity(a.len() + b.len());
                for list in [&a, &b] {
                    for index in 0..list.len() {
                        joined.push(list.get(index)?);
                    }
                }
                Ok(Value::List(List::Owned(Rc::new(joined))))
            }
            (left, right) => Err(overload("_+_", &left, &right)),
        }
    }

    fn comprehension(
        &mut self,
        kind: ComprehensionKind,
        elements: Vec<Value<'a>>,
        filter: Option<&'a Expr>,
        body: &'a Expr,
    ) -> Result<Value<'a>, EvalError> {
        let mut absorbed: Option<EvalError> = None;
        let mut matched = 0usize;
        let mut results = Vec::new();

        for element in elements {
            self.charge(NODE_COST)?;
            if let Some(slot) = self.scopes.last_mut() {
                slot.1 = element.clone();
            }

            match kind {
                ComprehensionKind::All | ComprehensionKind::Exists => {
                    let decisive = kind == ComprehensionKind::Exists;
                    match self.eval(body) {
                        Ok(Value::Bool(flag)) if flag == decisive => {
                            return Ok(Value::Bool(decisive));
                        }
                        Ok(Value::Bool(_)) => {}
                        Ok(other) => {
                            if absorbed.is_none() {
                                absorbed = Some(EvalError::no_overload(
                                    kind.name(),
                                    &[&other.type_name()],
                                ));
                            }
                        }
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            if absorbed.is_none() {
                                absorbed = Some(err);
                            }
                        }
                    }
                }
                ComprehensionKind::ExistsOne => {
                    if predicate(kind, self.eval(body)?)? {
                        matched += 1;
                    }
                }
                ComprehensionKind::Map => {
                    let keep = match filter {
                        Some(filter) => predicate(kind, self.eval(filter)?)?,
                        None => true,
                    };
                    if keep {
                        results.push(self.eval(body)?);
                    }
                }
                ComprehensionKind::Filter => {
                    if predicate(kind, self.eval(body)?)? {
                        results.push(element);
                    }
                }
            }
        }

        match kind {
            ComprehensionKind::All | ComprehensionKind::Exists => match absorbed {
                Some(err) => Err(err),
                None => Ok(Value::Bool(kind == ComprehensionKind::All)),
            },
            ComprehensionKind::ExistsOne => Ok(Value::Bool(matched == 1)),
            ComprehensionKind::Map | ComprehensionKind::Filter => Ok(Value::list(results)),
        }
    }
}

fn predicate(kind: ComprehensionKind, value: Value<'_>) -> Result<bool, EvalError> {
    value
        .as_bool()
        .ok_or_else(|| EvalError::no_overload(kind.name(), &[&value.type_name()]))
}

fn overload(function: &str, left: &Value<'_>, right: &Value<'_>) -> EvalError {
    EvalError::no_overload(function, &[&left.type_name(), &right.type_name()])
}

fn literal_value(literal: &Literal) -> Value<'_> {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(flag) => Value::Bool(*flag),
        Literal::Int(int) => Value::Int(*int),
        Literal::Uint(uint) => Value::Uint(*uint),
        Literal::Double(float) => Value::Double(*float),
        Literal::String(text) => Value::String(Cow::Borrowed(text.as_str())),
        Literal::Bytes(bytes) => Value::Bytes(Cow::Borrowed(bytes.as_slice())),
    }
}

fn select<'a>(operand: Value<'a>, field: &'a str) -> Result<Value<'a>, EvalError> {
    match operand {
        Value::Object(object) => object
            .field(field)?
            .ok_or_else(|| EvalError::NoSuchKey(field.to_string())),
        Value::Map(map) => map
            .get(&Value::String(Cow::Borrowed(field)))?
            .ok_or_else(|| EvalError::NoSuchKey(field.to_string())),
        other => Err(EvalError::no_overload("_._", &[&other.type_name()])),
    }
}

fn has(operand: &Value<'_>, field: &str) -> Result<bool, EvalError> {
    match operand {
        Value::Object(object) => {
            if object.schema().property(field).is_none() {
                return Err(EvalError::NoSuchKey(field.to_string()));
            }
            Ok(object.has(field))
        }
        Value::Map(map) => map.contains_key(&Value::String(Cow::Borrowed(field))),
        other => Err(EvalError::no_overload("has", &[&other.type_name()])),
    }
}

fn index_value<'a>(operand: Value<'a>, index: &Value<'a>) -> Result<Value<'a>, EvalError> {
    match (&operand, index) {
        (Value::List(list), index) => {
            let position: i128 = match index {
                Value::Int(int) => i128::from(*int),
                Value::Uint(uint) => i128::from(*uint),
                Value::Double(float) if float.fract() == 0.0 => *float as i128,
                other => return Err(overload("_[_]", &operand, other)),
            };
            match usize::try_from(position) {
                Ok(position) if position < list.len() => list.get(position),
                _ => Err(EvalError::IndexOutOfBounds(position)),
            }
        }
        (Value::Map(map), key) => map
            .get(key)?
            .ok_or_else(|| EvalError::NoSuchKey(key.to_string())),
        (_, other) => Err(overload("_[_]", &operand, other)),
    }
}

fn unary(op: UnaryOp, operand: Value<'_>) -> Result<Value<'_>, EvalError> {
    match (op, operand) {
        (UnaryOp::Not, Value::Bool(flag)) => Ok(Value::Bool(!flag)),
        (UnaryOp::Negate, Value::Int(int)) => int.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
        (UnaryOp::Negate, Value::Double(float)) => Ok(Value::Double(-float)),
        (UnaryOp::Not, other) => Err(EvalError::no_overload("!_", &[&other.type_name()])),
        (UnaryOp::Negate, other) => Err(EvalError::no_overload("-_", &[&other.type_name()])),
    }
}

fn arithmetic<'a>(op: BinaryOp, left: Value<'a>, right: Value<'a>) -> Result<Value<'a>, EvalError> {
    match (op, &left, &right) {
        (BinaryOp::Div, Value::Int(_), Value::Int(0))
        | (BinaryOp::Div, Value::Uint(_), Value::Uint(0)) => Err(EvalError::DivisionByZero),
        (BinaryOp::Rem, Value::Int(_), Value::Int(0))
        | (BinaryOp::Rem, Value::Uint(_), Value::Uint(0)) => Err(EvalError::ModulusByZero),
        (_, Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div => a.checked_div(*b),
                _ => a.checked_rem(*b),
            };
            result.map(Value::Int).ok_or(EvalError::Overflow)
        }
        (_, Value::Uint(a), Value::Uint(b)) => {
            let result = match op {
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                BinaryOp::Div => a.checked_div(*b),
                _ => a.checked_rem(*b),
            };
            result.map(Value::Uint).ok_or(EvalError::Overflow)
        }
        (BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div, Value::Double(a), Value::Double(b)) => {
            Ok(Value::Double(match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ => a / b,
            }))
        }
        _ => Err(overload(op.function_name(), &left, &right)),
    }
}

/// Runtime equality extra; never above the static bound for these kinds.
fn equality_cost(left: &Value<'_>, right: &Value<'_>) -> u64 {
    match (left, right) {
        (Value::String(_), Value::String(_)) | (Value::Bytes(_), Value::Bytes(_)) => {
            cost::string_equality_cost(left.cost_size(), right.cost_size())
        }
        (Value::List(_), Value::List(_))
        | (Value::Map(_), Value::Map(_))
        | (Value::Object(_), Value::Object(_)) => {
            cost::collection_equality_cost(left.cost_size(), right.cost_size())
        }
        _ => 0,
    }
}
