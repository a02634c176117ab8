//! Type checking and static cost estimation in one pass over the AST.

use std::collections::HashMap;

use podcel_schema::Structural;
use regex::Regex;

use crate::ast::{BinaryOp, ComprehensionKind, Expr, Literal, UnaryOp};
use crate::cost::{self, MAX_REQUEST_SIZE_BYTES, MAX_SCALAR_STRING_BYTES, NODE_COST};
use crate::types::CelType;

/// Result of checking one rule expression.
#[derive(Debug)]
pub(crate) struct CheckOutput {
    pub ty: CelType,
    pub cost: u64,
    pub transitional: bool,
    pub regexes: HashMap<String, Regex>,
}

/// Type `expr` with `self` (and `oldSelf`) bound to `schema`.
pub(crate) fn check(expr: &Expr, schema: &Structural) -> Result<CheckOutput, String> {
    let mut checker = Checker {
        root: schema,
        scopes: Vec::new(),
        transitional: false,
        regexes: HashMap::new(),
    };
    let checked = checker.check(expr)?;
    Ok(CheckOutput {
        ty: checked.ty,
        cost: checked.cost,
        transitional: checker.transitional,
        regexes: checker.regexes,
    })
}

/// Type, schema, maximum size and worst-case cost of a subexpression.
#[derive(Debug, Clone)]
struct Checked<'s> {
    ty: CelType,
    schema: Option<&'s Structural>,
    size: u64,
    cost: u64,
}

impl<'s> Checked<'s> {
    fn scalar(ty: CelType, cost: u64) -> Self {
        Self {
            ty,
            schema: None,
            size: 1,
            cost,
        }
    }

    fn of_schema(schema: &'s Structural, cost: u64) -> Self {
        let ty = CelType::from_schema(schema);
        Self {
            ty,
            schema: Some(schema),
            size: cost::max_size(schema),
            cost,
        }
    }

    fn unknown(ty: CelType, cost: u64) -> Self {
        Self {
            ty,
            schema: None,
            size: MAX_REQUEST_SIZE_BYTES,
            cost,
        }
    }
}

struct Checker<'s> {
    root: &'s Structural,
    scopes: Vec<(String, Checked<'s>)>,
    transitional: bool,
    regexes: HashMap<String, Regex>,
}

fn no_overload(function: &str, args: &[&Checked<'_>]) -> String {
    let types: Vec<String> = args.iter().map(|arg| arg.ty.to_string()).collect();
    format!(
        "found no matching overload for '{function}' applied to '({})'",
        types.join(", ")
    )
}

fn sum(costs: impl IntoIterator<Item = u64>) -> u64 {
    costs
        .into_iter()
        .fold(NODE_COST, |total, cost| total.saturating_add(cost))
}

impl<'s> Checker<'s> {
    fn check(&mut self, expr: &Expr) -> Result<Checked<'s>, String> {
        match expr {
            Expr::Literal(literal) => Ok(check_literal(literal)),
            Expr::Ident(name) => self.check_ident(name),
            Expr::Select { operand, field } => {
                let operand = self.check(operand)?;
                self.check_select(operand, field, false)
            }
            Expr::Has { operand, field } => {
                let operand = self.check(operand)?;
                self.check_select(operand, field, true)
            }
            Expr::Index { operand, index } => {
                let operand = self.check(operand)?;
                let index = self.check(index)?;
                check_index(operand, index)
            }
            Expr::Unary { op, operand } => {
                let operand = self.check(operand)?;
                check_unary(*op, operand)
            }
            Expr::Binary { op, left, right } => {
                let left = self.check(left)?;
                let right = self.check(right)?;
                check_binary(*op, left, right)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.check(condition)?;
                let then = self.check(then)?;
                let otherwise = self.check(otherwise)?;
                check_conditional(condition, then, otherwise)
            }
            Expr::List(items) => {
                let mut element = None::<CelType>;
                let mut costs = Vec::with_capacity(items.len());
                for item in items {
                    let item = self.check(item)?;
                    element = Some(match element {
                        Some(ty) => ty.join(&item.ty),
                        None => item.ty,
                    });
                    costs.push(item.cost);
                }
                Ok(Checked {
                    ty: CelType::list(element.unwrap_or(CelType::Dyn)),
                    schema: None,
                    size: items.len() as u64,
                    cost: sum(costs),
                })
            }
            Expr::Map(entries) => {
                let mut key_type = None::<CelType>;
                let mut value_type = None::<CelType>;
                let mut costs = Vec::with_capacity(entries.len() * 2);
                for (key, value) in entries {
                    let key = self.check(key)?;
                    if !matches!(
                        key.ty,
                        CelType::Int | CelType::Uint | CelType::Bool | CelType::String | CelType::Dyn
                    ) {
                        return Err(format!("unsupported map key type '{}'", key.ty));
                    }
                    let value = self.check(value)?;
                    key_type = Some(key_type.map_or(key.ty.clone(), |ty| ty.join(&key.ty)));
                    value_type = Some(value_type.map_or(value.ty.clone(), |ty| ty.join(&value.ty)));
                    costs.push(key.cost);
                    costs.push(value.cost);
                }
                Ok(Checked {
                    ty: CelType::map(
                        key_type.unwrap_or(CelType::Dyn),
                        value_type.unwrap_or(CelType::Dyn),
                    ),
                    schema: None,
                    size: entries.len() as u64,
                    cost: sum(costs),
                })
            }
            Expr::Call {
                function,
                target,
                args,
            } => {
                let target = match target {
                    Some(target) => Some(self.check(target)?),
                    None => None,
                };
                let mut checked_args = Vec::with_capacity(args.len());
                for arg in args {
                    checked_args.push(self.check(arg)?);
                }
                self.check_call(function, target, checked_args, args)
            }
            Expr::Comprehension {
                kind,
                range,
                var,
                filter,
                body,
            } => self.check_comprehension(*kind, range, var, filter.as_deref(), body),
        }
    }

    fn check_ident(&mut self, name: &str) -> Result<Checked<'s>, String> {
        if let Some((_, bound)) = self.scopes.iter().rev().find(|(var, _)| var == name) {
            return Ok(Checked {
                cost: NODE_COST,
                ..bound.clone()
            });
        }
        match name {
            "self" => Ok(Checked::of_schema(self.root, NODE_COST)),
            "oldSelf" => {
                self.transitional = true;
                Ok(Checked::of_schema(self.root, NODE_COST))
            }
            _ => match CelType::from_type_name(name) {
                Some(_) => Ok(Checked::scalar(CelType::Type, NODE_COST)),
                None => Err(format!("undeclared reference to '{name}'")),
            },
        }
    }

    fn check_select(
        &mut self,
        operand: Checked<'s>,
        field: &str,
        presence: bool,
    ) -> Result<Checked<'s>, String> {
        let cost = operand.cost.saturating_add(NODE_COST);
        let selected = match (&operand.ty, operand.schema) {
            (CelType::Object, Some(schema)) => match schema.property(field) {
                Some(child) => Checked::of_schema(child, cost),
                None => return Err(format!("undefined field '{field}'")),
            },
            (CelType::Map(key, value), schema) => {
                if !key.accepts(&CelType::String) {
                    return Err(format!("type '{}' does not support field selection", operand.ty));
                }
                match schema.and_then(|schema| schema.additional.as_deref()) {
                    Some(values) => Checked::of_schema(values, cost),
                    None => Checked::unknown((**value).clone(), cost),
                }
            }
            (CelType::Object | CelType::Dyn, _) => Checked::unknown(CelType::Dyn, cost),
            _ => {
                return Err(format!(
                    "type '{}' does not support field selection",
                    operand.ty
                ))
            }
        };

        if presence {
            Ok(Checked::scalar(CelType::Bool, cost))
        } else {
            Ok(selected)
        }
    }

    fn check_call(
        &mut self,
        function: &str,
        target: Option<Checked<'s>>,
        args: Vec<Checked<'s>>,
        arg_exprs: &[Expr],
    ) -> Result<Checked<'s>, String> {
        let costs = target
            .iter()
            .chain(args.iter())
            .map(|checked| checked.cost)
            .collect::<Vec<_>>();
        let base = sum(costs);

        match (function, target.as_ref(), args.as_slice()) {
            ("size", Some(subject), []) | ("size", None, [subject]) => {
                match subject.ty {
                    CelType::String
                    | CelType::Bytes
                    | CelType::List(_)
                    | CelType::Map(..)
                    | CelType::Dyn => Ok(Checked::scalar(CelType::Int, base)),
                    _ => Err(no_overload("size", &[subject])),
                }
            }
            ("contains" | "startsWith" | "endsWith", Some(text), [needle]) => {
                if is_stringish(&text.ty) && is_stringish(&needle.ty) {
                    let cost = base.saturating_add(cost::traversal_cost(text.size));
                    Ok(Checked::scalar(CelType::Bool, cost))
                } else {
                    Err(no_overload(function, &[text, needle]))
                }
            }
            ("matches", Some(text), [pattern]) | ("matches", None, [text, pattern]) => {
                if !is_stringish(&text.ty) || !is_stringish(&pattern.ty) {
                    return Err(no_overload("matches", &[text, pattern]));
                }
                if let Some(Expr::Literal(Literal::String(source))) = arg_exprs.last() {
                    if !self.regexes.contains_key(source) {
                        let regex = Regex::new(source)
                            .map_err(|err| format!("invalid regular expression: {err}"))?;
                        self.regexes.insert(source.clone(), regex);
                    }
                }
                let cost = base.saturating_add(cost::matches_cost(text.size, pattern.size));
                Ok(Checked::scalar(CelType::Bool, cost))
            }
            ("lowerAscii" | "upperAscii", Some(text), []) => {
                if !is_stringish(&text.ty) {
                    return Err(no_overload(function, &[text]));
                }
                Ok(Checked {
                    ty: CelType::String,
                    schema: None,
                    size: text.size,
                    cost: base.saturating_add(cost::traversal_cost(text.size)),
                })
            }
            (_, None, [arg]) if is_conversion(function) => check_conversion(function, arg, base),
            _ => {
                if is_known_function(function) {
                    let mut all: Vec<&Checked<'_>> = target.iter().collect();
                    all.extend(args.iter());
                    Err(no_overload(function, &all))
                } else {
                    Err(format!("undeclared reference to '{function}'"))
                }
            }
        }
    }

    fn check_comprehension(
        &mut self,
        kind: ComprehensionKind,
        range: &Expr,
        var: &str,
        filter: Option<&Expr>,
        body: &Expr,
    ) -> Result<Checked<'s>, String> {
        let range = self.check(range)?;
        let element = match (&range.ty, range.schema) {
            (CelType::List(_), Some(schema)) => match schema.items.as_deref() {
                Some(items) => Checked::of_schema(items, 0),
                None => Checked::unknown(CelType::Dyn, 0),
            },
            (CelType::List(element), None) => Checked::unknown(object_as_dyn(element), 0),
            (CelType::Map(key, _), _) => Checked::unknown((**key).clone(), 0),
            (CelType::Dyn, _) => Checked::unknown(CelType::Dyn, 0),
            _ => {
                return Err(format!(
                    "{}() cannot range over type '{}'",
                    kind.name(),
                    range.ty
                ))
            }
        };
        let element_type = element.ty.clone();

        self.scopes.push((var.to_string(), element));
        let checked = (|| {
            let filter = match filter {
                Some(filter) => Some(self.check(filter)?),
                None => None,
            };
            let body = self.check(body)?;
            Ok::<_, String>((filter, body))
        })();
        self.scopes.pop();
        let (filter, body) = checked?;

        if let Some(filter) = &filter {
            if !matches!(filter.ty, CelType::Bool | CelType::Dyn) {
                return Err(format!("{}() predicate must be bool, found '{}'", kind.name(), filter.ty));
            }
        }

        let per_iteration = body
            .cost
            .saturating_add(filter.as_ref().map_or(0, |filter| filter.cost))
            .saturating_add(NODE_COST);
        let cost = sum([range.cost, range.size.saturating_mul(per_iteration)]);

        let ty = match kind {
            ComprehensionKind::All | ComprehensionKind::Exists | ComprehensionKind::ExistsOne => {
                if !matches!(body.ty, CelType::Bool | CelType::Dyn) {
                    return Err(format!("{}() predicate must be bool, found '{}'", kind.name(), body.ty));
                }
                return Ok(Checked::scalar(CelType::Bool, cost));
            }
            ComprehensionKind::Map => CelType::list(object_as_dyn(&body.ty)),
            ComprehensionKind::Filter => {
                if !matches!(body.ty, CelType::Bool | CelType::Dyn) {
                    return Err(format!("filter() predicate must be bool, found '{}'", body.ty));
                }
                match range.ty {
                    CelType::Map(..) => CelType::list(element_type),
                    _ => range.ty.clone(),
                }
            }
        };

        let schema = match (kind, &range.ty) {
            (ComprehensionKind::Filter, CelType::List(_)) => range.schema,
            _ => None,
        };
        Ok(Checked {
            ty,
            schema,
            size: range.size,
            cost,
        })
    }
}

fn object_as_dyn(ty: &CelType) -> CelType {
    match ty {
        CelType::Object => CelType::Dyn,
        other => other.clone(),
    }
}

fn is_stringish(ty: &CelType) -> bool {
    matches!(ty, CelType::String | CelType::Dyn)
}

fn is_conversion(function: &str) -> bool {
    matches!(
        function,
        "int" | "uint" | "double" | "string" | "bytes" | "bool" | "dyn" | "type"
    )
}

fn is_known_function(function: &str) -> bool {
    is_conversion(function)
        || matches!(
            function,
            "size" | "contains" | "startsWith" | "endsWith" | "matches" | "lowerAscii" | "upperAscii"
        )
}

fn check_literal<'s>(literal: &Literal) -> Checked<'s> {
    match literal {
        Literal::Null => Checked::scalar(CelType::Null, NODE_COST),
        Literal::Bool(_) => Checked::scalar(CelType::Bool, NODE_COST),
        Literal::Int(_) => Checked::scalar(CelType::Int, NODE_COST),
        Literal::Uint(_) => Checked::scalar(CelType::Uint, NODE_COST),
        Literal::Double(_) => Checked::scalar(CelType::Double, NODE_COST),
        Literal::String(text) => Checked {
            size: text.len() as u64,
            ..Checked::scalar(CelType::String, NODE_COST)
        },
        Literal::Bytes(bytes) => Checked {
            size: bytes.len() as u64,
            ..Checked::scalar(CelType::Bytes, NODE_COST)
        },
    }
}

fn check_index<'s>(operand: Checked<'s>, index: Checked<'s>) -> Result<Checked<'s>, String> {
    let cost = sum([operand.cost, index.cost]);
    match (&operand.ty, operand.schema) {
        (CelType::List(element), schema) => {
            if !matches!(index.ty, CelType::Int | CelType::Uint | CelType::Dyn) {
                return Err(no_overload("_[_]", &[&operand, &index]));
            }
            Ok(match schema.and_then(|schema| schema.items.as_deref()) {
                Some(items) => Checked::of_schema(items, cost),
                None => Checked::unknown(object_as_dyn(element), cost),
            })
        }
        (CelType::Map(key, value), schema) => {
            if !key.accepts(&index.ty) {
                return Err(no_overload("_[_]", &[&operand, &index]));
            }
            Ok(match schema.and_then(|schema| schema.additional.as_deref()) {
                Some(values) => Checked::of_schema(values, cost),
                None => Checked::unknown(object_as_dyn(value), cost),
            })
        }
        (CelType::Dyn, _) => Ok(Checked::unknown(CelType::Dyn, cost)),
        _ => Err(no_overload("_[_]", &[&operand, &index])),
    }
}

fn check_unary<'s>(op: UnaryOp, operand: Checked<'s>) -> Result<Checked<'s>, String> {
    let cost = sum([operand.cost]);
    match (op, &operand.ty) {
        (UnaryOp::Not, CelType::Bool | CelType::Dyn) => Ok(Checked::scalar(CelType::Bool, cost)),
        (UnaryOp::Negate, CelType::Int | CelType::Double | CelType::Dyn) => {
            Ok(Checked::scalar(operand.ty.clone(), cost))
        }
        (UnaryOp::Not, _) => Err(no_overload("!_", &[&operand])),
        (UnaryOp::Negate, _) => Err(no_overload("-_", &[&operand])),
    }
}

fn check_binary<'s>(op: BinaryOp, left: Checked<'s>, right: Checked<'s>) -> Result<Checked<'s>, String> {
    let base = sum([left.cost, right.cost]);
    let name = op.function_name();
    let fail = || -> Result<Checked<'s>, String> { Err(no_overload(name, &[&left, &right])) };

    match op {
        BinaryOp::And | BinaryOp::Or => {
            let logical = |ty: &CelType| matches!(ty, CelType::Bool | CelType::Dyn);
            if logical(&left.ty) && logical(&right.ty) {
                Ok(Checked::scalar(CelType::Bool, base))
            } else {
                fail()
            }
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let cost = base.saturating_add(equality_cost(&left, &right));
            Ok(Checked::scalar(CelType::Bool, cost))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordered = match (&left.ty, &right.ty) {
                (CelType::Dyn, _) | (_, CelType::Dyn) => true,
                (l, r) if l.is_numeric() && r.is_numeric() => true,
                (CelType::String, CelType::String)
                | (CelType::Bytes, CelType::Bytes)
                | (CelType::Bool, CelType::Bool) => true,
                _ => false,
            };
            if ordered {
                Ok(Checked::scalar(CelType::Bool, base))
            } else {
                fail()
            }
        }
        BinaryOp::In => match &right.ty {
            CelType::List(element) if element.accepts(&left.ty) => {
                Ok(Checked::scalar(CelType::Bool, base.saturating_add(right.size)))
            }
            CelType::Map(key, _) if key.accepts(&left.ty) => Ok(Checked::scalar(CelType::Bool, base)),
            CelType::Dyn => Ok(Checked::scalar(CelType::Bool, base.saturating_add(right.size))),
            _ => fail(),
        },
        BinaryOp::Add => {
            let size = left.size.saturating_add(right.size);
            let concat = base.saturating_add(cost::concat_cost(left.size, right.size));
            match (&left.ty, &right.ty) {
                (CelType::Int, CelType::Int)
                | (CelType::Uint, CelType::Uint)
                | (CelType::Double, CelType::Double) => Ok(Checked::scalar(left.ty.clone(), base)),
                (CelType::String, CelType::String) | (CelType::Bytes, CelType::Bytes) => {
                    Ok(Checked {
                        ty: left.ty.clone(),
                        schema: None,
                        size,
                        cost: concat,
                    })
                }
                (CelType::List(a), CelType::List(b)) => Ok(Checked {
                    ty: CelType::list(object_as_dyn(&a.join(b))),
                    schema: None,
                    size,
                    cost: concat,
                }),
                (CelType::Dyn, _) | (_, CelType::Dyn) => Ok(Checked {
                    ty: CelType::Dyn,
                    schema: None,
                    size,
                    cost: concat,
                }),
                _ => fail(),
            }
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => match (&left.ty, &right.ty) {
            (l, r) if l == r && l.is_numeric() => Ok(Checked::scalar(l.clone(), base)),
            (CelType::Dyn, r) if r.is_numeric() || r.is_dyn() => Ok(Checked::scalar(CelType::Dyn, base)),
            (l, CelType::Dyn) if l.is_numeric() => Ok(Checked::scalar(CelType::Dyn, base)),
            _ => fail(),
        },
        BinaryOp::Rem => match (&left.ty, &right.ty) {
            (CelType::Int, CelType::Int) | (CelType::Uint, CelType::Uint) => {
                Ok(Checked::scalar(left.ty.clone(), base))
            }
            (CelType::Dyn, CelType::Int | CelType::Uint | CelType::Dyn)
            | (CelType::Int | CelType::Uint, CelType::Dyn) => Ok(Checked::scalar(CelType::Dyn, base)),
            _ => fail(),
        },
    }
}

/// Upper bound of the runtime equality extra for any values of these types.
fn equality_cost(left: &Checked<'_>, right: &Checked<'_>) -> u64 {
    use CelType::*;
    match (&left.ty, &right.ty) {
        (String, String) | (Bytes, Bytes) | (Dyn, String | Bytes) | (String | Bytes, Dyn) => {
            cost::string_equality_cost(left.size, right.size)
        }
        (List(_), List(_))
        | (Map(..), Map(..))
        | (Object, Object)
        | (Dyn, List(_) | Map(..) | Object | Dyn)
        | (List(_) | Map(..) | Object, Dyn) => {
            cost::collection_equality_cost(left.size, right.size)
        }
        _ => 0,
    }
}

fn check_conditional<'s>(
    condition: Checked<'s>,
    then: Checked<'s>,
    otherwise: Checked<'s>,
) -> Result<Checked<'s>, String> {
    if !matches!(condition.ty, CelType::Bool | CelType::Dyn) {
        return Err(no_overload("_?_:_", &[&condition, &then, &otherwise]));
    }
    let same_schema = match (then.schema, otherwise.schema) {
        (Some(a), Some(b)) => std::ptr::eq(a, b),
        _ => false,
    };
    let ty = then.ty.join(&otherwise.ty);
    let (ty, schema) = match (ty, same_schema) {
        (ty, true) => (ty, then.schema),
        (ty, false) => (object_as_dyn(&ty), None),
    };
    Ok(Checked {
        ty,
        schema,
        size: then.size.max(otherwise.size),
        cost: sum([condition.cost, then.cost.max(otherwise.cost)]),
    })
}

fn check_conversion<'s>(function: &str, arg: &Checked<'s>, cost: u64) -> Result<Checked<'s>, String> {
    use CelType::*;
    let converted = match (function, &arg.ty) {
        ("int", Int | Uint | Double | String | Dyn) => Checked::scalar(Int, cost),
        ("uint", Int | Uint | Double | String | Dyn) => Checked::scalar(Uint, cost),
        ("double", Int | Uint | Double | String | Dyn) => Checked::scalar(Double, cost),
        ("bool", Bool | String | Dyn) => Checked::scalar(Bool, cost),
        ("string", String | Bytes) => Checked {
            size: arg.size,
            ..Checked::scalar(String, cost)
        },
        // A dyn argument may hold a number whose text outgrows its size.
        ("string", Dyn) => Checked {
            size: arg.size.max(MAX_SCALAR_STRING_BYTES),
            ..Checked::scalar(String, cost)
        },
        ("string", Int | Uint | Double | Bool) => Checked {
            size: MAX_SCALAR_STRING_BYTES,
            ..Checked::scalar(String, cost)
        },
        ("bytes", String | Bytes | Dyn) => Checked {
            size: arg.size,
            ..Checked::scalar(Bytes, cost)
        },
        ("dyn", _) => Checked {
            ty: Dyn,
            schema: None,
            size: arg.size,
            cost,
        },
        ("type", _) => Checked::scalar(Type, cost),
        _ => return Err(no_overload(function, &[arg])),
    };
    Ok(converted)
}
