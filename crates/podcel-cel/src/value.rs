//! Runtime values.
//!
//! Values read from an instance borrow the JSON tree and carry the schema
//! node that describes them, so nothing is copied until an expression
//! builds a new string, list or map.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use podcel_schema::{Kind, Structural};
use serde_json::{Map as JsonMap, Value as Json};

use crate::error::EvalError;
use crate::types::CelType;

#[derive(Debug, Clone)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Cow<'a, str>),
    Bytes(Cow<'a, [u8]>),
    List(List<'a>),
    Map(Map<'a>),
    Object(Object<'a>),
    Type(CelType),
}

#[derive(Debug, Clone)]
pub enum List<'a> {
    /// A JSON array; `items` describes its elements.
    Json {
        items: &'a [Json],
        schema: Option<&'a Structural>,
    },
    Owned(Rc<Vec<Value<'a>>>),
}

#[derive(Debug, Clone)]
pub enum Map<'a> {
    /// A JSON object used as a map; `values` describes its values.
    Json {
        entries: &'a JsonMap<String, Json>,
        values: Option<&'a Structural>,
    },
    Owned(Rc<Vec<(Value<'a>, Value<'a>)>>),
}

/// A JSON object typed by a schema with declared properties.
#[derive(Debug, Clone)]
pub struct Object<'a> {
    fields: &'a JsonMap<String, Json>,
    schema: &'a Structural,
}

fn json_type(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn mismatch(expected: &str, json: &Json) -> EvalError {
    EvalError::SchemaMismatch(format!("expected {expected}, found {}", json_type(json)))
}

fn untyped_number(number: &serde_json::Number) -> Value<'static> {
    if let Some(int) = number.as_i64() {
        Value::Int(int)
    } else if let Some(uint) = number.as_u64() {
        Value::Uint(uint)
    } else {
        Value::Double(number.as_f64().unwrap_or(f64::NAN))
    }
}

fn integer(number: &serde_json::Number) -> Result<Value<'static>, EvalError> {
    if let Some(int) = number.as_i64() {
        return Ok(Value::Int(int));
    }
    match number.as_f64() {
        Some(float) if float.fract() == 0.0 && float >= i64::MIN as f64 && float < i64::MAX as f64 => {
            Ok(Value::Int(float as i64))
        }
        _ => Err(EvalError::SchemaMismatch(format!(
            "integer {number} out of range"
        ))),
    }
}

impl<'a> Value<'a> {
    /// Read `json` as a value of `schema`; `None` reads it untyped.
    pub fn from_json(json: &'a Json, schema: Option<&'a Structural>) -> Result<Self, EvalError> {
        let Some(schema) = schema else {
            return Ok(Self::untyped(json));
        };

        match (schema.kind, json) {
            (_, Json::Null) => Ok(Value::Null),
            (Kind::Any, _) => Ok(Self::untyped(json)),
            (Kind::Boolean, Json::Bool(flag)) => Ok(Value::Bool(*flag)),
            (Kind::Integer, Json::Number(number)) => integer(number),
            (Kind::Number, Json::Number(number)) => {
                Ok(Value::Double(number.as_f64().unwrap_or(f64::NAN)))
            }
            (Kind::String, Json::String(text)) => Ok(Value::String(Cow::Borrowed(text.as_str()))),
            (Kind::IntOrString, Json::String(text)) => Ok(Value::String(Cow::Borrowed(text.as_str()))),
            (Kind::IntOrString, Json::Number(number)) => integer(number),
            (Kind::Array, Json::Array(items)) => Ok(Value::List(List::Json {
                items,
                schema: schema.items.as_deref(),
            })),
            (Kind::Object, Json::Object(fields)) => {
                if let Some(values) = schema.additional.as_deref() {
                    Ok(Value::Map(Map::Json {
                        entries: fields,
                        values: Some(values),
                    }))
                } else if schema.properties.is_empty() && schema.extensions.preserve_unknown_fields {
                    Ok(Value::Map(Map::Json {
                        entries: fields,
                        values: None,
                    }))
                } else {
                    Ok(Value::Object(Object { fields, schema }))
                }
            }
            (Kind::Boolean, other) => Err(mismatch("boolean", other)),
            (Kind::Integer, other) => Err(mismatch("integer", other)),
            (Kind::Number, other) => Err(mismatch("number", other)),
            (Kind::String, other) => Err(mismatch("string", other)),
            (Kind::IntOrString, other) => Err(mismatch("integer or string", other)),
            (Kind::Array, other) => Err(mismatch("array", other)),
            (Kind::Object, other) => Err(mismatch("object", other)),
        }
    }

    fn untyped(json: &'a Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(flag) => Value::Bool(*flag),
            Json::Number(number) => untyped_number(number),
            Json::String(text) => Value::String(Cow::Borrowed(text.as_str())),
            Json::Array(items) => Value::List(List::Json {
                items,
                schema: None,
            }),
            Json::Object(entries) => Value::Map(Map::Json {
                entries,
                values: None,
            }),
        }
    }

    pub fn string(text: impl Into<String>) -> Self {
        Value::String(Cow::Owned(text.into()))
    }

    pub fn list(items: Vec<Value<'a>>) -> Self {
        Value::List(List::Owned(Rc::new(items)))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Runtime type, with list and map parameters erased.
    pub fn cel_type(&self) -> CelType {
        match self {
            Value::Null => CelType::Null,
            Value::Bool(_) => CelType::Bool,
            Value::Int(_) => CelType::Int,
            Value::Uint(_) => CelType::Uint,
            Value::Double(_) => CelType::Double,
            Value::String(_) => CelType::String,
            Value::Bytes(_) => CelType::Bytes,
            Value::List(_) => CelType::list(CelType::Dyn),
            Value::Map(_) => CelType::map(CelType::Dyn, CelType::Dyn),
            Value::Object(_) => CelType::Object,
            Value::Type(_) => CelType::Type,
        }
    }

    pub fn type_name(&self) -> String {
        self.cel_type().to_string()
    }

    /// Size seen by the cost model: bytes for strings and bytes, items
    /// for lists, entries for maps, present declared fields for objects.
    pub fn cost_size(&self) -> u64 {
        match self {
            Value::String(text) => text.len() as u64,
            Value::Bytes(bytes) => bytes.len() as u64,
            Value::List(list) => list.len() as u64,
            Value::Map(map) => map.len() as u64,
            Value::Object(object) => object.present_fields() as u64,
            _ => 1,
        }
    }

    /// CEL equality, numeric values compare across int, uint and double.
    pub fn equals(&self, other: &Value<'a>) -> Result<bool, EvalError> {
        Ok(match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a.erased() == b.erased(),
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for index in 0..a.len() {
                    if !a.get(index)?.equals(&b.get(index)?)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, value) in a.entries()? {
                    match b.get(&key)? {
                        Some(other) if value.equals(&other)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (Value::Object(a), Value::Object(b)) => a.equals(b)?,
            (a, b) => match numeric_order(a, b) {
                Some(ordering) => ordering == Ordering::Equal,
                None => false,
            },
        })
    }

    /// Ordering for `<`, `<=`, `>` and `>=`; `None` when unordered (NaN).
    pub fn compare(&self, other: &Value<'a>, function: &str) -> Result<Option<Ordering>, EvalError> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
            (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(Some(a.cmp(b))),
            (a, b) if a.is_numeric() && b.is_numeric() => Ok(numeric_order(a, b)),
            (a, b) => Err(EvalError::no_overload(
                function,
                &[a.type_name().as_str(), b.type_name().as_str()],
            )),
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Uint(_) | Value::Double(_))
    }

    /// Convert back to JSON for display.
    pub fn to_json(&self) -> Result<Json, EvalError> {
        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(flag) => Json::Bool(*flag),
            Value::Int(int) => Json::from(*int),
            Value::Uint(uint) => Json::from(*uint),
            Value::Double(float) => serde_json::Number::from_f64(*float)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(text) => Json::String(text.to_string()),
            Value::Bytes(bytes) => Json::String(String::from_utf8_lossy(bytes).into_owned()),
            Value::List(list) => {
                let mut items = Vec::with_capacity(list.len());
                for index in 0..list.len() {
                    items.push(list.get(index)?.to_json()?);
                }
                Json::Array(items)
            }
            Value::Map(map) => {
                let mut entries = JsonMap::new();
                for (key, value) in map.entries()? {
                    let key = match key {
                        Value::String(text) => text.into_owned(),
                        other => other.to_string(),
                    };
                    entries.insert(key, value.to_json()?);
                }
                Json::Object(entries)
            }
            Value::Object(object) => Json::Object(object.fields.clone()),
            Value::Type(ty) => Json::String(ty.to_string()),
        })
    }
}

fn numeric_order(a: &Value<'_>, b: &Value<'_>) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Uint(a), Value::Uint(b)) => Some(a.cmp(b)),
        (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Uint(b)) => Some(compare_int_uint(*a, *b)),
        (Value::Uint(a), Value::Int(b)) => Some(compare_int_uint(*b, *a).reverse()),
        (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Uint(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
        (Value::Double(a), Value::Uint(b)) => a.partial_cmp(&(*b as f64)),
        _ => None,
    }
}

fn compare_int_uint(int: i64, uint: u64) -> Ordering {
    match u64::try_from(int) {
        Ok(int) => int.cmp(&uint),
        Err(_) => Ordering::Less,
    }
}

impl<'a> List<'a> {
    pub fn len(&self) -> usize {
        match self {
            List::Json { items, .. } => items.len(),
            List::Owned(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<Value<'a>, EvalError> {
        match self {
            List::Json { items, schema } => match items.get(index) {
                Some(item) => Value::from_json(item, *schema),
                None => Err(EvalError::IndexOutOfBounds(index as i128)),
            },
            List::Owned(items) => items
                .get(index)
                .cloned()
                .ok_or(EvalError::IndexOutOfBounds(index as i128)),
        }
    }

    pub fn contains(&self, needle: &Value<'a>) -> Result<bool, EvalError> {
        for index in 0..self.len() {
            if self.get(index)?.equals(needle)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<'a> Map<'a> {
    pub fn len(&self) -> usize {
        match self {
            Map::Json { entries, .. } => entries.len(),
            Map::Owned(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &Value<'a>) -> Result<Option<Value<'a>>, EvalError> {
        match self {
            Map::Json { entries, values } => match key {
                Value::String(key) => match entries.get(key.as_ref()) {
                    Some(value) => Value::from_json(value, *values).map(Some),
                    None => Ok(None),
                },
                _ => Ok(None),
            },
            Map::Owned(entries) => {
                for (candidate, value) in entries.iter() {
                    if candidate.equals(key)? {
                        return Ok(Some(value.clone()));
                    }
                }
                Ok(None)
            }
        }
    }

    pub fn contains_key(&self, key: &Value<'a>) -> Result<bool, EvalError> {
        match self {
            Map::Json { entries, .. } => Ok(match key {
                Value::String(key) => entries.contains_key(key.as_ref()),
                _ => false,
            }),
            Map::Owned(_) => Ok(self.get(key)?.is_some()),
        }
    }

    pub fn keys(&self) -> Vec<Value<'a>> {
        match self {
            Map::Json { entries, .. } => entries
                .keys()
                .map(|key| Value::String(Cow::Borrowed(key.as_str())))
                .collect(),
            Map::Owned(entries) => entries.iter().map(|(key, _)| key.clone()).collect(),
        }
    }

    pub fn entries(&self) -> Result<Vec<(Value<'a>, Value<'a>)>, EvalError> {
        match self {
            Map::Json { entries, values } => entries
                .iter()
                .map(|(key, value)| {
                    Ok((
                        Value::String(Cow::Borrowed(key.as_str())),
                        Value::from_json(value, *values)?,
                    ))
                })
                .collect(),
            Map::Owned(entries) => Ok(entries.as_ref().clone()),
        }
    }
}

impl<'a> Object<'a> {
    pub fn schema(&self) -> &'a Structural {
        self.schema
    }

    /// Value of a declared field; `None` when absent or null.
    pub fn field(&self, name: &str) -> Result<Option<Value<'a>>, EvalError> {
        let Some(schema) = self.schema.property(name) else {
            return Err(EvalError::NoSuchKey(name.to_string()));
        };
        match self.fields.get(name) {
            None | Some(Json::Null) => Ok(None),
            Some(json) => Value::from_json(json, Some(schema)).map(Some),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        !matches!(self.fields.get(name), None | Some(Json::Null))
    }

    fn present_fields(&self) -> usize {
        self.schema
            .properties
            .keys()
            .filter(|name| self.has(name))
            .count()
    }

    fn equals(&self, other: &Object<'a>) -> Result<bool, EvalError> {
        for name in self.schema.properties.keys() {
            let same = match (self.field(name)?, other.field(name)?) {
                (None, None) => true,
                (Some(a), Some(b)) => a.equals(&b)?,
                _ => false,
            };
            if !same {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(flag) => write!(f, "{flag}"),
            Value::Int(int) => write!(f, "{int}"),
            Value::Uint(uint) => write!(f, "{uint}u"),
            Value::Double(float) => write!(f, "{float}"),
            Value::String(text) => write!(f, "{text:?}"),
            Value::Bytes(bytes) => write!(f, "b{:?}", String::from_utf8_lossy(bytes)),
            Value::Type(ty) => write!(f, "{ty}"),
            other => match other.to_json() {
                Ok(json) => write!(f, "{json}"),
                Err(err) => write!(f, "<{err}>"),
            },
        }
    }
}
