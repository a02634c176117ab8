//! Builtin functions and type conversions.

use std::borrow::Cow;

use regex::Regex;

use crate::cost;
use crate::error::EvalError;
use crate::eval::Interpreter;
use crate::value::Value;

impl<'a> Interpreter<'a> {
    pub(crate) fn call(
        &mut self,
        function: &str,
        target: Option<Value<'a>>,
        mut args: Vec<Value<'a>>,
    ) -> Result<Value<'a>, EvalError> {
        match (function, target, args.len()) {
            ("size", Some(subject), 0) => size(subject),
            ("size", None, 1) => size(args.remove(0)),
            ("contains" | "startsWith" | "endsWith", Some(text), 1) => {
                let needle = args.remove(0);
                let (Value::String(text), Value::String(needle)) = (&text, &needle) else {
                    return Err(EvalError::no_overload(
                        function,
                        &[text.type_name(), needle.type_name()],
                    ));
                };
                self.charge(cost::traversal_cost(text.len() as u64))?;
                let found = match function {
                    "contains" => text.contains(&**needle),
                    "startsWith" => text.starts_with(&**needle),
                    _ => text.ends_with(&**needle),
                };
                Ok(Value::Bool(found))
            }
            ("matches", Some(text), 1) => {
                let pattern = args.remove(0);
                self.matches(text, pattern)
            }
            ("matches", None, 2) => {
                let pattern = args.remove(1);
                let text = args.remove(0);
                self.matches(text, pattern)
            }
            ("lowerAscii" | "upperAscii", Some(text), 0) => {
                let Value::String(text) = text else {
                    return Err(EvalError::no_overload(function, &[text.type_name()]));
                };
                self.charge(cost::traversal_cost(text.len() as u64))?;
                let converted = if function == "lowerAscii" {
                    text.to_ascii_lowercase()
                } else {
                    text.to_ascii_uppercase()
                };
                Ok(Value::String(Cow::Owned(converted)))
            }
            (_, None, 1) => convert(function, args.remove(0)),
            (_, target, _) => {
                let mut types: Vec<String> = target.iter().map(Value::type_name).collect();
                types.extend(args.iter().map(Value::type_name));
                Err(EvalError::no_overload(function, &types))
            }
        }
    }

    fn matches(&mut self, text: Value<'a>, pattern: Value<'a>) -> Result<Value<'a>, EvalError> {
        let (Value::String(text), Value::String(pattern)) = (&text, &pattern) else {
            return Err(EvalError::no_overload(
                "matches",
                &[text.type_name(), pattern.type_name()],
            ));
        };
        self.charge(cost::matches_cost(text.len() as u64, pattern.len() as u64))?;

        let found = match self.regexes.get(&**pattern) {
            Some(regex) => regex.is_match(text),
            None => Regex::new(pattern)
                .map_err(|err| EvalError::Regex(err.to_string()))?
                .is_match(text),
        };
        Ok(Value::Bool(found))
    }
}

fn size(subject: Value<'_>) -> Result<Value<'_>, EvalError> {
    let size = match &subject {
        Value::String(text) => text.chars().count(),
        Value::Bytes(bytes) => bytes.len(),
        Value::List(list) => list.len(),
        Value::Map(map) => map.len(),
        other => return Err(EvalError::no_overload("size", &[other.type_name()])),
    };
    i64::try_from(size)
        .map(Value::Int)
        .map_err(|_| EvalError::Overflow)
}

/// Largest doubles that still truncate into the 64-bit integer ranges.
const INT_RANGE: (f64, f64) = (-9_223_372_036_854_775_808.0, 9_223_372_036_854_775_807.0);
const UINT_MAX: f64 = 18_446_744_073_709_551_615.0;

fn convert<'a>(function: &str, value: Value<'a>) -> Result<Value<'a>, EvalError> {
    let fail = |value: &Value<'_>| EvalError::no_overload(function, &[value.type_name()]);

    match function {
        "int" => match value {
            Value::Int(_) => Ok(value),
            Value::Uint(uint) => i64::try_from(uint)
                .map(Value::Int)
                .map_err(|_| EvalError::Overflow),
            Value::Double(float) => {
                if float.is_finite() && float >= INT_RANGE.0 && float < INT_RANGE.1 {
                    Ok(Value::Int(float.trunc() as i64))
                } else {
                    Err(EvalError::Overflow)
                }
            }
            Value::String(text) => text
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| EvalError::Conversion(format!("cannot convert '{text}' to int"))),
            other => Err(fail(&other)),
        },
        "uint" => match value {
            Value::Uint(_) => Ok(value),
            Value::Int(int) => u64::try_from(int)
                .map(Value::Uint)
                .map_err(|_| EvalError::Overflow),
            Value::Double(float) => {
                if float.is_finite() && float >= 0.0 && float < UINT_MAX {
                    Ok(Value::Uint(float.trunc() as u64))
                } else {
                    Err(EvalError::Overflow)
                }
            }
            Value::String(text) => text
                .parse::<u64>()
                .map(Value::Uint)
                .map_err(|_| EvalError::Conversion(format!("cannot convert '{text}' to uint"))),
            other => Err(fail(&other)),
        },
        "double" => match value {
            Value::Double(_) => Ok(value),
            Value::Int(int) => Ok(Value::Double(int as f64)),
            Value::Uint(uint) => Ok(Value::Double(uint as f64)),
            Value::String(text) => text
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| EvalError::Conversion(format!("cannot convert '{text}' to double"))),
            other => Err(fail(&other)),
        },
        "string" => match value {
            Value::String(_) => Ok(value),
            Value::Int(int) => Ok(Value::string(int.to_string())),
            Value::Uint(uint) => Ok(Value::string(uint.to_string())),
            Value::Double(float) => Ok(Value::string(format_double(float))),
            Value::Bool(flag) => Ok(Value::string(flag.to_string())),
            Value::Bytes(bytes) => String::from_utf8(bytes.into_owned())
                .map(Value::string)
                .map_err(|_| EvalError::Conversion("bytes are not valid UTF-8".to_string())),
            other => Err(fail(&other)),
        },
        "bytes" => match value {
            Value::Bytes(_) => Ok(value),
            Value::String(text) => Ok(Value::Bytes(match text {
                Cow::Borrowed(text) => Cow::Borrowed(text.as_bytes()),
                Cow::Owned(text) => Cow::Owned(text.into_bytes()),
            })),
            other => Err(fail(&other)),
        },
        "bool" => match value {
            Value::Bool(_) => Ok(value),
            Value::String(text) => match &*text {
                "1" | "t" | "true" | "TRUE" | "True" => Ok(Value::Bool(true)),
                "0" | "f" | "false" | "FALSE" | "False" => Ok(Value::Bool(false)),
                _ => Err(EvalError::Conversion(format!("cannot convert '{text}' to bool"))),
            },
            other => Err(fail(&other)),
        },
        "dyn" => Ok(value),
        "type" => Ok(Value::Type(value.cel_type())),
        _ => Err(fail(&value)),
    }
}

/// Shortest round-tripping form, in exponent notation outside `[1e-6, 1e21)`.
fn format_double(float: f64) -> String {
    let magnitude = float.abs();
    if float.is_finite() && magnitude != 0.0 && !(1e-6..1e21).contains(&magnitude) {
        format!("{float:e}")
    } else {
        format!("{float}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_follow_ranges() {
        assert!(matches!(convert("int", Value::Double(-1.9)), Ok(Value::Int(-1))));
        assert!(matches!(convert("int", Value::Double(1e19)), Err(EvalError::Overflow)));
        assert!(matches!(convert("uint", Value::Int(-1)), Err(EvalError::Overflow)));
        assert!(matches!(
            convert("int", Value::string("12a")),
            Err(EvalError::Conversion(_))
        ));
        assert!(matches!(convert("bool", Value::string("True")), Ok(Value::Bool(true))));
        assert!(matches!(
            convert("int", Value::Null),
            Err(EvalError::NoMatchingOverload { .. })
        ));
    }

    #[test]
    fn doubles_format_compactly() {
        assert_eq!(format_double(2.0), "2");
        assert_eq!(format_double(0.25), "0.25");
        assert_eq!(format_double(1e300), "1e300");
        assert_eq!(format_double(f64::INFINITY), "inf");
    }

    #[test]
    fn size_counts_code_points() {
        assert!(matches!(size(Value::string("日本")), Ok(Value::Int(2))));
        assert!(size(Value::Int(1)).is_err());
    }
}
