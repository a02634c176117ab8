use std::fmt;

use podcel_schema::{Kind, Structural};

/// Static type of a CEL expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CelType {
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    List(Box<CelType>),
    Map(Box<CelType>, Box<CelType>),
    /// Schema object with declared properties.
    Object,
    Dyn,
    Type,
}

impl CelType {
    pub fn list(element: CelType) -> Self {
        CelType::List(Box::new(element))
    }

    pub fn map(key: CelType, value: CelType) -> Self {
        CelType::Map(Box::new(key), Box::new(value))
    }

    /// Type of values conforming to `schema`.
    pub fn from_schema(schema: &Structural) -> Self {
        match schema.kind {
            Kind::Boolean => CelType::Bool,
            Kind::Integer => CelType::Int,
            Kind::Number => CelType::Double,
            Kind::String => CelType::String,
            Kind::IntOrString | Kind::Any => CelType::Dyn,
            Kind::Array => match schema.items.as_deref() {
                Some(items) => CelType::list(CelType::from_schema(items)),
                None => CelType::list(CelType::Dyn),
            },
            Kind::Object => {
                if let Some(additional) = schema.additional.as_deref() {
                    CelType::map(CelType::String, CelType::from_schema(additional))
                } else if schema.properties.is_empty() && schema.extensions.preserve_unknown_fields
                {
                    CelType::map(CelType::String, CelType::Dyn)
                } else {
                    CelType::Object
                }
            }
        }
    }

    pub fn is_dyn(&self) -> bool {
        matches!(self, CelType::Dyn)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, CelType::Int | CelType::Uint | CelType::Double)
    }

    /// True when a value of type `other` may be used where `self` is expected.
    pub fn accepts(&self, other: &CelType) -> bool {
        match (self, other) {
            (CelType::Dyn, _) | (_, CelType::Dyn) => true,
            (CelType::List(a), CelType::List(b)) => a.accepts(b),
            (CelType::Map(ak, av), CelType::Map(bk, bv)) => ak.accepts(bk) && av.accepts(bv),
            (a, b) => a == b,
        }
    }

    /// Least common type of two branches; `dyn` when they disagree.
    pub fn join(&self, other: &CelType) -> CelType {
        match (self, other) {
            (CelType::List(a), CelType::List(b)) => CelType::list(a.join(b)),
            (CelType::Map(ak, av), CelType::Map(bk, bv)) => CelType::map(ak.join(bk), av.join(bv)),
            (a, b) if a == b => a.clone(),
            _ => CelType::Dyn,
        }
    }

    /// Resolve a type-name identifier such as `int` or `list`.
    pub(crate) fn from_type_name(name: &str) -> Option<CelType> {
        Some(match name {
            "null_type" => CelType::Null,
            "bool" => CelType::Bool,
            "int" => CelType::Int,
            "uint" => CelType::Uint,
            "double" => CelType::Double,
            "string" => CelType::String,
            "bytes" => CelType::Bytes,
            "list" => CelType::list(CelType::Dyn),
            "map" => CelType::map(CelType::Dyn, CelType::Dyn),
            "type" => CelType::Type,
            _ => return None,
        })
    }

    /// Runtime type identity: parameters of lists and maps are erased.
    pub fn erased(&self) -> CelType {
        match self {
            CelType::List(_) => CelType::list(CelType::Dyn),
            CelType::Map(..) => CelType::map(CelType::Dyn, CelType::Dyn),
            other => other.clone(),
        }
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CelType::Null => f.write_str("null_type"),
            CelType::Bool => f.write_str("bool"),
            CelType::Int => f.write_str("int"),
            CelType::Uint => f.write_str("uint"),
            CelType::Double => f.write_str("double"),
            CelType::String => f.write_str("string"),
            CelType::Bytes => f.write_str("bytes"),
            CelType::List(element) => write!(f, "list({element})"),
            CelType::Map(key, value) => write!(f, "map({key}, {value})"),
            CelType::Object => f.write_str("object"),
            CelType::Dyn => f.write_str("dyn"),
            CelType::Type => f.write_str("type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_schema_kinds() {
        let string = Structural::new(Kind::String);
        assert_eq!(CelType::from_schema(&string), CelType::String);
        assert_eq!(
            CelType::from_schema(&Structural::array(Structural::new(Kind::Integer))),
            CelType::list(CelType::Int)
        );
        assert_eq!(
            CelType::from_schema(&Structural::map(Structural::new(Kind::Number))),
            CelType::map(CelType::String, CelType::Double)
        );
        assert_eq!(
            CelType::from_schema(&Structural::object([("a".to_string(), string)])),
            CelType::Object
        );
        assert_eq!(
            CelType::from_schema(&Structural::new(Kind::IntOrString)),
            CelType::Dyn
        );
    }

    #[test]
    fn preserved_empty_object_is_a_map() {
        let mut schema = Structural::new(Kind::Object);
        schema.extensions.preserve_unknown_fields = true;
        assert_eq!(
            CelType::from_schema(&schema),
            CelType::map(CelType::String, CelType::Dyn)
        );
    }

    #[test]
    fn join_and_accepts() {
        assert_eq!(CelType::Int.join(&CelType::Int), CelType::Int);
        assert_eq!(CelType::Int.join(&CelType::String), CelType::Dyn);
        assert!(CelType::list(CelType::Int).accepts(&CelType::list(CelType::Dyn)));
        assert!(!CelType::String.accepts(&CelType::Int));
        assert_eq!(CelType::map(CelType::String, CelType::Int).to_string(), "map(string, int)");
    }
}
