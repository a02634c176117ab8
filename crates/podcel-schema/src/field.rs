use std::fmt;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    Root(String),
    Field(String),
    Index(usize),
    Key(String),
}

/// Location of a value inside a validated object, e.g.
/// `spec.containers[0].ports[1].protocol` or `spec.nodeSelector[zone]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    elements: Vec<PathElement>,
}

impl FieldPath {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            elements: vec![PathElement::Root(root.into())],
        }
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        self.with(PathElement::Field(name.into()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.with(PathElement::Index(index))
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        self.with(PathElement::Key(key.into()))
    }

    pub fn push(&mut self, element: PathElement) {
        self.elements.push(element);
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    fn with(&self, element: PathElement) -> Self {
        let mut elements = Vec::with_capacity(self.elements.len() + 1);
        elements.extend(self.elements.iter().cloned());
        elements.push(element);
        Self { elements }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, element) in self.elements.iter().enumerate() {
            match element {
                PathElement::Root(name) => f.write_str(name)?,
                PathElement::Field(name) if position == 0 => f.write_str(name)?,
                PathElement::Field(name) => write!(f, ".{name}")?,
                PathElement::Index(index) => write!(f, "[{index}]")?,
                PathElement::Key(key) => write!(f, "[{key}]")?,
            }
        }
        Ok(())
    }
}

/// Category of a [`Violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// A rule evaluated to `false`.
    RuleViolation,
    /// A rule failed at runtime or was cancelled.
    EvaluationError,
    /// The per-request cost budget ran out.
    BudgetExhausted,
    Required,
    Invalid,
    NotSupported,
    Duplicate,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::RuleViolation => "rule_violation",
            ViolationKind::EvaluationError => "evaluation_error",
            ViolationKind::BudgetExhausted => "budget_exhausted",
            ViolationKind::Required => "required",
            ViolationKind::Invalid => "invalid",
            ViolationKind::NotSupported => "not_supported",
            ViolationKind::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation failure at a field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Violation {
    pub path: FieldPath,
    pub message: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn new(path: FieldPath, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.path, self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_fields_indexes_and_keys() {
        let path = FieldPath::new("spec")
            .child("containers")
            .index(0)
            .child("env")
            .key("HOME");
        assert_eq!(path.to_string(), "spec.containers[0].env[HOME]");
    }

    #[test]
    fn child_does_not_mutate_parent() {
        let root = FieldPath::new("spec");
        let child = root.child("restartPolicy");
        assert_eq!(root.to_string(), "spec");
        assert_eq!(child.to_string(), "spec.restartPolicy");
        assert_eq!(child.elements().len(), 2);
    }

    #[test]
    fn violation_display_includes_kind() {
        let violation = Violation::new(
            FieldPath::new("spec").child("containers"),
            ViolationKind::Required,
            "Required value",
        );
        assert_eq!(
            violation.to_string(),
            "spec.containers: required: Required value"
        );
    }
}
