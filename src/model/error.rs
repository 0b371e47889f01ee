//! Defines the error types for the model specification parser.
use std::fmt;
use thiserror::Error;

/// The specific category of a specification violation.
///
// Kept as an enum so callers can filter diagnostics without matching on text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// The document could not be read as a model document at all.
    Document,
    /// Unknown level names, or levels out of hierarchy order.
    LevelOrder,
    /// A regressor, contrast or grouping variable declared twice.
    DuplicateName,
    /// A contrast or dummy contrast names something its level cannot see.
    UndefinedReference,
    /// A grouping variable no lower level provides.
    UnresolvableGrouping,
    InvalidFilter,
    /// Weights that do not line up with the condition list, or a bad test type.
    MalformedContrast,
}

/// One problem found in a model document, with where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Path into the document, e.g. `Steps[1].Contrasts[0]`.
    pub location: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl Violation {
    pub fn new(location: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self { location: location.into(), kind, message: message.into() }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// The model document is malformed or inconsistent.
///
/// Always carries every violation found, never just the first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("model specification is invalid ({} violation(s)): {}", .violations.len(), render(.violations))]
pub struct SpecValidationError {
    pub violations: Vec<Violation>,
}

impl SpecValidationError {
    pub fn new(violations: Vec<Violation>) -> Self { Self { violations } }

    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }
}

fn render(violations: &[Violation]) -> String {
    violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; ")
}
