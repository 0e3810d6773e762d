//! Structured warnings collected while reconstructing a single unit.
//!
//! Nothing in the library prints. Each stage pushes into a [`Diagnostics`]
//! owned by the caller, and the caller decides how to report them.

use std::fmt;

/// The class of a recoverable condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// A type reference matched no declared type (or several)
    UnresolvedTypeReference,
    /// A decoded code point did not fit a single-byte literal and was truncated
    CodePointTruncated,
    /// Two fields of one message share a number
    DuplicateFieldNumber,
    /// Two declarations in one scope share a name
    DuplicateNestedName,
    /// The descriptor declared a syntax level that is not carried through
    UnsupportedSyntax,
    /// A field points at a oneof group that does not exist
    MissingOneof,
    /// A map field whose key or value type could not be recovered
    IncompleteMap,
    /// A field number or reserved range that protoc would reject
    InvalidNumber,
}

impl WarningKind {
    /// Short stable name used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::UnresolvedTypeReference => "unresolved-type-reference",
            WarningKind::CodePointTruncated => "code-point-truncated",
            WarningKind::DuplicateFieldNumber => "duplicate-field-number",
            WarningKind::DuplicateNestedName => "duplicate-nested-name",
            WarningKind::UnsupportedSyntax => "unsupported-syntax",
            WarningKind::MissingOneof => "missing-oneof",
            WarningKind::IncompleteMap => "incomplete-map",
            WarningKind::InvalidNumber => "invalid-number",
        }
    }
}

/// A single recoverable condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// What went wrong
    pub kind: WarningKind,
    /// Human readable detail
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

/// Ordered collection of warnings for one unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Creates an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning
    pub fn warn(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        tracing::trace!("{}: {}", kind.as_str(), message);
        self.warnings.push(Warning { kind, message });
    }

    /// Appends every warning of `other`
    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
    }

    /// All warnings in the order they were recorded
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Number of warnings of the given kind
    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }

    /// Returns true if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Number of recorded warnings
    pub fn len(&self) -> usize {
        self.warnings.len()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Warning;
    type IntoIter = std::vec::IntoIter<Warning>;

    fn into_iter(self) -> Self::IntoIter {
        self.warnings.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Warning;
    type IntoIter = std::slice::Iter<'a, Warning>;

    fn into_iter(self) -> Self::IntoIter {
        self.warnings.iter()
    }
}
