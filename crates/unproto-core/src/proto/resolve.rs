//! Type-reference resolution against one file's own declarations.
//!
//! Every message and enum is indexed by its package-relative path
//! (`Outer.Inner`). A reference is looked up in this order:
//!
//! 1. exact path, after stripping a leading `.` and the file's package
//! 2. exact path relative to each enclosing scope, innermost first
//! 3. exact simple name anywhere in the file, if unambiguous
//! 4. case-insensitive path or simple name, if exactly one type matches
//!
//! Anything else is external or ambiguous and is emitted verbatim.

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::model::{Enum, Message, SchemaFile};
use std::collections::HashMap;
use tracing::trace;

/// Outcome of resolving one reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolved {
    /// A type declared in this file, by package-relative path
    Local(String),
    /// Not declared here; the text to emit
    External(String),
}

/// Index of every type declared in a file
#[derive(Debug, Default)]
pub(crate) struct TypeIndex {
    package: String,
    /// Relative paths in declaration order
    paths: Vec<String>,
    by_path: HashMap<String, usize>,
    by_simple: HashMap<String, Vec<usize>>,
}

impl TypeIndex {
    pub(crate) fn build(file: &SchemaFile) -> Self {
        let mut index = Self {
            package: file.package.clone(),
            ..Default::default()
        };
        for enum_type in &file.enums {
            index.add_enum("", enum_type);
        }
        for message in &file.messages {
            index.add_message("", message);
        }
        index
    }

    fn add_enum(&mut self, scope: &str, enum_type: &Enum) {
        self.insert(join(scope, &enum_type.name));
    }

    fn add_message(&mut self, scope: &str, message: &Message) {
        let path = join(scope, &message.name);
        self.insert(path.clone());
        for enum_type in &message.enums {
            self.add_enum(&path, enum_type);
        }
        for nested in &message.messages {
            self.add_message(&path, nested);
        }
    }

    fn insert(&mut self, path: String) {
        // Duplicates are reported by the emitter; the first declaration wins.
        if self.by_path.contains_key(&path) {
            return;
        }
        let id = self.paths.len();
        self.by_simple
            .entry(simple_name(&path).to_string())
            .or_default()
            .push(id);
        self.by_path.insert(path.clone(), id);
        self.paths.push(path);
    }

    /// Returns true if `path` names a type declared in this file
    pub(crate) fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// Resolves `reference` as seen from the message at `scope`.
    ///
    /// `scope` is the package-relative path of the enclosing message, empty
    /// at file level.
    pub(crate) fn resolve(&self, reference: &str, scope: &str, diags: &mut Diagnostics) -> Resolved {
        let absolute = reference.starts_with('.');
        let trimmed = reference.trim_start_matches('.');

        let relative = if self.package.is_empty() {
            Some(trimmed)
        } else {
            trimmed
                .strip_prefix(self.package.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .or(if absolute { None } else { Some(trimmed) })
        };

        let Some(relative) = relative else {
            // Fully qualified into another package.
            return Resolved::External(trimmed.to_string());
        };

        if let Some(path) = self.lookup(relative, scope, absolute) {
            if path != relative {
                trace!("Resolved '{}' to '{}' from '{}'", reference, path, scope);
            }
            return Resolved::Local(path);
        }

        if !self.looks_foreign(trimmed) {
            diags.warn(
                WarningKind::UnresolvedTypeReference,
                format!("type '{}' is not declared in this file", reference),
            );
        }
        Resolved::External(trimmed.to_string())
    }

    fn lookup(&self, relative: &str, scope: &str, absolute: bool) -> Option<String> {
        if !absolute {
            let mut current = scope;
            while !current.is_empty() {
                let candidate = join(current, relative);
                if self.contains(&candidate) {
                    return Some(candidate);
                }
                current = parent(current);
            }
        }
        if self.contains(relative) {
            return Some(relative.to_string());
        }
        if absolute {
            return None;
        }

        let simple = simple_name(relative);
        if simple == relative {
            if let Some(ids) = self.by_simple.get(simple) {
                if ids.len() == 1 {
                    return Some(self.paths[ids[0]].clone());
                }
            }
        }

        let folded: Vec<&String> = self
            .paths
            .iter()
            .filter(|path| {
                path.eq_ignore_ascii_case(relative)
                    || (simple == relative && simple_name(path).eq_ignore_ascii_case(simple))
            })
            .collect();
        match folded.as_slice() {
            [only] => Some((*only).clone()),
            _ => None,
        }
    }

    /// A dotted reference whose first segment is not declared here is taken
    /// to be qualified by another package.
    fn looks_foreign(&self, reference: &str) -> bool {
        match reference.split_once('.') {
            Some((head, _)) => !self.contains(head),
            None => false,
        }
    }

    /// Text to emit for the local type at `path` when written inside `scope`.
    ///
    /// The package-relative path is used unless a declaration in an
    /// enclosing scope would shadow its first segment, in which case the
    /// reference is fully qualified.
    pub(crate) fn spelling(&self, path: &str, scope: &str) -> String {
        let head = path.split('.').next().unwrap_or(path);
        let mut current = scope;
        while !current.is_empty() {
            let shadow = join(current, head);
            if self.contains(&shadow) && !path.starts_with(&format!("{}.", shadow)) && shadow != path {
                return if self.package.is_empty() {
                    format!(".{}", path)
                } else {
                    format!(".{}.{}", self.package, path)
                };
            }
            current = parent(current);
        }
        path.to_string()
    }
}

pub(crate) fn join(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

fn parent(path: &str) -> &str {
    path.rsplit_once('.').map_or("", |(head, _)| head)
}

fn simple_name(path: &str) -> &str {
    path.rsplit_once('.').map_or(path, |(_, tail)| tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Enum, Message, SchemaFile};

    fn file() -> SchemaFile {
        SchemaFile::new()
            .with_package("p")
            .with_enum(Enum::new("Color"))
            .with_message(
                Message::new("Outer")
                    .with_message(Message::new("Inner"))
                    .with_enum(Enum::new("Mode")),
            )
            .with_message(Message::new("Foo"))
            .with_message(Message::new("foo"))
            .with_message(Message::new("Inner"))
    }

    fn resolve(index: &TypeIndex, reference: &str, scope: &str) -> (Resolved, usize) {
        let mut diags = Diagnostics::new();
        let resolved = index.resolve(reference, scope, &mut diags);
        (resolved, diags.count(WarningKind::UnresolvedTypeReference))
    }

    #[test]
    fn test_qualified_references() {
        let index = TypeIndex::build(&file());
        assert_eq!(resolve(&index, ".p.Outer.Inner", ""), (Resolved::Local("Outer.Inner".into()), 0));
        assert_eq!(resolve(&index, ".p.Color", "Outer"), (Resolved::Local("Color".into()), 0));
        assert_eq!(
            resolve(&index, ".google.protobuf.Timestamp", ""),
            (Resolved::External("google.protobuf.Timestamp".into()), 0)
        );
        assert_eq!(
            resolve(&index, "google.protobuf.Timestamp", ""),
            (Resolved::External("google.protobuf.Timestamp".into()), 0)
        );
    }

    #[test]
    fn test_scope_walk_prefers_innermost() {
        let index = TypeIndex::build(&file());
        assert_eq!(resolve(&index, "Inner", "Outer").0, Resolved::Local("Outer.Inner".into()));
        assert_eq!(resolve(&index, "Inner", "").0, Resolved::Local("Inner".into()));
        assert_eq!(resolve(&index, "Mode", "").0, Resolved::Local("Outer.Mode".into()));
    }

    #[test]
    fn test_exact_match_beats_case_folding() {
        let index = TypeIndex::build(&file());
        assert_eq!(resolve(&index, "foo", "").0, Resolved::Local("foo".into()));
        assert_eq!(resolve(&index, "Foo", "").0, Resolved::Local("Foo".into()));
        assert_eq!(resolve(&index, "FOO", ""), (Resolved::External("FOO".into()), 1));
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let index = TypeIndex::build(&file());
        assert_eq!(resolve(&index, "color", "").0, Resolved::Local("Color".into()));
        assert_eq!(resolve(&index, "outer.mode", "").0, Resolved::Local("Outer.Mode".into()));
        assert_eq!(resolve(&index, "Missing", ""), (Resolved::External("Missing".into()), 1));
    }

    #[test]
    fn test_spelling_avoids_shadowing() {
        let index = TypeIndex::build(&file());
        assert_eq!(index.spelling("Inner", "Outer"), ".p.Inner");
        assert_eq!(index.spelling("Outer.Inner", "Outer"), "Outer.Inner");
        assert_eq!(index.spelling("Inner", ""), "Inner");
        assert_eq!(index.spelling("Color", "Outer.Inner"), "Color");
    }
}
