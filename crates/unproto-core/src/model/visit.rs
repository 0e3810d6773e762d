//! Read-only traversal of the schema tree.
//!
//! [`walk`] visits every declaration depth first, in declaration order.
//! Implement [`SchemaVisitor`] to collect whatever you need; every method
//! defaults to a no-op.

use super::{Enum, EnumValue, Field, Message, Method, Oneof, SchemaFile, Service};

/// Callbacks invoked by [`walk`].
///
/// # Example
///
/// ```
/// use unproto_core::model::{walk, Message, SchemaFile, SchemaVisitor};
///
/// struct Names(Vec<String>);
///
/// impl SchemaVisitor for Names {
///     fn visit_message(&mut self, message: &Message) {
///         self.0.push(message.name.clone());
///     }
/// }
///
/// let file = SchemaFile::new().with_message(Message::new("Pt"));
/// let mut names = Names(Vec::new());
/// walk(&file, &mut names);
/// assert_eq!(names.0, ["Pt"]);
/// ```
pub trait SchemaVisitor {
    /// Called once per file, before anything else
    fn visit_file(&mut self, file: &SchemaFile) {
        let _ = file;
    }

    /// Called for every message, nested ones included
    fn visit_message(&mut self, message: &Message) {
        let _ = message;
    }

    /// Called for every field of a message
    fn visit_field(&mut self, field: &Field) {
        let _ = field;
    }

    /// Called for every oneof group of a message
    fn visit_oneof(&mut self, oneof: &Oneof) {
        let _ = oneof;
    }

    /// Called for every enum, nested ones included
    fn visit_enum(&mut self, enum_type: &Enum) {
        let _ = enum_type;
    }

    /// Called for every enum value
    fn visit_enum_value(&mut self, value: &EnumValue) {
        let _ = value;
    }

    /// Called for every service
    fn visit_service(&mut self, service: &Service) {
        let _ = service;
    }

    /// Called for every service method
    fn visit_method(&mut self, method: &Method) {
        let _ = method;
    }
}

/// Walks `file`, invoking `visitor` for every declaration
pub fn walk(file: &SchemaFile, visitor: &mut impl SchemaVisitor) {
    visitor.visit_file(file);
    for enum_type in &file.enums {
        walk_enum(enum_type, visitor);
    }
    for message in &file.messages {
        walk_message(message, visitor);
    }
    for service in &file.services {
        visitor.visit_service(service);
        for method in &service.methods {
            visitor.visit_method(method);
        }
    }
}

fn walk_message(message: &Message, visitor: &mut impl SchemaVisitor) {
    visitor.visit_message(message);
    for field in &message.fields {
        visitor.visit_field(field);
    }
    for oneof in &message.oneofs {
        visitor.visit_oneof(oneof);
    }
    for enum_type in &message.enums {
        walk_enum(enum_type, visitor);
    }
    for nested in &message.messages {
        walk_message(nested, visitor);
    }
}

fn walk_enum(enum_type: &Enum, visitor: &mut impl SchemaVisitor) {
    visitor.visit_enum(enum_type);
    for value in &enum_type.values {
        visitor.visit_enum_value(value);
    }
}

/// A visitor that counts declarations
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchemaStats {
    /// Number of messages, map entries included
    pub message_count: usize,
    /// Number of fields
    pub field_count: usize,
    /// Number of oneof groups
    pub oneof_count: usize,
    /// Number of enums
    pub enum_count: usize,
    /// Number of services
    pub service_count: usize,
    /// Number of methods
    pub method_count: usize,
}

impl SchemaStats {
    /// Counts the declarations of `file`
    pub fn of(file: &SchemaFile) -> Self {
        let mut stats = Self::default();
        walk(file, &mut stats);
        stats
    }
}

impl SchemaVisitor for SchemaStats {
    fn visit_message(&mut self, _message: &Message) {
        self.message_count += 1;
    }

    fn visit_field(&mut self, _field: &Field) {
        self.field_count += 1;
    }

    fn visit_oneof(&mut self, _oneof: &Oneof) {
        self.oneof_count += 1;
    }

    fn visit_enum(&mut self, _enum_type: &Enum) {
        self.enum_count += 1;
    }

    fn visit_service(&mut self, _service: &Service) {
        self.service_count += 1;
    }

    fn visit_method(&mut self, _method: &Method) {
        self.method_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scalar;

    #[test]
    fn test_stats_counts_nested() {
        let file = SchemaFile::new()
            .with_enum(Enum::new("Color").with_value("RED", 0))
            .with_message(
                Message::new("Outer")
                    .with_field(Field::new("a", 1, Scalar::Int32))
                    .with_message(
                        Message::new("Inner").with_field(Field::new("b", 1, Scalar::String)),
                    )
                    .with_enum(Enum::new("Mode")),
            );

        let stats = SchemaStats::of(&file);
        assert_eq!(stats.message_count, 2);
        assert_eq!(stats.field_count, 2);
        assert_eq!(stats.enum_count, 2);
        assert_eq!(stats.service_count, 0);
    }
}
