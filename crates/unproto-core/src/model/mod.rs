//! Language-neutral schema model.
//!
//! Both extraction paths (wire decoding of an embedded descriptor, and the
//! syntactic adapters) build a [`SchemaFile`]; the emitter is its only reader.
//! The tree is owned top-down: a file owns its messages and enums, a message
//! owns its nested declarations. Cross references (a field's oneof, a type
//! name) are plain indices or strings resolved at emission time.
//!
//! Invariants such as unique field numbers are deliberately *not* enforced
//! here. Scraped input is best effort, and the emitter reports violations as
//! warnings instead of rejecting the whole file.

mod visit;

use crate::error::Error;
use std::ops::{Range, RangeInclusive};

pub use visit::{walk, SchemaStats, SchemaVisitor};

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Syntax {
    /// Proto2 syntax
    Proto2,
    /// Proto3 syntax
    #[default]
    Proto3,
}

impl Syntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        }
    }
}

impl TryFrom<&str> for Syntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Error> {
        match value {
            "" | "proto2" => Ok(Syntax::Proto2),
            "proto3" => Ok(Syntax::Proto3),
            _ => Err(Error::malformed_schema(
                0,
                format!("unsupported syntax '{}'", value),
            )),
        }
    }
}

/// Scalar value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Scalar {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Bytes,
    Uint32,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl Scalar {
    /// The `.proto` keyword for this type
    pub fn as_str(&self) -> &'static str {
        match self {
            Scalar::Double => "double",
            Scalar::Float => "float",
            Scalar::Int64 => "int64",
            Scalar::Uint64 => "uint64",
            Scalar::Int32 => "int32",
            Scalar::Fixed64 => "fixed64",
            Scalar::Fixed32 => "fixed32",
            Scalar::Bool => "bool",
            Scalar::String => "string",
            Scalar::Bytes => "bytes",
            Scalar::Uint32 => "uint32",
            Scalar::Sfixed32 => "sfixed32",
            Scalar::Sfixed64 => "sfixed64",
            Scalar::Sint32 => "sint32",
            Scalar::Sint64 => "sint64",
        }
    }

    /// Parses a `.proto` scalar keyword
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "double" => Scalar::Double,
            "float" => Scalar::Float,
            "int64" => Scalar::Int64,
            "uint64" => Scalar::Uint64,
            "int32" => Scalar::Int32,
            "fixed64" => Scalar::Fixed64,
            "fixed32" => Scalar::Fixed32,
            "bool" => Scalar::Bool,
            "string" => Scalar::String,
            "bytes" => Scalar::Bytes,
            "uint32" => Scalar::Uint32,
            "sfixed32" => Scalar::Sfixed32,
            "sfixed64" => Scalar::Sfixed64,
            "sint32" => Scalar::Sint32,
            "sint64" => Scalar::Sint64,
            _ => return None,
        })
    }

    /// Maps a `FieldDescriptorProto.Type` number onto a scalar.
    ///
    /// Returns `None` for group, message and enum (types 10, 11 and 14).
    pub fn from_descriptor_type(value: i32) -> Option<Self> {
        Some(match value {
            1 => Scalar::Double,
            2 => Scalar::Float,
            3 => Scalar::Int64,
            4 => Scalar::Uint64,
            5 => Scalar::Int32,
            6 => Scalar::Fixed64,
            7 => Scalar::Fixed32,
            8 => Scalar::Bool,
            9 => Scalar::String,
            12 => Scalar::Bytes,
            13 => Scalar::Uint32,
            15 => Scalar::Sfixed32,
            16 => Scalar::Sfixed64,
            17 => Scalar::Sint32,
            18 => Scalar::Sint64,
            _ => return None,
        })
    }
}

/// The declared type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// A scalar value type
    Scalar(Scalar),
    /// A reference to a message or enum, resolved lazily by the emitter.
    ///
    /// Descriptor input carries fully qualified names (`.pkg.Outer.Inner`);
    /// adapters usually only know the simple name.
    Named(String),
    /// A map field recovered directly by an adapter
    Map(Box<FieldType>, Box<FieldType>),
}

impl FieldType {
    /// Shorthand for a named reference
    pub fn named(name: impl Into<String>) -> Self {
        FieldType::Named(name.into())
    }

    /// Shorthand for a map type
    pub fn map(key: FieldType, value: FieldType) -> Self {
        FieldType::Map(Box::new(key), Box::new(value))
    }

    /// Parses a scalar keyword, falling back to a named reference
    pub fn parse(name: &str) -> Self {
        match Scalar::from_name(name) {
            Some(scalar) => FieldType::Scalar(scalar),
            None => FieldType::Named(name.to_string()),
        }
    }
}

impl From<Scalar> for FieldType {
    fn from(scalar: Scalar) -> Self {
        FieldType::Scalar(scalar)
    }
}

/// Field cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Label {
    /// Singular field (`optional` in proto2, implicit in proto3)
    #[default]
    Optional,
    /// Proto2 `required`
    Required,
    /// `repeated`
    Repeated,
}

impl Label {
    /// Maps a `FieldDescriptorProto.Label` number
    pub fn from_descriptor(value: i32) -> Self {
        match value {
            2 => Label::Required,
            3 => Label::Repeated,
            _ => Label::Optional,
        }
    }
}

/// A message field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field number (positive, unique within its message)
    pub number: i32,
    /// Cardinality
    pub label: Label,
    /// Declared type
    pub ty: FieldType,
    /// Index into the owning message's [`Message::oneofs`]
    pub oneof_index: Option<usize>,
    /// Explicit presence in proto3 (`optional` keyword)
    pub proto3_optional: bool,
    /// Proto2 default value, as written in the descriptor
    pub default_value: Option<String>,
    /// JSON name, when the descriptor carried one
    pub json_name: Option<String>,
    /// `[packed = ...]` option
    pub packed: Option<bool>,
    /// `[deprecated = true]` option
    pub deprecated: bool,
}

impl Default for FieldType {
    fn default() -> Self {
        FieldType::Scalar(Scalar::Int32)
    }
}

impl Field {
    /// Creates a singular field
    pub fn new(name: impl Into<String>, number: i32, ty: impl Into<FieldType>) -> Self {
        Self {
            name: name.into(),
            number,
            ty: ty.into(),
            ..Default::default()
        }
    }

    /// Marks the field as repeated
    pub fn repeated(mut self) -> Self {
        self.label = Label::Repeated;
        self
    }

    /// Places the field into the oneof group at `index`
    pub fn in_oneof(mut self, index: usize) -> Self {
        self.oneof_index = Some(index);
        self
    }

    /// Marks the field as a proto3 `optional`
    pub fn optional(mut self) -> Self {
        self.proto3_optional = true;
        self
    }

    /// Sets the cardinality
    pub fn with_label(mut self, label: Label) -> Self {
        self.label = label;
        self
    }
}

/// A oneof group. Members are the fields whose `oneof_index` points here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Oneof {
    /// Group name
    pub name: String,
}

impl Oneof {
    /// Creates a oneof group
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A message declaration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Simple name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<Field>,
    /// Oneof groups in declaration order
    pub oneofs: Vec<Oneof>,
    /// Nested messages
    pub messages: Vec<Message>,
    /// Nested enums
    pub enums: Vec<Enum>,
    /// Synthetic map-entry marker.
    ///
    /// `Some(_)` when the source carried an explicit marker (descriptor
    /// `map_entry` option), `None` when only the structure is known.
    pub map_entry: Option<bool>,
    /// Reserved field numbers, end exclusive
    pub reserved_ranges: Vec<Range<i32>>,
    /// Reserved field names
    pub reserved_names: Vec<String>,
}

impl Message {
    /// Creates an empty message
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Appends a field
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Appends a oneof group
    pub fn with_oneof(mut self, oneof: Oneof) -> Self {
        self.oneofs.push(oneof);
        self
    }

    /// Appends a nested message
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Appends a nested enum
    pub fn with_enum(mut self, enum_type: Enum) -> Self {
        self.enums.push(enum_type);
        self
    }

    /// Index of the oneof named `name`, appending it if absent
    pub fn oneof_index_or_insert(&mut self, name: &str) -> usize {
        match self.oneofs.iter().position(|o| o.name == name) {
            Some(index) => index,
            None => {
                self.oneofs.push(Oneof::new(name));
                self.oneofs.len() - 1
            }
        }
    }
}

/// An enum value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnumValue {
    /// Value name
    pub name: String,
    /// Numeric value
    pub number: i32,
    /// `[deprecated = true]` option
    pub deprecated: bool,
}

impl EnumValue {
    /// Creates an enum value
    pub fn new(name: impl Into<String>, number: i32) -> Self {
        Self {
            name: name.into(),
            number,
            deprecated: false,
        }
    }
}

/// An enum declaration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Enum {
    /// Simple name
    pub name: String,
    /// Values in declaration order; aliases allowed
    pub values: Vec<EnumValue>,
    /// `option allow_alias = true;`
    pub allow_alias: bool,
    /// Reserved numbers, end inclusive
    pub reserved_ranges: Vec<RangeInclusive<i32>>,
    /// Reserved value names
    pub reserved_names: Vec<String>,
}

impl Enum {
    /// Creates an empty enum
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Appends a value
    pub fn with_value(mut self, name: impl Into<String>, number: i32) -> Self {
        self.values.push(EnumValue::new(name, number));
        self
    }
}

/// An RPC method
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Method {
    /// Method name
    pub name: String,
    /// Request type reference
    pub input_type: String,
    /// Response type reference
    pub output_type: String,
    /// `stream` request
    pub client_streaming: bool,
    /// `stream` response
    pub server_streaming: bool,
}

/// A service declaration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Service {
    /// Service name
    pub name: String,
    /// Methods in declaration order
    pub methods: Vec<Method>,
}

/// Import modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportKind {
    /// `import "x";`
    #[default]
    Plain,
    /// `import public "x";`
    Public,
    /// `import weak "x";`
    Weak,
}

/// An imported file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dependency {
    /// Import path as written in the original file
    pub path: String,
    /// Modifier
    pub kind: ImportKind,
}

impl Dependency {
    /// Creates a plain import
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ImportKind::Plain,
        }
    }
}

/// Value of a file-level option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Quoted string
    String(String),
    /// `true` / `false`
    Bool(bool),
    /// Bare identifier (enum constant)
    Ident(String),
}

/// A file-level option such as `go_package`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOption {
    /// Option name
    pub name: String,
    /// Option value
    pub value: OptionValue,
}

/// One reconstructed `.proto` file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaFile {
    /// File name recorded by the generator, if any (`foo/bar.proto`)
    pub name: Option<String>,
    /// Package name, empty when absent
    pub package: String,
    /// Syntax level
    pub syntax: Syntax,
    /// Imports in declaration order
    pub dependencies: Vec<Dependency>,
    /// Top-level messages in first-seen order
    pub messages: Vec<Message>,
    /// Top-level enums in first-seen order
    pub enums: Vec<Enum>,
    /// Services in declaration order
    pub services: Vec<Service>,
    /// File options in declaration order
    pub options: Vec<FileOption>,
}

impl SchemaFile {
    /// Creates an empty proto3 file
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the package
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    /// Appends a top-level message
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Appends a top-level enum
    pub fn with_enum(mut self, enum_type: Enum) -> Self {
        self.enums.push(enum_type);
        self
    }

    /// Adds an import unless it is already present
    pub fn add_dependency(&mut self, path: &str) {
        if !self.dependencies.iter().any(|d| d.path == path) {
            self.dependencies.push(Dependency::new(path));
        }
    }

    /// Returns true if the file declares nothing
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.enums.is_empty() && self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax() {
        assert_eq!(Syntax::try_from("").unwrap(), Syntax::Proto2);
        assert_eq!(Syntax::try_from("proto2").unwrap(), Syntax::Proto2);
        assert_eq!(Syntax::try_from("proto3").unwrap(), Syntax::Proto3);
        assert!(Syntax::try_from("editions").is_err());
    }

    #[test]
    fn test_scalar_names() {
        for n in [1, 2, 3, 4, 5, 6, 7, 8, 9, 12, 13, 15, 16, 17, 18] {
            let scalar = Scalar::from_descriptor_type(n).unwrap();
            assert_eq!(Scalar::from_name(scalar.as_str()), Some(scalar));
        }
        assert_eq!(Scalar::from_descriptor_type(11), None);
        assert_eq!(FieldType::parse("Foo"), FieldType::named("Foo"));
        assert_eq!(FieldType::parse("sint64"), FieldType::Scalar(Scalar::Sint64));
    }

    #[test]
    fn test_oneof_index_or_insert() {
        let mut msg = Message::new("M");
        assert_eq!(msg.oneof_index_or_insert("kind"), 0);
        assert_eq!(msg.oneof_index_or_insert("other"), 1);
        assert_eq!(msg.oneof_index_or_insert("kind"), 0);
        assert_eq!(msg.oneofs.len(), 2);
    }

    #[test]
    fn test_add_dependency_dedups() {
        let mut file = SchemaFile::new();
        file.add_dependency("google/protobuf/timestamp.proto");
        file.add_dependency("google/protobuf/timestamp.proto");
        assert_eq!(file.dependencies.len(), 1);
    }
}
