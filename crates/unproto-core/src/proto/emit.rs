//! Rendering a [`SchemaFile`] as `.proto` source.
//!
//! Output is fully determined by the model and the configuration. File
//! layout is: syntax, package, imports, options, then enums, messages and
//! services, one blank line between sections. Message bodies list reserved
//! declarations, nested enums, nested messages, plain fields, map fields and
//! finally oneof groups.

use super::resolve::{join, Resolved, TypeIndex};
use super::ReconstructorConfig;
use crate::case::to_json_name;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::model::{
    Enum, Field, FieldType, FileOption, ImportKind, Label, Message, Method, OptionValue, Scalar,
    SchemaFile, Service, Syntax,
};
use crate::MAX_FIELD_NUMBER;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as FmtWrite;
use std::ops::RangeInclusive;
use tracing::debug;

/// Field numbers protoc refuses for user fields
const RESERVED_BY_PROTOBUF: RangeInclusive<i32> = 19_000..=19_999;

/// Renders `file` as `.proto` text
pub fn emit(file: &SchemaFile, config: &ReconstructorConfig, diags: &mut Diagnostics) -> String {
    let mut output = String::new();
    emit_to(file, config, diags, &mut output).expect("String write cannot fail");
    output
}

/// Writes the `.proto` text for `file` into `w`
pub fn emit_to(
    file: &SchemaFile,
    config: &ReconstructorConfig,
    diags: &mut Diagnostics,
    w: &mut impl FmtWrite,
) -> std::fmt::Result {
    let mut writer = ProtoEmitter::new(w, file, config, diags);
    writer.write_file(file)
}

struct ProtoEmitter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a ReconstructorConfig,
    diags: &'a mut Diagnostics,
    index: TypeIndex,
    syntax: Syntax,
    indent_level: usize,
    /// Package-relative path of the message being written
    scope: String,
}

/// Key and value of a map entry that will be collapsed
type Entry<'m> = (&'m Field, &'m Field);

impl<'a, W: FmtWrite> ProtoEmitter<'a, W> {
    fn new(
        writer: &'a mut W,
        file: &SchemaFile,
        config: &'a ReconstructorConfig,
        diags: &'a mut Diagnostics,
    ) -> Self {
        Self {
            writer,
            config,
            diags,
            index: TypeIndex::build(file),
            syntax: file.syntax,
            indent_level: 0,
            scope: String::new(),
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> std::fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.config.indent_str)?;
        }
        Ok(())
    }

    fn writeln(&mut self, s: &str) -> std::fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "{}", s)
    }

    fn write_file(&mut self, file: &SchemaFile) -> std::fmt::Result {
        writeln!(self.writer, "syntax = \"{}\";", file.syntax.as_str())?;

        if !file.package.is_empty() {
            writeln!(self.writer)?;
            writeln!(self.writer, "package {};", file.package)?;
        }

        if !file.dependencies.is_empty() {
            writeln!(self.writer)?;
            for dep in &file.dependencies {
                let modifier = match dep.kind {
                    ImportKind::Plain => "",
                    ImportKind::Public => "public ",
                    ImportKind::Weak => "weak ",
                };
                writeln!(self.writer, "import {}\"{}\";", modifier, escape_string(&dep.path))?;
            }
        }

        if !file.options.is_empty() {
            writeln!(self.writer)?;
            for option in &file.options {
                self.write_file_option(option)?;
            }
        }

        self.check_names("file", &file.enums, &file.messages);

        for enum_type in &file.enums {
            writeln!(self.writer)?;
            self.write_enum(enum_type)?;
        }
        for message in &file.messages {
            writeln!(self.writer)?;
            self.write_message(message)?;
        }
        for service in &file.services {
            writeln!(self.writer)?;
            self.write_service(service)?;
        }

        Ok(())
    }

    fn write_file_option(&mut self, option: &FileOption) -> std::fmt::Result {
        match &option.value {
            OptionValue::String(v) => {
                writeln!(self.writer, "option {} = \"{}\";", option.name, escape_string(v))
            }
            OptionValue::Bool(v) => writeln!(self.writer, "option {} = {};", option.name, v),
            OptionValue::Ident(v) => writeln!(self.writer, "option {} = {};", option.name, v),
        }
    }

    fn write_service(&mut self, service: &Service) -> std::fmt::Result {
        writeln!(self.writer, "service {} {{", service.name)?;
        self.indent();

        for method in &service.methods {
            self.write_method(method)?;
        }

        self.dedent();
        writeln!(self.writer, "}}")
    }

    fn write_method(&mut self, method: &Method) -> std::fmt::Result {
        let input = self.reference(&method.input_type);
        let output = self.reference(&method.output_type);
        let stream = |streaming: bool| if streaming { "stream " } else { "" };

        self.write_indent()?;
        writeln!(
            self.writer,
            "rpc {}({}{}) returns ({}{});",
            method.name,
            stream(method.client_streaming),
            input,
            stream(method.server_streaming),
            output
        )
    }

    fn write_message(&mut self, message: &Message) -> std::fmt::Result {
        let path = join(&self.scope, &message.name);
        self.write_indent()?;
        writeln!(self.writer, "message {} {{", message.name)?;
        self.indent();
        let outer = std::mem::replace(&mut self.scope, path.clone());

        self.check_field_numbers(&path, message);
        self.check_names(&path, &message.enums, &message.messages);

        self.write_reserved_ranges(
            &path,
            message
                .reserved_ranges
                .iter()
                .map(|r| (r.start, r.end.saturating_sub(1), MAX_FIELD_NUMBER as i32)),
        )?;
        self.write_reserved_names(&message.reserved_names)?;

        let entries = self.map_entries(message, &path);

        for enum_type in &message.enums {
            self.write_enum(enum_type)?;
        }
        for nested in &message.messages {
            if !entries.contains_key(&join(&path, &nested.name)) {
                self.write_message(nested)?;
            }
        }

        let mut plain = Vec::new();
        let mut maps = Vec::new();
        let mut groups: Vec<Vec<&Field>> = vec![Vec::new(); message.oneofs.len()];

        for field in &message.fields {
            match field.oneof_index {
                Some(index) if !field.proto3_optional => match groups.get_mut(index) {
                    Some(members) => members.push(field),
                    None => {
                        self.diags.warn(
                            WarningKind::MissingOneof,
                            format!(
                                "field '{}.{}' refers to oneof #{} which does not exist",
                                path, field.name, index
                            ),
                        );
                        plain.push(field);
                    }
                },
                _ => match self.entry_of(field, &path, &entries) {
                    Some(entry) => maps.push((field, Some(entry))),
                    None if matches!(field.ty, FieldType::Map(..)) => maps.push((field, None)),
                    None => plain.push(field),
                },
            }
        }

        for field in plain {
            self.write_field(field, false)?;
        }
        for (field, entry) in maps {
            self.write_map_field(field, entry)?;
        }
        for (oneof, mut members) in message.oneofs.iter().zip(groups) {
            if members.is_empty() {
                continue;
            }
            members.sort_by_key(|f| f.number);

            self.write_indent()?;
            writeln!(self.writer, "oneof {} {{", oneof.name)?;
            self.indent();
            for field in members {
                self.write_field(field, true)?;
            }
            self.dedent();
            self.writeln("}")?;
        }

        self.scope = outer;
        self.dedent();
        self.writeln("}")
    }

    /// Nested messages of `message` that collapse into `map<K, V>` fields,
    /// keyed by their package-relative path.
    fn map_entries<'m>(&mut self, message: &'m Message, path: &str) -> HashMap<String, Entry<'m>> {
        let mut entries = HashMap::new();

        for nested in &message.messages {
            let nested_path = join(path, &nested.name);
            let is_entry = match nested.map_entry {
                Some(marker) => marker,
                None => {
                    self.config.map_entry_heuristic
                        && looks_like_entry(nested)
                        && message.fields.iter().any(|f| {
                            f.label == Label::Repeated
                                && self.local_path(&f.ty, path).as_deref() == Some(nested_path.as_str())
                        })
                }
            };
            if !is_entry {
                continue;
            }

            let key = nested.fields.iter().find(|f| f.number == 1);
            let value = nested.fields.iter().find(|f| f.number == 2);
            match (key, value) {
                (Some(key), Some(value)) => {
                    debug!("Collapsing map entry {}", nested_path);
                    entries.insert(nested_path, (key, value));
                }
                _ => self.diags.warn(
                    WarningKind::IncompleteMap,
                    format!("map entry '{}' lacks a key or value field", nested_path),
                ),
            }
        }

        entries
    }

    fn entry_of<'m>(
        &self,
        field: &Field,
        path: &str,
        entries: &HashMap<String, Entry<'m>>,
    ) -> Option<Entry<'m>> {
        if field.label != Label::Repeated || entries.is_empty() {
            return None;
        }
        self.local_path(&field.ty, path)
            .and_then(|p| entries.get(&p).copied())
    }

    /// Resolves a named type without reporting anything
    fn local_path(&self, ty: &FieldType, scope: &str) -> Option<String> {
        let FieldType::Named(name) = ty else {
            return None;
        };
        match self.index.resolve(name, scope, &mut Diagnostics::new()) {
            Resolved::Local(path) => Some(path),
            Resolved::External(_) => None,
        }
    }

    fn write_field(&mut self, field: &Field, in_oneof: bool) -> std::fmt::Result {
        let label = if in_oneof {
            ""
        } else {
            match field.label {
                Label::Repeated => "repeated ",
                Label::Required => "required ",
                Label::Optional if field.proto3_optional || self.syntax == Syntax::Proto2 => {
                    "optional "
                }
                Label::Optional => "",
            }
        };
        let ty = self.type_text(&field.ty);
        let options = self.field_options(field);

        self.write_indent()?;
        writeln!(
            self.writer,
            "{}{} {} = {}{};",
            label, ty, field.name, field.number, options
        )
    }

    fn write_map_field(&mut self, field: &Field, entry: Option<Entry<'_>>) -> std::fmt::Result {
        let ty = match entry {
            Some((key, value)) => format!(
                "map<{}, {}>",
                self.type_text(&key.ty),
                self.type_text(&value.ty)
            ),
            None => self.type_text(&field.ty),
        };
        let options = self.field_options(field);

        self.write_indent()?;
        writeln!(
            self.writer,
            "{} {} = {}{};",
            ty, field.name, field.number, options
        )
    }

    fn field_options(&self, field: &Field) -> String {
        let mut options = Vec::new();

        if self.syntax == Syntax::Proto2 {
            if let Some(default) = &field.default_value {
                let formatted = match field.ty {
                    FieldType::Scalar(Scalar::String) => format!("\"{}\"", escape_string(default)),
                    // Descriptors store bytes defaults already C-escaped.
                    FieldType::Scalar(Scalar::Bytes) => format!("\"{}\"", default),
                    _ => default.clone(),
                };
                options.push(format!("default = {}", formatted));
            }
        }

        if let Some(json_name) = &field.json_name {
            if *json_name != to_json_name(&field.name) {
                options.push(format!("json_name = \"{}\"", escape_string(json_name)));
            }
        }

        if let Some(packed) = field.packed {
            options.push(format!("packed = {}", packed));
        }

        if field.deprecated {
            options.push("deprecated = true".to_string());
        }

        if options.is_empty() {
            String::new()
        } else {
            format!(" [{}]", options.join(", "))
        }
    }

    fn type_text(&mut self, ty: &FieldType) -> String {
        match ty {
            FieldType::Scalar(scalar) => scalar.as_str().to_string(),
            FieldType::Named(name) => self.reference(name),
            FieldType::Map(key, value) => {
                format!("map<{}, {}>", self.type_text(key), self.type_text(value))
            }
        }
    }

    fn reference(&mut self, name: &str) -> String {
        match self.index.resolve(name, &self.scope, self.diags) {
            Resolved::Local(path) => self.index.spelling(&path, &self.scope),
            Resolved::External(text) => text,
        }
    }

    fn write_enum(&mut self, enum_type: &Enum) -> std::fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "enum {} {{", enum_type.name)?;
        self.indent();

        let mut seen = HashSet::new();
        let values: Vec<_> = enum_type
            .values
            .iter()
            .filter(|v| seen.insert((v.name.as_str(), v.number)))
            .collect();

        let mut numbers = HashSet::new();
        let aliased = values.iter().any(|v| !numbers.insert(v.number));
        if aliased {
            self.writeln("option allow_alias = true;")?;
        }

        let path = join(&self.scope, &enum_type.name);
        self.write_reserved_ranges(
            &path,
            enum_type
                .reserved_ranges
                .iter()
                .map(|r| (*r.start(), *r.end(), i32::MAX)),
        )?;
        self.write_reserved_names(&enum_type.reserved_names)?;

        for value in values {
            self.write_indent()?;
            write!(self.writer, "{} = {}", value.name, value.number)?;
            if value.deprecated {
                write!(self.writer, " [deprecated = true]")?;
            }
            writeln!(self.writer, ";")?;
        }

        self.dedent();
        self.writeln("}")
    }

    /// Writes inclusive `(start, end)` ranges; `end == max` prints as `max`.
    /// Inverted ranges are dropped with a warning.
    fn write_reserved_ranges(
        &mut self,
        path: &str,
        ranges: impl Iterator<Item = (i32, i32, i32)>,
    ) -> std::fmt::Result {
        let mut parts = Vec::new();
        for (start, end, max) in ranges {
            if end < start {
                self.diags.warn(
                    WarningKind::InvalidNumber,
                    format!("'{}': dropped inverted reserved range {} to {}", path, start, end),
                );
                continue;
            }
            parts.push(if start == end {
                    start.to_string()
            } else if end == max {
                format!("{} to max", start)
            } else {
                format!("{} to {}", start, end)
            });
        }

        if parts.is_empty() {
            return Ok(());
        }
        self.write_indent()?;
        writeln!(self.writer, "reserved {};", parts.join(", "))
    }

    fn write_reserved_names(&mut self, names: &[String]) -> std::fmt::Result {
        if names.is_empty() {
            return Ok(());
        }
        let quoted: Vec<String> = names
            .iter()
            .map(|n| format!("\"{}\"", escape_string(n)))
            .collect();
        self.write_indent()?;
        writeln!(self.writer, "reserved {};", quoted.join(", "))
    }

    fn check_field_numbers(&mut self, path: &str, message: &Message) {
        let mut owners: HashMap<i32, &str> = HashMap::new();
        for field in &message.fields {
            if field.number < 1 || field.number > MAX_FIELD_NUMBER as i32 {
                self.diags.warn(
                    WarningKind::InvalidNumber,
                    format!(
                        "field '{}.{}' has number {} outside 1 to {}",
                        path, field.name, field.number, MAX_FIELD_NUMBER
                    ),
                );
            } else if RESERVED_BY_PROTOBUF.contains(&field.number) {
                self.diags.warn(
                    WarningKind::InvalidNumber,
                    format!(
                        "field '{}.{}' uses number {} reserved for the protobuf implementation",
                        path, field.name, field.number
                    ),
                );
            }
            if let Some(previous) = owners.insert(field.number, &field.name) {
                self.diags.warn(
                    WarningKind::DuplicateFieldNumber,
                    format!(
                        "message '{}': fields '{}' and '{}' share number {}",
                        path, previous, field.name, field.number
                    ),
                );
            }
        }
    }

    fn check_names(&mut self, scope: &str, enums: &[Enum], messages: &[Message]) {
        let mut names = HashSet::new();
        let declared = enums
            .iter()
            .map(|e| e.name.as_str())
            .chain(messages.iter().map(|m| m.name.as_str()));
        for name in declared {
            if !names.insert(name) {
                self.diags.warn(
                    WarningKind::DuplicateNestedName,
                    format!("'{}' is declared twice in {}", name, scope),
                );
            }
        }
    }
}

/// Structural shape of a synthetic map entry: `XEntry { key = 1; value = 2; }`
fn looks_like_entry(message: &Message) -> bool {
    message.name.ends_with("Entry")
        && message.fields.len() == 2
        && message.messages.is_empty()
        && message.enums.is_empty()
        && message
            .fields
            .iter()
            .any(|f| f.name == "key" && f.number == 1 && f.label != Label::Repeated)
        && message
            .fields
            .iter()
            .any(|f| f.name == "value" && f.number == 2 && f.label != Label::Repeated)
}

/// Escape a string for proto syntax
fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ if c.is_ascii_control() => {
                result.push_str(&format!("\\x{:02x}", c as u8));
            }
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dependency, Oneof};
    use pretty_assertions::assert_eq;

    fn render(file: &SchemaFile) -> (String, Diagnostics) {
        let mut diags = Diagnostics::new();
        let text = emit(file, &ReconstructorConfig::default(), &mut diags);
        (text, diags)
    }

    fn entry(name: &str, key: Scalar, value: FieldType) -> Message {
        Message::new(name)
            .with_field(Field::new("key", 1, key))
            .with_field(Field::new("value", 2, value))
    }

    #[test]
    fn test_end_to_end_layout() {
        let file = SchemaFile::new()
            .with_package("p")
            .with_enum(Enum::new("Color").with_value("RED", 0).with_value("GREEN", 1))
            .with_message(
                Message::new("Pt")
                    .with_field(Field::new("x", 1, Scalar::Int32))
                    .with_field(Field::new("y", 2, Scalar::Int32)),
            );

        let (text, diags) = render(&file);
        assert_eq!(
            text,
            "syntax = \"proto3\";\n\npackage p;\n\nenum Color {\n    RED = 0;\n    GREEN = 1;\n}\n\nmessage Pt {\n    int32 x = 1;\n    int32 y = 2;\n}\n"
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn test_emit_is_idempotent() {
        let file = SchemaFile::new()
            .with_message(Message::new("A").with_field(Field::new("b", 1, FieldType::named("B"))))
            .with_message(Message::new("B"));
        assert_eq!(render(&file).0, render(&file).0);
    }

    #[test]
    fn test_message_body_order() {
        let mut message = Message::new("Shape")
            .with_oneof(Oneof::new("kind"))
            .with_field(Field::new("square", 5, FieldType::named("Square")).in_oneof(0))
            .with_field(Field::new("name", 1, Scalar::String))
            .with_field(Field::new("circle", 4, FieldType::named("Circle")).in_oneof(0))
            .with_field(Field::new(
                "tags",
                3,
                FieldType::map(Scalar::String.into(), Scalar::Int64.into()),
            ))
            .with_field(Field::new("mode", 2, FieldType::named("Mode")))
            .with_message(Message::new("Circle"))
            .with_enum(Enum::new("Mode").with_value("MODE_UNSPECIFIED", 0));
        message.reserved_ranges = vec![8..9, 10..16];
        message.reserved_names = vec!["legacy".to_string()];
        let file = SchemaFile::new()
            .with_message(message)
            .with_message(Message::new("Square"));

        let (text, diags) = render(&file);
        assert_eq!(
            text,
            r#"syntax = "proto3";

message Shape {
    reserved 8, 10 to 15;
    reserved "legacy";
    enum Mode {
        MODE_UNSPECIFIED = 0;
    }
    message Circle {
    }
    string name = 1;
    Shape.Mode mode = 2;
    map<string, int64> tags = 3;
    oneof kind {
        Shape.Circle circle = 4;
        Square square = 5;
    }
}

message Square {
}
"#
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn test_map_entry_heuristic_collapses() {
        let file = SchemaFile::new().with_message(
            Message::new("M")
                .with_message(entry("XEntry", Scalar::Int32, Scalar::String.into()))
                .with_field(Field::new("x", 3, FieldType::named("XEntry")).repeated()),
        );

        let (text, _) = render(&file);
        assert!(text.contains("    map<int32, string> x = 3;\n"), "{}", text);
        assert!(!text.contains("XEntry"), "{}", text);
    }

    #[test]
    fn test_explicit_marker_is_authoritative() {
        let mut not_entry = entry("XEntry", Scalar::Int32, Scalar::String.into());
        not_entry.map_entry = Some(false);
        let mut renamed = entry("Pair", Scalar::String, FieldType::named(".Value"));
        renamed.map_entry = Some(true);
        let file = SchemaFile::new()
            .with_message(
                Message::new("M")
                    .with_message(not_entry)
                    .with_message(renamed)
                    .with_field(Field::new("x", 1, FieldType::named(".M.XEntry")).repeated())
                    .with_field(Field::new("y", 2, FieldType::named(".M.Pair")).repeated()),
            )
            .with_message(Message::new("Value"));

        let (text, _) = render(&file);
        assert!(text.contains("    message XEntry {\n"), "{}", text);
        assert!(text.contains("    repeated M.XEntry x = 1;\n"), "{}", text);
        assert!(text.contains("    map<string, Value> y = 2;\n"), "{}", text);
        assert!(!text.contains("message Pair"), "{}", text);
    }

    #[test]
    fn test_heuristic_can_be_disabled() {
        let file = SchemaFile::new().with_message(
            Message::new("M")
                .with_message(entry("XEntry", Scalar::Int32, Scalar::String.into()))
                .with_field(Field::new("x", 3, FieldType::named("XEntry")).repeated()),
        );
        let config = ReconstructorConfig::new().map_entry_heuristic(false);
        let text = emit(&file, &config, &mut Diagnostics::new());
        assert!(text.contains("repeated M.XEntry x = 3;"), "{}", text);
    }

    #[test]
    fn test_unreferenced_entry_is_kept() {
        let file = SchemaFile::new().with_message(
            Message::new("M").with_message(entry("LogEntry", Scalar::Int32, Scalar::String.into())),
        );
        let (text, _) = render(&file);
        assert!(text.contains("message LogEntry {"), "{}", text);
    }

    #[test]
    fn test_exact_name_beats_case_insensitive_match() {
        let file = SchemaFile::new()
            .with_message(Message::new("Foo"))
            .with_message(Message::new("foo"))
            .with_message(Message::new("M").with_field(Field::new("f", 1, FieldType::named("foo"))));

        let (text, diags) = render(&file);
        assert!(text.contains("    foo f = 1;\n"), "{}", text);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_unresolved_reference_is_verbatim() {
        let file = SchemaFile::new().with_message(
            Message::new("M")
                .with_field(Field::new("a", 1, FieldType::named("Missing")))
                .with_field(Field::new("t", 2, FieldType::named("google.protobuf.Timestamp"))),
        );

        let (text, diags) = render(&file);
        assert!(text.contains("    Missing a = 1;\n"));
        assert!(text.contains("    google.protobuf.Timestamp t = 2;\n"));
        assert_eq!(diags.count(WarningKind::UnresolvedTypeReference), 1);
    }

    #[test]
    fn test_proto3_optional_hides_synthetic_oneof() {
        let file = SchemaFile::new().with_message(
            Message::new("M")
                .with_oneof(Oneof::new("_nick"))
                .with_field(Field::new("nick", 1, Scalar::String).in_oneof(0).optional()),
        );

        let (text, _) = render(&file);
        assert!(text.contains("    optional string nick = 1;\n"), "{}", text);
        assert!(!text.contains("oneof"), "{}", text);
    }

    #[test]
    fn test_proto2_labels_and_defaults() {
        let mut name = Field::new("name", 1, Scalar::String);
        name.default_value = Some("a\"b".to_string());
        let mut mode = Field::new("mode", 3, FieldType::named(".legacy.Mode"));
        mode.default_value = Some("FAST".to_string());
        mode.deprecated = true;
        let mut file = SchemaFile::new().with_package("legacy").with_message(
            Message::new("Req")
                .with_field(name)
                .with_field(Field::new("id", 2, Scalar::Int32).with_label(Label::Required))
                .with_field(mode)
                .with_field(Field::new("ids", 4, Scalar::Int32).repeated()),
        );
        file.enums.push(Enum::new("Mode").with_value("FAST", 0));
        file.syntax = Syntax::Proto2;

        let (text, _) = render(&file);
        assert!(text.starts_with("syntax = \"proto2\";\n"));
        assert!(text.contains("    optional string name = 1 [default = \"a\\\"b\"];\n"), "{}", text);
        assert!(text.contains("    required int32 id = 2;\n"));
        assert!(text.contains("    optional Mode mode = 3 [default = FAST, deprecated = true];\n"), "{}", text);
        assert!(text.contains("    repeated int32 ids = 4;\n"));
    }

    #[test]
    fn test_enum_aliases() {
        let duplicated = Enum::new("Dup")
            .with_value("A", 0)
            .with_value("B", 1)
            .with_value("A", 0);
        let aliased = Enum::new("Alias").with_value("A", 0).with_value("B", 0);
        let file = SchemaFile::new().with_enum(duplicated).with_enum(aliased);

        let (text, _) = render(&file);
        assert!(text.contains("enum Dup {\n    A = 0;\n    B = 1;\n}\n"), "{}", text);
        assert!(text.contains("enum Alias {\n    option allow_alias = true;\n    A = 0;\n    B = 0;\n}\n"), "{}", text);
    }

    #[test]
    fn test_header_services_and_options() {
        let mut file = SchemaFile::new().with_package("svc");
        file.dependencies = vec![
            Dependency::new("google/protobuf/empty.proto"),
            Dependency {
                path: "shared.proto".to_string(),
                kind: ImportKind::Public,
            },
        ];
        file.options = vec![
            FileOption {
                name: "go_package".to_string(),
                value: OptionValue::String("example.com/svc".to_string()),
            },
            FileOption {
                name: "optimize_for".to_string(),
                value: OptionValue::Ident("SPEED".to_string()),
            },
        ];
        file.messages.push(Message::new("Ping"));
        file.services.push(Service {
            name: "Echo".to_string(),
            methods: vec![Method {
                name: "Stream".to_string(),
                input_type: ".svc.Ping".to_string(),
                output_type: ".google.protobuf.Empty".to_string(),
                client_streaming: true,
                server_streaming: false,
            }],
        });

        let (text, _) = render(&file);
        assert_eq!(
            text,
            r#"syntax = "proto3";

package svc;

import "google/protobuf/empty.proto";
import public "shared.proto";

option go_package = "example.com/svc";
option optimize_for = SPEED;

message Ping {
}

service Echo {
    rpc Stream(stream Ping) returns (google.protobuf.Empty);
}
"#
        );
    }

    #[test]
    fn test_duplicates_warn_but_emit() {
        let file = SchemaFile::new()
            .with_message(
                Message::new("M")
                    .with_field(Field::new("a", 1, Scalar::Int32))
                    .with_field(Field::new("b", 1, Scalar::Int32)),
            )
            .with_message(Message::new("M"));

        let (text, diags) = render(&file);
        assert!(text.contains("int32 b = 1;"));
        assert_eq!(diags.count(WarningKind::DuplicateFieldNumber), 1);
        assert_eq!(diags.count(WarningKind::DuplicateNestedName), 1);
    }

    #[test]
    fn test_missing_oneof_falls_back_to_field() {
        let file = SchemaFile::new()
            .with_message(Message::new("M").with_field(Field::new("a", 1, Scalar::Int32).in_oneof(3)));

        let (text, diags) = render(&file);
        assert!(text.contains("    int32 a = 1;\n"));
        assert_eq!(diags.count(WarningKind::MissingOneof), 1);
    }

    #[test]
    fn test_reserved_max() {
        let mut message = Message::new("M");
        message.reserved_ranges = vec![100..MAX_FIELD_NUMBER as i32 + 1];
        let mut enum_type = Enum::new("E").with_value("ZERO", 0);
        enum_type.reserved_ranges = vec![5..=5, 10..=i32::MAX];
        let file = SchemaFile::new().with_enum(enum_type).with_message(message);

        let (text, _) = render(&file);
        assert!(text.contains("    reserved 100 to max;\n"));
        assert!(text.contains("    reserved 5, 10 to max;\n"));
    }

    #[test]
    fn test_inverted_reserved_ranges_are_dropped() {
        let mut message = Message::new("M").with_field(Field::new("a", 1, Scalar::Int32));
        message.reserved_ranges = vec![std::ops::Range { start: 1, end: i32::MIN }, 4..6];
        let mut enum_type = Enum::new("E").with_value("ZERO", 0);
        enum_type.reserved_ranges = vec![RangeInclusive::new(9, 2)];
        let file = SchemaFile::new().with_enum(enum_type).with_message(message);

        let (text, diags) = render(&file);
        assert!(text.contains("    reserved 4 to 5;\n"));
        assert!(!text.contains("reserved 1"));
        assert!(!text.contains("reserved 9"));
        assert_eq!(diags.count(WarningKind::InvalidNumber), 2);
    }

    #[test]
    fn test_invalid_field_numbers_warn() {
        let file = SchemaFile::new().with_message(
            Message::new("M")
                .with_field(Field::new("zero", 0, Scalar::Int32))
                .with_field(Field::new("negative", -3, Scalar::Int32))
                .with_field(Field::new("internal", 19_500, Scalar::Int32))
                .with_field(Field::new("huge", MAX_FIELD_NUMBER as i32 + 1, Scalar::Int32))
                .with_field(Field::new("fine", 19_999 + 1, Scalar::Int32)),
        );

        let (text, diags) = render(&file);
        assert!(text.contains("    int32 zero = 0;\n"));
        assert_eq!(diags.count(WarningKind::InvalidNumber), 4);
        assert!(diags.warnings()[0].message.contains("'M.zero'"));
    }

    #[test]
    fn test_indent_str() {
        let file = SchemaFile::new()
            .with_message(Message::new("M").with_field(Field::new("a", 1, Scalar::Int32)));
        let config = ReconstructorConfig::new().indent_str("\t");
        let text = emit(&file, &config, &mut Diagnostics::new());
        assert!(text.contains("\n\tint32 a = 1;\n"));
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("hello"), "hello");
        assert_eq!(escape_string("hello\\world"), "hello\\\\world");
        assert_eq!(escape_string("hello\"world"), "hello\\\"world");
        assert_eq!(escape_string("hello\nworld"), "hello\\nworld");
    }
}
