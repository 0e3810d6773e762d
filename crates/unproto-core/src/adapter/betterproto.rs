//! Adapter for Python modules generated by betterproto.
//!
//! Fields are class attributes assigned from `betterproto.<kind>_field(n, ...)`;
//! oneof membership is the `group=` keyword and scopes follow indentation.

use super::{well_known, SchemaAdapter};
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{Error, Result};
use crate::model::{Enum, EnumValue, Field, FieldType, Label, Message, Scalar, SchemaFile};
use crate::scan::{self, Lang};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

static CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^([ \t]*)class\s+(\w+)\s*\(\s*betterproto\.(Message|Enum)\s*\)\s*:")
        .expect("valid regex")
});

static FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(\w+)\s*:\s*([^=\n]+?)\s*=\s*betterproto\.(\w+)_field\s*\(")
        .expect("valid regex")
});

static ENUM_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(\w+)\s*=\s*(-?\d+)\s*$").expect("valid regex"));

/// betterproto output (`*.py`)
#[derive(Debug, Clone, Copy, Default)]
pub struct BetterprotoAdapter;

impl SchemaAdapter for BetterprotoAdapter {
    fn parse(&self, source: &str, diags: &mut Diagnostics) -> Result<SchemaFile> {
        let masked = scan::mask_comments(source, Lang::PYTHON);
        let mut parser = Parser {
            diags,
            imports: Vec::new(),
        };

        let mut file = SchemaFile::new();
        for class in classes(&masked) {
            match class.kind {
                Kind::Message => {
                    let message = parser.message(&class);
                    file.messages.push(message);
                }
                Kind::Enum => file.enums.push(enumeration(&class)),
            }
        }

        if file.messages.is_empty() && file.enums.is_empty() {
            return Err(Error::payload_not_found("betterproto `betterproto.Message` classes"));
        }
        for import in parser.imports {
            file.add_dependency(import);
        }

        debug!(
            "betterproto: {} messages, {} enums",
            file.messages.len(),
            file.enums.len()
        );
        Ok(file)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Message,
    Enum,
}

#[derive(Debug)]
struct Class<'t> {
    name: &'t str,
    kind: Kind,
    /// Header through the last body line
    span: Range<usize>,
    body: &'t str,
}

/// Classes declared at the shallowest indentation of `text`
fn classes(text: &str) -> Vec<Class<'_>> {
    let headers: Vec<_> = CLASS.captures_iter(text).collect();
    let Some(level) = headers.iter().map(|c| c[1].len()).min() else {
        return Vec::new();
    };

    headers
        .into_iter()
        .filter(|caps| caps[1].len() == level)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(2)?.as_str();
            let kind = match &caps[3] {
                "Enum" => Kind::Enum,
                _ => Kind::Message,
            };
            let body = scan::indented_block(text, whole.end());
            let end = if body.is_empty() {
                whole.end()
            } else {
                offset_in(text, body) + body.len()
            };
            Some(Class {
                name,
                kind,
                span: whole.start()..end,
                body,
            })
        })
        .collect()
}

/// Byte offset of `inner`, a subslice of `outer`
fn offset_in(outer: &str, inner: &str) -> usize {
    inner.as_ptr() as usize - outer.as_ptr() as usize
}

/// Splits call arguments at top-level commas
fn split_args(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Arguments inside the outer `[...]` of a subscripted annotation
fn subscript_args(annotation: &str) -> Vec<&str> {
    match (annotation.find('['), annotation.ends_with(']')) {
        (Some(open), true) => split_args(&annotation[open + 1..annotation.len() - 1]),
        _ => Vec::new(),
    }
}

fn unquote(text: &str) -> &str {
    text.trim().trim_matches(|c| c == '"' || c == '\'')
}

/// Strips `Optional[..]` and `List[..]`; reports whether a list was seen
fn unwrap_annotation(annotation: &str) -> (&str, bool) {
    let mut current = unquote(annotation);
    let mut repeated = false;
    loop {
        let bare = current.trim_start_matches("typing.");
        let Some(open) = bare.find('[') else {
            return (unquote(bare), repeated);
        };
        match &bare[..open] {
            "List" | "list" | "Sequence" => repeated = true,
            "Optional" => {}
            _ => return (unquote(bare), repeated),
        }
        if !bare.ends_with(']') {
            return (unquote(bare), repeated);
        }
        current = unquote(&bare[open + 1..bare.len() - 1]);
    }
}

/// Scalar named by a `betterproto.TYPE_*` constant
fn type_constant(constant: &str) -> Option<Scalar> {
    let name = constant.trim().rsplit('.').next()?.strip_prefix("TYPE_")?;
    Scalar::from_name(&name.to_ascii_lowercase())
}

struct Parser<'d> {
    diags: &'d mut Diagnostics,
    imports: Vec<&'static str>,
}

impl Parser<'_> {
    fn message(&mut self, class: &Class<'_>) -> Message {
        let nested = classes(class.body);
        let spans: Vec<_> = nested.iter().map(|c| c.span.clone()).collect();
        let own = scan::blank_spans(class.body, &spans);

        let mut message = Message::new(class.name);
        for inner in &nested {
            match inner.kind {
                Kind::Message => {
                    let nested_message = self.message(inner);
                    message.messages.push(nested_message);
                }
                Kind::Enum => message.enums.push(enumeration(inner)),
            }
        }

        for caps in FIELD.captures_iter(&own) {
            let Some(whole) = caps.get(0) else { continue };
            let open = whole.end() - 1;
            let Some(close) = scan::find_matching(&own, open, Lang::PYTHON) else {
                continue;
            };
            let args = split_args(&own[open + 1..close]);
            let (positional, keywords): (Vec<&str>, Vec<&str>) =
                args.into_iter().partition(|a| !a.contains('='));
            let keyword = |key: &str| {
                keywords.iter().find_map(|k| {
                    let (k, v) = k.split_once('=')?;
                    (k.trim() == key).then(|| v.trim())
                })
            };

            let name = &caps[1];
            let Some(number) = positional.first().and_then(|n| n.parse().ok()) else {
                debug!("betterproto: field {} has no number", name);
                continue;
            };

            let annotation = caps[2].trim();
            let (inner, repeated) = unwrap_annotation(annotation);
            let ty = match &caps[3] {
                "map" => self.map_type(&positional, annotation, name),
                "message" => match keyword("wraps").and_then(type_constant) {
                    Some(scalar) => self.wrapper(scalar),
                    None => self.python_type(inner),
                },
                "enum" => self.python_type(inner),
                kind => match Scalar::from_name(kind) {
                    Some(scalar) => scalar.into(),
                    None => self.python_type(inner),
                },
            };

            let mut field = Field::new(name, number, ty);
            if repeated && !matches!(field.ty, FieldType::Map(..)) {
                field.label = Label::Repeated;
            }
            let optional = keyword("optional") == Some("True");
            field.proto3_optional = optional;
            if let Some(group) = keyword("group").map(unquote) {
                if !optional {
                    field.oneof_index = Some(message.oneof_index_or_insert(group));
                }
            }
            message.fields.push(field);
        }

        message
    }

    fn map_type(&mut self, positional: &[&str], annotation: &str, name: &str) -> FieldType {
        let key = positional.get(1).and_then(|k| type_constant(k));
        let value_constant = positional.get(2).copied().unwrap_or("");
        let value = match type_constant(value_constant) {
            Some(scalar) => Some(scalar.into()),
            None => subscript_args(unquote(annotation))
                .get(1)
                .map(|v| self.python_type(unwrap_annotation(v).0)),
        };

        match (key, value) {
            (Some(key), Some(value)) => FieldType::map(key.into(), value),
            (key, value) => {
                self.diags.warn(
                    WarningKind::IncompleteMap,
                    format!("map field {} lacks a recoverable key or value type", name),
                );
                FieldType::map(
                    key.unwrap_or(Scalar::String).into(),
                    value.unwrap_or(Scalar::Bytes.into()),
                )
            }
        }
    }

    fn wrapper(&mut self, scalar: Scalar) -> FieldType {
        let name = match scalar {
            Scalar::Double => "DoubleValue",
            Scalar::Float => "FloatValue",
            Scalar::Int64 => "Int64Value",
            Scalar::Uint64 => "UInt64Value",
            Scalar::Int32 => "Int32Value",
            Scalar::Uint32 => "UInt32Value",
            Scalar::Bool => "BoolValue",
            Scalar::String => "StringValue",
            Scalar::Bytes => "BytesValue",
            other => return other.into(),
        };
        self.well_known(name).unwrap_or_else(|| FieldType::named(name))
    }

    fn well_known(&mut self, name: &str) -> Option<FieldType> {
        let (full, import) = well_known(name)?;
        self.imports.push(import);
        Some(FieldType::Named(full))
    }

    /// Converts an annotation such as `"_other__.Thing"` into a reference
    fn python_type(&mut self, annotation: &str) -> FieldType {
        match annotation {
            "datetime" | "datetime.datetime" => {
                return self
                    .well_known("Timestamp")
                    .unwrap_or_else(|| FieldType::named("Timestamp"))
            }
            "timedelta" | "datetime.timedelta" => {
                return self
                    .well_known("Duration")
                    .unwrap_or_else(|| FieldType::named("Duration"))
            }
            _ => {}
        }

        let segments: Vec<&str> = annotation.split('.').collect();
        let last = segments.last().copied().unwrap_or(annotation);
        if segments.iter().any(|s| s.contains("google_protobuf")) {
            if let Some(ty) = self.well_known(last) {
                return ty;
            }
        }

        let path: Vec<&str> = segments.into_iter().filter(|s| !s.starts_with('_')).collect();
        if path.is_empty() {
            FieldType::named(last)
        } else {
            FieldType::named(path.join("."))
        }
    }
}

fn enumeration(class: &Class<'_>) -> Enum {
    let nested: Vec<_> = classes(class.body).into_iter().map(|c| c.span).collect();
    let own = scan::blank_spans(class.body, &nested);

    let mut enum_type = Enum::new(class.name);
    for caps in ENUM_VALUE.captures_iter(&own) {
        if let Ok(number) = caps[2].parse() {
            enum_type.values.push(EnumValue::new(&caps[1], number));
        }
    }
    enum_type
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Oneof, Syntax};
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"# Generated by the protocol buffer compiler.  DO NOT EDIT!
# sources: shapes.proto
# plugin: python-betterproto
from dataclasses import dataclass
from datetime import datetime
from typing import Dict, List, Optional

import betterproto


class Color(betterproto.Enum):
    """Colors: {not a brace problem}"""

    RED = 0
    DARK_BLUE = 1


@dataclass(eq=False, repr=False)
class Shape(betterproto.Message):
    """A shape."""

    name: str = betterproto.string_field(1)
    points: List["Point"] = betterproto.message_field(2)
    tags: Dict[str, "Point"] = betterproto.map_field(
        3, betterproto.TYPE_STRING, betterproto.TYPE_MESSAGE
    )
    counts: Dict[str, int] = betterproto.map_field(4, betterproto.TYPE_STRING, betterproto.TYPE_INT64)
    color: "Color" = betterproto.enum_field(5)
    created: datetime = betterproto.message_field(6)
    circle: "Circle" = betterproto.message_field(7, group="kind")
    square: "Square" = betterproto.message_field(8, group="kind")
    weight: Optional[float] = betterproto.double_field(9, optional=True, group="_weight")
    label: Optional[str] = betterproto.message_field(10, wraps=betterproto.TYPE_STRING)
    raw: bytes = betterproto.bytes_field(11)
    ids: List[int] = betterproto.sint64_field(12)
    other: "_other__.Thing" = betterproto.message_field(13)

    class Corner(betterproto.Message):
        x: int = betterproto.int32_field(1)


@dataclass(eq=False, repr=False)
class Point(betterproto.Message):
    x: int = betterproto.int32_field(1)
    y: int = betterproto.int32_field(2)
"#;

    fn parse(text: &str) -> (SchemaFile, Diagnostics) {
        let mut diags = Diagnostics::new();
        let file = BetterprotoAdapter.parse(text, &mut diags).unwrap();
        (file, diags)
    }

    #[test]
    fn test_declarations() {
        let (file, diags) = parse(SAMPLE);
        assert!(diags.is_empty());
        assert_eq!(file.syntax, Syntax::Proto3);
        assert_eq!(
            file.enums,
            vec![Enum::new("Color").with_value("RED", 0).with_value("DARK_BLUE", 1)]
        );
        let names: Vec<_> = file.messages.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Shape", "Point"]);
        assert_eq!(file.messages[0].messages[0].name, "Corner");
        assert_eq!(file.messages[1].fields.len(), 2);
    }

    #[test]
    fn test_field_kinds() {
        let (file, _) = parse(SAMPLE);
        let shape = &file.messages[0];
        let field = |name: &str| shape.fields.iter().find(|f| f.name == name).unwrap();

        assert_eq!(field("name").ty, FieldType::Scalar(Scalar::String));
        assert_eq!(field("points").label, Label::Repeated);
        assert_eq!(field("points").ty, FieldType::named("Point"));
        assert_eq!(
            field("tags").ty,
            FieldType::map(Scalar::String.into(), FieldType::named("Point"))
        );
        assert_eq!(field("tags").label, Label::Optional);
        assert_eq!(
            field("counts").ty,
            FieldType::map(Scalar::String.into(), Scalar::Int64.into())
        );
        assert_eq!(field("color").ty, FieldType::named("Color"));
        assert_eq!(field("created").ty, FieldType::named("google.protobuf.Timestamp"));
        assert_eq!(field("label").ty, FieldType::named("google.protobuf.StringValue"));
        assert_eq!(field("raw").ty, FieldType::Scalar(Scalar::Bytes));
        assert_eq!(field("ids").ty, FieldType::Scalar(Scalar::Sint64));
        assert_eq!(field("ids").label, Label::Repeated);
        assert_eq!(field("other").ty, FieldType::named("Thing"));

        let imports: Vec<_> = file.dependencies.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(
            imports,
            ["google/protobuf/timestamp.proto", "google/protobuf/wrappers.proto"]
        );
    }

    #[test]
    fn test_oneof_and_optional() {
        let (file, _) = parse(SAMPLE);
        let shape = &file.messages[0];
        assert_eq!(shape.oneofs, vec![Oneof::new("kind")]);

        let members: Vec<_> = shape
            .fields
            .iter()
            .filter(|f| f.oneof_index == Some(0))
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(members, ["circle", "square"]);

        let weight = shape.fields.iter().find(|f| f.name == "weight").unwrap();
        assert!(weight.proto3_optional);
        assert_eq!(weight.oneof_index, None);
    }

    #[test]
    fn test_incomplete_map_warns() {
        let text = r#"
class Broken(betterproto.Message):
    lookup: Dict = betterproto.map_field(1, betterproto.TYPE_STRING, betterproto.TYPE_MESSAGE)
"#;
        let (file, diags) = parse(text);
        assert_eq!(diags.count(WarningKind::IncompleteMap), 1);
        assert_eq!(
            file.messages[0].fields[0].ty,
            FieldType::map(Scalar::String.into(), Scalar::Bytes.into())
        );
    }

    #[test]
    fn test_no_classes_is_not_found() {
        let err = BetterprotoAdapter
            .parse("import os\n", &mut Diagnostics::new())
            .unwrap_err();
        assert!(err.is_skippable());
    }

    #[test]
    fn test_unwrap_annotation() {
        assert_eq!(unwrap_annotation("Optional[List[\"Foo\"]]"), ("Foo", true));
        assert_eq!(unwrap_annotation("\"Bar\""), ("Bar", false));
        assert_eq!(unwrap_annotation("Dict[str, int]"), ("Dict[str, int]", false));
    }
}
