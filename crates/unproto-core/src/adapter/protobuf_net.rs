//! Adapter for C# classes generated by protobuf-net's protogen.
//!
//! Messages are `[ProtoContract]` partial classes with one
//! `[ProtoMember(n, Name = ...)]` property per field. Oneof members share a
//! `DiscriminatedUnion*` backing field named `__pbn__<oneof>`; optional
//! scalars get a nullable `__pbn__<Property>` backing field instead.

use super::{well_known, SchemaAdapter};
use crate::case::to_snake_case;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{Error, Result};
use crate::model::{Enum, EnumValue, Field, FieldType, Label, Message, Scalar, SchemaFile, Syntax};
use crate::scan::{self, Lang};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

static ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[\s*global::ProtoBuf\.ProtoContract\b[^\]]*\]\s*(?:\[[^\]]*\]\s*)*public\s+(?:(?:sealed|partial|abstract)\s+)*(class|enum)\s+(\w+)[^{;]*\{",
    )
    .expect("valid regex")
});

static MEMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[\s*global::ProtoBuf\.ProtoMember\s*\(([^)]*)\)\s*\]\s*((?:\[[^\]]*\]\s*)*)public\s+(?:(?:virtual|override|readonly|new)\s+)*([\w<>,\[\]\s\.:?]+?)\s+(\w+)\s*(\{|=>|;|=)",
    )
    .expect("valid regex")
});

static UNION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"global::ProtoBuf\.DiscriminatedUnion\w*\s+__pbn__(\w+)\s*;").expect("valid regex")
});

static UNION_USE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__pbn__(\w+)\s*\.\s*Is\s*\(").expect("valid regex"));

static ENUM_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"((?:\[[^\]]*\]\s*)*)(\w+)\s*=\s*(-?\d+)"#,
    )
    .expect("valid regex")
});

static ENUM_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"ProtoEnum\s*\([^)]*Name\s*=\s*@?"([^"]+)""#).expect("valid regex")
});

static NAME_ARG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"Name\s*=\s*@?"([^"]+)""#).expect("valid regex"));

static FORMAT_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(DataFormat|KeyFormat|ValueFormat)\s*=\s*global::ProtoBuf\.DataFormat\.(\w+)")
        .expect("valid regex")
});

static DEFAULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"DefaultValue\s*\(\s*(.+?)\s*\)\s*\]").expect("valid regex")
});

static NAMESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bnamespace\s+([\w.]+)").expect("valid regex"));

/// protobuf-net protogen output (`*.cs`)
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufNetAdapter;

impl SchemaAdapter for ProtobufNetAdapter {
    fn parse(&self, source: &str, diags: &mut Diagnostics) -> Result<SchemaFile> {
        let masked = scan::mask_comments(source, Lang::CSHARP);
        let mut parser = Parser {
            diags,
            namespace: NAMESPACE
                .captures(&masked)
                .map(|c| format!("{}.", &c[1]))
                .unwrap_or_default(),
            imports: Vec::new(),
            proto2: false,
        };

        let mut file = SchemaFile::new();
        let (messages, enums) = parser.scope(&masked);
        file.messages = messages;
        file.enums = enums;

        if file.messages.is_empty() && file.enums.is_empty() {
            return Err(Error::payload_not_found("protobuf-net `[ProtoContract]` types"));
        }
        for import in parser.imports {
            file.add_dependency(import);
        }
        if parser.proto2 {
            file.syntax = Syntax::Proto2;
            for message in &mut file.messages {
                settle_proto2(message);
            }
        } else {
            for message in &mut file.messages {
                drop_defaults(message);
            }
        }

        debug!(
            "protobuf-net: {} messages, {} enums",
            file.messages.len(),
            file.enums.len()
        );
        Ok(file)
    }
}

fn settle_proto2(message: &mut Message) {
    for field in &mut message.fields {
        field.proto3_optional = false;
    }
    message.messages.iter_mut().for_each(settle_proto2);
}

fn drop_defaults(message: &mut Message) {
    for field in &mut message.fields {
        field.default_value = None;
    }
    message.messages.iter_mut().for_each(drop_defaults);
}

/// `DataFormat` values that change the wire type of an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Default,
    ZigZag,
    Fixed,
}

impl Format {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("ZigZag") => Format::ZigZag,
            Some("FixedSize") => Format::Fixed,
            _ => Format::Default,
        }
    }

    fn apply(self, scalar: Scalar) -> Scalar {
        match (self, scalar) {
            (Format::ZigZag, Scalar::Int32) => Scalar::Sint32,
            (Format::ZigZag, Scalar::Int64) => Scalar::Sint64,
            (Format::Fixed, Scalar::Int32) => Scalar::Sfixed32,
            (Format::Fixed, Scalar::Int64) => Scalar::Sfixed64,
            (Format::Fixed, Scalar::Uint32) => Scalar::Fixed32,
            (Format::Fixed, Scalar::Uint64) => Scalar::Fixed64,
            (_, other) => other,
        }
    }
}

fn format_arg(args: &str, key: &str) -> Format {
    Format::parse(
        FORMAT_ARG
            .captures_iter(args)
            .find(|c| &c[1] == key)
            .map(|c| c.get(2).map_or("", |m| m.as_str())),
    )
}

/// C# type arguments of `Outer<A, B>`
fn generic_args(ty: &str) -> Vec<&str> {
    let (Some(open), true) = (ty.find('<'), ty.ends_with('>')) else {
        return Vec::new();
    };
    let inner = &ty[open + 1..ty.len() - 1];
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(inner[start..].trim());
    args
}

fn cs_scalar(name: &str) -> Option<Scalar> {
    Some(match name {
        "int" | "System.Int32" => Scalar::Int32,
        "long" | "System.Int64" => Scalar::Int64,
        "uint" | "System.UInt32" => Scalar::Uint32,
        "ulong" | "System.UInt64" => Scalar::Uint64,
        "float" | "System.Single" => Scalar::Float,
        "double" | "System.Double" => Scalar::Double,
        "bool" | "System.Boolean" => Scalar::Bool,
        "string" | "System.String" => Scalar::String,
        "byte[]" | "System.Byte[]" => Scalar::Bytes,
        _ => return None,
    })
}

struct Parser<'d> {
    diags: &'d mut Diagnostics,
    /// `Namespace.` prefix stripped from qualified type names
    namespace: String,
    imports: Vec<&'static str>,
    proto2: bool,
}

impl Parser<'_> {
    fn scope(&mut self, text: &str) -> (Vec<Message>, Vec<Enum>) {
        let mut items = Vec::new();
        scan::for_each_item(text, &ITEM, Lang::CSHARP, |caps, body| {
            items.push((caps[1].to_string(), caps[2].to_string(), body));
        });

        let mut messages = Vec::new();
        let mut enums = Vec::new();
        for (kind, name, body) in items {
            if kind == "enum" {
                enums.push(enumeration(&name, body));
            } else {
                messages.push(self.message(&name, body));
            }
        }
        (messages, enums)
    }

    fn message(&mut self, name: &str, body: &str) -> Message {
        let (messages, enums) = self.scope(body);
        let own = scan::blank_spans(body, &scan::item_spans(body, &ITEM, Lang::CSHARP));

        let mut message = Message::new(name);
        message.messages = messages;
        message.enums = enums;

        let unions: HashSet<&str> = UNION
            .captures_iter(&own)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        for caps in MEMBER.captures_iter(&own) {
            let Some(whole) = caps.get(0) else { continue };
            let args = &caps[1];
            let attributes = &caps[2];
            let property = &caps[4];

            let Some(number) = args
                .split(',')
                .next()
                .and_then(|n| n.trim().parse::<i32>().ok())
            else {
                debug!("protobuf-net: member {} has no field number", property);
                continue;
            };
            let field_name = NAME_ARG
                .captures(args)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| to_snake_case(property));

            let Some((ty, repeated)) = self.cs_type(caps[3].trim(), args, attributes, &field_name)
            else {
                continue;
            };

            let mut field = Field::new(field_name, number, ty);
            if repeated {
                field.label = Label::Repeated;
            }
            if args.contains("IsRequired = true") {
                field.label = Label::Required;
                self.proto2 = true;
            }
            if args.contains("IsPacked = true") {
                field.packed = Some(true);
            }
            field.deprecated = attributes.contains("Obsolete");
            field.default_value = DEFAULT
                .captures(attributes)
                .and_then(|c| default_literal(&c[1]));

            // Property body decides oneof membership and presence
            let accessor = if &caps[5] == "{" {
                let open = whole.end() - 1;
                scan::find_matching(&own, open, Lang::CSHARP).map(|close| &own[open..close])
            } else {
                own[whole.end()..].split(';').next()
            }
            .unwrap_or("");

            match UNION_USE.captures(accessor) {
                Some(use_caps) if unions.contains(&use_caps[1]) => {
                    field.oneof_index = Some(message.oneof_index_or_insert(&use_caps[1]));
                }
                Some(use_caps) => {
                    self.diags.warn(
                        WarningKind::MissingOneof,
                        format!(
                            "{}.{} refers to undeclared union __pbn__{}",
                            name, property, &use_caps[1]
                        ),
                    );
                }
                None if accessor.contains("__pbn__") && field.label == Label::Optional => {
                    field.proto3_optional = true;
                }
                None => {}
            }

            message.fields.push(field);
        }

        message
    }

    fn cs_type(
        &mut self,
        ty: &str,
        args: &str,
        attributes: &str,
        field_name: &str,
    ) -> Option<(FieldType, bool)> {
        let ty = ty.replace("global::", "");
        let ty = ty.trim().trim_end_matches('?');

        if let Some(scalar) = cs_scalar(ty) {
            return Some((format_arg(args, "DataFormat").apply(scalar).into(), false));
        }

        let head = ty.split('<').next().unwrap_or(ty);
        let head = head.rsplit('.').next().unwrap_or(head);
        match head {
            "Dictionary" | "IDictionary" => {
                let type_args = generic_args(ty);
                let (Some(key), Some(value)) = (type_args.first(), type_args.get(1)) else {
                    self.diags.warn(
                        WarningKind::IncompleteMap,
                        format!("map field {} has no type arguments", field_name),
                    );
                    return None;
                };
                let key = match cs_scalar(key) {
                    Some(scalar) => format_arg(attributes, "KeyFormat").apply(scalar).into(),
                    None => self.named(key, field_name)?,
                };
                let value = match cs_scalar(value.trim_end_matches('?')) {
                    Some(scalar) => format_arg(attributes, "ValueFormat").apply(scalar).into(),
                    None => self.named(value, field_name)?,
                };
                Some((FieldType::map(key, value), false))
            }
            "List" | "IList" | "RepeatedField" => {
                let element = generic_args(ty).first().copied().unwrap_or("");
                let (element, _) = self.cs_type(element, args, attributes, field_name)?;
                Some((element, true))
            }
            _ if ty.ends_with("[]") => {
                let element = ty.trim_end_matches("[]");
                let (element, _) = self.cs_type(element, args, attributes, field_name)?;
                Some((element, true))
            }
            _ => Some((self.named(ty, field_name)?, false)),
        }
    }

    /// Message or enum reference; `None` (with a warning) when no type name is left
    fn named(&mut self, ty: &str, field_name: &str) -> Option<FieldType> {
        let ty = ty.trim().trim_end_matches('?');
        let well_known_name = match ty {
            "System.DateTime" | "DateTime" => Some("Timestamp"),
            "System.TimeSpan" | "TimeSpan" => Some("Duration"),
            _ => None,
        };
        if let Some((full, import)) = well_known_name.and_then(well_known) {
            self.imports.push(import);
            return Some(FieldType::Named(full));
        }
        if let Some(rest) = ty.strip_prefix("Google.Protobuf.WellKnownTypes.") {
            if let Some((full, import)) = well_known(rest) {
                self.imports.push(import);
                return Some(FieldType::Named(full));
            }
        }

        let name = ty
            .strip_prefix(self.namespace.as_str())
            .unwrap_or(ty)
            .trim_matches('.');
        if name.is_empty() {
            self.diags.warn(
                WarningKind::UnresolvedTypeReference,
                format!("member {} has no recoverable type and was skipped", field_name),
            );
            return None;
        }
        Some(FieldType::named(name))
    }
}

/// Default literal as it would appear in a descriptor, if it is one
fn default_literal(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some(text) = raw
        .strip_prefix('@')
        .unwrap_or(raw)
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
    {
        return (!text.is_empty()).then(|| text.to_string());
    }
    let numeric = raw.trim_end_matches(|c| matches!(c, 'f' | 'F' | 'd' | 'D' | 'L' | 'U' | 'u' | 'l'));
    if numeric.parse::<f64>().is_ok() || matches!(raw, "true" | "false") {
        return Some(numeric.to_string());
    }
    None
}

fn enumeration(name: &str, body: &str) -> Enum {
    let mut enum_type = Enum::new(name);
    for caps in ENUM_VALUE.captures_iter(body) {
        let attributes = &caps[1];
        let Ok(number) = caps[3].parse() else { continue };
        let value_name = ENUM_NAME
            .captures(attributes)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| caps[2].to_string());
        enum_type.values.push(EnumValue {
            name: value_name,
            number,
            deprecated: attributes.contains("Obsolete"),
        });
    }
    enum_type
}
