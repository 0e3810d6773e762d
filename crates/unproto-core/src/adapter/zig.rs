//! Adapter for Zig modules generated by zig-protobuf.
//!
//! A message is a `pub const X = struct { ... }` whose `_desc_table` maps each
//! field to `fd(number, wire_spec)`. The wire spec together with the Zig
//! field type pins down the proto scalar (`.{ .FixedInt = .I32 }` on an
//! `i32` is `sfixed32`, on an `f32` is `float`). Oneofs are tagged unions
//! with their own `_union_desc`. Map entries stay as nested `*Entry`
//! structs for the emitter to collapse.

use super::{well_known, SchemaAdapter};
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{Error, Result};
use crate::model::{Enum, EnumValue, Field, FieldType, Label, Message, Scalar, SchemaFile};
use crate::scan::{self, Lang};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

static ITEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"pub\s+const\s+(\w+)\s*=\s*(?:extern\s+|packed\s+)?(struct|enum|union)\b[^{;=]*\{")
        .expect("valid regex")
});

static FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*(?:@"(\w+)"|(\w+))\s*:\s*([^=,\n]+?)\s*(?:=\s*[^,\n]+)?,"#).expect("valid regex")
});

static TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pub\s+const\s+_(?:desc_table|union_desc)\s*=\s*\.\{").expect("valid regex"));

static DESCRIPTOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\.(?:@"(\w+)"|(\w+))\s*=\s*fd\(\s*(\d+|null)\s*,"#).expect("valid regex")
});

static ENUM_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:@"(\w+)"|(\w+))\s*=\s*(-?\d+)"#).expect("valid regex"));

static PACKAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*///!\s*package\s+([\w.]+)").expect("valid regex"));

/// zig-protobuf output (`*.pb.zig`)
#[derive(Debug, Clone, Copy, Default)]
pub struct ZigAdapter;

impl SchemaAdapter for ZigAdapter {
    fn parse(&self, source: &str, diags: &mut Diagnostics) -> Result<SchemaFile> {
        let masked = scan::mask_comments(source, Lang::ZIG);
        let mut parser = Parser {
            diags,
            imports: Vec::new(),
        };

        let scope = parser.scope(&masked);
        if scope.messages.is_empty() && scope.enums.is_empty() {
            return Err(Error::payload_not_found("zig-protobuf `_desc_table` structs"));
        }

        let mut file = SchemaFile::new();
        if let Some(caps) = PACKAGE.captures(source) {
            file.package = caps[1].to_string();
        }
        file.messages = scope.messages;
        file.enums = scope.enums;
        for import in parser.imports {
            file.add_dependency(import);
        }

        debug!(
            "zig: {} messages, {} enums",
            file.messages.len(),
            file.enums.len()
        );
        Ok(file)
    }
}

fn ident<'t>(caps: &regex::Captures<'t>, quoted: usize, bare: usize) -> &'t str {
    caps.get(quoted)
        .or_else(|| caps.get(bare))
        .map_or("", |m| m.as_str())
}

#[derive(Debug, Default)]
struct Scope {
    messages: Vec<Message>,
    enums: Vec<Enum>,
    /// Union name -> member fields
    unions: HashMap<String, Vec<Field>>,
}

/// `name -> (number, wire spec)` from a `_desc_table` or `_union_desc`
fn descriptor_table(text: &str) -> HashMap<String, (Option<i32>, String)> {
    let mut table = HashMap::new();
    let Some(header) = TABLE.find(text) else {
        return table;
    };
    let open = header.end() - 1;
    let Some(close) = scan::find_matching(text, open, Lang::ZIG) else {
        return table;
    };
    let body = &text[open + 1..close];

    for caps in DESCRIPTOR.captures_iter(body) {
        let Some(whole) = caps.get(0) else { continue };
        // the `(` of `fd(`
        let Some(paren) = body[..whole.end()].rfind('(') else { continue };
        let Some(end) = scan::find_matching(body, paren, Lang::ZIG) else { continue };
        let spec = body[whole.end()..end].trim().to_string();
        let number = caps[3].parse().ok();
        table.insert(ident(&caps, 1, 2).to_string(), (number, spec));
    }
    table
}

/// Strips `?` and `ArrayList(...)` from a Zig field type
fn element_type(ty: &str) -> &str {
    let mut ty = ty.trim().trim_start_matches('?').trim();
    for prefix in ["std.ArrayList(", "ArrayList("] {
        if let Some(inner) = ty.strip_prefix(prefix).and_then(|t| t.strip_suffix(')')) {
            ty = inner.trim();
        }
    }
    ty
}

fn list_spec(spec: &str) -> Option<(&str, bool)> {
    let inner = spec.strip_prefix(".{")?.strip_suffix('}')?.trim();
    if let Some(rest) = inner.strip_prefix(".List") {
        return Some((rest.trim_start().strip_prefix('=')?.trim(), false));
    }
    if let Some(rest) = inner.strip_prefix(".PackedList") {
        return Some((rest.trim_start().strip_prefix('=')?.trim(), true));
    }
    None
}

fn zig_scalar(ty: &str) -> Option<Scalar> {
    Some(match ty {
        "i32" => Scalar::Int32,
        "i64" => Scalar::Int64,
        "u32" => Scalar::Uint32,
        "u64" => Scalar::Uint64,
        "f32" => Scalar::Float,
        "f64" => Scalar::Double,
        "bool" => Scalar::Bool,
        "ManagedString" | "protobuf.ManagedString" => Scalar::String,
        _ => return None,
    })
}

struct Parser<'d> {
    diags: &'d mut Diagnostics,
    imports: Vec<&'static str>,
}

impl Parser<'_> {
    fn scope(&mut self, text: &str) -> Scope {
        let mut items = Vec::new();
        scan::for_each_item(text, &ITEM, Lang::ZIG, |caps, body| {
            items.push((caps[1].to_string(), caps[2].to_string(), body));
        });

        let mut scope = Scope::default();
        for (name, kind, body) in items {
            match kind.as_str() {
                // union tag enums (`_kind_case`) are implementation detail
                "enum" if name.starts_with('_') => {}
                "enum" => scope.enums.push(enumeration(&name, body)),
                "union" => {
                    let own = scan::blank_spans(body, &scan::item_spans(body, &ITEM, Lang::ZIG));
                    let (members, _) = self.fields(&name, &own);
                    scope.unions.insert(name, members);
                }
                _ => {
                    if let Some(message) = self.message(&name, body) {
                        scope.messages.push(message);
                    }
                }
            }
        }
        scope
    }

    /// `None` for plain structs without a descriptor table
    fn message(&mut self, name: &str, body: &str) -> Option<Message> {
        let nested = self.scope(body);
        let own = scan::blank_spans(body, &scan::item_spans(body, &ITEM, Lang::ZIG));
        if !TABLE.is_match(&own) {
            return None;
        }

        let mut message = Message::new(name);
        message.messages = nested.messages;
        message.enums = nested.enums;

        let (fields, slots) = self.fields(name, &own);
        message.fields = fields;
        for (slot, spec) in slots {
            let index = message.oneof_index_or_insert(&slot);
            let union_name = spec
                .split("OneOf")
                .nth(1)
                .and_then(|s| s.trim_start().strip_prefix('='))
                .map(|s| s.trim().trim_end_matches('}').trim())
                .map(|s| s.rsplit('.').next().unwrap_or(s))
                .unwrap_or_default();
            match nested.unions.get(union_name) {
                Some(members) => message
                    .fields
                    .extend(members.iter().cloned().map(|f| f.in_oneof(index))),
                None => self.diags.warn(
                    WarningKind::MissingOneof,
                    format!("union {} for {}.{} not found", union_name, name, slot),
                ),
            }
        }

        Some(message)
    }

    /// Declared fields joined with their table entries.
    ///
    /// Entries numbered `null` are oneof slots and come back separately as
    /// `(field name, wire spec)`.
    fn fields(&mut self, owner: &str, own: &str) -> (Vec<Field>, Vec<(String, String)>) {
        let table = descriptor_table(own);
        let declarations = match TABLE.find(own) {
            Some(m) => &own[..m.start()],
            None => own,
        };

        let mut fields = Vec::new();
        let mut slots = Vec::new();
        for caps in FIELD.captures_iter(declarations) {
            let name = ident(&caps, 1, 2);
            let zig_type = caps[3].trim();
            let Some((number, spec)) = table.get(name) else {
                debug!("zig: {}.{} has no descriptor entry", owner, name);
                continue;
            };
            let Some(number) = number else {
                slots.push((name.to_string(), spec.clone()));
                continue;
            };

            let (ty, label, packed) = self.wire_type(spec, zig_type);
            let mut field = Field::new(name, *number, ty).with_label(label);
            field.packed = packed;
            if label == Label::Optional
                && zig_type.starts_with('?')
                && matches!(field.ty, FieldType::Scalar(_))
            {
                field.proto3_optional = true;
            }
            fields.push(field);
        }
        (fields, slots)
    }

    fn wire_type(&mut self, spec: &str, zig_type: &str) -> (FieldType, Label, Option<bool>) {
        let element = element_type(zig_type);
        match list_spec(spec) {
            Some((inner, packed)) => (
                self.element_wire_type(inner, element),
                Label::Repeated,
                packed.then_some(true),
            ),
            None => (self.element_wire_type(spec, element), Label::Optional, None),
        }
    }

    fn element_wire_type(&mut self, spec: &str, element: &str) -> FieldType {
        let scalar = zig_scalar(element);
        if spec.contains("ZigZagOptimized") {
            return match scalar {
                Some(Scalar::Int32) => Scalar::Sint32.into(),
                _ => Scalar::Sint64.into(),
            };
        }
        if spec.contains(".I32") {
            return match scalar {
                Some(Scalar::Float) => Scalar::Float.into(),
                Some(Scalar::Int32) => Scalar::Sfixed32.into(),
                _ => Scalar::Fixed32.into(),
            };
        }
        if spec.contains(".I64") {
            return match scalar {
                Some(Scalar::Double) => Scalar::Double.into(),
                Some(Scalar::Int64) => Scalar::Sfixed64.into(),
                _ => Scalar::Fixed64.into(),
            };
        }
        if spec.contains(".String") {
            return Scalar::String.into();
        }
        if spec.contains(".Bytes") {
            return Scalar::Bytes.into();
        }
        match scalar {
            Some(scalar) => scalar.into(),
            None => self.named(element),
        }
    }

    fn named(&mut self, element: &str) -> FieldType {
        let segments: Vec<&str> = element.split('.').collect();
        let last = segments.last().copied().unwrap_or(element);
        if segments.iter().any(|s| s.contains("google_protobuf") || *s == "google") {
            if let Some((full, import)) = well_known(last) {
                self.imports.push(import);
                return FieldType::Named(full);
            }
        }
        FieldType::named(element)
    }
}

fn enumeration(name: &str, body: &str) -> Enum {
    let mut enum_type = Enum::new(name);
    for caps in ENUM_VALUE.captures_iter(body) {
        if let Ok(number) = caps[3].parse() {
            enum_type.values.push(EnumValue::new(ident(&caps, 1, 2), number));
        }
    }
    enum_type
}
