//! Decoder for serialized `FileDescriptorProto` / `FileDescriptorSet` bytes.
//!
//! The descriptor messages are a fixed schema, so the decoder is written out
//! by hand: one function per record type, each a loop over tags that
//! dispatches on the field number and skips anything it does not know.
//! Field numbers follow `google/protobuf/descriptor.proto`.

pub mod wire;

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::Result;
use crate::model::{
    Dependency, Enum, EnumValue, Field, FieldType, FileOption, ImportKind, Label, Message,
    Method, Oneof, OptionValue, Scalar, SchemaFile, Service, Syntax,
};
use tracing::{debug, trace};
use wire::{WireReader, WireType};

/// Decodes a single serialized `FileDescriptorProto`.
///
/// Fails with [`crate::Error::MalformedSchema`] when the bytes violate the
/// wire grammar. Unknown fields are skipped.
pub fn decode_file(bytes: &[u8], diags: &mut Diagnostics) -> Result<SchemaFile> {
    file(WireReader::new(bytes), diags)
}

/// Decodes a serialized `FileDescriptorSet`, keeping declaration order.
///
/// Each file is decoded independently; references between them stay as
/// qualified names.
pub fn decode_set(bytes: &[u8], diags: &mut Diagnostics) -> Result<Vec<SchemaFile>> {
    let mut r = WireReader::new(bytes);
    let mut files = Vec::new();

    while !r.is_empty() {
        let (number, wire_type) = r.read_tag()?;
        match number {
            1 => files.push(file(nested(&mut r, number, wire_type)?, diags)?),
            _ => r.skip(number, wire_type)?,
        }
    }

    debug!("Decoded descriptor set with {} files", files.len());
    Ok(files)
}

fn string(r: &mut WireReader<'_>, number: u32, wire_type: WireType) -> Result<String> {
    r.expect(number, wire_type, WireType::Len)?;
    r.read_string()
}

fn nested<'a>(r: &mut WireReader<'a>, number: u32, wire_type: WireType) -> Result<WireReader<'a>> {
    r.expect(number, wire_type, WireType::Len)?;
    r.read_message()
}

fn int32(r: &mut WireReader<'_>, number: u32, wire_type: WireType) -> Result<i32> {
    r.expect(number, wire_type, WireType::Varint)?;
    r.read_int32()
}

fn boolean(r: &mut WireReader<'_>, number: u32, wire_type: WireType) -> Result<bool> {
    r.expect(number, wire_type, WireType::Varint)?;
    r.read_bool()
}

fn file(mut r: WireReader<'_>, diags: &mut Diagnostics) -> Result<SchemaFile> {
    let mut file = SchemaFile::new();
    let mut dependencies = Vec::new();
    let mut public = Vec::new();
    let mut weak = Vec::new();
    let mut syntax = String::new();
    let mut edition = None;

    while !r.is_empty() {
        let (number, wire_type) = r.read_tag()?;
        match number {
            1 => {
                let name = string(&mut r, number, wire_type)?;
                if !name.is_empty() {
                    file.name = Some(name);
                }
            }
            2 => file.package = string(&mut r, number, wire_type)?,
            3 => dependencies.push(string(&mut r, number, wire_type)?),
            4 => file
                .messages
                .push(message(nested(&mut r, number, wire_type)?)?),
            5 => file
                .enums
                .push(enum_type(nested(&mut r, number, wire_type)?)?),
            6 => file
                .services
                .push(service(nested(&mut r, number, wire_type)?)?),
            8 => file.options = file_options(nested(&mut r, number, wire_type)?)?,
            10 => public.extend(r.read_packed_varints(wire_type)?),
            11 => weak.extend(r.read_packed_varints(wire_type)?),
            12 => syntax = string(&mut r, number, wire_type)?,
            14 => edition = Some(int32(&mut r, number, wire_type)?),
            _ => {
                trace!("Skipping file field {} ({:?})", number, wire_type);
                r.skip(number, wire_type)?;
            }
        }
    }

    file.dependencies = dependencies.into_iter().map(Dependency::new).collect();
    for (indices, kind) in [(public, ImportKind::Public), (weak, ImportKind::Weak)] {
        for index in indices {
            match usize::try_from(index)
                .ok()
                .and_then(|i| file.dependencies.get_mut(i))
            {
                Some(dep) => dep.kind = kind,
                None => debug!("Ignoring out of range dependency index {}", index),
            }
        }
    }

    file.syntax = match Syntax::try_from(syntax.as_str()) {
        Ok(syntax) => syntax,
        Err(_) => {
            let detail = match edition {
                Some(edition) => format!("'{}' (edition {})", syntax, edition),
                None => format!("'{}'", syntax),
            };
            diags.warn(
                WarningKind::UnsupportedSyntax,
                format!("syntax {} emitted as proto2", detail),
            );
            Syntax::Proto2
        }
    };

    debug!(
        "Decoded {} ({} messages, {} enums, {} services)",
        file.name.as_deref().unwrap_or("<unnamed>"),
        file.messages.len(),
        file.enums.len(),
        file.services.len()
    );
    Ok(file)
}

fn file_options(mut r: WireReader<'_>) -> Result<Vec<FileOption>> {
    let mut options = Vec::new();

    while !r.is_empty() {
        let (number, wire_type) = r.read_tag()?;
        let name = match number {
            1 => "java_package",
            8 => "java_outer_classname",
            9 => "optimize_for",
            10 => "java_multiple_files",
            11 => "go_package",
            23 => "deprecated",
            31 => "cc_enable_arenas",
            36 => "objc_class_prefix",
            37 => "csharp_namespace",
            39 => "swift_prefix",
            40 => "php_class_prefix",
            41 => "php_namespace",
            44 => "php_metadata_namespace",
            45 => "ruby_package",
            _ => {
                r.skip(number, wire_type)?;
                continue;
            }
        };

        let value = match number {
            9 => match int32(&mut r, number, wire_type)? {
                1 => OptionValue::Ident("SPEED".to_string()),
                2 => OptionValue::Ident("CODE_SIZE".to_string()),
                3 => OptionValue::Ident("LITE_RUNTIME".to_string()),
                other => {
                    debug!("Ignoring unknown optimize_for value {}", other);
                    continue;
                }
            },
            10 | 23 | 31 => OptionValue::Bool(boolean(&mut r, number, wire_type)?),
            _ => OptionValue::String(string(&mut r, number, wire_type)?),
        };

        options.push(FileOption {
            name: name.to_string(),
            value,
        });
    }

    Ok(options)
}

fn message(mut r: WireReader<'_>) -> Result<Message> {
    let mut message = Message::new("");
    // Descriptor input always knows whether a message is a map entry.
    message.map_entry = Some(false);

    while !r.is_empty() {
        let (number, wire_type) = r.read_tag()?;
        match number {
            1 => message.name = string(&mut r, number, wire_type)?,
            2 => message
                .fields
                .push(field(nested(&mut r, number, wire_type)?)?),
            3 => message
                .messages
                .push(self::message(nested(&mut r, number, wire_type)?)?),
            4 => message
                .enums
                .push(enum_type(nested(&mut r, number, wire_type)?)?),
            7 => {
                let mut options = nested(&mut r, number, wire_type)?;
                while !options.is_empty() {
                    let (number, wire_type) = options.read_tag()?;
                    match number {
                        7 => message.map_entry = Some(boolean(&mut options, number, wire_type)?),
                        _ => options.skip(number, wire_type)?,
                    }
                }
            }
            8 => {
                let mut oneof = nested(&mut r, number, wire_type)?;
                let mut name = String::new();
                while !oneof.is_empty() {
                    let (number, wire_type) = oneof.read_tag()?;
                    match number {
                        1 => name = string(&mut oneof, number, wire_type)?,
                        _ => oneof.skip(number, wire_type)?,
                    }
                }
                message.oneofs.push(Oneof::new(name));
            }
            9 => {
                let (start, end) = range(nested(&mut r, number, wire_type)?)?;
                message.reserved_ranges.push(start..end);
            }
            10 => message
                .reserved_names
                .push(string(&mut r, number, wire_type)?),
            _ => r.skip(number, wire_type)?,
        }
    }

    Ok(message)
}

/// Reads a `ReservedRange` / `EnumReservedRange` record
fn range(mut r: WireReader<'_>) -> Result<(i32, i32)> {
    let (mut start, mut end) = (0, 0);
    while !r.is_empty() {
        let (number, wire_type) = r.read_tag()?;
        match number {
            1 => start = int32(&mut r, number, wire_type)?,
            2 => end = int32(&mut r, number, wire_type)?,
            _ => r.skip(number, wire_type)?,
        }
    }
    Ok((start, end))
}

fn field(mut r: WireReader<'_>) -> Result<Field> {
    let start = r.offset();
    let mut field = Field::default();
    let mut type_number = None;
    let mut type_name = String::new();

    while !r.is_empty() {
        let (number, wire_type) = r.read_tag()?;
        match number {
            1 => field.name = string(&mut r, number, wire_type)?,
            3 => field.number = int32(&mut r, number, wire_type)?,
            4 => field.label = Label::from_descriptor(int32(&mut r, number, wire_type)?),
            5 => type_number = Some(int32(&mut r, number, wire_type)?),
            6 => type_name = string(&mut r, number, wire_type)?,
            7 => field.default_value = Some(string(&mut r, number, wire_type)?),
            8 => {
                let mut options = nested(&mut r, number, wire_type)?;
                while !options.is_empty() {
                    let (number, wire_type) = options.read_tag()?;
                    match number {
                        2 => field.packed = Some(boolean(&mut options, number, wire_type)?),
                        3 => field.deprecated = boolean(&mut options, number, wire_type)?,
                        _ => options.skip(number, wire_type)?,
                    }
                }
            }
            9 => {
                let index = int32(&mut r, number, wire_type)?;
                field.oneof_index = usize::try_from(index).ok();
            }
            10 => field.json_name = Some(string(&mut r, number, wire_type)?),
            17 => field.proto3_optional = boolean(&mut r, number, wire_type)?,
            _ => r.skip(number, wire_type)?,
        }
    }

    field.ty = match type_number.and_then(Scalar::from_descriptor_type) {
        Some(scalar) => FieldType::Scalar(scalar),
        None if !type_name.is_empty() => FieldType::Named(type_name),
        None => {
            return Err(crate::Error::malformed_schema(
                start,
                format!("field '{}' has neither a scalar type nor a type name", field.name),
            ))
        }
    };

    Ok(field)
}

fn enum_type(mut r: WireReader<'_>) -> Result<Enum> {
    let mut enum_type = Enum::new("");

    while !r.is_empty() {
        let (number, wire_type) = r.read_tag()?;
        match number {
            1 => enum_type.name = string(&mut r, number, wire_type)?,
            2 => enum_type
                .values
                .push(enum_value(nested(&mut r, number, wire_type)?)?),
            3 => {
                let mut options = nested(&mut r, number, wire_type)?;
                while !options.is_empty() {
                    let (number, wire_type) = options.read_tag()?;
                    match number {
                        2 => enum_type.allow_alias = boolean(&mut options, number, wire_type)?,
                        _ => options.skip(number, wire_type)?,
                    }
                }
            }
            4 => {
                let (start, end) = range(nested(&mut r, number, wire_type)?)?;
                enum_type.reserved_ranges.push(start..=end);
            }
            5 => enum_type
                .reserved_names
                .push(string(&mut r, number, wire_type)?),
            _ => r.skip(number, wire_type)?,
        }
    }

    Ok(enum_type)
}

fn enum_value(mut r: WireReader<'_>) -> Result<EnumValue> {
    let mut value = EnumValue::new("", 0);

    while !r.is_empty() {
        let (number, wire_type) = r.read_tag()?;
        match number {
            1 => value.name = string(&mut r, number, wire_type)?,
            2 => value.number = int32(&mut r, number, wire_type)?,
            3 => {
                let mut options = nested(&mut r, number, wire_type)?;
                while !options.is_empty() {
                    let (number, wire_type) = options.read_tag()?;
                    match number {
                        1 => value.deprecated = boolean(&mut options, number, wire_type)?,
                        _ => options.skip(number, wire_type)?,
                    }
                }
            }
            _ => r.skip(number, wire_type)?,
        }
    }

    Ok(value)
}

fn service(mut r: WireReader<'_>) -> Result<Service> {
    let mut service = Service::default();

    while !r.is_empty() {
        let (number, wire_type) = r.read_tag()?;
        match number {
            1 => service.name = string(&mut r, number, wire_type)?,
            2 => service
                .methods
                .push(method(nested(&mut r, number, wire_type)?)?),
            _ => r.skip(number, wire_type)?,
        }
    }

    Ok(service)
}

fn method(mut r: WireReader<'_>) -> Result<Method> {
    let mut method = Method::default();

    while !r.is_empty() {
        let (number, wire_type) = r.read_tag()?;
        match number {
            1 => method.name = string(&mut r, number, wire_type)?,
            2 => method.input_type = string(&mut r, number, wire_type)?,
            3 => method.output_type = string(&mut r, number, wire_type)?,
            5 => method.client_streaming = boolean(&mut r, number, wire_type)?,
            6 => method.server_streaming = boolean(&mut r, number, wire_type)?,
            _ => r.skip(number, wire_type)?,
        }
    }

    Ok(method)
}
