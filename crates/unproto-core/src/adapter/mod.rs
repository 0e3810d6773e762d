//! Syntactic adapters for generators that do not embed a descriptor.
//!
//! Each adapter scans the generated declarations of one ecosystem and builds
//! a [`SchemaFile`] directly. Scanning goes through [`crate::scan`], so
//! braces and quotes inside comments or string defaults never confuse
//! nesting. Structures that look like map entries are left with
//! `map_entry: None`; the emitter decides whether to collapse them.

pub mod betterproto;
pub mod prost;
pub mod protobuf_net;
pub mod zig;

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::model::SchemaFile;

pub use betterproto::BetterprotoAdapter;
pub use prost::ProstAdapter;
pub use protobuf_net::ProtobufNetAdapter;
pub use zig::ZigAdapter;

/// Builds a schema model from generated source text
pub trait SchemaAdapter {
    /// Parses one generated source file.
    ///
    /// Returns [`crate::Error::PayloadNotFound`] when the text carries none
    /// of the generator's markers.
    fn parse(&self, source: &str, diags: &mut Diagnostics) -> Result<SchemaFile>;
}

/// Fully qualified name and import path of a `google.protobuf` well-known type
pub(crate) fn well_known(name: &str) -> Option<(String, &'static str)> {
    let import = match name {
        "Timestamp" => "google/protobuf/timestamp.proto",
        "Duration" => "google/protobuf/duration.proto",
        "Any" => "google/protobuf/any.proto",
        "Empty" => "google/protobuf/empty.proto",
        "FieldMask" => "google/protobuf/field_mask.proto",
        "Struct" | "Value" | "ListValue" | "NullValue" => "google/protobuf/struct.proto",
        "DoubleValue" | "FloatValue" | "Int64Value" | "UInt64Value" | "Int32Value"
        | "UInt32Value" | "BoolValue" | "StringValue" | "BytesValue" => {
            "google/protobuf/wrappers.proto"
        }
        _ => return None,
    };
    Some((format!("google.protobuf.{}", name), import))
}
