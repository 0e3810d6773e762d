//! Proto definition reconstruction.
//!
//! This module ties the pipeline together. For one unit of generated source
//! [`ProtoReconstructor`]:
//!
//! 1. picks the dialect's [`Strategy`]
//! 2. locates and decodes the embedded descriptor, or runs the adapter
//! 3. emits every resulting [`SchemaFile`] as `.proto` text
//!
//! Steps run strictly in sequence. Warnings are collected per unit and
//! returned with the text, never printed.
//!
//! ## Example
//!
//! ```
//! use unproto_core::{Dialect, ProtoReconstructor};
//!
//! let source = r#"
//! #[derive(Clone, PartialEq, ::prost::Message)]
//! pub struct Pt {
//!     #[prost(int32, tag = "1")]
//!     pub x: i32,
//! }
//! "#;
//!
//! let units = ProtoReconstructor::new().reconstruct(source, Dialect::Prost)?;
//! assert_eq!(units[0].text, "syntax = \"proto3\";\n\nmessage Pt {\n    int32 x = 1;\n}\n");
//! # Ok::<(), unproto_core::Error>(())
//! ```

mod emit;
mod resolve;

use crate::descriptor;
use crate::diagnostics::Diagnostics;
use crate::dialect::{Dialect, Strategy};
use crate::error::Result;
use crate::literal;
use crate::model::{SchemaFile, SchemaStats};
use tracing::debug;

pub use emit::{emit, emit_to};

/// Configuration for proto reconstruction
#[derive(Debug, Clone)]
pub struct ReconstructorConfig {
    /// Indentation string (default: 4 spaces)
    pub indent_str: String,
    /// Truncate out-of-range code points in single-byte literals to their
    /// low byte with a warning, instead of failing
    pub lenient_code_points: bool,
    /// Collapse `XEntry { key = 1; value = 2; }` messages into map fields
    /// when the source carries no explicit map-entry marker
    pub map_entry_heuristic: bool,
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        Self {
            indent_str: "    ".to_string(),
            lenient_code_points: true,
            map_entry_heuristic: true,
        }
    }
}

impl ReconstructorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether out-of-range code points are truncated or rejected
    pub fn lenient_code_points(mut self, lenient: bool) -> Self {
        self.lenient_code_points = lenient;
        self
    }

    /// Sets whether unmarked map entries are detected by shape
    pub fn map_entry_heuristic(mut self, enabled: bool) -> Self {
        self.map_entry_heuristic = enabled;
        self
    }
}

/// One reconstructed `.proto` file
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Output name: the name recorded in the schema, else the dialect's
    /// name hint. `None` leaves naming to the caller.
    pub name: Option<String>,
    /// The recovered model
    pub schema: SchemaFile,
    /// Emitted `.proto` source
    pub text: String,
    /// Warnings raised while extracting and emitting this file
    pub diagnostics: Diagnostics,
    /// Declaration counts
    pub stats: SchemaStats,
}

/// Reconstructs `.proto` files from generated source
#[derive(Debug, Clone, Default)]
pub struct ProtoReconstructor {
    config: ReconstructorConfig,
}

impl ProtoReconstructor {
    /// Creates a reconstructor with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: ReconstructorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the active configuration
    pub fn config(&self) -> &ReconstructorConfig {
        &self.config
    }

    /// Builds the schema model(s) for one unit of `dialect` source.
    ///
    /// Most dialects yield exactly one file; PHP payloads may carry a set.
    pub fn extract(
        &self,
        source: &str,
        dialect: Dialect,
        diags: &mut Diagnostics,
    ) -> Result<Vec<SchemaFile>> {
        match dialect.strategy() {
            Strategy::Embedded(embedding) => {
                let payload = literal::locate(source, embedding)?;
                let bytes = literal::decode(&payload, self.config.lenient_code_points, diags)?;
                debug!("Decoded {} descriptor bytes ({})", bytes.len(), dialect);

                if embedding.is_set() {
                    decode_set_or_file(&bytes, diags)
                } else {
                    Ok(vec![descriptor::decode_file(&bytes, diags)?])
                }
            }
            Strategy::Syntactic(adapter) => Ok(vec![adapter.parse(source, diags)?]),
        }
    }

    /// Runs the whole pipeline on one unit of `dialect` source.
    ///
    /// Extraction warnings are attached to the first returned file.
    pub fn reconstruct(&self, source: &str, dialect: Dialect) -> Result<Vec<Reconstruction>> {
        let mut diags = Diagnostics::new();
        let files = self.extract(source, dialect, &mut diags)?;
        let hint = match files.as_slice() {
            [only] if only.name.is_none() => dialect.name_hint(source),
            _ => None,
        };

        let mut units = Vec::with_capacity(files.len());
        for file in files {
            let unit_diags = std::mem::take(&mut diags);
            let mut unit = self.reconstruct_schema(file, unit_diags);
            if unit.name.is_none() {
                unit.name = hint.clone();
            }
            units.push(unit);
        }
        Ok(units)
    }

    /// Reconstructs a single serialized `FileDescriptorProto`
    pub fn reconstruct_descriptor(&self, bytes: &[u8]) -> Result<Reconstruction> {
        let mut diags = Diagnostics::new();
        let file = descriptor::decode_file(bytes, &mut diags)?;
        Ok(self.reconstruct_schema(file, diags))
    }

    /// Emits an already built model, appending to `diags`
    pub fn reconstruct_schema(&self, schema: SchemaFile, mut diags: Diagnostics) -> Reconstruction {
        let text = emit(&schema, &self.config, &mut diags);
        let stats = SchemaStats::of(&schema);
        debug!(
            "Emitted {} ({} messages, {} enums, {} warnings)",
            schema.name.as_deref().unwrap_or("<unnamed>"),
            stats.message_count,
            stats.enum_count,
            diags.len()
        );

        Reconstruction {
            name: schema.name.clone(),
            schema,
            text,
            diagnostics: diags,
            stats,
        }
    }
}

/// Decodes a set, falling back to a single file when the bytes are not one
fn decode_set_or_file(bytes: &[u8], diags: &mut Diagnostics) -> Result<Vec<SchemaFile>> {
    let mut scratch = Diagnostics::new();
    match descriptor::decode_set(bytes, &mut scratch) {
        Ok(files) if !files.is_empty() && files.iter().all(is_named) => {
            diags.extend(scratch);
            Ok(files)
        }
        Ok(files) => {
            debug!(
                "Descriptor set has {} files but not all are named, decoding as a single file",
                files.len()
            );
            Ok(vec![descriptor::decode_file(bytes, diags)?])
        }
        Err(e) => {
            debug!("Not a descriptor set ({}), decoding as a single file", e);
            Ok(vec![descriptor::decode_file(bytes, diags)?])
        }
    }
}

/// Files in a descriptor set always carry their path
fn is_named(file: &SchemaFile) -> bool {
    file.name.as_deref().is_some_and(|name| !name.is_empty())
}
