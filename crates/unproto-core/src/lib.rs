//! # unproto-core
//!
//! A library for recovering Protocol Buffer schemas from generated code.
//!
//! Generated bindings usually carry the schema with them: most protoc plugins
//! embed the serialized `FileDescriptorProto` as a string or byte literal,
//! and the rest (prost, betterproto, protobuf-net, zig-protobuf) annotate
//! every field with its number and wire type. This crate reads either form
//! back into a [`SchemaFile`] and prints it as `.proto` source.
//!
//! ## Architecture
//!
//! - [`literal`]: finds the embedded descriptor literal and unescapes it
//! - [`descriptor`]: decodes descriptor bytes into the schema model
//! - [`adapter`]: builds the schema model from annotated declarations
//! - [`model`]: the language-neutral schema tree
//! - [`proto`]: the emitter and the [`ProtoReconstructor`] pipeline
//! - [`dialect`]: the closed set of supported generators
//!
//! Shared scanning primitives live in [`scan`], warnings in [`diagnostics`].
//!
//! ## Example
//!
//! ```no_run
//! use unproto_core::{Dialect, ProtoReconstructor};
//! use std::fs;
//!
//! let source = fs::read_to_string("gen/UserReflection.cs")?;
//!
//! for unit in ProtoReconstructor::new().reconstruct(&source, Dialect::CSharp)? {
//!     for warning in &unit.diagnostics {
//!         eprintln!("warning: {}", warning);
//!     }
//!     println!("{}", unit.text);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod adapter;
pub mod case;
pub mod descriptor;
pub mod diagnostics;
pub mod dialect;
pub mod error;
pub mod literal;
pub mod model;
pub mod proto;
pub mod scan;

// Re-export primary types for convenience
pub use adapter::SchemaAdapter;
pub use diagnostics::{Diagnostics, Warning, WarningKind};
pub use dialect::{Dialect, Strategy};
pub use error::{Error, Result};
pub use literal::Embedding;
pub use model::{SchemaFile, SchemaStats};
pub use proto::{emit, ProtoReconstructor, Reconstruction, ReconstructorConfig};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
/// Used for `reserved X to max` ranges
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;
