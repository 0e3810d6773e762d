//! Error types for the unproto-core library.
//!
//! Every failure the reconstruction pipeline can hit is a deterministic parse
//! failure, so none of these are retried. Conditions that merely degrade the
//! output (an unresolved type reference, a truncated code point) are not
//! errors at all: they travel through [`crate::Diagnostics`] instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for unproto operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all unproto operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write an output `.proto` file
    #[error("failed to write file '{path}': {source}")]
    OutputWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create output directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Path traversal attempt detected (security error)
    #[error("path traversal detected: '{path}' would escape output directory")]
    PathTraversal {
        /// The suspicious path
        path: PathBuf,
    },

    /// The dialect's syntactic anchor is absent from the source text
    #[error("no embedded descriptor found: expected {anchor}")]
    PayloadNotFound {
        /// Human readable description of the anchor that was searched for
        anchor: &'static str,
    },

    /// The located payload is not valid base64, hex or a byte list
    #[error("failed to decode descriptor payload: {details}")]
    PayloadDecode {
        /// Detailed description of the issue
        details: String,
    },

    /// A broken escape sequence inside a string or character literal
    #[error("invalid escape sequence at offset {offset}: {details}")]
    EscapeDecode {
        /// Character offset into the concatenated literal body
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// The descriptor bytes violate the protobuf wire grammar
    #[error("malformed schema descriptor at offset {offset}: {details}")]
    MalformedSchema {
        /// Byte offset where the error occurred
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new output write error
    pub fn output_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::OutputWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Creates a new path traversal error
    pub fn path_traversal(path: impl Into<PathBuf>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Creates a new payload-not-found error
    pub fn payload_not_found(anchor: &'static str) -> Self {
        Self::PayloadNotFound { anchor }
    }

    /// Creates a new payload decode error
    pub fn payload_decode(details: impl Into<String>) -> Self {
        Self::PayloadDecode {
            details: details.into(),
        }
    }

    /// Creates a new escape decode error
    pub fn escape_decode(offset: usize, details: impl Into<String>) -> Self {
        Self::EscapeDecode {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new malformed schema error
    pub fn malformed_schema(offset: usize, details: impl Into<String>) -> Self {
        Self::MalformedSchema {
            offset,
            details: details.into(),
        }
    }

    /// Returns true if the input simply carries nothing to extract.
    ///
    /// Directory scans log these as skips instead of failures.
    pub fn is_skippable(&self) -> bool {
        matches!(self, Self::PayloadNotFound { .. })
    }
}
