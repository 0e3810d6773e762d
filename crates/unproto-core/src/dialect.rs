//! The closed set of supported generator dialects.
//!
//! A [`Dialect`] is always chosen explicitly by the caller. It decides three
//! things: which extraction [`Strategy`] runs, which file extensions belong
//! to it in directory mode, and how an output name is guessed from the
//! generated source when the schema itself carries none.

use crate::adapter::{
    BetterprotoAdapter, ProstAdapter, ProtobufNetAdapter, SchemaAdapter, ZigAdapter,
};
use crate::case::to_snake_case;
use crate::literal::Embedding;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;

/// A generated-code ecosystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Google.Protobuf C# (`*Reflection` classes)
    CSharp,
    /// protoc Java
    Java,
    /// protoc-gen-go
    Go,
    /// protoc Python (`_pb2.py`)
    Python,
    /// protoc Ruby (`_pb.rb`)
    Ruby,
    /// protoc PHP (`GPBMetadata` classes)
    Php,
    /// protoc C++ (`.pb.cc`)
    Cpp,
    /// prost-build Rust
    Prost,
    /// betterproto Python
    Betterproto,
    /// protobuf-net protogen C#
    ProtobufNet,
    /// zig-protobuf
    Zig,
}

/// How a dialect's source is turned into a schema model
#[derive(Clone, Copy)]
pub enum Strategy {
    /// Locate an embedded descriptor literal and wire-decode it
    Embedded(Embedding),
    /// Scan generated declarations with an adapter
    Syntactic(&'static dyn SchemaAdapter),
}

impl Dialect {
    /// Every dialect, in display order
    pub const ALL: [Dialect; 11] = [
        Dialect::CSharp,
        Dialect::Java,
        Dialect::Go,
        Dialect::Python,
        Dialect::Ruby,
        Dialect::Php,
        Dialect::Cpp,
        Dialect::Prost,
        Dialect::Betterproto,
        Dialect::ProtobufNet,
        Dialect::Zig,
    ];

    /// Command-line name
    pub fn name(self) -> &'static str {
        match self {
            Dialect::CSharp => "csharp",
            Dialect::Java => "java",
            Dialect::Go => "go",
            Dialect::Python => "python",
            Dialect::Ruby => "ruby",
            Dialect::Php => "php",
            Dialect::Cpp => "cpp",
            Dialect::Prost => "prost",
            Dialect::Betterproto => "betterproto",
            Dialect::ProtobufNet => "protobuf-net",
            Dialect::Zig => "zig",
        }
    }

    /// Looks a dialect up by its command-line name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    /// File extensions scanned in directory mode
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Dialect::CSharp | Dialect::ProtobufNet => &["cs"],
            Dialect::Java => &["java"],
            Dialect::Go => &["go"],
            Dialect::Python | Dialect::Betterproto => &["py"],
            Dialect::Ruby => &["rb"],
            Dialect::Php => &["php"],
            Dialect::Cpp => &["cc", "cpp", "cxx"],
            Dialect::Prost => &["rs"],
            Dialect::Zig => &["zig"],
        }
    }

    /// Returns true if `path` has one of [`Self::extensions`]
    pub fn matches_path(self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| {
                self.extensions()
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext))
            })
    }

    /// The extraction strategy for this dialect
    pub fn strategy(self) -> Strategy {
        match self {
            Dialect::CSharp => Strategy::Embedded(Embedding::CSharp),
            Dialect::Java => Strategy::Embedded(Embedding::Java),
            Dialect::Go => Strategy::Embedded(Embedding::Go),
            Dialect::Python => Strategy::Embedded(Embedding::Python),
            Dialect::Ruby => Strategy::Embedded(Embedding::Ruby),
            Dialect::Php => Strategy::Embedded(Embedding::Php),
            Dialect::Cpp => Strategy::Embedded(Embedding::Cpp),
            Dialect::Prost => Strategy::Syntactic(&ProstAdapter),
            Dialect::Betterproto => Strategy::Syntactic(&BetterprotoAdapter),
            Dialect::ProtobufNet => Strategy::Syntactic(&ProtobufNetAdapter),
            Dialect::Zig => Strategy::Syntactic(&ZigAdapter),
        }
    }

    /// Guesses the `.proto` file name from generator conventions.
    ///
    /// Headers naming the source file win; otherwise a class or variable
    /// name is stripped of its generator suffix. Returns `None` when the
    /// text offers nothing to go on.
    pub fn name_hint(self, text: &str) -> Option<String> {
        static SLASH_SOURCE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?m)^//\s*source:\s*(\S+?\.proto)\b").expect("valid regex")
        });
        static HASH_SOURCE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?m)^#\s*source:\s*(\S+?\.proto)\b").expect("valid regex")
        });
        static BETTERPROTO_SOURCES: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?m)^#\s*sources:\s*([^,\s]+?\.proto)\b").expect("valid regex")
        });
        static PROTOGEN_INPUT: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?m)^//\s*Input:\s*(\S+?\.proto)\b").expect("valid regex")
        });
        static CSHARP_CLASS: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"public\s+static\s+partial\s+class\s+(\w+)Reflection\b")
                .expect("valid regex")
        });
        static JAVA_CLASS: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"public\s+final\s+class\s+(\w+?)(?:OuterClass)?\s*\{")
                .expect("valid regex")
        });
        static GO_VAR: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"file_(\w+?)_proto_rawDesc\b").expect("valid regex")
        });
        static CPP_TABLE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"descriptor_table_protodef_(\w+)").expect("valid regex")
        });
        static PHP_CLASS: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"\bclass\s+(\w+)\s*\{").expect("valid regex"));

        let first = |re: &Regex| re.captures(text).map(|c| c[1].to_string());

        match self {
            Dialect::CSharp => first(&SLASH_SOURCE)
                .or_else(|| first(&CSHARP_CLASS).map(|c| format!("{}.proto", to_snake_case(&c)))),
            Dialect::Java => first(&SLASH_SOURCE)
                .or_else(|| first(&JAVA_CLASS).map(|c| format!("{}.proto", to_snake_case(&c)))),
            Dialect::Go => first(&SLASH_SOURCE).or_else(|| first(&GO_VAR).map(|v| format!("{}.proto", v))),
            Dialect::Cpp => first(&SLASH_SOURCE).or_else(|| first(&CPP_TABLE).map(|m| unmangle(&m))),
            Dialect::Python | Dialect::Ruby => first(&HASH_SOURCE),
            Dialect::Php => first(&HASH_SOURCE)
                .or_else(|| first(&PHP_CLASS).map(|c| format!("{}.proto", to_snake_case(&c)))),
            Dialect::Betterproto => first(&BETTERPROTO_SOURCES),
            Dialect::ProtobufNet => first(&PROTOGEN_INPUT),
            Dialect::Prost | Dialect::Zig => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reverses protoc's C++ identifier mangling, where every character that
/// is not alphanumeric (underscore included) became `_XX`.
fn unmangle(mangled: &str) -> String {
    let bytes = mangled.as_bytes();
    let mut out = String::with_capacity(mangled.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'_' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(char::from(byte));
                i += 3;
                continue;
            }
        }
        out.push(char::from(bytes[i]));
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for dialect in Dialect::ALL {
            assert_eq!(Dialect::from_name(dialect.name()), Some(dialect));
        }
        assert_eq!(Dialect::from_name("protobuf-net"), Some(Dialect::ProtobufNet));
        assert_eq!(Dialect::from_name("kotlin"), None);
        assert_eq!(Dialect::ProtobufNet.to_string(), "protobuf-net");
    }

    #[test]
    fn test_matches_path() {
        assert!(Dialect::Cpp.matches_path(Path::new("gen/foo.pb.cc")));
        assert!(Dialect::Cpp.matches_path(Path::new("foo.CPP")));
        assert!(!Dialect::Cpp.matches_path(Path::new("foo.pb.h")));
        assert!(Dialect::Prost.matches_path(Path::new("src/my.pkg.rs")));
        assert!(!Dialect::Go.matches_path(Path::new("Makefile")));
    }

    #[test]
    fn test_strategy() {
        assert!(matches!(
            Dialect::Php.strategy(),
            Strategy::Embedded(Embedding::Php)
        ));
        assert!(matches!(Dialect::Zig.strategy(), Strategy::Syntactic(_)));
    }

    #[test]
    fn test_source_header_wins() {
        let text = "// Generated by the protocol buffer compiler.  DO NOT EDIT!\n\
                    // source: api/v1/user.proto\n\
                    public static partial class UserReflection {";
        assert_eq!(
            Dialect::CSharp.name_hint(text).as_deref(),
            Some("api/v1/user.proto")
        );
        assert_eq!(
            Dialect::Python
                .name_hint("# -*- coding: utf-8 -*-\n# source: shop/cart.proto\n")
                .as_deref(),
            Some("shop/cart.proto")
        );
    }

    #[test]
    fn test_class_and_variable_hints() {
        assert_eq!(
            Dialect::CSharp
                .name_hint("public static partial class AddressBookReflection {")
                .as_deref(),
            Some("address_book.proto")
        );
        assert_eq!(
            Dialect::Java
                .name_hint("public final class UserOuterClass {\n  private UserOuterClass() {}")
                .as_deref(),
            Some("user.proto")
        );
        assert_eq!(
            Dialect::Go
                .name_hint("var file_user_v1_user_proto_rawDesc = []byte{")
                .as_deref(),
            Some("user_v1_user.proto")
        );
        assert_eq!(
            Dialect::Cpp
                .name_hint("const char descriptor_table_protodef_my_5fdir_2fuser_2eproto[] = {")
                .as_deref(),
            Some("my_dir/user.proto")
        );
        assert_eq!(
            Dialect::Betterproto
                .name_hint("# Generated by the protocol buffer compiler.  DO NOT EDIT!\n# sources: a.proto, b.proto\n")
                .as_deref(),
            Some("a.proto")
        );
        assert_eq!(
            Dialect::ProtobufNet
                .name_hint("// This file was generated by a tool; you should avoid making direct changes.\n// Input: shapes.proto\n")
                .as_deref(),
            Some("shapes.proto")
        );
        assert_eq!(Dialect::Prost.name_hint("pub struct Pt {}"), None);
    }

    #[test]
    fn test_unmangle() {
        assert_eq!(unmangle("foo_2eproto"), "foo.proto");
        assert_eq!(unmangle("a_5fb_2eproto"), "a_b.proto");
        assert_eq!(unmangle("trailing_"), "trailing_");
        assert_eq!(unmangle("x_zz"), "x_zz");
    }
}
