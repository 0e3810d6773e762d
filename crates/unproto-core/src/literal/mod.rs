//! Finding and decoding descriptor bytes embedded in generated source.
//!
//! Every generator that embeds a serialized descriptor does so through one
//! recognisable statement. [`locate`] finds that statement with a header
//! regex and a bounded, comment-aware scan to its end, returning the raw
//! [`Payload`] text; [`decode`] turns the payload into bytes. [`encode`]
//! renders bytes back into the same statement shape.

pub mod escape;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::scan::{self, Lang};
use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

pub use escape::{escape, unescape, Grammar, Unescaper};

/// Generators whose output carries a serialized descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Embedding {
    /// Google.Protobuf C# reflection classes
    CSharp,
    /// protoc Java outer classes
    Java,
    /// protoc-gen-go `rawDesc`
    Go,
    /// protoc Python `_pb2` modules
    Python,
    /// protoc Ruby `_pb` files
    Ruby,
    /// protoc PHP metadata classes
    Php,
    /// protoc C++ `.pb.cc` files
    Cpp,
}

impl Embedding {
    /// Description of the anchor statement, used in not-found errors
    pub fn anchor(self) -> &'static str {
        match self {
            Embedding::CSharp => "a `descriptorData = ...FromBase64String(...)` assignment",
            Embedding::Java => "a `java.lang.String[] descriptorData = {...}` array",
            Embedding::Go => "a `file_*_proto_rawDesc` byte slice or string",
            Embedding::Python => "an `AddSerializedFile(...)` call",
            Embedding::Ruby => "a `descriptor_data = \"...\"` assignment",
            Embedding::Php => "an `internalAddGeneratedFile(...)` call",
            Embedding::Cpp => "a `descriptor_table_protodef_*[]` array",
        }
    }

    /// True when the payload is a `FileDescriptorSet` rather than one file
    pub fn is_set(self) -> bool {
        matches!(self, Embedding::Php)
    }
}

/// Raw payload text as it appears in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Base64 fragments to concatenate
    Base64(Vec<&'a str>),
    /// Escaped string literal bodies to concatenate
    Escaped {
        /// Escape syntax of the fragments
        grammar: Grammar,
        /// Literal bodies, quotes stripped
        fragments: Vec<&'a str>,
    },
    /// Single-byte char literal bodies (`'\012'` -> `\012`)
    CharLiterals(Vec<&'a str>),
    /// Comma separated integer list (`0x0a, 0x05, ...`)
    ByteList(&'a str),
    /// A hex digit string
    Hex(&'a str),
}

macro_rules! regex {
    ($name:ident, $pattern:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($pattern).expect("valid regex"));
    };
}

regex!(
    CSHARP_CONCAT,
    r"descriptorData\s*=\s*(?:global::)?System\.Convert\.FromBase64String\s*\(\s*string\.Concat\s*\("
);
regex!(
    CSHARP_SINGLE,
    r#"descriptorData\s*=\s*(?:global::)?System\.Convert\.FromBase64String\s*\(\s*@?""#
);
regex!(JAVA, r"java\.lang\.String\s*\[\s*\]\s+descriptorData\s*=\s*\{");
regex!(GO_BYTES, r"var\s+file_\w+_proto_rawDesc\s*=\s*\[\s*\]\s*byte\s*\{");
regex!(GO_STRING, r"const\s+file_\w+_proto_rawDesc\s*=\s*");
regex!(
    PYTHON,
    r#"_descriptor_pool\.Default\(\)\.AddSerializedFile\(\s*b?['"]"#
);
regex!(RUBY, r#"descriptor_data\s*=\s*""#);
regex!(PHP, r"\$pool->internalAddGeneratedFile\s*\(\s*");
regex!(PHP_HEX, r#"^hex2bin\s*\(\s*['"]"#);
regex!(
    CPP,
    r"const\s+char\s+descriptor_table_protodef_\w+\s*\[\s*\]\s*(?:\w+\s*\(\s*\w+\s*\)\s*)?=\s*\{"
);
regex!(
    CHAR_LITERAL,
    r"'(\\(?:[0-7]{1,3}|x[0-9A-Fa-f]{1,2}|u[0-9A-Fa-f]{4}|U[0-9A-Fa-f]{8}|.)|[^'\\])'"
);

/// Finds the embedded payload for `embedding` in `text`
pub fn locate(text: &str, embedding: Embedding) -> Result<Payload<'_>> {
    let not_found = || Error::payload_not_found(embedding.anchor());

    let payload = match embedding {
        Embedding::CSharp => {
            if let Some(m) = CSHARP_CONCAT.find(text) {
                let open = m.end() - 1;
                let close = scan::find_matching(text, open, Lang::C_LIKE).ok_or_else(not_found)?;
                Payload::Base64(scan::string_literals(&text[open + 1..close], '"', Lang::C_LIKE))
            } else {
                let m = CSHARP_SINGLE.find(text).ok_or_else(not_found)?;
                let body = scan::quoted_body(text, m.end() - 1).ok_or_else(not_found)?;
                Payload::Base64(vec![body])
            }
        }
        Embedding::Java => {
            let region = braced(text, &JAVA, Lang::C_LIKE).ok_or_else(not_found)?;
            Payload::Escaped {
                grammar: Grammar::Java,
                fragments: scan::string_literals(region, '"', Lang::C_LIKE),
            }
        }
        Embedding::Go => {
            if let Some(region) = braced(text, &GO_BYTES, Lang::C_LIKE) {
                Payload::ByteList(region)
            } else {
                let m = GO_STRING.find(text).ok_or_else(not_found)?;
                Payload::Escaped {
                    grammar: Grammar::Go,
                    fragments: concatenation(&text[m.end()..]),
                }
            }
        }
        Embedding::Python => {
            let m = PYTHON.find(text).ok_or_else(not_found)?;
            let body = scan::quoted_body(text, m.end() - 1).ok_or_else(not_found)?;
            Payload::Escaped {
                grammar: Grammar::Python,
                fragments: vec![body],
            }
        }
        Embedding::Ruby => {
            let m = RUBY.find(text).ok_or_else(not_found)?;
            let body = scan::quoted_body(text, m.end() - 1).ok_or_else(not_found)?;
            Payload::Escaped {
                grammar: Grammar::Ruby,
                fragments: vec![body],
            }
        }
        Embedding::Php => {
            let m = PHP.find(text).ok_or_else(not_found)?;
            let rest = &text[m.end()..];
            if let Some(hex) = PHP_HEX.find(rest) {
                let body = scan::quoted_body(rest, hex.end() - 1).ok_or_else(not_found)?;
                Payload::Hex(body)
            } else if rest.starts_with('"') {
                let body = scan::quoted_body(rest, 0).ok_or_else(not_found)?;
                Payload::Escaped {
                    grammar: Grammar::Php,
                    fragments: vec![body],
                }
            } else {
                return Err(not_found());
            }
        }
        Embedding::Cpp => {
            let region = braced(text, &CPP, Lang::C_LIKE).ok_or_else(not_found)?;
            let masked = scan::mask_comments(region, Lang::C_LIKE);
            if masked.trim_start().starts_with('\'') {
                // Offsets are preserved by masking, so captures index `region`.
                let literals = CHAR_LITERAL
                    .captures_iter(&masked)
                    .filter_map(|c| c.get(1))
                    .map(|m| &region[m.range()])
                    .collect();
                Payload::CharLiterals(literals)
            } else {
                Payload::Escaped {
                    grammar: Grammar::C,
                    fragments: scan::string_literals(region, '"', Lang::C_LIKE),
                }
            }
        }
    };

    debug!("Located {:?} payload", embedding);
    Ok(payload)
}

/// Text between the braces opened at the end of a `header` match
fn braced<'a>(text: &'a str, header: &Regex, lang: Lang) -> Option<&'a str> {
    let m = header.find(text)?;
    let open = m.end() - 1;
    let close = scan::find_matching(text, open, lang)?;
    Some(&text[open + 1..close])
}

/// Bodies of a `"a" + "b" + ...` chain at the start of `text`
fn concatenation(text: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut pos = 0;

    loop {
        let rest = &text[pos..];
        let skipped = rest.len() - rest.trim_start().len();
        let open = pos + skipped;
        if !text[open..].starts_with('"') {
            break;
        }
        let Some(body) = scan::quoted_body(text, open) else {
            break;
        };
        fragments.push(body);
        pos = open + body.len() + 2;

        let rest = text[pos..].trim_start();
        match rest.strip_prefix('+') {
            Some(after) => pos = text.len() - after.len(),
            None => break,
        }
    }
    fragments
}

/// Decodes a located payload into descriptor bytes
pub fn decode(payload: &Payload<'_>, lenient_code_points: bool, diags: &mut Diagnostics) -> Result<Vec<u8>> {
    match payload {
        Payload::Base64(fragments) => {
            let joined: String = fragments
                .iter()
                .flat_map(|f| f.chars())
                .filter(|c| !c.is_whitespace())
                .collect();
            base64::engine::general_purpose::STANDARD
                .decode(joined)
                .map_err(|e| Error::payload_decode(format!("invalid base64: {}", e)))
        }
        Payload::Escaped { grammar, fragments } => {
            let mut unescaper = Unescaper::new(*grammar, lenient_code_points);
            for fragment in fragments {
                unescaper.feed(fragment, diags)?;
            }
            Ok(unescaper.finish())
        }
        Payload::CharLiterals(literals) => {
            let mut unescaper = Unescaper::new(Grammar::C, lenient_code_points);
            for literal in literals {
                unescaper.feed(literal, diags)?;
            }
            Ok(unescaper.finish())
        }
        Payload::ByteList(list) => byte_list(list),
        Payload::Hex(hex) => {
            let digits: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
            if digits.len() % 2 != 0 {
                return Err(Error::payload_decode("hex payload has an odd number of digits"));
            }
            digits
                .chunks(2)
                .map(|pair| {
                    std::str::from_utf8(pair)
                        .ok()
                        .and_then(|s| u8::from_str_radix(s, 16).ok())
                        .ok_or_else(|| Error::payload_decode("invalid hex digit in payload"))
                })
                .collect()
        }
    }
}

fn byte_list(list: &str) -> Result<Vec<u8>> {
    let masked = scan::mask_comments(list, Lang::C_LIKE);
    let mut bytes = Vec::with_capacity(masked.len() / 5);

    for item in masked.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let parsed = match item.strip_prefix("0x").or_else(|| item.strip_prefix("0X")) {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => item.parse::<u8>(),
        };
        let byte = parsed
            .map_err(|_| Error::payload_decode(format!("invalid byte literal '{}'", item)))?;
        bytes.push(byte);
    }

    Ok(bytes)
}

/// Renders `bytes` as the statement `embedding`'s generator would emit.
///
/// `decode(&locate(&encode(b, e), e)?, ..)` yields `b` again.
pub fn encode(bytes: &[u8], embedding: Embedding) -> String {
    match embedding {
        Embedding::CSharp => {
            let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
            let fragments: Vec<String> = b64
                .as_bytes()
                .chunks(76)
                .map(|c| format!("\"{}\"", String::from_utf8_lossy(c)))
                .collect();
            let fragments = if fragments.is_empty() {
                "\"\"".to_string()
            } else {
                fragments.join(",\n          ")
            };
            format!(
                "byte[] descriptorData = global::System.Convert.FromBase64String(\n      string.Concat(\n          {}));\n",
                fragments
            )
        }
        Embedding::Java => {
            let lines: Vec<String> = bytes
                .chunks(40)
                .map(|c| format!("\"{}\"", escape(c)))
                .collect();
            format!(
                "java.lang.String[] descriptorData = {{\n      {}\n    }};\n",
                lines.join(" +\n      ")
            )
        }
        Embedding::Go => {
            let lines: Vec<String> = bytes
                .chunks(16)
                .map(|c| {
                    c.iter()
                        .map(|b| format!("0x{:02x},", b))
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect();
            format!(
                "var file_schema_proto_rawDesc = []byte{{\n\t{}\n}}\n",
                lines.join("\n\t")
            )
        }
        Embedding::Python => format!(
            "DESCRIPTOR = _descriptor_pool.Default().AddSerializedFile(b'{}')\n",
            escape(bytes)
        ),
        Embedding::Ruby => format!("descriptor_data = \"{}\"\n", escape(bytes)),
        Embedding::Php => format!(
            "$pool->internalAddGeneratedFile(\n    \"{}\"\n    , true);\n",
            escape(bytes)
        ),
        Embedding::Cpp => {
            let chars: Vec<String> = bytes.iter().map(|b| format!("'{}'", escape(&[*b]))).collect();
            format!(
                "const char descriptor_table_protodef_schema_2eproto[] ABSL_ATTRIBUTE_SECTION_VARIABLE(protodesc_cold) = {{\n  {}\n}};\n",
                chars.join(", ")
            )
        }
    }
}
