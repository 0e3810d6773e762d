//! One escape-sequence state machine for every supported string literal
//! syntax, parameterised by [`Grammar`].

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{Error, Result};
use std::iter::{Enumerate, Peekable};
use std::str::Chars;

/// Escape syntax of a host language's string or char literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grammar {
    /// C / C++ string and char literals
    C,
    /// Java string literals
    Java,
    /// Go interpreted string literals
    Go,
    /// Python `str` and `bytes` literals
    Python,
    /// Ruby double-quoted strings
    Ruby,
    /// PHP double-quoted strings
    Php,
}

/// Numeric escape forms a grammar accepts; `(min, max)` digit counts
#[derive(Debug, Clone, Copy)]
struct Rules {
    octal: Option<(usize, usize)>,
    /// A three digit octal escape must start with `0`-`3` (Java)
    octal_lead_limited: bool,
    hex: Option<(usize, usize)>,
    short_unicode: bool,
    long_unicode: bool,
    braced_unicode: bool,
    multibyte: bool,
}

impl Grammar {
    fn rules(self) -> Rules {
        match self {
            Grammar::C => Rules {
                octal: Some((1, 3)),
                octal_lead_limited: false,
                hex: Some((1, 2)),
                short_unicode: true,
                long_unicode: true,
                braced_unicode: false,
                multibyte: false,
            },
            Grammar::Java => Rules {
                octal: Some((1, 3)),
                octal_lead_limited: true,
                hex: None,
                short_unicode: true,
                long_unicode: false,
                braced_unicode: false,
                multibyte: false,
            },
            Grammar::Go => Rules {
                octal: Some((3, 3)),
                octal_lead_limited: false,
                hex: Some((2, 2)),
                short_unicode: true,
                long_unicode: true,
                braced_unicode: false,
                multibyte: true,
            },
            Grammar::Python => Rules {
                octal: Some((1, 3)),
                octal_lead_limited: false,
                hex: Some((2, 2)),
                short_unicode: true,
                long_unicode: true,
                braced_unicode: false,
                multibyte: false,
            },
            Grammar::Ruby => Rules {
                octal: Some((1, 3)),
                octal_lead_limited: false,
                hex: Some((1, 2)),
                short_unicode: true,
                long_unicode: false,
                braced_unicode: true,
                multibyte: true,
            },
            Grammar::Php => Rules {
                octal: Some((1, 3)),
                octal_lead_limited: false,
                hex: Some((1, 2)),
                short_unicode: false,
                long_unicode: false,
                braced_unicode: true,
                multibyte: true,
            },
        }
    }

    /// Single-letter escapes
    fn simple(self, c: char) -> Option<u8> {
        let byte = match (self, c) {
            (_, 'n') => b'\n',
            (_, 'r') => b'\r',
            (_, 't') => b'\t',
            (_, '\\') => b'\\',
            (_, '"') => b'"',
            (Grammar::Php, '\'') => return None,
            (_, '\'') => b'\'',
            (Grammar::Php, '$') => b'$',
            (Grammar::C, '?') => b'?',
            (Grammar::Ruby, '#') => b'#',
            (Grammar::Ruby | Grammar::Java, 's') => b' ',
            (Grammar::Ruby | Grammar::Php, 'e') => 0x1B,
            (Grammar::C | Grammar::Go | Grammar::Python | Grammar::Ruby, 'a') => 0x07,
            (Grammar::Php, 'b') => return None,
            (_, 'b') => 0x08,
            (_, 'f') => 0x0C,
            (Grammar::Java, 'v') => return None,
            (_, 'v') => 0x0B,
            _ => return None,
        };
        Some(byte)
    }

    /// Whether `\u` escapes and raw non-ASCII characters become UTF-8.
    ///
    /// Otherwise every character must fit a single Latin-1 code unit.
    pub fn is_multibyte(self) -> bool {
        self.rules().multibyte
    }
}

type Cursor<'a> = Peekable<Enumerate<Chars<'a>>>;

/// Decodes a sequence of literal fragments into bytes.
///
/// Fragments are fed one at a time (each is a complete literal body, so an
/// escape never spans two of them); error offsets count characters across
/// all fragments fed so far.
#[derive(Debug, Clone)]
pub struct Unescaper {
    grammar: Grammar,
    rules: Rules,
    lenient: bool,
    offset: usize,
    out: Vec<u8>,
}

impl Unescaper {
    /// Creates a decoder. With `lenient_code_points`, a code point that
    /// does not fit a single-byte grammar is truncated to its low byte with
    /// a [`WarningKind::CodePointTruncated`] warning instead of failing.
    pub fn new(grammar: Grammar, lenient_code_points: bool) -> Self {
        Self {
            grammar,
            rules: grammar.rules(),
            lenient: lenient_code_points,
            offset: 0,
            out: Vec::new(),
        }
    }

    /// Decodes one literal body
    pub fn feed(&mut self, fragment: &str, diags: &mut Diagnostics) -> Result<()> {
        let mut chars = fragment.chars().enumerate().peekable();

        while let Some((i, c)) = chars.next() {
            let at = self.offset + i;
            if c != '\\' {
                self.push_char(c, at, diags)?;
                continue;
            }

            let Some((_, e)) = chars.next() else {
                return Err(Error::escape_decode(at, "incomplete escape at end of literal"));
            };

            if let Some(byte) = self.grammar.simple(e) {
                self.out.push(byte);
                continue;
            }

            match e {
                '0'..='7' if self.rules.octal.is_some() => self.octal(e, at, &mut chars)?,
                'x' if self.rules.hex.is_some() => self.hex(at, &mut chars)?,
                'u' if self.rules.braced_unicode && matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    let (value, count) = take_hex(&mut chars, 6);
                    if count == 0 || !matches!(chars.next(), Some((_, '}'))) {
                        return Err(Error::escape_decode(at, "malformed \\u{...} escape"));
                    }
                    self.push_code_point(value, at, diags)?;
                }
                'u' if self.rules.short_unicode => {
                    let value = exact_hex(&mut chars, 4, at, 'u')?;
                    self.push_code_point(value, at, diags)?;
                }
                'U' if self.rules.long_unicode => {
                    let value = exact_hex(&mut chars, 8, at, 'U')?;
                    self.push_code_point(value, at, diags)?;
                }
                _ => {
                    // Unknown escapes keep their backslash
                    self.out.push(b'\\');
                    self.push_char(e, at + 1, diags)?;
                }
            }
        }

        self.offset += fragment.chars().count();
        Ok(())
    }

    /// Returns the decoded bytes
    pub fn finish(self) -> Vec<u8> {
        self.out
    }

    fn octal(&mut self, first: char, at: usize, chars: &mut Cursor<'_>) -> Result<()> {
        let (min, mut max) = self.rules.octal.unwrap_or((1, 3));
        if self.rules.octal_lead_limited && first > '3' {
            max = max.min(2);
        }
        let mut value = first.to_digit(8).unwrap_or(0);
        let mut count = 1;

        while count < max {
            match chars.peek().and_then(|(_, d)| d.to_digit(8)) {
                Some(digit) => {
                    value = value * 8 + digit;
                    count += 1;
                    chars.next();
                }
                None => break,
            }
        }

        if count < min {
            return Err(Error::escape_decode(
                at,
                format!("octal escape needs {} digits, found {}", min, count),
            ));
        }
        if value > 0xFF {
            return Err(Error::escape_decode(
                at,
                format!("octal escape \\{:o} is out of byte range", value),
            ));
        }
        self.out.push(value as u8);
        Ok(())
    }

    fn hex(&mut self, at: usize, chars: &mut Cursor<'_>) -> Result<()> {
        let (min, max) = self.rules.hex.unwrap_or((2, 2));
        let (value, count) = take_hex(chars, max);
        if count < min {
            return Err(Error::escape_decode(at, "incomplete \\x escape"));
        }
        self.out.push(value as u8);
        Ok(())
    }

    fn push_char(&mut self, c: char, at: usize, diags: &mut Diagnostics) -> Result<()> {
        if c.is_ascii() {
            self.out.push(c as u8);
            Ok(())
        } else {
            self.push_code_point(c as u32, at, diags)
        }
    }

    fn push_code_point(&mut self, value: u32, at: usize, diags: &mut Diagnostics) -> Result<()> {
        if self.rules.multibyte {
            let c = char::from_u32(value).ok_or_else(|| {
                Error::escape_decode(at, format!("U+{:04X} is not a valid code point", value))
            })?;
            let mut buf = [0u8; 4];
            self.out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        } else if value <= 0xFF {
            self.out.push(value as u8);
        } else if self.lenient {
            let byte = (value & 0xFF) as u8;
            diags.warn(
                WarningKind::CodePointTruncated,
                format!(
                    "U+{:04X} at offset {} truncated to byte 0x{:02X}",
                    value, at, byte
                ),
            );
            self.out.push(byte);
        } else {
            return Err(Error::escape_decode(
                at,
                format!("U+{:04X} does not fit a single-byte literal", value),
            ));
        }
        Ok(())
    }
}

/// Reads up to `max` hex digits; returns the value and digit count
fn take_hex(chars: &mut Cursor<'_>, max: usize) -> (u32, usize) {
    let mut value = 0u32;
    let mut count = 0;
    while count < max {
        match chars.peek().and_then(|(_, d)| d.to_digit(16)) {
            Some(digit) => {
                value = value * 16 + digit;
                count += 1;
                chars.next();
            }
            None => break,
        }
    }
    (value, count)
}

fn exact_hex(chars: &mut Cursor<'_>, digits: usize, at: usize, letter: char) -> Result<u32> {
    let (value, count) = take_hex(chars, digits);
    if count != digits {
        return Err(Error::escape_decode(
            at,
            format!("\\{} escape needs {} hex digits, found {}", letter, digits, count),
        ));
    }
    Ok(value)
}

/// Decodes a single literal body
pub fn unescape(
    body: &str,
    grammar: Grammar,
    lenient_code_points: bool,
    diags: &mut Diagnostics,
) -> Result<Vec<u8>> {
    let mut unescaper = Unescaper::new(grammar, lenient_code_points);
    unescaper.feed(body, diags)?;
    Ok(unescaper.finish())
}

/// Renders bytes as a literal body any [`Grammar`] decodes back exactly.
///
/// A small set of printable characters is kept; every other byte becomes a
/// three digit octal escape.
pub fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        if b.is_ascii_alphanumeric() || matches!(b, b' ' | b'.' | b'_' | b'-' | b'/' | b':' | b',') {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\{:03o}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [Grammar; 6] = [
        Grammar::C,
        Grammar::Java,
        Grammar::Go,
        Grammar::Python,
        Grammar::Ruby,
        Grammar::Php,
    ];

    fn decode(body: &str, grammar: Grammar) -> Result<Vec<u8>> {
        unescape(body, grammar, false, &mut Diagnostics::new())
    }

    #[test]
    fn test_simple_escapes() {
        assert_eq!(decode(r#"a\n\t\"\\"#, Grammar::Java).unwrap(), b"a\n\t\"\\");
        assert_eq!(decode(r"\e\#\s", Grammar::Ruby).unwrap(), [0x1B, b'#', b' ']);
        assert_eq!(decode(r"\$\e", Grammar::Php).unwrap(), [b'$', 0x1B]);
        assert_eq!(decode(r"\a\?", Grammar::C).unwrap(), [0x07, b'?']);
    }

    #[test]
    fn test_octal() {
        assert_eq!(decode(r"\0\12\377", Grammar::C).unwrap(), [0, 0o12, 0xFF]);
        // at most three digits are consumed
        assert_eq!(decode(r"\1234", Grammar::Java).unwrap(), [0o123, b'4']);
        assert_eq!(decode(r"\012", Grammar::Go).unwrap(), [0o12]);
        // Java only takes a third digit after a leading 0-3
        assert_eq!(decode(r"\477", Grammar::Java).unwrap(), [0o47, b'7']);
        assert_eq!(decode(r"\377\78", Grammar::Java).unwrap(), [0xFF, 0o7, b'8']);
        assert!(matches!(
            decode(r"\12", Grammar::Go),
            Err(Error::EscapeDecode { offset: 0, .. })
        ));
        assert!(matches!(
            decode(r"ab\477", Grammar::Python),
            Err(Error::EscapeDecode { offset: 2, .. })
        ));
    }

    #[test]
    fn test_hex() {
        assert_eq!(decode(r"\x0a\xFF", Grammar::Python).unwrap(), [0x0A, 0xFF]);
        assert_eq!(decode(r"\xA", Grammar::Php).unwrap(), [0x0A]);
        assert!(decode(r"\xA", Grammar::Go).is_err());
        // Java has no \x escape: the backslash is kept
        assert_eq!(decode(r"\x41", Grammar::Java).unwrap(), b"\\x41");
    }

    #[test]
    fn test_unicode_multibyte() {
        assert_eq!(decode(r"é", Grammar::Go).unwrap(), "é".as_bytes());
        assert_eq!(decode(r"\U0001F600", Grammar::Go).unwrap(), "😀".as_bytes());
        assert_eq!(decode(r"\u{e9}", Grammar::Ruby).unwrap(), "é".as_bytes());
        assert_eq!(decode(r"\u{1F600}", Grammar::Php).unwrap(), "😀".as_bytes());
        assert_eq!(decode("é", Grammar::Ruby).unwrap(), "é".as_bytes());
        assert!(decode(r"\uD800", Grammar::Go).is_err());
    }

    #[test]
    fn test_unicode_single_byte() {
        assert_eq!(decode(r"é", Grammar::Java).unwrap(), [0xE9]);
        assert_eq!(decode("é", Grammar::Python).unwrap(), [0xE9]);
        assert!(matches!(
            decode(r"Ł", Grammar::C),
            Err(Error::EscapeDecode { .. })
        ));
    }

    #[test]
    fn test_lenient_truncation_warns() {
        let mut diags = Diagnostics::new();
        let bytes = unescape(r"Ł", Grammar::C, true, &mut diags).unwrap();
        assert_eq!(bytes, [0x41]);
        assert_eq!(diags.count(WarningKind::CodePointTruncated), 1);
    }

    #[test]
    fn test_unknown_escape_is_kept() {
        assert_eq!(decode(r"\q", Grammar::Go).unwrap(), b"\\q");
        assert_eq!(decode(r"\'", Grammar::Php).unwrap(), b"\\'");
    }

    #[test]
    fn test_incomplete_trailing_escape() {
        assert!(matches!(
            decode("abc\\", Grammar::Ruby),
            Err(Error::EscapeDecode { offset: 3, .. })
        ));
        assert!(decode(r"\u12", Grammar::Java).is_err());
        assert!(decode(r"\u{12", Grammar::Ruby).is_err());
    }

    #[test]
    fn test_offsets_span_fragments() {
        let mut diags = Diagnostics::new();
        let mut unescaper = Unescaper::new(Grammar::Java, false);
        unescaper.feed("ab", &mut diags).unwrap();
        let err = unescaper.feed(r"c\u12", &mut diags).unwrap_err();
        assert!(matches!(err, Error::EscapeDecode { offset: 3, .. }));
    }

    #[test]
    fn test_escape_keeps_safe_chars() {
        assert_eq!(escape(b"a.proto\n\"$"), r"a.proto\012\042\044");
    }

    proptest! {
        #[test]
        fn escape_round_trips(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let body = escape(&bytes);
            for grammar in ALL {
                let mut diags = Diagnostics::new();
                prop_assert_eq!(&unescape(&body, grammar, false, &mut diags).unwrap(), &bytes);
                prop_assert!(diags.is_empty());
            }
        }
    }
}
