//! Comment and string aware scanning over generated source text.
//!
//! Generated code routinely carries braces inside doc comments and string
//! defaults, so nesting is never found by counting raw characters. [`Lexer`]
//! is a single pass state machine that classifies every character as code,
//! line comment, block comment or literal; everything else in this module is
//! built on top of it.

/// Comment and literal syntax of a host language
#[derive(Debug, Clone, Copy)]
pub struct Lang {
    /// Line comment openers
    pub line_comments: &'static [&'static str],
    /// Block comment (open, close) pairs, checked before quotes
    pub block_comments: &'static [(&'static str, &'static str)],
    /// Characters that open a literal closed by the same character
    pub quotes: &'static [char],
    /// `'` opens a char literal only in the `'x'` / `'\..'` forms (Rust lifetimes)
    pub lifetimes: bool,
    /// `@"..."` strings with `""` as the only escape (C#)
    pub verbatim_strings: bool,
}

impl Lang {
    /// C, C++, Java, Go
    pub const C_LIKE: Lang = Lang {
        line_comments: &["//"],
        block_comments: &[("/*", "*/")],
        quotes: &['"', '\''],
        lifetimes: false,
        verbatim_strings: false,
    };

    /// C#, with verbatim and interpolated verbatim strings
    pub const CSHARP: Lang = Lang {
        line_comments: &["//"],
        block_comments: &[("/*", "*/")],
        quotes: &['"', '\''],
        lifetimes: false,
        verbatim_strings: true,
    };

    /// Rust
    pub const RUST: Lang = Lang {
        line_comments: &["//"],
        block_comments: &[("/*", "*/")],
        quotes: &['"', '\''],
        lifetimes: true,
        verbatim_strings: false,
    };

    /// Python; docstrings are treated as comments
    pub const PYTHON: Lang = Lang {
        line_comments: &["#"],
        block_comments: &[("\"\"\"", "\"\"\""), ("'''", "'''")],
        quotes: &['"', '\''],
        lifetimes: false,
        verbatim_strings: false,
    };

    /// PHP
    pub const PHP: Lang = Lang {
        line_comments: &["//", "#"],
        block_comments: &[("/*", "*/")],
        quotes: &['"', '\''],
        lifetimes: false,
        verbatim_strings: false,
    };

    /// Ruby (`=begin` blocks are not recognised)
    pub const RUBY: Lang = Lang {
        line_comments: &["#"],
        block_comments: &[],
        quotes: &['"', '\''],
        lifetimes: false,
        verbatim_strings: false,
    };

    /// Zig
    pub const ZIG: Lang = Lang {
        line_comments: &["//"],
        block_comments: &[],
        quotes: &['"', '\''],
        lifetimes: false,
        verbatim_strings: false,
    };
}

/// Classification of one character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Ordinary source text
    Code,
    /// Inside a line comment (the terminating newline is code)
    LineComment,
    /// Inside a block comment, delimiters included
    BlockComment,
    /// Inside a string or char literal, quotes included
    Literal,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Code,
    LineComment,
    BlockComment(&'static str),
    Literal { quote: char, escaped: bool },
    Verbatim,
}

/// Iterator of `(byte offset, char, region)` over a text
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    text: &'a str,
    chars: std::str::CharIndices<'a>,
    lang: Lang,
    state: State,
    /// Bytes before this offset belong to a multi-character delimiter already classified
    pending: usize,
    pending_region: Region,
}

impl<'a> Lexer<'a> {
    /// Lexes `text` from the start, in code state
    pub fn new(text: &'a str, lang: Lang) -> Self {
        Self {
            text,
            chars: text.char_indices(),
            lang,
            state: State::Code,
            pending: 0,
            pending_region: Region::Code,
        }
    }

    /// Length of a verbatim string opener at the start of `rest`
    fn verbatim_opener(&self, rest: &str) -> Option<usize> {
        if !self.lang.verbatim_strings {
            return None;
        }
        ["@\"", "@$\"", "$@\""]
            .iter()
            .find(|o| rest.starts_with(**o))
            .map(|o| o.len())
    }

    fn opens_char_literal(&self, at: usize) -> bool {
        let rest = &self.text[at + 1..];
        let mut chars = rest.chars();
        match chars.next() {
            Some('\\') => true,
            Some(_) => chars.next() == Some('\''),
            None => false,
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = (usize, char, Region);

    fn next(&mut self) -> Option<Self::Item> {
        let (i, c) = self.chars.next()?;

        if i < self.pending {
            return Some((i, c, self.pending_region));
        }

        let rest = &self.text[i..];
        let region = match self.state {
            State::Code => {
                if let Some(open) = self.lang.line_comments.iter().find(|o| rest.starts_with(**o)) {
                    self.state = State::LineComment;
                    self.pending = i + open.len();
                    self.pending_region = Region::LineComment;
                    Region::LineComment
                } else if let Some((open, close)) = self
                    .lang
                    .block_comments
                    .iter()
                    .find(|(o, _)| rest.starts_with(*o))
                {
                    self.state = State::BlockComment(close);
                    self.pending = i + open.len();
                    self.pending_region = Region::BlockComment;
                    Region::BlockComment
                } else if let Some(open) = self.verbatim_opener(rest) {
                    self.state = State::Verbatim;
                    self.pending = i + open;
                    self.pending_region = Region::Literal;
                    Region::Literal
                } else if self.lang.quotes.contains(&c)
                    && !(c == '\'' && self.lang.lifetimes && !self.opens_char_literal(i))
                {
                    self.state = State::Literal {
                        quote: c,
                        escaped: false,
                    };
                    Region::Literal
                } else {
                    Region::Code
                }
            }
            State::LineComment => {
                if c == '\n' {
                    self.state = State::Code;
                    Region::Code
                } else {
                    Region::LineComment
                }
            }
            State::BlockComment(close) => {
                if rest.starts_with(close) {
                    self.state = State::Code;
                    self.pending = i + close.len();
                    self.pending_region = Region::BlockComment;
                }
                Region::BlockComment
            }
            State::Literal { quote, escaped } => {
                if escaped {
                    self.state = State::Literal {
                        quote,
                        escaped: false,
                    };
                } else if c == '\\' {
                    self.state = State::Literal {
                        quote,
                        escaped: true,
                    };
                } else if c == quote {
                    self.state = State::Code;
                }
                Region::Literal
            }
            State::Verbatim => {
                if c == '"' {
                    if rest[1..].starts_with('"') {
                        self.pending = i + 2;
                        self.pending_region = Region::Literal;
                    } else {
                        self.state = State::Code;
                    }
                }
                Region::Literal
            }
        };

        Some((i, c, region))
    }
}

/// Finds the delimiter closing the one at byte offset `open`.
///
/// `open` must point at `{`, `(` or `[`. Delimiters inside comments and
/// literals are ignored. Returns `None` when the text ends first.
pub fn find_matching(text: &str, open: usize, lang: Lang) -> Option<usize> {
    let open_char = text[open..].chars().next()?;
    let close_char = match open_char {
        '{' => '}',
        '(' => ')',
        '[' => ']',
        _ => return None,
    };

    let mut depth = 0usize;
    for (i, c, region) in Lexer::new(&text[open..], lang) {
        if region != Region::Code {
            continue;
        }
        if c == open_char {
            depth += 1;
        } else if c == close_char {
            depth -= 1;
            if depth == 0 {
                return Some(open + i);
            }
        }
    }
    None
}

/// Replaces comment text with spaces, keeping newlines and byte offsets
pub fn mask_comments(text: &str, lang: Lang) -> String {
    let mut out = String::with_capacity(text.len());
    for (_, c, region) in Lexer::new(text, lang) {
        match region {
            Region::LineComment | Region::BlockComment if c != '\n' => {
                for _ in 0..c.len_utf8() {
                    out.push(' ');
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Bodies of every `quote`-delimited literal in `text`, escapes left intact
pub fn string_literals(text: &str, quote: char, lang: Lang) -> Vec<&str> {
    let mut bodies = Vec::new();
    // (opening quote, body start) of the literal being walked
    let mut open: Option<(char, usize)> = None;
    let mut escaped = false;

    for (i, c, region) in Lexer::new(text, lang) {
        if region != Region::Literal {
            continue;
        }
        match open {
            None => {
                open = Some((c, i + c.len_utf8()));
                escaped = false;
            }
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some((q, body_start)) if c == q => {
                if q == quote {
                    bodies.push(&text[body_start..i]);
                }
                open = None;
            }
            Some(_) => {}
        }
    }
    bodies
}

/// Body of the literal whose opening quote sits at byte offset `open`
pub fn quoted_body(text: &str, open: usize) -> Option<&str> {
    let quote = text[open..].chars().next()?;
    let body_start = open + quote.len_utf8();
    let mut escaped = false;

    for (i, c) in text[body_start..].char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(&text[body_start..body_start + i]);
        }
    }
    None
}

/// Walks every top-level item introduced by a header match.
///
/// For each match of `header` (which must end right before an opening
/// brace, or include it), `visit` receives the captures and the body
/// between the braces; scanning resumes after the closing brace, so items
/// nested inside a visited body are not reported again.
pub fn for_each_item<'t>(
    text: &'t str,
    header: &regex::Regex,
    lang: Lang,
    mut visit: impl FnMut(&regex::Captures<'t>, &'t str),
) {
    let mut from = 0;
    while let Some(caps) = header.captures_at(text, from) {
        let Some(whole) = caps.get(0) else { break };
        let Some(open) = text[whole.start()..].find('{').map(|o| whole.start() + o) else {
            break;
        };
        match find_matching(text, open, lang) {
            Some(close) => {
                visit(&caps, &text[open + 1..close]);
                from = close + 1;
            }
            None => break,
        }
    }
}

/// Byte ranges of top-level `{ ... }` bodies opened by `header` matches.
///
/// Used to blank out nested declarations before scanning a scope's own
/// members.
pub fn item_spans(text: &str, header: &regex::Regex, lang: Lang) -> Vec<std::ops::Range<usize>> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(m) = header.find_at(text, from) {
        let Some(open) = text[m.start()..].find('{').map(|o| m.start() + o) else {
            break;
        };
        match find_matching(text, open, lang) {
            Some(close) => {
                spans.push(m.start()..close + 1);
                from = close + 1;
            }
            None => break,
        }
    }
    spans
}

/// Copy of `text` with the given byte ranges replaced by spaces
pub fn blank_spans(text: &str, spans: &[std::ops::Range<usize>]) -> String {
    let mut out = text.as_bytes().to_vec();
    for span in spans {
        for byte in &mut out[span.clone()] {
            if *byte != b'\n' {
                *byte = b' ';
            }
        }
    }
    // Spans start and end on ASCII delimiters.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Width of the leading whitespace of `line`
pub fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Lines following the line that ends at `header_end` which are indented
/// deeper than that line. Blank lines inside the block are kept.
pub fn indented_block(text: &str, header_end: usize) -> &str {
    let line_start = text[..header_end].rfind('\n').map_or(0, |p| p + 1);
    let header_indent = indent_of(&text[line_start..header_end]);
    let body_start = match text[header_end..].find('\n') {
        Some(p) => header_end + p + 1,
        None => return "",
    };

    let mut end = body_start;
    let mut pos = body_start;
    for line in text[body_start..].split_inclusive('\n') {
        pos += line.len();
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) <= header_indent {
            break;
        }
        end = pos;
    }
    &text[body_start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_braces_in_comments_and_strings() {
        let text = r#"struct A { // }
    /* { */ s: "}", c: '{',
}
rest"#;
        let open = text.find('{').unwrap();
        let close = find_matching(text, open, Lang::C_LIKE).unwrap();
        assert_eq!(&text[close..], "}\nrest");
    }

    #[test]
    fn test_rust_lifetimes_are_not_literals() {
        let text = "impl<'a> X<'a> { fn f(&'a self) -> char { '}' } }";
        let open = text.find('{').unwrap();
        let close = find_matching(text, open, Lang::RUST).unwrap();
        assert_eq!(close, text.len() - 1);
    }

    #[test]
    fn test_escaped_quote_in_literal() {
        let text = r#"{ "a\"}" }"#;
        assert_eq!(find_matching(text, 0, Lang::C_LIKE), Some(text.len() - 1));
    }

    #[test]
    fn test_csharp_verbatim_strings() {
        let text = r#"{ Path = @"C:\dir\"; Doc = @"say ""}"" // kept"; Fmt = $@"{{x}}"; }"#;
        assert_eq!(find_matching(text, 0, Lang::CSHARP), Some(text.len() - 1));
        assert_eq!(mask_comments(text, Lang::CSHARP), text);
        // without verbatim support the trailing backslash escapes the quote
        assert_ne!(find_matching(text, 0, Lang::C_LIKE), Some(text.len() - 1));
    }

    #[test]
    fn test_unbalanced() {
        assert_eq!(find_matching("{ {", 0, Lang::C_LIKE), None);
    }

    #[test]
    fn test_mask_comments_keeps_offsets() {
        let text = "a /* é */ b // x\nc \"// kept\"";
        let masked = mask_comments(text, Lang::C_LIKE);
        assert_eq!(masked.len(), text.len());
        assert!(masked.starts_with("a "));
        assert!(masked.contains("\nc \"// kept\""));
        assert!(!masked.contains('x'));
    }

    #[test]
    fn test_python_docstrings_are_comments() {
        let text = "class A:\n    \"\"\"Doc with { and \"quote\".\"\"\"\n    x = '}'\n";
        let masked = mask_comments(text, Lang::PYTHON);
        assert!(!masked.contains("Doc"));
        assert!(masked.contains("x = '}'"));
    }

    #[test]
    fn test_string_literals() {
        let text = r#""ab\"c" + /* "no" */ "d" // "nope""#;
        assert_eq!(string_literals(text, '"', Lang::C_LIKE), vec![r#"ab\"c"#, "d"]);
    }

    #[test]
    fn test_quoted_body() {
        let text = r#"x = b'a\'b' + 1"#;
        let open = text.find('\'').unwrap();
        assert_eq!(quoted_body(text, open), Some(r"a\'b"));
        assert_eq!(quoted_body("'open", 0), None);
    }

    #[test]
    fn test_for_each_item_skips_nested() {
        let text = "mod a { mod b { } } mod c { }";
        let header = Regex::new(r"mod (\w+) \{").unwrap();
        let mut names = Vec::new();
        for_each_item(text, &header, Lang::RUST, |caps, _body| {
            names.push(caps[1].to_string());
        });
        assert_eq!(names, ["a", "c"]);
    }

    #[test]
    fn test_blank_spans() {
        let text = "a { b }\nc";
        let header = Regex::new(r"a \{").unwrap();
        let spans = item_spans(text, &header, Lang::C_LIKE);
        assert_eq!(blank_spans(text, &spans), "       \nc");
    }

    #[test]
    fn test_indented_block() {
        let text = "class A:\n    x = 1\n\n    y = 2\nclass B:\n    z = 3\n";
        let header_end = text.find(':').unwrap() + 1;
        assert_eq!(indented_block(text, header_end), "    x = 1\n\n    y = 2\n");
    }
}
