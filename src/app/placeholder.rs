use std::collections::HashMap;
use std::ops::Range;

/// Source of variable values, `name -> (value, exists)`.
pub trait Environment {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
    }
}

impl Environment for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<E: Environment + ?Sized> Environment for &E {
    fn lookup(&self, name: &str) -> Option<String> {
        (**self).lookup(name)
    }
}

/// A single recognized placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub name: &'a str,
    /// `Some` whenever the `:=` separator was present, even with empty text.
    pub default: Option<&'a [u8]>,
    /// Byte range of the whole `${...}` text in the scanned buffer.
    pub span: Range<usize>,
}

impl Token<'_> {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// Iterator over the placeholders of a buffer, left to right.
pub struct Tokens<'a> {
    input: &'a [u8],
    pos: usize,
    /// No `}` occurs at or after this offset.
    unclosed_from: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        while self.pos < self.input.len() {
            let offset = self.input[self.pos..].iter().position(|&b| b == b'$')?;
            let start = self.pos + offset;
            match parse_token(self.input, start, &mut self.unclosed_from) {
                Some(token) => {
                    self.pos = token.span.end;
                    return Some(token);
                }
                None => self.pos = start + 1,
            }
        }
        None
    }
}

/// Scans raw bytes for `${NAME}` and `${NAME:=default}`. A default runs to
/// the first `}` after `:=`; there is no nesting.
pub fn tokens(input: &[u8]) -> Tokens<'_> {
    Tokens {
        input,
        pos: 0,
        unclosed_from: input.len(),
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Parses a token starting at the `$` at `start`, if one is there.
/// `unclosed_from` is lowered when a default turns out to be unterminated,
/// so later attempts past that point fail without rescanning.
fn parse_token<'a>(input: &'a [u8], start: usize, unclosed_from: &mut usize) -> Option<Token<'a>> {
    if input.get(start + 1) != Some(&b'{') {
        return None;
    }
    let name_start = start + 2;
    if !input.get(name_start).copied().is_some_and(is_name_start) {
        return None;
    }
    let name_end = input[name_start..]
        .iter()
        .position(|&b| !is_name_char(b))
        .map_or(input.len(), |len| name_start + len);
    let name = std::str::from_utf8(&input[name_start..name_end]).ok()?;

    match input.get(name_end) {
        Some(b'}') => Some(Token {
            name,
            default: None,
            span: start..name_end + 1,
        }),
        Some(b':') if input.get(name_end + 1) == Some(&b'=') => {
            let default_start = name_end + 2;
            if default_start >= *unclosed_from {
                return None;
            }
            let Some(close) = input[default_start..].iter().position(|&b| b == b'}') else {
                *unclosed_from = default_start;
                return None;
            };
            let default_end = default_start + close;
            Some(Token {
                name,
                default: Some(&input[default_start..default_end]),
                span: start..default_end + 1,
            })
        }
        _ => None,
    }
}

/// Rewrites every placeholder in `content`.
///
/// A variable that exists wins over any default, even when its value is
/// empty. An absent variable takes its default when `:=` was written, and
/// otherwise the token text is kept verbatim.
pub fn substitute<E: Environment + ?Sized>(content: &[u8], env: &E) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len());
    let mut last = 0;
    for token in tokens(content) {
        out.extend_from_slice(&content[last..token.span.start]);
        match (env.lookup(token.name), token.default) {
            (Some(value), _) => out.extend_from_slice(value.as_bytes()),
            (None, Some(default)) => out.extend_from_slice(default),
            (None, None) => out.extend_from_slice(&content[token.span.clone()]),
        }
        last = token.span.end;
    }
    out.extend_from_slice(&content[last..]);
    out
}

/// Names referenced without a default whose variable is absent, in order of
/// appearance (duplicates included).
pub fn missing_vars<'a, E: Environment + ?Sized>(content: &'a [u8], env: &E) -> Vec<&'a str> {
    tokens(content)
        .filter(|token| !token.has_default() && env.lookup(token.name).is_none())
        .map(|token| token.name)
        .collect()
}
