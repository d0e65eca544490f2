//! Schema and table name filters.
//!
//! Filters are written as POSIX extended regular expressions. The `regex`
//! crate reads a different grammar: it knows Perl escapes (`\d`, `\b`),
//! lazy quantifiers and inline `(?...)` groups, and inside a bracket
//! expression it treats `[`, `&&`, `--` and `~~` as nested classes and set
//! operators. A pattern is therefore checked against the POSIX grammar and
//! rewritten into an equivalent `regex` pattern before it is compiled; the
//! text as given is kept for display and serialization.

use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::iter::Peekable;
use std::str::Chars;

/// A compiled name filter that keeps its source text.
#[derive(Debug, Clone)]
pub struct Filter {
    source: String,
    regex: Regex,
}

impl Filter {
    /// Compiles `pattern` for the option named `option`.
    ///
    /// An empty pattern means "no filter" and yields `Ok(None)`.
    ///
    /// # Errors
    /// Returns [`ConfigError::BadRegex`] naming `option` when the pattern is
    /// not a valid POSIX extended regular expression.
    pub fn compile(option: &'static str, pattern: &str) -> Result<Option<Self>, ConfigError> {
        if pattern.is_empty() {
            return Ok(None);
        }
        Self::parse(pattern)
            .map(Some)
            .map_err(|reason| ConfigError::BadRegex { option, reason })
    }

    fn parse(pattern: &str) -> Result<Self, String> {
        let translated = Translator::new(pattern).run()?;
        let regex = Regex::new(&translated).map_err(|e| match e {
            regex::Error::Syntax(msg) => msg
                .lines()
                .rev()
                .find(|l| l.starts_with("error:"))
                .map_or_else(
                    || msg.clone(),
                    |l| l.trim_start_matches("error: ").to_string(),
                ),
            other => other.to_string(),
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern text as given on the command line.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `name` matches anywhere in the pattern (unanchored).
    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Self::parse(&pattern).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Prev {
    /// Start of expression, after `(`, `|` or `^`
    Open,
    Atom,
    Quantifier,
}

/// One member of a bracket expression.
enum ClassItem {
    Char(char),
    /// `[:name:]`, kept verbatim
    Named(String),
}

/// Checks a POSIX ERE and rewrites it for the `regex` crate.
struct Translator<'a> {
    chars: Peekable<Chars<'a>>,
    out: String,
    prev: Prev,
}

impl<'a> Translator<'a> {
    fn new(pattern: &'a str) -> Self {
        Self {
            chars: pattern.chars().peekable(),
            out: String::with_capacity(pattern.len()),
            prev: Prev::Open,
        }
    }

    fn run(mut self) -> Result<String, String> {
        while let Some(c) = self.chars.next() {
            match c {
                '\\' => {
                    let literal = self.escape()?;
                    push_literal(&mut self.out, literal);
                    self.prev = Prev::Atom;
                }
                '[' => {
                    self.bracket_expression()?;
                    self.prev = Prev::Atom;
                }
                '(' => {
                    if self.chars.peek() == Some(&'?') {
                        return Err("missing argument to repetition operator: `?`".to_string());
                    }
                    self.out.push('(');
                    self.prev = Prev::Open;
                }
                '|' | '^' => {
                    self.out.push(c);
                    self.prev = Prev::Open;
                }
                '*' | '+' | '?' => {
                    self.quantifier(c)?;
                    self.out.push(c);
                }
                '{' if is_counted_repetition(self.chars.clone()) => {
                    self.quantifier('{')?;
                    self.out.push('{');
                    for d in self.chars.by_ref() {
                        self.out.push(d);
                        if d == '}' {
                            break;
                        }
                    }
                }
                ')' | '.' | '$' => {
                    self.out.push(c);
                    self.prev = Prev::Atom;
                }
                _ => {
                    push_literal(&mut self.out, c);
                    self.prev = Prev::Atom;
                }
            }
        }
        Ok(self.out)
    }

    fn quantifier(&mut self, op: char) -> Result<(), String> {
        match self.prev {
            Prev::Open => Err(format!("missing argument to repetition operator: `{op}`")),
            Prev::Quantifier => Err(format!("invalid nested repetition operator: `{op}`")),
            Prev::Atom => {
                self.prev = Prev::Quantifier;
                Ok(())
            }
        }
    }

    /// Reads the character denoted by an escape whose `\` was consumed.
    fn escape(&mut self) -> Result<char, String> {
        let Some(e) = self.chars.next() else {
            return Err("trailing backslash at end of expression".to_string());
        };
        match e {
            'a' => Ok('\u{7}'),
            'f' => Ok('\u{c}'),
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            'v' => Ok('\u{b}'),
            'x' => self.hex_escape(),
            '0' => Ok(self.octal_escape(0)),
            '1'..='7' if self.chars.peek().is_some_and(|d| ('0'..='7').contains(d)) => {
                Ok(self.octal_escape(e.to_digit(8).unwrap_or(0)))
            }
            e if e.is_ascii_punctuation() => Ok(e),
            e => Err(format!("invalid escape sequence: `\\{e}`")),
        }
    }

    /// Up to two more octal digits after the first.
    fn octal_escape(&mut self, first: u32) -> char {
        let mut value = first;
        for _ in 0..2 {
            match self.chars.peek().and_then(|d| d.to_digit(8)) {
                Some(digit) => {
                    self.chars.next();
                    value = value.saturating_mul(8).saturating_add(digit);
                }
                None => break,
            }
        }
        char::from_u32(value).unwrap_or('\0')
    }

    /// `\xHH` or `\x{H...}`.
    fn hex_escape(&mut self) -> Result<char, String> {
        let invalid = || "invalid escape sequence: `\\x`".to_string();
        let mut digits = String::new();
        if self.chars.peek() == Some(&'{') {
            self.chars.next();
            loop {
                match self.chars.next() {
                    Some('}') => break,
                    Some(d) if d.is_ascii_hexdigit() => digits.push(d),
                    _ => return Err(invalid()),
                }
            }
        } else {
            for _ in 0..2 {
                match self.chars.next() {
                    Some(d) if d.is_ascii_hexdigit() => digits.push(d),
                    _ => return Err(invalid()),
                }
            }
        }
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(invalid)
    }

    /// Rewrites a bracket expression whose opening `[` was already read.
    fn bracket_expression(&mut self) -> Result<(), String> {
        self.out.push('[');
        if self.chars.peek() == Some(&'^') {
            self.chars.next();
            self.out.push('^');
        }
        let mut first = true;
        loop {
            let item = match self.chars.next() {
                None => return Err("missing closing ]".to_string()),
                Some(']') if !first => {
                    self.out.push(']');
                    return Ok(());
                }
                Some(c) => self.class_item(c)?,
            };
            first = false;

            // `x-y` is a range unless the `-` is the last member.
            let mut lookahead = self.chars.clone();
            let is_range = lookahead.next() == Some('-')
                && lookahead.next().is_some_and(|c| c != ']');
            if let (ClassItem::Char(lo), true) = (&item, is_range) {
                self.chars.next();
                let Some(c) = self.chars.next() else {
                    return Err("missing closing ]".to_string());
                };
                let ClassItem::Char(hi) = self.class_item(c)? else {
                    return Err("invalid character class range".to_string());
                };
                push_class_literal(&mut self.out, *lo);
                self.out.push('-');
                push_class_literal(&mut self.out, hi);
                continue;
            }
            match item {
                ClassItem::Char(c) => push_class_literal(&mut self.out, c),
                ClassItem::Named(name) => {
                    self.out.push_str("[:");
                    self.out.push_str(&name);
                    self.out.push_str(":]");
                }
            }
        }
    }

    fn class_item(&mut self, c: char) -> Result<ClassItem, String> {
        match c {
            '\\' => self.escape().map(ClassItem::Char),
            '[' if self.chars.peek() == Some(&':') => {
                let mut rest = self.chars.clone();
                rest.next();
                let mut name = String::new();
                while let Some(d) = rest.next() {
                    if d == ':' && rest.peek() == Some(&']') {
                        rest.next();
                        self.chars = rest;
                        return Ok(ClassItem::Named(name));
                    }
                    name.push(d);
                }
                Ok(ClassItem::Char('['))
            }
            c => Ok(ClassItem::Char(c)),
        }
    }
}

/// Appends `c` so that it matches only itself outside a class.
fn push_literal(out: &mut String, c: char) {
    match c {
        '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        | '#' | '&' | '-' | '~' => {
            out.push('\\');
            out.push(c);
        }
        c if c.is_control() => out.push_str(&format!("\\x{{{:x}}}", u32::from(c))),
        c => out.push(c),
    }
}

/// Appends `c` so that it is a plain member inside a class.
fn push_class_literal(out: &mut String, c: char) {
    match c {
        '\\' | '[' | ']' | '^' | '-' | '&' | '~' => {
            out.push('\\');
            out.push(c);
        }
        c if c.is_control() => out.push_str(&format!("\\x{{{:x}}}", u32::from(c))),
        c => out.push(c),
    }
}

/// Whether the text after a `{` forms `n}`, `n,}` or `n,m}`.
fn is_counted_repetition<I>(rest: I) -> bool
where
    I: Iterator<Item = char>,
{
    let mut digits = 0usize;
    let mut seen_comma = false;
    for c in rest {
        match c {
            '0'..='9' => digits = digits.saturating_add(1),
            ',' if !seen_comma && digits > 0 => seen_comma = true,
            '}' => return digits > 0,
            _ => return false,
        }
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn reason(pattern: &str) -> String {
        match Filter::compile("-a/--table", pattern) {
            Err(ConfigError::BadRegex { option, reason }) => {
                assert_eq!(option, "-a/--table");
                reason
            }
            other => panic!("expected BadRegex for {pattern:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_pattern_is_no_filter() {
        assert!(Filter::compile("-c/--schema", "").unwrap().is_none());
    }

    #[test]
    fn test_posix_patterns_compile() {
        for pattern in [
            "^public$",
            "^(app|audit)_[0-9]+$",
            "[[:alpha:]_][[:alnum:]_]*",
            "[]a-z]",
            "[^.]+\\.log",
            "a{2,3}b{4}c{1,}",
            "x|y|z",
            "\\$temp",
            "^data[_[]",
            "^[a&&b]$",
            "[a-c~~]",
            "[--/]",
            "\\x41\\x{42}",
            "\\101",
        ] {
            let filter = Filter::compile("-c/--schema", pattern).unwrap();
            assert_eq!(filter.unwrap().as_str(), pattern);
        }
    }

    #[test]
    fn test_bracket_members_are_plain_characters() {
        let filter = Filter::compile("-a/--table", "^data[_[]").unwrap().unwrap();
        assert!(filter.is_match("data_2024"));
        assert!(filter.is_match("data[x"));
        assert!(!filter.is_match("data-x"));

        let filter = Filter::compile("-c/--schema", "^[a&&b]$").unwrap().unwrap();
        for name in ["a", "&", "b"] {
            assert!(filter.is_match(name), "{name} should match");
        }
        assert!(!filter.is_match("c"));

        let filter = Filter::compile("-c/--schema", "^[a~~-]+$").unwrap().unwrap();
        assert!(filter.is_match("a~-a"));
        assert!(!filter.is_match("ab"));

        let filter = Filter::compile("-c/--schema", "^[]^]$").unwrap().unwrap();
        assert!(filter.is_match("]"));
        assert!(filter.is_match("^"));
    }

    #[test]
    fn test_numeric_escapes() {
        let filter = Filter::compile("-a/--table", "^\\x41\\x{42}\\103$").unwrap().unwrap();
        assert!(filter.is_match("ABC"));
        assert_eq!(filter.as_str(), "^\\x41\\x{42}\\103$");

        assert_eq!(reason("\\1"), "invalid escape sequence: `\\1`");
        assert_eq!(reason("\\xZ1"), "invalid escape sequence: `\\x`");
    }

    #[test]
    fn test_escaped_punctuation_is_literal() {
        let filter = Filter::compile("-a/--table", "^\\<tmp\\>$").unwrap().unwrap();
        assert!(filter.is_match("<tmp>"));
        let filter = Filter::compile("-a/--table", "a{x").unwrap().unwrap();
        assert!(filter.is_match("a{x"));
    }

    #[test]
    fn test_unbalanced_parenthesis_rejected() {
        assert!(!reason("(foo").is_empty());
        assert!(!reason("foo)").is_empty());
    }

    #[test]
    fn test_unterminated_bracket_rejected() {
        assert_eq!(reason("[abc"), "missing closing ]");
        assert_eq!(reason("[[:alpha:]"), "missing closing ]");
    }

    #[test]
    fn test_perl_only_syntax_rejected() {
        assert_eq!(reason("\\d+"), "invalid escape sequence: `\\d`");
        assert_eq!(reason("a*?"), "invalid nested repetition operator: `?`");
        assert_eq!(reason("a{2}?"), "invalid nested repetition operator: `?`");
        assert_eq!(reason("(?i)users"), "missing argument to repetition operator: `?`");
        assert_eq!(reason("*users"), "missing argument to repetition operator: `*`");
        assert_eq!(reason("^*"), "missing argument to repetition operator: `*`");
        assert_eq!(reason("(+a)"), "missing argument to repetition operator: `+`");
        assert_eq!(reason("{2}a"), "missing argument to repetition operator: `{`");
        assert_eq!(reason("users\\"), "trailing backslash at end of expression");
    }

    #[test]
    fn test_filter_matching_is_unanchored() {
        let filter = Filter::compile("-a/--table", "^orders_").unwrap().unwrap();
        assert!(filter.is_match("orders_2024"));
        assert!(!filter.is_match("legacy_orders_2024"));

        let filter = Filter::compile("-a/--table", "tmp").unwrap().unwrap();
        assert!(filter.is_match("session_tmp_1"));
    }

    #[test]
    fn test_filter_serde_revalidates() {
        let filter = Filter::compile("-c/--schema", "^app$").unwrap().unwrap();
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, "\"^app$\"");
        let back: Filter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);

        assert!(serde_json::from_str::<Filter>("\"(unclosed\"").is_err());
    }
}
