//! Logical comparison of rendered structures.
//!
//! Origin and destination code often render the same structure with
//! different syntax: `{a=1}` against `{'a': 1}`, object addresses, class
//! names. Strings are normalized, split into named `[ name ... ]` sections,
//! and each section is parsed as a literal and compared by value.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

static ANY_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]+?object at 0x[0-9a-fA-F]+>").expect("static regex"));
static OPTION_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[ option:.*?::.*?::.*?\]").expect("static regex"));
static CLASS_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"class\s+[\w.$]+").expect("static regex"));
static CLASS_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<class\s+'[\w.]+'?>").expect("static regex"));
static BARE_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\w+)\s*[:=]\s*").expect("static regex"));
static SECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*(\w+)\s+").expect("static regex"));

const OBJECT_PLACEHOLDER: &str = "\"<_anyobject_>\"";
const CLASS_PLACEHOLDER: &str = "\"<class>\"";

/// Deepest container nesting a literal may have
pub const MAX_DEPTH: usize = 256;

/// Literal parse failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiteralError {
    /// Character that cannot start or continue a literal
    #[error("unexpected {found:?} at offset {offset}")]
    Unexpected {
        /// Character offset
        offset: usize,
        /// Offending character
        found: char,
    },

    /// Input ended inside a literal
    #[error("unexpected end of input")]
    Eof,

    /// Identifier other than `None`, `True` or `False`
    #[error("{0:?} is not a literal")]
    Name(String),

    /// Containers nested deeper than the limit
    #[error("nesting deeper than {0}")]
    TooDeep(usize),

    /// Section with no closing bracket
    #[error("section {0:?} has no closing bracket")]
    Unbalanced(String),

    /// Section whose body is not a literal
    #[error("section {name:?}: {source}")]
    Section {
        /// Section name
        name: String,
        /// Parse failure
        source: Box<LiteralError>,
    },
}

/// A parsed literal value
#[derive(Debug, Clone)]
pub enum Literal {
    /// `None`
    None,
    /// `True` or `False`
    Bool(bool),
    /// Integer
    Int(i128),
    /// Float
    Float(f64),
    /// Quoted string
    Str(String),
    /// `[...]`
    List(Vec<Literal>),
    /// `(...)`
    Tuple(Vec<Literal>),
    /// `{a, b}`
    Set(Vec<Literal>),
    /// `{k: v}`
    Dict(Vec<(Literal, Literal)>),
}

impl Literal {
    /// Parse a complete literal
    ///
    /// # Errors
    ///
    /// Returns error if the text is not exactly one literal
    pub fn parse(text: &str) -> Result<Self, LiteralError> {
        let mut parser = Parser::new(text);
        let value = parser.value()?;
        parser.skip_ws();
        match parser.peek() {
            None => Ok(value),
            Some(found) => Err(LiteralError::Unexpected {
                offset: parser.pos,
                found,
            }),
        }
    }

    fn as_number(&self) -> Option<f64> {
        #[allow(clippy::cast_precision_loss)]
        match self {
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::List(a), Self::List(b)) | (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => a.len() == b.len() && a.iter().all(|x| b.contains(x)),
            (Self::Dict(a), Self::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Canonicalize syntax that differs between renderers.
///
/// Object addresses and `[ option: ... ]` blocks become an opaque object
/// placeholder, class references become a class placeholder, and bare
/// `key: ` or `key=` prefixes become quoted keys.
#[must_use]
pub fn normalize(text: &str) -> String {
    let text = ANY_OBJECT.replace_all(text, OBJECT_PLACEHOLDER);
    let text = OPTION_BLOCK.replace_all(&text, OBJECT_PLACEHOLDER);
    let text = CLASS_WORD.replace_all(&text, CLASS_PLACEHOLDER);
    let text = CLASS_TAG.replace_all(&text, CLASS_PLACEHOLDER);
    quote_keys(&text)
}

/// Quote bare keys unless the key already follows a quote
fn quote_keys(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut last = 0;
    for caps in BARE_KEY.captures_iter(text) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let quoted_before = text[..whole.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c == '\'' || c == '"');
        if quoted_before {
            continue;
        }
        out.push_str(&text[last..whole.start()]);
        out.push('\'');
        out.push_str(key.as_str());
        out.push_str("': ");
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Split `[ name body ]` sections and parse each body.
///
/// A repeated name keeps the last body.
///
/// # Errors
///
/// Returns error if a section is unbalanced or its body is not a literal
pub fn named_sections(text: &str) -> Result<IndexMap<String, Literal>, LiteralError> {
    let mut sections = IndexMap::new();
    let mut pos = 0;
    while let Some(caps) = SECTION.captures_at(text, pos) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let name = name.as_str().to_string();
        let Some((body, end)) = balanced_body(text, whole.end()) else {
            return Err(LiteralError::Unbalanced(name));
        };
        let parsed = Literal::parse(&normalize(body)).map_err(|e| LiteralError::Section {
            name: name.clone(),
            source: Box::new(e),
        })?;
        sections.insert(name, parsed);
        pos = end + 1;
    }
    Ok(sections)
}

/// Body up to the `]` closing an already-open bracket, and that bracket's offset
fn balanced_body(text: &str, start: usize) -> Option<(&str, usize)> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;
    for (offset, c) in text[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' => escape = true,
            '"' | '\'' => in_string = !in_string,
            '[' if !in_string => depth += 1,
            ']' if !in_string => {
                if depth == 0 {
                    let end = start + offset;
                    return Some((text[start..end].trim(), end));
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Whether two renderings describe the same structure
#[must_use]
pub fn logically_equal(a: &str, b: &str) -> bool {
    if a.trim_start().starts_with("[ option:") && b.trim_start().starts_with("[ option:") {
        return normalize(a).trim() == normalize(b).trim();
    }
    let (Ok(left), Ok(right)) = (named_sections(a), named_sections(b)) else {
        tracing::trace!("rendering is not a section list");
        return false;
    };
    if left.is_empty() || right.is_empty() || left.len() != right.len() {
        return false;
    }
    left.iter()
        .all(|(name, value)| right.get(name).is_some_and(|other| other == value))
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn unexpected(&self) -> LiteralError {
        match self.peek() {
            Some(found) => LiteralError::Unexpected {
                offset: self.pos,
                found,
            },
            None => LiteralError::Eof,
        }
    }

    fn eat(&mut self, want: char) -> Result<(), LiteralError> {
        self.skip_ws();
        if self.peek() == Some(want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn value(&mut self) -> Result<Literal, LiteralError> {
        self.skip_ws();
        match self.peek().ok_or(LiteralError::Eof)? {
            '[' | '(' | '{' => {
                if self.depth == MAX_DEPTH {
                    return Err(LiteralError::TooDeep(MAX_DEPTH));
                }
                self.depth += 1;
                let container = self.container();
                self.depth -= 1;
                container
            }
            '\'' | '"' => self.strings(),
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            c if c.is_alphabetic() || c == '_' => self.name(),
            _ => Err(self.unexpected()),
        }
    }

    fn container(&mut self) -> Result<Literal, LiteralError> {
        match self.peek().ok_or(LiteralError::Eof)? {
            '[' => {
                self.pos += 1;
                Ok(Literal::List(self.items(']')?.0))
            }
            '(' => {
                self.pos += 1;
                let (items, trailing_comma) = self.items(')')?;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.into_iter().next().unwrap_or(Literal::None))
                } else {
                    Ok(Literal::Tuple(items))
                }
            }
            '{' => {
                self.pos += 1;
                self.brace()
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Comma-separated values up to `close`; reports a trailing comma
    fn items(&mut self, close: char) -> Result<(Vec<Literal>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    trailing_comma = true;
                }
                Some(c) if c == close => trailing_comma = false,
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn brace(&mut self) -> Result<Literal, LiteralError> {
        self.skip_ws();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(Literal::Dict(Vec::new()));
        }
        let first = self.value()?;
        self.skip_ws();
        if self.peek() == Some(':') {
            self.pos += 1;
            let mut entries = vec![(first, self.value()?)];
            loop {
                self.skip_ws();
                match self.bump() {
                    Some('}') => break,
                    Some(',') => {
                        self.skip_ws();
                        if self.peek() == Some('}') {
                            self.pos += 1;
                            break;
                        }
                        let key = self.value()?;
                        self.eat(':')?;
                        let value = self.value()?;
                        match entries.iter_mut().find(|(k, _)| *k == key) {
                            Some(slot) => slot.1 = value,
                            None => entries.push((key, value)),
                        }
                    }
                    Some(_) => {
                        self.pos -= 1;
                        return Err(self.unexpected());
                    }
                    None => return Err(LiteralError::Eof),
                }
            }
            return Ok(Literal::Dict(entries));
        }

        let mut members = vec![first];
        loop {
            self.skip_ws();
            match self.bump() {
                Some('}') => break,
                Some(',') => {
                    self.skip_ws();
                    if self.peek() == Some('}') {
                        self.pos += 1;
                        break;
                    }
                    let member = self.value()?;
                    if !members.contains(&member) {
                        members.push(member);
                    }
                }
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.unexpected());
                }
                None => return Err(LiteralError::Eof),
            }
        }
        Ok(Literal::Set(members))
    }

    /// One or more adjacent quoted strings, concatenated
    fn strings(&mut self) -> Result<Literal, LiteralError> {
        let mut out = String::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(quote @ ('\'' | '"')) => {
                    self.pos += 1;
                    self.string_body(quote, &mut out)?;
                }
                _ => return Ok(Literal::Str(out)),
            }
        }
    }

    fn string_body(&mut self, quote: char, out: &mut String) -> Result<(), LiteralError> {
        loop {
            let c = self.bump().ok_or(LiteralError::Eof)?;
            if c == quote {
                return Ok(());
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let esc = self.bump().ok_or(LiteralError::Eof)?;
            match esc {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                'x' => out.push(self.hex_escape(2)?),
                'u' => out.push(self.hex_escape(4)?),
                '\n' => {}
                other => {
                    if !matches!(other, '\\' | '\'' | '"') {
                        out.push('\\');
                    }
                    out.push(other);
                }
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        let start = self.pos;
        let mut code = 0u32;
        for _ in 0..digits {
            let c = self.bump().ok_or(LiteralError::Eof)?;
            let d = c.to_digit(16).ok_or(LiteralError::Unexpected {
                offset: self.pos - 1,
                found: c,
            })?;
            code = code * 16 + d;
        }
        char::from_u32(code).ok_or(LiteralError::Unexpected {
            offset: start,
            found: 'x',
        })
    }

    fn number(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.pos += 1;
            self.skip_ws();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    if matches!(self.chars.get(self.pos + 1), Some('-' | '+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| !c.is_whitespace() && **c != '_')
            .collect();
        let bad = || LiteralError::Unexpected {
            offset: start,
            found: self.chars.get(start).copied().unwrap_or('?'),
        };
        if is_float {
            text.parse::<f64>().map(Literal::Float).map_err(|_| bad())
        } else {
            text.parse::<i128>().map(Literal::Int).map_err(|_| bad())
        }
    }

    fn name(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "None" => Ok(Literal::None),
            "True" => Ok(Literal::Bool(true)),
            "False" => Ok(Literal::Bool(false)),
            _ => Err(LiteralError::Name(word)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        assert_eq!(Literal::parse("42").unwrap(), Literal::Int(42));
        assert_eq!(Literal::parse("-1.5").unwrap(), Literal::Float(-1.5));
        assert_eq!(Literal::parse("1e3").unwrap(), Literal::Float(1000.0));
        assert_eq!(Literal::parse("None").unwrap(), Literal::None);
        assert_eq!(Literal::parse("'a\\'b'").unwrap(), Literal::Str("a'b".into()));
        assert_eq!(Literal::parse("'a' \"b\"").unwrap(), Literal::Str("ab".into()));
        assert!(matches!(Literal::parse("foo"), Err(LiteralError::Name(_))));
        assert!(Literal::parse("1 2").is_err());
    }

    #[test]
    fn test_parse_containers() {
        assert_eq!(
            Literal::parse("[1, (2,), (3), {}]").unwrap(),
            Literal::List(vec![
                Literal::Int(1),
                Literal::Tuple(vec![Literal::Int(2)]),
                Literal::Int(3),
                Literal::Dict(vec![]),
            ])
        );
        assert_eq!(
            Literal::parse("{'a': 1, 'b': [True]}").unwrap(),
            Literal::parse("{'b': [1], 'a': 1.0}").unwrap()
        );
        assert_eq!(Literal::parse("{1, 2, 2}").unwrap(), Literal::parse("{2, 1}").unwrap());
        assert_ne!(Literal::parse("[1, 2]").unwrap(), Literal::parse("(1, 2)").unwrap());
        assert!(Literal::parse("[1, 2").is_err());
    }

    #[test]
    fn test_normalize_keys() {
        assert_eq!(normalize("{a=1, b: 2}"), "{'a': 1, 'b': 2}");
        assert_eq!(normalize("{'a': 1}"), "{'a': 1}");
        assert_eq!(normalize("a:b:c"), "'a': 'b': c");
    }

    #[test]
    fn test_normalize_placeholders() {
        assert_eq!(normalize("<app.Thing object at 0x7f3a>"), "\"<_anyobject_>\"");
        assert_eq!(normalize("class org.acme.Foo$Bar"), "\"<class>\"");
        assert_eq!(normalize("<class 'app.Foo'>"), "\"<class>\"");
    }

    #[test]
    fn test_named_sections() {
        let sections = named_sections("[ short {a=1} ] [ long {b=[1, 2]} ]").unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections["short"], Literal::parse("{'a': 1}").unwrap());
        assert!(matches!(named_sections("[ short {a=1}"), Err(LiteralError::Unbalanced(_))));
        assert!(matches!(named_sections("[ short {a=foo} ]"), Err(LiteralError::Section { .. })));
        assert!(named_sections("no sections here").unwrap().is_empty());
    }

    #[test]
    fn test_logically_equal() {
        assert!(!logically_equal("[ opts {verbose=true} ]", "[ opts {'verbose': True} ]"));
        assert!(logically_equal("[ opts {n=3, m=4} ]", "[ opts {'m': 4, 'n': 3} ]"));
        assert!(logically_equal(
            "[ a {x=1} ] [ b {y=2} ]",
            "[ b {'y': 2} ] [ a {'x': 1.0} ]"
        ));
        assert!(!logically_equal("[ a {x=1} ]", "[ a {x=2} ]"));
        assert!(!logically_equal("hello", "world"));
        assert!(!logically_equal("[ a {x=1} ]", "[ a {x=1} ] [ b {y=1} ]"));
    }

    #[test]
    fn test_nesting_limit() {
        let at_limit = format!("{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(Literal::parse(&at_limit).is_ok());
        let past_limit = format!("{}{}", "[".repeat(MAX_DEPTH + 1), "]".repeat(MAX_DEPTH + 1));
        assert_eq!(Literal::parse(&past_limit), Err(LiteralError::TooDeep(MAX_DEPTH)));
        let mixed = format!("{}{}", "({[".repeat(MAX_DEPTH), "]})".repeat(MAX_DEPTH));
        assert!(matches!(Literal::parse(&mixed), Err(LiteralError::TooDeep(_))));
    }

    #[test]
    fn test_deep_sections_are_unequal() {
        let deep = format!("[ a {}{} ]", "[".repeat(200_000), "]".repeat(200_000));
        assert!(matches!(
            named_sections(&deep),
            Err(LiteralError::Section { source, .. }) if *source == LiteralError::TooDeep(MAX_DEPTH)
        ));
        assert!(!logically_equal(&deep, &deep));
        assert!(!logically_equal(&deep, "[ a [] ]"));
    }

    #[test]
    fn test_partial_parse_failures_are_unequal() {
        assert!(matches!(Literal::parse("{'x': [1, 2}"), Err(LiteralError::Unexpected { found: '}', .. })));
        assert!(matches!(Literal::parse("[1, (2, 3]"), Err(LiteralError::Unexpected { .. })));
        assert_eq!(Literal::parse("{'x': [1,"), Err(LiteralError::Eof));
        assert!(!logically_equal("[ a {x=[1, 2} ]", "[ a {x=[1, 2]} ]"));
        assert!(!logically_equal("[ a {x=1} ] [ b (1, ]", "[ a {x=1} ] [ b (1,) ]"));
    }

    #[test]
    fn test_option_blocks() {
        assert!(logically_equal(
            "[ option: -v :: verbose :: <app.Opt object at 0x1> ]",
            "[ option: -q :: quiet :: <other.Opt object at 0x2> ]"
        ));
    }
}
