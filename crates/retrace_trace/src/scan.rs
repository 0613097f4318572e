//! Bracket-balance scanner for payload values.
//!
//! Recorded values are JSON documents embedded in a free-form line, so a
//! value ends at the bracket that balances its opening bracket. Quote and
//! escape state is tracked so a brace inside a string literal does not end
//! the value early.

/// Which bracket pairs open a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Brackets {
    /// Only `{` / `}`
    Braces,
    /// `{` / `}` and `[` / `]`
    Any,
}

impl Brackets {
    fn opens(self, c: char) -> bool {
        match self {
            Self::Braces => c == '{',
            Self::Any => c == '{' || c == '[',
        }
    }

    fn closes(self, c: char) -> bool {
        match self {
            Self::Braces => c == '}',
            Self::Any => c == '}' || c == ']',
        }
    }
}

/// Find the first balanced value at or after `start`.
///
/// Returns the byte range of the value, brackets included. Text before the
/// first opening bracket is skipped.
#[must_use]
pub fn balanced_range(text: &str, start: usize, brackets: Brackets) -> Option<(usize, usize)> {
    let tail = text.get(start..)?;
    let mut depth = 0usize;
    let mut open_at = None;
    let mut in_quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in tail.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if c == '"' || c == '\'' {
            match in_quote {
                None => in_quote = Some(c),
                Some(q) if q == c => in_quote = None,
                Some(_) => {}
            }
            continue;
        }
        if in_quote.is_some() {
            continue;
        }
        if brackets.opens(c) {
            if depth == 0 {
                open_at = Some(start + offset);
            }
            depth += 1;
        } else if brackets.closes(c) && depth > 0 {
            depth -= 1;
            if depth == 0 {
                let begin = open_at?;
                return Some((begin, start + offset + c.len_utf8()));
            }
        }
    }
    None
}

/// Slice form of [`balanced_range`]
#[must_use]
pub fn balanced_value(text: &str, start: usize, brackets: Brackets) -> Option<&str> {
    balanced_range(text, start, brackets).map(|(begin, end)| &text[begin..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_object() {
        let text = r#"Return value: {"type":"int","value":"3"}, Arg0"#;
        assert_eq!(
            balanced_value(text, 0, Brackets::Any),
            Some(r#"{"type":"int","value":"3"}"#)
        );
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"value":"a}b{c"} trailing"#;
        assert_eq!(balanced_value(text, 0, Brackets::Braces), Some(r#"{"value":"a}b{c"}"#));
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let text = r#"{"value":"say \"}\" now"} x"#;
        assert_eq!(
            balanced_value(text, 0, Brackets::Braces),
            Some(r#"{"value":"say \"}\" now"}"#)
        );
    }

    #[test]
    fn test_single_quote_inside_double_quoted() {
        let text = r#"{"value":"it's {"} x"#;
        assert_eq!(balanced_value(text, 0, Brackets::Braces), Some(r#"{"value":"it's {"}"#));
    }

    #[test]
    fn test_array_value() {
        let text = r#"Static Fields Changed: [{"A":[{"x":{}}]}], Instance Final: {}"#;
        assert_eq!(
            balanced_value(text, 0, Brackets::Any),
            Some(r#"[{"A":[{"x":{}}]}]"#)
        );
    }

    #[test]
    fn test_braces_mode_skips_leading_array() {
        let text = r#"[1, 2] {"a":1}"#;
        assert_eq!(balanced_value(text, 0, Brackets::Braces), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert_eq!(balanced_value(r#"{"a":{"b":1}"#, 0, Brackets::Any), None);
        assert_eq!(balanced_value("no brackets here", 0, Brackets::Any), None);
    }

    #[test]
    fn test_start_offset_and_unicode() {
        let text = r#"é {"v":"ü"} {"w":1}"#;
        let first = balanced_range(text, 0, Brackets::Braces).unwrap();
        assert_eq!(&text[first.0..first.1], r#"{"v":"ü"}"#);
        assert_eq!(balanced_value(text, first.1, Brackets::Braces), Some(r#"{"w":1}"#));
    }

    #[test]
    fn test_start_out_of_range() {
        assert_eq!(balanced_range("{}", 10, Brackets::Any), None);
    }
}
