//! Content line decoding.
//!
//! A content line looks like
//! `pkg.Type.method[public:[Instance Initial: {...}, Arg0 initial state: {...}, Return value: {...}]`
//! or, in the compact grammar, `pkg.Type.method[public]: Return value: {...}`.

use crate::error::TraceError;
use crate::record::{ArgState, CallRecord};
use crate::scan::{balanced_range, balanced_value, Brackets};
use once_cell::sync::Lazy;
use regex::Regex;

/// Payload keys whose values are single JSON documents
pub const PAYLOAD_KEYS: [&str; 6] = [
    "Return value",
    "Instance Initial",
    "Instance Final",
    "Static Fields Changed",
    "Static Fields Initial",
    "Exception thrown",
];

static ARG_INITIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Arg(\d+) initial state: ").expect("static regex"));

static ARG_FINAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Arg(\d+) final state: ").expect("static regex"));

static KEY_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    PAYLOAD_KEYS
        .iter()
        .map(|key| {
            let pattern = format!(r"{}: [\{{\[]", regex::escape(key));
            (*key, Regex::new(&pattern).expect("static regex"))
        })
        .collect()
});

/// Parse one content line into a record with no position information.
///
/// # Errors
///
/// Returns error if the header separator is missing
pub fn parse_content_line(line: &str) -> Result<CallRecord, TraceError> {
    parse_content_line_at(line, 0)
}

pub(crate) fn parse_content_line_at(line: &str, line_no: usize) -> Result<CallRecord, TraceError> {
    let (method_name, modifier, payload) =
        split_header(line).ok_or(TraceError::MissingHeader { line: line_no })?;

    let mut record = CallRecord::new(method_name, modifier);
    record.args_initial = extract_args(payload, &ARG_INITIAL);
    record.args_final = extract_args(payload, &ARG_FINAL);

    for (key, pattern) in KEY_PATTERNS.iter() {
        if let Some(found) = pattern.find(payload) {
            // The match ends just past the opening bracket.
            let open = found.end() - 1;
            if let Some(value) = balanced_value(payload, open, Brackets::Any) {
                record.set_payload(key, value.to_string());
            }
        }
    }

    Ok(record)
}

/// Split `method[modifier...: payload` into its parts
fn split_header(line: &str) -> Option<(&str, &str, &str)> {
    let line = line.trim();
    let (lhs, payload) = line.split_once(':')?;
    let (method, modifier) = lhs.split_once('[')?;
    let method = method.trim();
    if method.is_empty() {
        return None;
    }
    let modifier = modifier.trim().trim_end_matches(']').trim();
    Some((method, modifier, payload))
}

/// Collect `(index, json)` pairs for every argument marker in order
fn extract_args(text: &str, marker: &Regex) -> Vec<ArgState> {
    let mut args = Vec::new();
    for caps in marker.captures_iter(text) {
        let (Some(whole), Some(index)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let Ok(index) = index.as_str().parse::<usize>() else {
            continue;
        };
        if let Some((begin, end)) = balanced_range(text, whole.end(), Brackets::Braces) {
            args.push(ArgState::new(index, &text[begin..end]));
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDER_LINE: &str = r#"org.acme.Counter.add[public:[Instance Initial: {"type":"src.main.org.acme.Counter","instance_fields":{}}, Arg0 initial state: {"type":"int","value":"2"}, Arg1 initial state: {"type":"java.lang.String","value":"x}y"}, Instance Final: {"type":"src.main.org.acme.Counter","instance_fields":{"n":{"type":"int","value":"2"}}}, Arg0 final state: {"type":"int","value":"2"}, Return value: {"type":"int","value":"2"}]"#;

    #[test]
    fn test_recorder_line() {
        let record = parse_content_line(RECORDER_LINE).unwrap();
        assert_eq!(record.method_name, "org.acme.Counter.add");
        assert_eq!(record.modifier, "public");
        assert_eq!(record.args_initial.len(), 2);
        assert_eq!(record.args_initial[0].index, 0);
        assert_eq!(record.args_initial[1].raw, r#"{"type":"java.lang.String","value":"x}y"}"#);
        assert_eq!(record.args_final.len(), 1);
        assert_eq!(record.return_value.as_deref(), Some(r#"{"type":"int","value":"2"}"#));
        assert!(record.instance_initial.is_some());
        assert!(record.instance_final.unwrap().contains("\"n\""));
        assert!(record.exception_thrown.is_none());
    }

    #[test]
    fn test_compact_grammar() {
        let line = r#"Foo.bar[private]: Return value: {"type":"null","value":null}"#;
        let record = parse_content_line(line).unwrap();
        assert_eq!(record.method_name, "Foo.bar");
        assert_eq!(record.modifier, "private");
        assert!(record.return_value.is_some());
    }

    #[test]
    fn test_static_fields_array() {
        let line = r#"Foo.bar[public:[Static Fields Changed: [{"src.main.Foo":[{"count":{"modifier":"private","details":{"type":"int","value":"1"}}}]}]]"#;
        let record = parse_content_line(line).unwrap();
        let changed = record.static_fields_changed.unwrap();
        assert!(changed.starts_with('['));
        assert!(changed.ends_with(']'));
        let parsed: serde_json::Value = serde_json::from_str(&changed).unwrap();
        assert!(parsed.is_array());
    }

    #[test]
    fn test_exception_thrown() {
        let line = r#"Foo.bar[public:[Exception thrown: {"type":"java.lang.Throwable","throwable_type":"java.lang.IllegalStateException","message":"bad {state}"}]"#;
        let record = parse_content_line(line).unwrap();
        assert!(record.threw());
        let parsed: serde_json::Value =
            serde_json::from_str(record.exception_thrown.as_deref().unwrap()).unwrap();
        assert_eq!(parsed["message"], "bad {state}");
    }

    #[test]
    fn test_arg_values_parse_as_json() {
        let record = parse_content_line(RECORDER_LINE).unwrap();
        for arg in &record.args_initial {
            assert!(arg.parse_json().is_ok());
        }
    }

    #[test]
    fn test_missing_colon() {
        let err = parse_content_line_at("Foo.bar[public", 7).unwrap_err();
        assert_eq!(err, TraceError::MissingHeader { line: 7 });
    }

    #[test]
    fn test_missing_bracket() {
        assert!(parse_content_line("Foo.bar: Return value: {}").is_err());
    }

    #[test]
    fn test_empty_payload() {
        let record = parse_content_line("Foo.bar[public:[]").unwrap();
        assert!(record.args_initial.is_empty());
        assert!(record.return_value.is_none());
    }
}
