//! Call records extracted from a trace.

use serde::{Deserialize, Serialize};

/// Occurrence index given to the focal call of every workflow
pub const SKIP_OCCURRENCE: usize = 1;

/// Note attached to a call record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallNote {
    /// Focal call: executed for real, recorded state used for assertions
    Skip,
}

/// Recorded state of one argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgState {
    /// Zero-based argument position
    pub index: usize,
    /// Raw JSON snapshot text
    pub raw: String,
}

impl ArgState {
    /// Create a new argument state
    #[must_use]
    pub fn new(index: usize, raw: impl Into<String>) -> Self {
        Self {
            index,
            raw: raw.into(),
        }
    }

    /// Decode the raw snapshot text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid JSON
    pub fn parse_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.raw)
    }
}

/// Inclusive 1-based line range of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    /// Line of the `START OF` delimiter
    pub start: usize,
    /// Line of the `END OF` delimiter
    pub end: usize,
}

impl LineSpan {
    /// Whether `other` lies strictly inside this span
    #[must_use]
    pub const fn encloses(&self, other: &LineSpan) -> bool {
        self.start < other.start && other.end < self.end
    }
}

/// One intercepted invocation and its recorded side effects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Qualified method name
    pub method_name: String,
    /// Declared visibility of the method
    pub modifier: String,
    /// Argument snapshots before the call
    #[serde(rename = "Args Initial", default, skip_serializing_if = "Vec::is_empty")]
    pub args_initial: Vec<ArgState>,
    /// Argument snapshots after the call
    #[serde(rename = "Args Final", default, skip_serializing_if = "Vec::is_empty")]
    pub args_final: Vec<ArgState>,
    /// Returned value snapshot
    #[serde(rename = "Return value", default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<String>,
    /// Receiver snapshot before the call
    #[serde(rename = "Instance Initial", default, skip_serializing_if = "Option::is_none")]
    pub instance_initial: Option<String>,
    /// Receiver snapshot after the call
    #[serde(rename = "Instance Final", default, skip_serializing_if = "Option::is_none")]
    pub instance_final: Option<String>,
    /// Static state before the call
    #[serde(rename = "Static Fields Initial", default, skip_serializing_if = "Option::is_none")]
    pub static_fields_initial: Option<String>,
    /// Static fields the call changed
    #[serde(rename = "Static Fields Changed", default, skip_serializing_if = "Option::is_none")]
    pub static_fields_changed: Option<String>,
    /// Exception snapshot if the call threw
    #[serde(rename = "Exception thrown", default, skip_serializing_if = "Option::is_none")]
    pub exception_thrown: Option<String>,
    /// Ordinal of this call among same-named calls in the workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_idx: Option<usize>,
    /// `skip` for the focal call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<CallNote>,
    /// Where the section sits in the trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<LineSpan>,
    /// Calls made from inside this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CallRecord>,
}

impl CallRecord {
    /// Create a record with only a header
    #[must_use]
    pub fn new(method_name: impl Into<String>, modifier: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            modifier: modifier.into(),
            args_initial: Vec::new(),
            args_final: Vec::new(),
            return_value: None,
            instance_initial: None,
            instance_final: None,
            static_fields_initial: None,
            static_fields_changed: None,
            exception_thrown: None,
            occurrence_idx: None,
            note: None,
            span: None,
            children: Vec::new(),
        }
    }

    /// Whether this is the focal call of its workflow
    #[must_use]
    pub fn is_skip(&self) -> bool {
        self.note == Some(CallNote::Skip)
    }

    /// Whether the call ended by throwing
    #[must_use]
    pub fn threw(&self) -> bool {
        self.exception_thrown.is_some()
    }

    /// Look up the initial state of argument `index`
    #[must_use]
    pub fn arg_initial(&self, index: usize) -> Option<&ArgState> {
        self.args_initial.iter().find(|a| a.index == index)
    }

    /// Look up the final state of argument `index`
    #[must_use]
    pub fn arg_final(&self, index: usize) -> Option<&ArgState> {
        self.args_final.iter().find(|a| a.index == index)
    }

    /// Set the payload key named as in the trace vocabulary
    pub(crate) fn set_payload(&mut self, key: &str, raw: String) {
        let slot = match key {
            "Return value" => &mut self.return_value,
            "Instance Initial" => &mut self.instance_initial,
            "Instance Final" => &mut self.instance_final,
            "Static Fields Initial" => &mut self.static_fields_initial,
            "Static Fields Changed" => &mut self.static_fields_changed,
            "Exception thrown" => &mut self.exception_thrown,
            _ => return,
        };
        *slot = Some(raw);
    }

    /// Total number of records in this subtree, this one included
    #[must_use]
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(CallRecord::subtree_len).sum::<usize>()
    }
}

/// The focal call of one workflow followed by the calls to mock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Flattened pre-order records; the first is the skip call
    pub calls: Vec<CallRecord>,
}

impl Workflow {
    /// The focal call
    #[must_use]
    pub fn skip_call(&self) -> Option<&CallRecord> {
        self.calls.first().filter(|c| c.is_skip())
    }

    /// Calls that a generated test replays instead of executing
    pub fn mocked_calls(&self) -> impl Iterator<Item = &CallRecord> {
        self.calls.iter().filter(|c| !c.is_skip())
    }

    /// Mocked call for the `occurrence`-th invocation of `method_name`
    #[must_use]
    pub fn mocked(&self, method_name: &str, occurrence: usize) -> Option<&CallRecord> {
        self.mocked_calls()
            .find(|c| c.method_name == method_name && c.occurrence_idx == Some(occurrence))
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether the workflow has no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_record_new() {
        let record = CallRecord::new("Foo.bar", "public");
        assert!(!record.is_skip());
        assert!(!record.threw());
        assert_eq!(record.subtree_len(), 1);
    }

    #[test]
    fn test_set_payload_ignores_unknown_keys() {
        let mut record = CallRecord::new("Foo.bar", "public");
        record.set_payload("Return value", "{}".to_string());
        record.set_payload("Unknown", "{}".to_string());
        assert_eq!(record.return_value.as_deref(), Some("{}"));
    }

    #[test]
    fn test_serialized_keys_follow_trace_vocabulary() {
        let mut record = CallRecord::new("Foo.bar", "private");
        record.return_value = Some("{\"type\":\"null\"}".to_string());
        record.note = Some(CallNote::Skip);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("Return value").is_some());
        assert_eq!(json["note"], "skip");
        assert!(json.get("Args Initial").is_none());
    }

    #[test]
    fn test_line_span_encloses() {
        let outer = LineSpan { start: 1, end: 10 };
        assert!(outer.encloses(&LineSpan { start: 2, end: 5 }));
        assert!(!outer.encloses(&LineSpan { start: 1, end: 5 }));
    }

    #[test]
    fn test_workflow_lookup() {
        let mut skip = CallRecord::new("A.run", "public");
        skip.note = Some(CallNote::Skip);
        skip.occurrence_idx = Some(SKIP_OCCURRENCE);
        let mut first = CallRecord::new("B.get", "public");
        first.occurrence_idx = Some(0);
        let mut second = CallRecord::new("B.get", "public");
        second.occurrence_idx = Some(1);

        let workflow = Workflow {
            calls: vec![skip, first, second],
        };
        assert_eq!(workflow.skip_call().unwrap().method_name, "A.run");
        assert_eq!(workflow.mocked_calls().count(), 2);
        assert_eq!(workflow.mocked("B.get", 1).unwrap().occurrence_idx, Some(1));
        assert!(workflow.mocked("B.get", 2).is_none());
    }
}
