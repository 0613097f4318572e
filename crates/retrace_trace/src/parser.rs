//! Trace parser: delimiters to call trees to workflows.

use crate::error::TraceError;
use crate::payload::parse_content_line_at;
use crate::record::{CallNote, CallRecord, LineSpan, Workflow, SKIP_OCCURRENCE};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

const START_MARKER: &str = "==========START OF";
const END_MARKER: &str = "==========END OF";
const FENCE: &str = "==========";

/// Which sections become focal calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FocalScope {
    /// One workflow per top-level section
    #[default]
    TopLevel,
    /// One workflow per section at any depth
    EverySection,
}

/// Which nested calls a workflow lists as mocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MockScope {
    /// Calls made directly by the focal call; deeper calls stay as children
    #[default]
    DirectChildren,
    /// Every call inside the focal span, pre-order
    AllDescendants,
}

/// Parser configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ParserConfig {
    /// Focal section selection
    pub focal: FocalScope,
    /// Mock selection
    pub mock_scope: MockScope,
}

impl ParserConfig {
    /// Set focal scope
    #[must_use]
    pub fn with_focal(mut self, focal: FocalScope) -> Self {
        self.focal = focal;
        self
    }

    /// Set mock scope
    #[must_use]
    pub fn with_mock_scope(mut self, mock_scope: MockScope) -> Self {
        self.mock_scope = mock_scope;
        self
    }
}

/// Output of a parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTrace {
    /// Full call forest, one root per top-level section
    pub roots: Vec<CallRecord>,
    /// Workflows selected by the parser configuration
    pub workflows: Vec<Workflow>,
}

impl ParsedTrace {
    /// Number of records in the forest
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.roots.iter().map(CallRecord::subtree_len).sum()
    }
}

/// Section delimiter parsed from a line
enum Delimiter<'a> {
    Start(&'a str),
    End(&'a str),
}

fn delimiter(line: &str) -> Option<Delimiter<'_>> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix(START_MARKER) {
        Some(Delimiter::Start(section_name(rest)))
    } else {
        line.strip_prefix(END_MARKER).map(|rest| Delimiter::End(section_name(rest)))
    }
}

fn section_name(rest: &str) -> &str {
    let rest = rest.trim_start();
    rest.split(FENCE).next().unwrap_or(rest).trim()
}

/// Open section while scanning
struct OpenSection {
    name: String,
    start: usize,
    children: Vec<CallRecord>,
}

/// Trace parser
pub struct TraceParser {
    config: ParserConfig,
}

impl TraceParser {
    /// Create a parser with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ParserConfig::default(),
        }
    }

    /// Create with custom config
    #[must_use]
    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse a whole trace held in memory
    ///
    /// # Errors
    ///
    /// Returns error on unmatched delimiters or a malformed content line
    pub fn parse_str(&self, text: &str) -> Result<ParsedTrace, TraceError> {
        self.parse_lines(text.lines())
    }

    /// Parse a trace file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or does not parse
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<ParsedTrace, TraceError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), bytes = text.len(), "read trace");
        self.parse_str(&text)
    }

    /// Parse a sequence of lines
    ///
    /// # Errors
    ///
    /// Returns error on unmatched delimiters or a malformed content line
    pub fn parse_lines<I, S>(&self, lines: I) -> Result<ParsedTrace, TraceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines: Vec<S> = lines.into_iter().collect();
        let roots = build_forest(&lines)?;
        let workflows = self.select_workflows(&roots);
        tracing::debug!(
            roots = roots.len(),
            workflows = workflows.len(),
            "parsed trace"
        );
        Ok(ParsedTrace { roots, workflows })
    }

    fn select_workflows(&self, roots: &[CallRecord]) -> Vec<Workflow> {
        let mut workflows = Vec::new();
        match self.config.focal {
            FocalScope::TopLevel => {
                for root in roots {
                    workflows.push(self.workflow_for(root));
                }
            }
            FocalScope::EverySection => {
                let mut stack: Vec<&CallRecord> = roots.iter().rev().collect();
                while let Some(section) = stack.pop() {
                    workflows.push(self.workflow_for(section));
                    stack.extend(section.children.iter().rev());
                }
            }
        }
        workflows
    }

    fn workflow_for(&self, focal: &CallRecord) -> Workflow {
        let mut skip = focal.clone();
        skip.children.clear();
        skip.note = Some(CallNote::Skip);
        skip.occurrence_idx = Some(SKIP_OCCURRENCE);

        let mut calls = vec![skip];
        let mut counters: IndexMap<String, usize> = IndexMap::new();
        let mut next_index = |name: &str| {
            let slot = counters.entry(name.to_string()).or_insert(0);
            let index = *slot;
            *slot += 1;
            index
        };

        match self.config.mock_scope {
            MockScope::DirectChildren => {
                for child in &focal.children {
                    let mut mock = child.clone();
                    mock.occurrence_idx = Some(next_index(&mock.method_name));
                    calls.push(mock);
                }
            }
            MockScope::AllDescendants => {
                let mut stack: Vec<&CallRecord> = focal.children.iter().rev().collect();
                while let Some(call) = stack.pop() {
                    let mut mock = call.clone();
                    mock.children.clear();
                    mock.occurrence_idx = Some(next_index(&mock.method_name));
                    calls.push(mock);
                    stack.extend(call.children.iter().rev());
                }
            }
        }

        Workflow { calls }
    }
}

impl Default for TraceParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Match delimiters with a nesting counter and decode each closing section
fn build_forest<S: AsRef<str>>(lines: &[S]) -> Result<Vec<CallRecord>, TraceError> {
    let mut open: Vec<OpenSection> = Vec::new();
    let mut roots = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        match delimiter(line.as_ref()) {
            Some(Delimiter::Start(name)) => {
                tracing::trace!(line = line_no, name, depth = open.len(), "section start");
                open.push(OpenSection {
                    name: name.to_string(),
                    start: line_no,
                    children: Vec::new(),
                });
            }
            Some(Delimiter::End(name)) => {
                let section = open.pop().ok_or_else(|| TraceError::UnmatchedEnd {
                    line: line_no,
                    name: name.to_string(),
                })?;
                if section.name != name {
                    tracing::warn!(
                        line = line_no,
                        open = %section.name,
                        close = name,
                        "section closed under a different name"
                    );
                }
                let content = idx
                    .checked_sub(1)
                    .map(|i| lines[i].as_ref())
                    .filter(|l| delimiter(l).is_none())
                    .ok_or(TraceError::MissingHeader { line: line_no })?;

                let mut record = parse_content_line_at(content, line_no - 1)?;
                record.span = Some(LineSpan {
                    start: section.start,
                    end: line_no,
                });
                record.children = section.children;

                match open.last_mut() {
                    Some(parent) => parent.children.push(record),
                    None => roots.push(record),
                }
            }
            None => {}
        }
    }

    if let Some(section) = open.pop() {
        return Err(TraceError::UnmatchedStart {
            line: section.start,
            name: section.name,
        });
    }

    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(name: &str) -> String {
        format!("==========START OF {name}==========")
    }

    fn end(name: &str) -> String {
        format!("==========END OF {name}==========")
    }

    fn content(name: &str, ret: &str) -> String {
        format!(r#"{name}[public:[Return value: {{"type":"int","value":"{ret}"}}]"#)
    }

    fn section(name: &str, ret: &str, inner: Vec<String>) -> Vec<String> {
        let mut out = vec![start(name)];
        out.extend(inner);
        out.push(content(name, ret));
        out.push(end(name));
        out
    }

    #[test]
    fn test_parse_empty() {
        let parsed = TraceParser::new().parse_str("").unwrap();
        assert!(parsed.roots.is_empty());
        assert!(parsed.workflows.is_empty());
    }

    #[test]
    fn test_single_section() {
        let lines = section("Foo.bar", "1", vec![]);
        let parsed = TraceParser::new().parse_lines(&lines).unwrap();
        assert_eq!(parsed.workflows.len(), 1);
        let skip = parsed.workflows[0].skip_call().unwrap();
        assert_eq!(skip.method_name, "Foo.bar");
        assert_eq!(skip.occurrence_idx, Some(SKIP_OCCURRENCE));
        assert_eq!(skip.span, Some(LineSpan { start: 1, end: 3 }));
    }

    #[test]
    fn test_recursive_same_name() {
        let inner = section("Foo.bar", "2", vec![]);
        let lines = section("Foo.bar", "1", inner);
        let parsed = TraceParser::new().parse_lines(&lines).unwrap();

        assert_eq!(parsed.workflows.len(), 1);
        let calls = &parsed.workflows[0].calls;
        assert_eq!(calls.len(), 2);
        assert!(calls[0].is_skip());
        assert_eq!(calls[0].occurrence_idx, Some(SKIP_OCCURRENCE));
        assert_eq!(calls[0].return_value.as_deref(), Some(r#"{"type":"int","value":"1"}"#));
        assert_eq!(calls[1].method_name, "Foo.bar");
        assert_eq!(calls[1].occurrence_idx, Some(0));
        assert_eq!(calls[1].return_value.as_deref(), Some(r#"{"type":"int","value":"2"}"#));
    }

    #[test]
    fn test_occurrence_per_method_name() {
        let mut inner = section("B.get", "1", vec![]);
        inner.extend(section("C.put", "2", vec![]));
        inner.extend(section("B.get", "3", vec![]));
        let lines = section("A.run", "0", inner);

        let parsed = TraceParser::new().parse_lines(&lines).unwrap();
        let workflow = &parsed.workflows[0];
        assert_eq!(workflow.mocked("B.get", 0).unwrap().return_value.as_deref(), Some(r#"{"type":"int","value":"1"}"#));
        assert_eq!(workflow.mocked("B.get", 1).unwrap().return_value.as_deref(), Some(r#"{"type":"int","value":"3"}"#));
        assert_eq!(workflow.mocked("C.put", 0).unwrap().occurrence_idx, Some(0));
    }

    #[test]
    fn test_direct_children_keep_subtrees() {
        let grandchild = section("D.leaf", "9", vec![]);
        let child = section("B.get", "1", grandchild);
        let lines = section("A.run", "0", child);

        let parsed = TraceParser::new().parse_lines(&lines).unwrap();
        let calls = &parsed.workflows[0].calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].children.len(), 1);
        assert_eq!(calls[1].children[0].method_name, "D.leaf");
        assert!(calls[0].children.is_empty());
    }

    #[test]
    fn test_all_descendants_preorder() {
        let grandchild = section("D.leaf", "9", vec![]);
        let mut inner = section("B.get", "1", grandchild);
        inner.extend(section("D.leaf", "8", vec![]));
        let lines = section("A.run", "0", inner);

        let config = ParserConfig::default().with_mock_scope(MockScope::AllDescendants);
        let parsed = TraceParser::new().with_config(config).parse_lines(&lines).unwrap();
        let names: Vec<_> = parsed.workflows[0]
            .calls
            .iter()
            .map(|c| (c.method_name.as_str(), c.occurrence_idx))
            .collect();
        assert_eq!(
            names,
            vec![
                ("A.run", Some(SKIP_OCCURRENCE)),
                ("B.get", Some(0)),
                ("D.leaf", Some(0)),
                ("D.leaf", Some(1)),
            ]
        );
    }

    #[test]
    fn test_every_section_focal() {
        let child = section("B.get", "1", vec![]);
        let mut lines = section("A.run", "0", child);
        lines.extend(section("E.other", "5", vec![]));

        let top = TraceParser::new().parse_lines(&lines).unwrap();
        assert_eq!(top.workflows.len(), 2);

        let config = ParserConfig::default().with_focal(FocalScope::EverySection);
        let every = TraceParser::new().with_config(config).parse_lines(&lines).unwrap();
        let focal: Vec<_> = every
            .workflows
            .iter()
            .map(|w| w.skip_call().unwrap().method_name.clone())
            .collect();
        assert_eq!(focal, vec!["A.run", "B.get", "E.other"]);
    }

    #[test]
    fn test_unmatched_end() {
        let lines = vec![content("Foo.bar", "1"), end("Foo.bar")];
        let err = TraceParser::new().parse_lines(&lines).unwrap_err();
        assert_eq!(
            err,
            TraceError::UnmatchedEnd {
                line: 2,
                name: "Foo.bar".to_string()
            }
        );
    }

    #[test]
    fn test_unmatched_start() {
        let mut lines = vec![start("Outer.run")];
        lines.extend(section("Foo.bar", "1", vec![]));
        let err = TraceParser::new().parse_lines(&lines).unwrap_err();
        assert!(matches!(err, TraceError::UnmatchedStart { line: 1, .. }));
    }

    #[test]
    fn test_missing_content_line() {
        let lines = vec![start("Foo.bar"), end("Foo.bar")];
        let err = TraceParser::new().parse_lines(&lines).unwrap_err();
        assert_eq!(err, TraceError::MissingHeader { line: 2 });
    }

    #[test]
    fn test_content_without_separator() {
        let lines = vec![start("Foo.bar"), "garbage".to_string(), end("Foo.bar")];
        let err = TraceParser::new().parse_lines(&lines).unwrap_err();
        assert_eq!(err, TraceError::MissingHeader { line: 2 });
    }

    #[test]
    fn test_noise_lines_ignored() {
        let mut lines = vec!["some unrelated output".to_string()];
        lines.extend(section("Foo.bar", "1", vec!["debug: noise".to_string()]));
        let parsed = TraceParser::new().parse_lines(&lines).unwrap();
        assert_eq!(parsed.workflows.len(), 1);
        assert_eq!(parsed.total_calls(), 1);
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.log");
        std::fs::write(&path, section("Foo.bar", "1", vec![]).join("\n")).unwrap();
        let parsed = TraceParser::new().parse_file(&path).unwrap();
        assert_eq!(parsed.workflows.len(), 1);
    }

    #[test]
    fn test_parse_missing_file() {
        let err = TraceParser::new().parse_file("/definitely/not/here.log").unwrap_err();
        assert!(matches!(err, TraceError::Io(_)));
    }

    fn nested_trace(depths: &[u8]) -> Vec<String> {
        depths.iter().enumerate().fold(Vec::new(), |mut acc, (i, depth)| {
            let name = if i % 2 == 0 { "Rec.call" } else { "Other.call" };
            let mut inner = Vec::new();
            for _ in 0..(*depth % 3) {
                inner.extend(section(name, "0", vec![]));
            }
            acc.extend(section(name, "1", inner));
            acc
        })
    }

    proptest::proptest! {
        #[test]
        fn prop_skip_first_and_occurrences_increase(depths in proptest::collection::vec(0u8..6, 0..6)) {
            let lines = nested_trace(&depths);
            let parsed = TraceParser::new().parse_lines(&lines).unwrap();
            proptest::prop_assert_eq!(parsed.workflows.len(), depths.len());
            for workflow in &parsed.workflows {
                proptest::prop_assert!(workflow.calls[0].is_skip());
                let mut seen: IndexMap<&str, usize> = IndexMap::new();
                for call in workflow.mocked_calls() {
                    let expected = seen.entry(call.method_name.as_str()).or_insert(0);
                    proptest::prop_assert_eq!(call.occurrence_idx, Some(*expected));
                    *expected += 1;
                }
            }
        }
    }
}
