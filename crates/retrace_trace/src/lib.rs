//! RETRACE Trace Parser
//!
//! Turns a flat execution log into a forest of call records.
//! Each top-level section becomes one workflow: the focal call first,
//! followed by the nested calls that a generated test will mock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod parser;
pub mod payload;
pub mod record;
pub mod scan;

pub use error::TraceError;
pub use parser::{FocalScope, MockScope, ParsedTrace, ParserConfig, TraceParser};
pub use payload::parse_content_line;
pub use record::{ArgState, CallNote, CallRecord, LineSpan, Workflow};
