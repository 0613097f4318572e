//! RETRACE Core Types
//!
//! Shared vocabulary for the trace parser and the replay engine.
//! This crate contains pure types and logic with no I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod field;
pub mod id;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use field::{FieldKey, Visibility};
pub use id::IdentityToken;
