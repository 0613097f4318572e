//! RETRACE Replay Engine
//!
//! Rebuilds recorded values as live destination objects and checks
//! structural equivalence between recorded and fresh results.
//!
//! All state for one test case lives in a [`ReplaySession`]: the reference
//! table that keeps origin aliasing intact and the static field store.
//! Sessions are single-threaded by construction.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod cursor;
pub mod de;
pub mod equiv;
pub mod hash;
pub mod literal;
pub mod materialize;
pub mod refs;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod statics;
pub mod value;

pub use buffer::{BufferedStream, ByteBuffer, FileBuffer, StreamDirection, TextBuffer};
pub use cursor::ReplayCursor;
pub use equiv::{Checker, CheckerConfig};
pub use hash::{structural_hash, tuple_hash};
pub use literal::{logically_equal, Literal, LiteralError};
pub use materialize::Materializer;
pub use refs::ReferenceTable;
pub use registry::{ClassDef, ClassForm, DestKind, Destination, RegistryFile, TypeRegistry};
pub use session::{ReplaySession, SessionConfig};
pub use snapshot::{FieldMap, FieldSnapshot, StaticFieldDiffs, StaticFieldEntry, ValueSnapshot};
pub use statics::StaticStore;
pub use value::{
    CallableValue, EnumValue, ExceptionValue, Instance, ObjRef, Object, ParsedAddress, StdStream,
    ThreadHandle, TypeRef, Value,
};
