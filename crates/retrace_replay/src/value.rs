//! Destination values.
//!
//! Scalars are plain enum variants. Everything with identity lives behind an
//! [`ObjRef`], a shared mutable cell, so that two snapshots carrying the same
//! identity token resolve to one object and in-place updates are seen by
//! every holder.

use crate::buffer::{BufferedStream, ByteBuffer, FileBuffer, TextBuffer};
use crate::cursor::ReplayCursor;
use chrono::{DateTime, FixedOffset, TimeDelta};
use indexmap::IndexMap;
use retrace_core::FieldKey;
use std::cell::{Ref, RefCell, RefMut};
use std::path::PathBuf;
use std::rc::Rc;

/// A rebuilt value
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Arbitrary-width origin integer
    Int(i128),
    /// Floating point
    Float(f64),
    /// Text
    Str(String),
    /// Filesystem path
    Path(PathBuf),
    /// Parsed network address
    Address(ParsedAddress),
    /// Reference to a type
    Type(TypeRef),
    /// Opaque thread handle
    Thread(ThreadHandle),
    /// Process standard stream
    Std(StdStream),
    /// Shared object
    Ref(ObjRef),
}

impl Value {
    /// Wrap an object in a fresh shared cell
    #[must_use]
    pub fn object(object: Object) -> Self {
        Self::Ref(ObjRef::new(object))
    }

    /// Text value
    #[must_use]
    pub fn str(text: impl Into<String>) -> Self {
        Self::Str(text.into())
    }

    /// Fresh list
    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Self::object(Object::List(items))
    }

    /// Fresh tuple
    #[must_use]
    pub fn tuple(items: Vec<Value>) -> Self {
        Self::object(Object::Tuple(items))
    }

    /// Fresh set; duplicate members are dropped
    #[must_use]
    pub fn set(items: Vec<Value>) -> Self {
        Self::object(Object::Set(dedup(items)))
    }

    /// Fresh mapping; a repeated key keeps the last value
    #[must_use]
    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Self::object(Object::Map(dedup_entries(entries)))
    }

    /// Shared object, if this is one
    #[must_use]
    pub fn as_obj(&self) -> Option<&ObjRef> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Whether this is the null value
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Kind tag used for type comparison
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::Path(_) => ValueKind::Path,
            Self::Address(_) => ValueKind::Address,
            Self::Type(_) => ValueKind::Type,
            Self::Thread(_) => ValueKind::Thread,
            Self::Std(_) => ValueKind::Std,
            Self::Ref(r) => r.borrow().kind(),
        }
    }

    /// Built-in equality: value equality for scalars, identity for objects.
    ///
    /// Tuples and enum constants compare by content so that they can act
    /// as mapping keys and set members.
    #[must_use]
    pub fn native_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Path(a), Self::Path(b)) => a == b,
            (Self::Address(a), Self::Address(b)) => a == b,
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::Thread(a), Self::Thread(b)) => a == b,
            (Self::Std(a), Self::Std(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => {
                if a.ptr_eq(b) {
                    return true;
                }
                let (Ok(x), Ok(y)) = (a.0.try_borrow(), b.0.try_borrow()) else {
                    return false;
                };
                match (&*x, &*y) {
                    (Object::Tuple(p), Object::Tuple(q)) => {
                        p.len() == q.len() && p.iter().zip(q).all(|(l, r)| l.native_eq(r))
                    }
                    (Object::Enum(p), Object::Enum(q)) => p.class == q.class && p.name == q.name,
                    (Object::DateTime(p), Object::DateTime(q)) => p == q,
                    (Object::Duration(p), Object::Duration(q)) => p == q,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

/// Drop later duplicates under built-in equality
fn dedup(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if !out.iter().any(|v| v.native_eq(&item)) {
            out.push(item);
        }
    }
    out
}

/// Keep first-insertion order, last value wins
pub(crate) fn dedup_entries(entries: Vec<(Value, Value)>) -> Vec<(Value, Value)> {
    let mut out: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        match out.iter_mut().find(|(k, _)| k.native_eq(&key)) {
            Some(slot) => slot.1 = value,
            None => out.push((key, value)),
        }
    }
    out
}

pub(crate) fn dedup_members(items: Vec<Value>) -> Vec<Value> {
    dedup(items)
}

/// Kind of a value, with the class name for instances
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Path,
    Address,
    Type,
    Thread,
    Std,
    List,
    Tuple,
    Set,
    Map,
    KeyView,
    ValueView,
    Cursor,
    Bytes,
    Text,
    File,
    Buffered,
    DateTime,
    Duration,
    Exception,
    Enum,
    Callable,
    Instance(String),
}

/// Shared mutable object cell. Equality of handles is pointer identity.
#[derive(Clone)]
pub struct ObjRef(Rc<RefCell<Object>>);

impl ObjRef {
    /// Wrap an object
    #[must_use]
    pub fn new(object: Object) -> Self {
        Self(Rc::new(RefCell::new(object)))
    }

    /// Borrow the object
    ///
    /// # Panics
    ///
    /// Panics if the object is mutably borrowed
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, Object> {
        self.0.borrow()
    }

    /// Borrow the object mutably
    ///
    /// # Panics
    ///
    /// Panics if the object is borrowed
    #[must_use]
    pub fn borrow_mut(&self) -> RefMut<'_, Object> {
        self.0.borrow_mut()
    }

    /// Borrow without panicking
    #[must_use]
    pub fn try_borrow(&self) -> Option<Ref<'_, Object>> {
        self.0.try_borrow().ok()
    }

    /// Borrow mutably without panicking
    #[must_use]
    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, Object>> {
        self.0.try_borrow_mut().ok()
    }

    /// Whether two handles point at the same object
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address of the object for the lifetime of the cell
    #[must_use]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }

    /// Swap in new content, keeping the identity
    pub fn replace(&self, object: Object) -> Object {
        self.0.replace(object)
    }
}

impl std::fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.try_borrow() {
            Ok(obj) => write!(f, "ObjRef({:#x}, {:?})", self.addr(), obj.kind()),
            Err(_) => write!(f, "ObjRef({:#x}, <borrowed>)", self.addr()),
        }
    }
}

/// Object content
#[derive(Debug)]
pub enum Object {
    /// Mutable ordered sequence
    List(Vec<Value>),
    /// Immutable ordered sequence
    Tuple(Vec<Value>),
    /// Unordered unique members
    Set(Vec<Value>),
    /// Insertion-ordered mapping
    Map(Vec<(Value, Value)>),
    /// Keys of a mapping
    KeyView(Vec<Value>),
    /// Values of a mapping
    ValueView(Vec<Value>),
    /// Bidirectional cursor
    Cursor(ReplayCursor<Value>),
    /// In-memory byte stream
    Bytes(ByteBuffer),
    /// In-memory text stream
    Text(TextBuffer),
    /// File opened for reading
    File(FileBuffer),
    /// Stream wrapping another stream
    Buffered(BufferedStream),
    /// Zoned instant
    DateTime(DateTime<FixedOffset>),
    /// Elapsed time
    Duration(TimeDelta),
    /// Exception object
    Exception(ExceptionValue),
    /// Enum constant
    Enum(EnumValue),
    /// Callable object
    Callable(CallableValue),
    /// Instance of a domain class
    Instance(Instance),
}

impl Object {
    /// Kind tag
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::List(_) => ValueKind::List,
            Self::Tuple(_) => ValueKind::Tuple,
            Self::Set(_) => ValueKind::Set,
            Self::Map(_) => ValueKind::Map,
            Self::KeyView(_) => ValueKind::KeyView,
            Self::ValueView(_) => ValueKind::ValueView,
            Self::Cursor(_) => ValueKind::Cursor,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Text(_) => ValueKind::Text,
            Self::File(_) => ValueKind::File,
            Self::Buffered(_) => ValueKind::Buffered,
            Self::DateTime(_) => ValueKind::DateTime,
            Self::Duration(_) => ValueKind::Duration,
            Self::Exception(_) => ValueKind::Exception,
            Self::Enum(_) => ValueKind::Enum,
            Self::Callable(_) => ValueKind::Callable,
            Self::Instance(i) => ValueKind::Instance(i.class.clone()),
        }
    }

    /// Shallow copy: child values are shared, not duplicated.
    ///
    /// Cursors copy their full element list into a new cursor.
    pub fn shallow_copy(&mut self) -> Object {
        match self {
            Self::List(v) => Self::List(v.clone()),
            Self::Tuple(v) => Self::Tuple(v.clone()),
            Self::Set(v) => Self::Set(v.clone()),
            Self::Map(v) => Self::Map(v.clone()),
            Self::KeyView(v) => Self::KeyView(v.clone()),
            Self::ValueView(v) => Self::ValueView(v.clone()),
            Self::Cursor(c) => Self::Cursor(ReplayCursor::from_vec(c.to_list())),
            Self::Bytes(b) => Self::Bytes(b.clone()),
            Self::Text(t) => Self::Text(t.clone()),
            Self::File(f) => Self::File(f.clone()),
            Self::Buffered(b) => Self::Buffered(b.clone()),
            Self::DateTime(d) => Self::DateTime(*d),
            Self::Duration(d) => Self::Duration(*d),
            Self::Exception(e) => Self::Exception(e.clone()),
            Self::Enum(e) => Self::Enum(e.clone()),
            Self::Callable(c) => Self::Callable(c.clone()),
            Self::Instance(i) => Self::Instance(i.clone()),
        }
    }

    /// Instance content, if this is an instance
    #[must_use]
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Self::Instance(i) => Some(i),
            _ => None,
        }
    }
}

/// Instance of a domain class with fields keyed by declaring type
#[derive(Debug, Clone, Default)]
pub struct Instance {
    /// Destination class name
    pub class: String,
    /// Field values
    pub fields: IndexMap<FieldKey, Value>,
    /// Stream state for classes that wrap a stream
    pub backing: Option<ObjRef>,
}

impl Instance {
    /// Instance with no fields
    #[must_use]
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: IndexMap::new(),
            backing: None,
        }
    }

    /// Set a field
    pub fn set_field(&mut self, key: FieldKey, value: Value) {
        self.fields.insert(key, value);
    }

    /// Field by name, preferring the one declared by the instance's class
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.field_of(&self.class, name).or_else(|| {
            self.fields
                .iter()
                .find(|(k, _)| k.name == name)
                .map(|(_, v)| v)
        })
    }

    /// Field declared by a specific type
    #[must_use]
    pub fn field_of(&self, declaring: &str, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| k.declaring == declaring && k.name == name)
            .map(|(_, v)| v)
    }
}

/// Exception object carrying only message and cause
#[derive(Debug, Clone)]
pub struct ExceptionValue {
    /// Destination exception class
    pub class: String,
    /// Message text
    pub message: Option<String>,
    /// Nested cause
    pub cause: Option<Box<Value>>,
}

impl ExceptionValue {
    /// Exception with a message
    #[must_use]
    pub fn new(class: impl Into<String>, message: Option<String>) -> Self {
        Self {
            class: class.into(),
            message,
            cause: None,
        }
    }
}

/// Enum constant
#[derive(Debug, Clone)]
pub struct EnumValue {
    /// Destination enum class
    pub class: String,
    /// Constant name
    pub name: String,
    /// Constant payload
    pub value: Value,
}

/// Callable object
#[derive(Debug, Clone, Default)]
pub struct CallableValue {
    /// Recorded descriptor, e.g. `Comparator@1b6d3586`
    pub descriptor: String,
    /// Raw-allocated instance of the implementing class, when known
    pub target: Option<Instance>,
}

/// Type reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// The generic sequence type
    Sequence,
    /// A registered destination type
    Named(String),
}

/// Thread handle; all handles compare equal under the checker
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ThreadHandle {
    /// Recorded description
    pub name: Option<String>,
}

/// Standard stream of the current process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdStream {
    /// Standard input
    Stdin,
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

impl StdStream {
    /// Map a recorder note such as `System.out`
    #[must_use]
    pub fn from_note(note: &str) -> Option<Self> {
        match note {
            "System.in" => Some(Self::Stdin),
            "System.out" => Some(Self::Stdout),
            "System.err" => Some(Self::Stderr),
            _ => None,
        }
    }
}

/// Address split into its components
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParsedAddress {
    /// Lowercased scheme
    pub scheme: String,
    /// Authority, e.g. `user@host:80`
    pub netloc: String,
    /// Path
    pub path: String,
    /// Parameters of the last path segment
    pub params: String,
    /// Query string
    pub query: String,
    /// Fragment
    pub fragment: String,
}

impl ParsedAddress {
    /// Split an address. Never fails; unknown parts stay empty.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut rest = text;
        let mut out = Self::default();

        if let Some((scheme, tail)) = rest.split_once(':') {
            let mut chars = scheme.chars();
            let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
            if valid {
                out.scheme = scheme.to_ascii_lowercase();
                rest = tail;
            }
        }

        if let Some(tail) = rest.strip_prefix("//") {
            let end = tail.find(['/', '?', '#']).unwrap_or(tail.len());
            out.netloc = tail[..end].to_string();
            rest = &tail[end..];
        }

        if let Some((head, fragment)) = rest.split_once('#') {
            out.fragment = fragment.to_string();
            rest = head;
        }
        if let Some((head, query)) = rest.split_once('?') {
            out.query = query.to_string();
            rest = head;
        }

        let last_segment = rest.rfind('/').map_or(0, |i| i + 1);
        if let Some(semi) = rest[last_segment..].find(';') {
            let split = last_segment + semi;
            out.params = rest[split + 1..].to_string();
            rest = &rest[..split];
        }
        out.path = rest.to_string();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_eq_scalars() {
        assert!(Value::Int(1).native_eq(&Value::Float(1.0)));
        assert!(!Value::Int(1).native_eq(&Value::Int(2)));
        assert!(Value::str("a").native_eq(&Value::str("a")));
        assert!(!Value::Null.native_eq(&Value::Bool(false)));
    }

    #[test]
    fn test_native_eq_objects_by_identity() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = Value::list(vec![Value::Int(1)]);
        assert!(a.native_eq(&a.clone()));
        assert!(!a.native_eq(&b));
    }

    #[test]
    fn test_tuples_compare_by_content() {
        let a = Value::tuple(vec![Value::Int(1), Value::str("x")]);
        let b = Value::tuple(vec![Value::Int(1), Value::str("x")]);
        assert!(a.native_eq(&b));
    }

    #[test]
    fn test_map_last_value_wins() {
        let map = Value::map(vec![
            (Value::str("k"), Value::Int(1)),
            (Value::str("j"), Value::Int(2)),
            (Value::str("k"), Value::Int(3)),
        ]);
        let obj = map.as_obj().unwrap().borrow();
        let Object::Map(entries) = &*obj else {
            panic!("expected map");
        };
        assert_eq!(entries.len(), 2);
        assert!(entries[0].1.native_eq(&Value::Int(3)));
    }

    #[test]
    fn test_set_dedup() {
        let set = Value::set(vec![Value::Int(1), Value::Int(1), Value::Int(2)]);
        assert!(matches!(&*set.as_obj().unwrap().borrow(), Object::Set(v) if v.len() == 2));
    }

    #[test]
    fn test_replace_keeps_identity() {
        let list = Value::list(vec![Value::Int(1)]);
        let holder = list.clone();
        list.as_obj().unwrap().replace(Object::List(vec![Value::Int(1), Value::Int(2)]));
        assert!(matches!(&*holder.as_obj().unwrap().borrow(), Object::List(v) if v.len() == 2));
    }

    #[test]
    fn test_instance_field_lookup() {
        let mut inst = Instance::new("B");
        inst.set_field(FieldKey::new("A", "x"), Value::Int(1));
        inst.set_field(FieldKey::new("B", "x"), Value::Int(2));
        assert!(inst.field("x").unwrap().native_eq(&Value::Int(2)));
        assert!(inst.field_of("A", "x").unwrap().native_eq(&Value::Int(1)));
        assert!(inst.field("y").is_none());
    }

    #[test]
    fn test_kind_includes_class() {
        let v = Value::object(Object::Instance(Instance::new("Counter")));
        assert_eq!(v.kind(), ValueKind::Instance("Counter".into()));
        assert_eq!(Value::Int(3).kind(), ValueKind::Int);
    }

    #[test]
    fn test_parse_address() {
        let addr = ParsedAddress::parse("HTTPS://user@example.com:8080/a/b;v=1?q=2#frag");
        assert_eq!(addr.scheme, "https");
        assert_eq!(addr.netloc, "user@example.com:8080");
        assert_eq!(addr.path, "/a/b");
        assert_eq!(addr.params, "v=1");
        assert_eq!(addr.query, "q=2");
        assert_eq!(addr.fragment, "frag");

        let bare = ParsedAddress::parse("relative/path");
        assert_eq!(bare.scheme, "");
        assert_eq!(bare.path, "relative/path");
    }

    #[test]
    fn test_std_stream_notes() {
        assert_eq!(StdStream::from_note("System.err"), Some(StdStream::Stderr));
        assert_eq!(StdStream::from_note("byte_stream"), None);
    }
}
