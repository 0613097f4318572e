//! Type registry: origin type names to destination kinds and classes.
//!
//! Built-in origin types come preloaded. Domain classes are registered by the
//! code that drives a replay, or loaded from a JSON registry file.

use crate::value::{Instance, Value};
use indexmap::IndexMap;
use retrace_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a destination type is rebuilt from a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestKind {
    /// Always null
    Null,
    /// Text
    Str,
    /// Integer
    Int,
    /// Floating point
    Float,
    /// Boolean
    Bool,
    /// Mutable sequence
    Sequence,
    /// Immutable sequence
    Tuple,
    /// Set
    Set,
    /// Mapping
    Mapping,
    /// Key view of a mapping
    KeyView,
    /// Value view of a mapping
    ValueView,
    /// Bidirectional cursor
    Cursor,
    /// Parsed network address
    Address,
    /// Filesystem path
    Path,
    /// Byte stream read from
    ByteInput,
    /// Byte stream written to
    ByteOutput,
    /// Text stream
    CharBuffer,
    /// Buffered reader over another stream
    BufferedReader,
    /// Buffered writer over another stream
    BufferedWriter,
    /// Text decoder over a byte stream
    TextReader,
    /// Text encoder over a byte stream
    TextWriter,
    /// File opened for reading
    FileStream,
    /// Zoned instant
    DateTime,
    /// Elapsed time
    Duration,
    /// Thread handle
    Thread,
    /// Callable object
    Callable,
    /// Reference to a type
    TypeRef,
    /// Throwable wrapper carrying `throwable_type` and `message`
    Throwable,
    /// Registered class; see [`ClassDef`]
    Class,
}

/// Resolved destination of an origin type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Destination type or class name
    pub name: String,
    /// Rebuild strategy
    pub kind: DestKind,
}

impl Destination {
    /// Create a destination
    #[must_use]
    pub fn new(name: impl Into<String>, kind: DestKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// What a registered class is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassForm {
    /// Ordinary class with fields
    #[default]
    Plain,
    /// Exception class
    Exception,
    /// Enum class
    Enum,
}

/// Normal construction path of a class
pub type Constructor = fn(&ClassDef, &[Value]) -> CoreResult<Instance>;

/// Destination class description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    /// Destination class name
    pub name: String,
    /// Direct superclass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Kind of class
    #[serde(default)]
    pub form: ClassForm,
    /// Normal constructor; never used when rebuilding snapshots
    #[serde(skip)]
    pub constructor: Option<Constructor>,
}

impl ClassDef {
    /// Plain class with no parent
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            form: ClassForm::Plain,
            constructor: None,
        }
    }

    /// Set the superclass
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set the class form
    #[must_use]
    pub fn with_form(mut self, form: ClassForm) -> Self {
        self.form = form;
        self
    }

    /// Set the normal constructor
    #[must_use]
    pub fn with_constructor(mut self, constructor: Constructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    /// Allocate an instance without running its constructor
    #[must_use]
    pub fn allocate_raw(&self) -> Instance {
        Instance::new(self.name.clone())
    }

    /// Run the normal constructor
    ///
    /// # Errors
    ///
    /// Returns error if the class has no constructor or the constructor fails
    pub fn construct(&self, args: &[Value]) -> CoreResult<Instance> {
        match self.constructor {
            Some(ctor) => ctor(self, args),
            None => Err(CoreError::materialization(
                &self.name,
                "class has no registered constructor",
            )),
        }
    }
}

/// On-disk registry description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    /// Origin type name to destination
    #[serde(default)]
    pub types: IndexMap<String, Destination>,
    /// Classes keyed by origin type name
    #[serde(default)]
    pub classes: IndexMap<String, ClassDef>,
}

/// Root of the destination exception hierarchy
pub const ROOT_EXCEPTION: &str = "Exception";

/// Prefixes tried when an origin name is not registered as-is
const CLASS_PREFIXES: [&str; 2] = ["src.main.", "src.test."];

/// Registry of origin types
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: IndexMap<String, Destination>,
    classes: IndexMap<String, ClassDef>,
}

impl TypeRegistry {
    /// Registry with only the built-in origin types
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            types: IndexMap::new(),
            classes: IndexMap::new(),
        };
        registry.install_builtins();
        registry
    }

    /// Load a registry file on top of the built-ins
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a registry
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let file: RegistryFile = serde_json::from_str(&text)?;
        let mut registry = Self::new();
        registry.extend(file);
        tracing::debug!(path = %path.display(), types = registry.types.len(), "loaded type registry");
        Ok(registry)
    }

    /// Merge a registry description
    pub fn extend(&mut self, file: RegistryFile) {
        for (origin, dest) in file.types {
            self.types.insert(origin, dest);
        }
        for (origin, class) in file.classes {
            self.register_class(origin, class);
        }
    }

    /// Map an origin type to a destination
    pub fn register(&mut self, origin: impl Into<String>, name: impl Into<String>, kind: DestKind) {
        self.types.insert(origin.into(), Destination::new(name, kind));
    }

    /// Register a class under an origin type name
    pub fn register_class(&mut self, origin: impl Into<String>, class: ClassDef) {
        let origin = origin.into();
        self.types
            .insert(origin, Destination::new(class.name.clone(), DestKind::Class));
        self.classes.insert(class.name.clone(), class);
    }

    /// Resolve an origin type name
    ///
    /// # Errors
    ///
    /// Returns error if the name is neither registered nor an array type
    pub fn resolve(&self, origin: &str) -> CoreResult<Destination> {
        if let Some(dest) = self.types.get(origin) {
            return Ok(dest.clone());
        }
        if origin.ends_with("[]") {
            return Ok(Destination::new("list", DestKind::Sequence));
        }
        if self.classes.contains_key(origin) {
            return Ok(Destination::new(origin, DestKind::Class));
        }
        Err(CoreError::schema_mapping(origin))
    }

    /// Destination name for an origin name, or the name itself
    #[must_use]
    pub fn destination_name(&self, origin: &str) -> String {
        self.types
            .get(origin)
            .map_or_else(|| origin.to_string(), |d| d.name.clone())
    }

    /// Resolve a type reference by name, trying project prefixes
    #[must_use]
    pub fn lookup_type(&self, name: &str) -> Option<Destination> {
        let dotted = name.replace('$', ".");
        let mut candidates = vec![name.to_string(), dotted.clone()];
        for prefix in CLASS_PREFIXES {
            candidates.push(format!("{prefix}{name}"));
            candidates.push(format!("{prefix}{dotted}"));
        }
        candidates.iter().find_map(|c| self.resolve(c).ok())
    }

    /// Class by destination name
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// Whether `class` is `ancestor` or inherits from it
    #[must_use]
    pub fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class);
        let mut hops = 0;
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.classes.len() {
                return false;
            }
            current = self.classes.get(name).and_then(|c| c.parent.as_deref());
        }
        false
    }

    /// Destination exception class for an origin throwable type
    #[must_use]
    pub fn exception_class(&self, origin: &str) -> String {
        match self.types.get(origin) {
            Some(dest)
                if dest.kind == DestKind::Class
                    && self
                        .classes
                        .get(&dest.name)
                        .is_some_and(|c| c.form == ClassForm::Exception) =>
            {
                dest.name.clone()
            }
            _ => ROOT_EXCEPTION.to_string(),
        }
    }

    /// Number of origin type names
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no origin names are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn install_builtins(&mut self) {
        use DestKind as K;

        let groups: &[(&str, DestKind, &[&str])] = &[
            ("null", K::Null, &["null", "java.io.InputStream"]),
            (
                "int",
                K::Int,
                &[
                    "int", "long", "short", "byte",
                    "java.lang.Integer", "java.lang.Long", "java.lang.Short", "java.lang.Byte",
                    "java.math.BigInteger",
                    "java.util.concurrent.atomic.AtomicInteger",
                    "java.util.concurrent.atomic.AtomicLong",
                ],
            ),
            (
                "float",
                K::Float,
                &[
                    "float", "double", "java.lang.Float", "java.lang.Double",
                    "java.math.BigDecimal", "java.lang.Number",
                ],
            ),
            ("bool", K::Bool, &["boolean", "java.lang.Boolean"]),
            (
                "string",
                K::Str,
                &["char", "java.lang.Character", "java.lang.String", "java.lang.CharSequence"],
            ),
            (
                "list",
                K::Sequence,
                &[
                    "java.util.ArrayList", "java.util.LinkedList", "java.util.Arrays$ArrayList",
                    "java.util.Vector", "java.util.Stack", "java.util.Arrays", "java.util.List",
                    "java.util.Collections$SingletonList", "java.util.Collections$EmptyList",
                    "java.util.concurrent.CopyOnWriteArrayList",
                ],
            ),
            (
                "tuple",
                K::Tuple,
                &[
                    "java.util.Collections$UnmodifiableRandomAccessList",
                    "java.util.Collections$UnmodifiableCollection",
                    "java.util.Collections$UnmodifiableList",
                    "java.util.ImmutableCollections$List12",
                    "java.util.ImmutableCollections$ListN",
                ],
            ),
            (
                "set",
                K::Set,
                &["java.util.HashSet", "java.util.LinkedHashSet", "java.util.TreeSet", "java.util.Set"],
            ),
            (
                "map",
                K::Mapping,
                &[
                    "java.util.HashMap", "java.util.LinkedHashMap", "java.util.TreeMap",
                    "java.util.Map", "java.util.Hashtable", "java.util.Properties",
                    "java.util.concurrent.ConcurrentHashMap",
                ],
            ),
            (
                "key_view",
                K::KeyView,
                &["java.util.LinkedHashMap$LinkedKeySet", "java.util.HashMap$KeySet"],
            ),
            (
                "value_view",
                K::ValueView,
                &["java.util.LinkedHashMap$LinkedValues", "java.util.HashMap$Values"],
            ),
            (
                "cursor",
                K::Cursor,
                &[
                    "java.util.Iterator", "java.util.ListIterator", "java.util.Enumeration",
                    "java.util.stream.Stream", "java.util.ArrayList$Itr",
                ],
            ),
            ("address", K::Address, &["java.net.URL", "java.net.URI"]),
            ("path", K::Path, &["java.io.File", "java.nio.file.Path"]),
            ("bytes_in", K::ByteInput, &["java.io.ByteArrayInputStream", "java.io.PipedInputStream"]),
            (
                "bytes_out",
                K::ByteOutput,
                &["java.io.ByteArrayOutputStream", "java.io.PipedOutputStream", "java.io.PrintStream"],
            ),
            (
                "text",
                K::CharBuffer,
                &[
                    "java.io.StringReader", "java.io.StringWriter", "java.io.PrintWriter",
                    "java.io.PipedReader", "java.io.PipedWriter",
                    "java.lang.StringBuilder", "java.lang.StringBuffer",
                ],
            ),
            ("buffered_reader", K::BufferedReader, &["java.io.BufferedReader", "java.io.FilterInputStream"]),
            ("buffered_writer", K::BufferedWriter, &["java.io.BufferedWriter", "java.io.FilterOutputStream"]),
            ("text_reader", K::TextReader, &["java.io.InputStreamReader"]),
            ("text_writer", K::TextWriter, &["java.io.OutputStreamWriter"]),
            ("file", K::FileStream, &["java.io.FileInputStream", "java.io.FileOutputStream", "java.io.FileReader"]),
            (
                "datetime",
                K::DateTime,
                &[
                    "java.util.Date", "java.util.Calendar", "java.util.GregorianCalendar",
                    "java.time.Instant", "java.time.Clock",
                ],
            ),
            (
                "timedelta",
                K::Duration,
                &["java.time.Duration", "java.util.concurrent.TimeUnit", "java.time.temporal.ChronoUnit"],
            ),
            (
                "thread",
                K::Thread,
                &[
                    "java.lang.Thread", "java.util.concurrent.ThreadFactory",
                    "java.util.concurrent.Executors$DefaultThreadFactory",
                ],
            ),
            ("callable", K::Callable, &["java.util.Comparator", "java.util.function.Function"]),
            ("type", K::TypeRef, &["java.lang.Class"]),
            (ROOT_EXCEPTION, K::Throwable, &["java.lang.Throwable"]),
        ];
        for (name, kind, origins) in groups {
            for origin in *origins {
                self.register(*origin, *name, *kind);
            }
        }

        self.register_class("java.lang.Object", ClassDef::new("Object"));

        let exceptions: &[(&str, Option<&str>, &[&str])] = &[
            (ROOT_EXCEPTION, None, &["java.lang.Exception"]),
            (
                "RuntimeError",
                Some(ROOT_EXCEPTION),
                &[
                    "java.lang.RuntimeException", "java.lang.IllegalStateException",
                    "java.lang.UnsupportedOperationException", "java.lang.ArithmeticException",
                    "java.lang.NullPointerException",
                ],
            ),
            (
                "ArgumentError",
                Some(ROOT_EXCEPTION),
                &[
                    "java.lang.IllegalArgumentException", "java.lang.NumberFormatException",
                    "java.io.UnsupportedEncodingException", "java.net.MalformedURLException",
                ],
            ),
            ("IoError", Some(ROOT_EXCEPTION), &["java.io.IOException", "java.io.UncheckedIOException"]),
            ("NotFoundError", Some("IoError"), &["java.io.FileNotFoundException"]),
            ("TypeError", Some(ROOT_EXCEPTION), &["java.lang.CloneNotSupportedException", "java.lang.ClassCastException"]),
            ("ModuleNotFoundError", Some(ROOT_EXCEPTION), &["java.lang.ClassNotFoundException"]),
            ("KeyError", Some(ROOT_EXCEPTION), &["java.util.NoSuchElementException"]),
            (
                "IndexError",
                Some(ROOT_EXCEPTION),
                &["java.lang.IndexOutOfBoundsException", "java.lang.ArrayIndexOutOfBoundsException"],
            ),
        ];
        for (name, parent, origins) in exceptions {
            let mut class = ClassDef::new(*name).with_form(ClassForm::Exception);
            if let Some(parent) = parent {
                class = class.with_parent(*parent);
            }
            for origin in *origins {
                self.register_class(*origin, class.clone());
            }
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_core::FieldKey;

    #[test]
    fn test_builtin_resolution() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.resolve("java.util.ArrayList").unwrap().kind, DestKind::Sequence);
        assert_eq!(reg.resolve("java.lang.Integer").unwrap().kind, DestKind::Int);
        assert_eq!(reg.resolve("java.util.HashMap$KeySet").unwrap().kind, DestKind::KeyView);
        assert_eq!(reg.resolve("int[]").unwrap().kind, DestKind::Sequence);
        assert_eq!(reg.resolve("java.lang.Throwable").unwrap().kind, DestKind::Throwable);
    }

    #[test]
    fn test_unknown_type() {
        let reg = TypeRegistry::new();
        let err = reg.resolve("com.unknown.Thing").unwrap_err();
        assert_eq!(err, CoreError::schema_mapping("com.unknown.Thing"));
    }

    #[test]
    fn test_exception_hierarchy() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.exception_class("java.io.FileNotFoundException"), "NotFoundError");
        assert!(reg.is_subclass("NotFoundError", "IoError"));
        assert!(reg.is_subclass("NotFoundError", ROOT_EXCEPTION));
        assert!(!reg.is_subclass("IoError", "NotFoundError"));
        assert_eq!(reg.exception_class("com.acme.WeirdException"), ROOT_EXCEPTION);
        assert_eq!(reg.exception_class("java.util.ArrayList"), ROOT_EXCEPTION);
    }

    #[test]
    fn test_register_class_and_lookup_type() {
        let mut reg = TypeRegistry::new();
        reg.register_class("src.main.org.acme.Counter", ClassDef::new("Counter"));
        assert_eq!(reg.resolve("src.main.org.acme.Counter").unwrap().name, "Counter");
        assert_eq!(reg.lookup_type("org.acme.Counter").unwrap().name, "Counter");
        assert!(reg.lookup_type("org.acme.Missing").is_none());
        assert_eq!(reg.destination_name("src.main.org.acme.Counter"), "Counter");
        assert_eq!(reg.destination_name("raw"), "raw");
    }

    #[test]
    fn test_allocate_raw_skips_constructor() {
        fn ctor(class: &ClassDef, _: &[Value]) -> CoreResult<Instance> {
            let mut inst = class.allocate_raw();
            inst.set_field(FieldKey::new(&class.name, "constructed"), Value::Bool(true));
            Ok(inst)
        }
        let class = ClassDef::new("Widget").with_constructor(ctor);
        assert!(class.allocate_raw().fields.is_empty());
        assert_eq!(class.construct(&[]).unwrap().fields.len(), 1);
        assert!(ClassDef::new("Bare").construct(&[]).is_err());
    }

    #[test]
    fn test_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(
            &path,
            r#"{"types":{"com.acme.Money":{"name":"float","kind":"float"}},
                "classes":{"src.main.com.acme.Color":{"name":"Color","form":"enum"},
                           "src.main.com.acme.Boom":{"name":"Boom","parent":"RuntimeError","form":"exception"}}}"#,
        )
        .unwrap();
        let reg = TypeRegistry::from_file(&path).unwrap();
        assert_eq!(reg.resolve("com.acme.Money").unwrap().kind, DestKind::Float);
        assert_eq!(reg.class("Color").unwrap().form, ClassForm::Enum);
        assert!(reg.is_subclass("Boom", ROOT_EXCEPTION));
        assert_eq!(reg.exception_class("src.main.com.acme.Boom"), "Boom");
    }

    #[test]
    fn test_missing_registry_file() {
        let err = TypeRegistry::from_file(Path::new("/nonexistent/registry.json")).unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
