//! Recorded value snapshots.
//!
//! A snapshot is a JSON object keyed by `type`. Every other key is optional
//! and only meaningful for the kind the type maps to. Snapshots are parsed
//! only once, on first use; the trace parser keeps them as raw text.

use crate::de::{lenient_f64, lenient_i64, present};
use indexmap::IndexMap;
use retrace_core::{CoreError, CoreResult, IdentityToken};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// One recorded value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueSnapshot {
    /// Origin type name
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,

    /// Scalar payload; `Some(Null)` marks an explicit null
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,

    /// Origin identity of the recorded instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_address: Option<IdentityToken>,

    /// Sequence, set and view elements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_elements: Option<Vec<ValueSnapshot>>,

    /// Mapping keys, parallel to `values`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<ValueSnapshot>>,

    /// Mapping values, parallel to `keys`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<ValueSnapshot>>,

    /// Remaining elements of a cursor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_details: Option<Box<ValueSnapshot>>,

    /// Instance fields keyed by field name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_fields: Option<FieldMap>,

    /// Class-level fields recorded alongside an instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_fields: Option<FieldMap>,

    /// Concrete exception type of a throwable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throwable_type: Option<String>,

    /// Exception message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Enum constant name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_name: Option<String>,

    /// Enum constant payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_value: Option<Box<ValueSnapshot>>,

    /// Byte array of a byte stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_array: Option<Box<ValueSnapshot>>,

    /// Wrapper around the byte array of an output byte stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sink_details: Option<Box<ValueSnapshot>>,

    /// Count of valid bytes in an output byte stream
    #[serde(deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,

    /// Stream position
    #[serde(deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,

    /// Recorded size of a file
    #[serde(deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,

    /// Text content of a character or buffered stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Marks standard streams or a stream wrapping another snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_note: Option<String>,

    /// Wrapped byte stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_stream: Option<Box<ValueSnapshot>>,

    /// `byte_stream` or `file_stream` for buffered streams
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<String>,

    /// Wrapped stream of a buffered stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_details: Option<Box<ValueSnapshot>>,

    /// Path of a file stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Wrapped file stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_stream: Option<Box<ValueSnapshot>>,

    /// Text encoding of a text wrapper
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    /// Seconds since the epoch
    #[serde(deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,

    /// Zone name or offset in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<JsonValue>,

    /// ISO-8601 instant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instant: Option<String>,

    /// Whole seconds of a duration
    #[serde(deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub seconds: Option<i64>,

    /// Nanosecond part of a duration
    #[serde(deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub nanos: Option<i64>,
}

impl ValueSnapshot {
    /// Snapshot with only a type name
    #[must_use]
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    /// Set the scalar payload
    #[must_use]
    pub fn with_value(mut self, value: impl Into<JsonValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Set the identity token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<IdentityToken>) -> Self {
        self.memory_address = Some(token.into());
        self
    }

    /// Set the element list
    #[must_use]
    pub fn with_elements(mut self, elements: Vec<ValueSnapshot>) -> Self {
        self.collection_elements = Some(elements);
        self
    }

    /// Parse a snapshot from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a JSON object of the expected shape
    pub fn from_json(raw: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Whether the payload is an explicit null marker
    #[must_use]
    pub fn is_null_marker(&self) -> bool {
        matches!(self.value, Some(JsonValue::Null))
    }

    /// Identity token, ignoring blank ones
    #[must_use]
    pub fn token(&self) -> Option<&IdentityToken> {
        self.memory_address.as_ref().filter(|t| !t.is_blank())
    }

    /// Scalar payload rendered as text
    #[must_use]
    pub fn value_text(&self) -> Option<String> {
        match self.value.as_ref()? {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// A typed snapshot nested under `value`, as recorded for object fields
    #[must_use]
    pub fn nested(&self) -> Option<ValueSnapshot> {
        let inner = self.value.as_ref()?;
        if inner.get("type").is_some() {
            serde_json::from_value(inner.clone()).ok()
        } else {
            None
        }
    }

    /// Whether the snapshot carries any field maps
    #[must_use]
    pub fn has_fields(&self) -> bool {
        self.instance_fields.as_ref().is_some_and(|f| !f.is_empty())
            || self.static_fields.as_ref().is_some_and(|f| !f.is_empty())
    }
}

/// A recorded field: visibility, declaring type and the value itself
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldSnapshot {
    /// Modifier text, e.g. `"private final"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,

    /// Origin type declaring the field, when it is not the snapshot's type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaring_class: Option<String>,

    /// Recorder flag for fields hidden by a subclass field of the same name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shadowed: Option<JsonValue>,

    /// Field value
    #[serde(flatten)]
    pub snapshot: ValueSnapshot,
}

/// Field name to field snapshot, in recorded order
///
/// Duplicate names are kept: a shadowed field and its shadowing field may
/// share a name and differ only in declaring type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMap(Vec<(String, FieldSnapshot)>);

impl FieldMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field
    pub fn push(&mut self, name: impl Into<String>, field: FieldSnapshot) {
        self.0.push((name.into(), field));
    }

    /// Look up the first field with a name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldSnapshot> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Iterate fields in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSnapshot)> {
        self.0.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, field) in &self.0 {
            map.serialize_entry(name, field)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a map of field snapshots")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, field)) = access.next_entry::<String, FieldSnapshot>()? {
                    fields.push((name, field));
                }
                Ok(FieldMap(fields))
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// One static field change inside a class group
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StaticFieldEntry {
    /// Modifier text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,

    /// Origin type declaring the field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaring_class: Option<String>,

    /// New value
    #[serde(default)]
    pub details: ValueSnapshot,
}

/// Static field changes grouped by origin class
///
/// Wire shape: `[{"Class": [{"field": {entry}}, ...]}, ...]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticFieldDiffs(Vec<IndexMap<String, Vec<IndexMap<String, StaticFieldEntry>>>>);

impl StaticFieldDiffs {
    /// Parse the `Static Fields Changed` payload
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a static field list
    pub fn from_json(raw: &str) -> CoreResult<Self> {
        serde_json::from_str(raw).map_err(|e| CoreError::InvalidSnapshot {
            reason: format!("static field list: {e}"),
        })
    }

    /// Add a change
    pub fn push(&mut self, class: impl Into<String>, field: impl Into<String>, entry: StaticFieldEntry) {
        let mut inner = IndexMap::new();
        inner.insert(field.into(), entry);
        let mut group = IndexMap::new();
        group.insert(class.into(), vec![inner]);
        self.0.push(group);
    }

    /// Flatten to `(class, field, entry)` triples in recorded order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &StaticFieldEntry)> {
        self.0.iter().flat_map(|group| {
            group.iter().flat_map(|(class, fields)| {
                fields.iter().flat_map(move |inner| {
                    inner
                        .iter()
                        .map(move |(field, entry)| (class.as_str(), field.as_str(), entry))
                })
            })
        })
    }

    /// Whether there are no changes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }
}
