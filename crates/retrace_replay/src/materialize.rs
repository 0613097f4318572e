//! Snapshot to live value conversion.
//!
//! The materializer resolves each snapshot's origin type through the
//! registry and rebuilds a value of the mapped kind. Snapshots carrying an
//! identity token resolve to one shared object per token; a repeat sighting
//! refreshes that object in place unless `force_new` is set.

use crate::buffer::{BufferedStream, ByteBuffer, FileBuffer, StreamDirection, TextBuffer};
use crate::cursor::ReplayCursor;
use crate::refs::ReferenceTable;
use crate::registry::{ClassForm, DestKind, TypeRegistry};
use crate::snapshot::{FieldMap, StaticFieldDiffs, ValueSnapshot};
use crate::statics::StaticStore;
use crate::value::{
    dedup_entries, dedup_members, CallableValue, EnumValue, ExceptionValue, ObjRef, Object,
    ParsedAddress, StdStream, ThreadHandle, TypeRef, Value,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeDelta, Utc};
use retrace_core::{CoreError, CoreResult, FieldKey, Visibility};
use serde_json::Value as JsonValue;

/// How a repeat sighting of a token updates the registered object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refill {
    /// Swap in the fresh content
    Replace,
    /// Leave the registered object untouched
    Keep,
    /// Rewrite the content of the wrapped stream
    Rewrap,
}

/// Declaring types whose fields belong to the origin runtime, not the domain
const RUNTIME_DECLARERS: [&str; 2] = ["java.lang.Throwable", "java.io."];

/// Rebuilds snapshots against one session's state
pub struct Materializer<'a> {
    registry: &'a TypeRegistry,
    refs: &'a mut ReferenceTable,
    statics: &'a mut StaticStore,
}

impl<'a> Materializer<'a> {
    /// Create a materializer over session state
    #[must_use]
    pub fn new(
        registry: &'a TypeRegistry,
        refs: &'a mut ReferenceTable,
        statics: &'a mut StaticStore,
    ) -> Self {
        Self {
            registry,
            refs,
            statics,
        }
    }

    /// Rebuild one snapshot
    ///
    /// # Errors
    ///
    /// Returns error if the type is unregistered or the snapshot lacks data
    /// its kind cannot default
    pub fn materialize(&mut self, snap: &ValueSnapshot, force_new: bool) -> CoreResult<Value> {
        let Some(type_name) = snap.type_name.as_deref() else {
            return Ok(Value::Null);
        };
        if snap.is_null_marker() {
            return Ok(Value::Null);
        }
        let dest = self.registry.resolve(type_name)?;
        tracing::trace!(type_name, kind = ?dest.kind, force_new, "materialize");

        match dest.kind {
            DestKind::Null => Ok(Value::Null),
            DestKind::Str => Ok(snap.value_text().map_or(Value::Null, Value::Str)),
            DestKind::Int => int_value(type_name, snap.value.as_ref()),
            DestKind::Float => float_value(type_name, snap.value.as_ref()),
            DestKind::Bool => Ok(bool_value(snap.value.as_ref())),
            DestKind::Sequence => {
                let items = self.elements(snap.collection_elements.as_deref(), force_new)?;
                Ok(self.share(snap, force_new, Object::List(items), Refill::Replace))
            }
            DestKind::Tuple => {
                let items = self.elements(snap.collection_elements.as_deref(), force_new)?;
                Ok(self.share(snap, force_new, Object::Tuple(items), Refill::Keep))
            }
            DestKind::Set => {
                let items = self.elements(snap.collection_elements.as_deref(), force_new)?;
                Ok(self.share(snap, force_new, Object::Set(dedup_members(items)), Refill::Replace))
            }
            DestKind::Mapping => {
                let entries = self.entries(type_name, snap, force_new)?;
                Ok(self.share(snap, force_new, Object::Map(entries), Refill::Replace))
            }
            DestKind::KeyView => {
                let items = self.elements(snap.collection_elements.as_deref(), force_new)?;
                Ok(self.share(snap, force_new, Object::KeyView(items), Refill::Replace))
            }
            DestKind::ValueView => {
                let items = self.elements(snap.collection_elements.as_deref(), force_new)?;
                Ok(self.share(snap, force_new, Object::ValueView(items), Refill::Replace))
            }
            DestKind::Cursor => self.cursor(snap, force_new),
            DestKind::Address => Ok(snap
                .value_text()
                .map_or(Value::Null, |text| Value::Address(ParsedAddress::parse(&text)))),
            DestKind::Path => Ok(snap
                .value_text()
                .map_or(Value::Null, |text| Value::Path(text.into()))),
            DestKind::ByteInput => self.byte_input(snap, force_new),
            DestKind::ByteOutput => self.byte_output(snap, force_new),
            DestKind::CharBuffer => self.char_buffer(snap, force_new),
            DestKind::BufferedReader => self.buffered(snap, force_new, StreamDirection::Reader),
            DestKind::BufferedWriter => self.buffered(snap, force_new, StreamDirection::Writer),
            DestKind::TextReader => self.text_wrapper(snap, force_new, StreamDirection::Reader),
            DestKind::TextWriter => self.text_wrapper(snap, force_new, StreamDirection::Writer),
            DestKind::FileStream => self.file_stream(type_name, snap, force_new),
            DestKind::DateTime => {
                let instant = datetime_value(type_name, snap)?;
                Ok(self.share(snap, force_new, Object::DateTime(instant), Refill::Replace))
            }
            DestKind::Duration => {
                let elapsed = duration_value(type_name, snap)?;
                Ok(self.share(snap, force_new, Object::Duration(elapsed), Refill::Replace))
            }
            DestKind::Thread => Ok(Value::Thread(ThreadHandle {
                name: snap.value_text(),
            })),
            DestKind::Callable => Ok(self.callable(snap, force_new)),
            DestKind::TypeRef => Ok(self.type_ref(snap)),
            DestKind::Throwable => {
                let origin = snap.throwable_type.as_deref().unwrap_or(type_name);
                let class = self.registry.exception_class(origin);
                Ok(Value::object(Object::Exception(ExceptionValue::new(
                    class,
                    snap.message.clone(),
                ))))
            }
            DestKind::Class => self.class_value(type_name, &dest.name, snap, force_new),
        }
    }

    /// Overwrite the fields of an existing value from a snapshot.
    ///
    /// Instances get each recorded field assigned; other objects take the
    /// content of the rebuilt snapshot while keeping their identity.
    ///
    /// # Errors
    ///
    /// Returns error if a field or the snapshot cannot be materialized
    pub fn set_instance_fields(&mut self, target: &Value, snap: &ValueSnapshot) -> CoreResult<()> {
        let Value::Ref(target) = target else {
            tracing::debug!(kind = ?target.kind(), "scalar target has no fields to set");
            return Ok(());
        };

        let class = target.borrow().as_instance().map(|i| i.class.clone());
        if let Some(class) = class {
            let nested;
            let snap = if !snap.has_fields() {
                nested = snap.nested();
                nested.as_ref().unwrap_or(snap)
            } else {
                snap
            };
            let fields = self.fields(&class, snap.instance_fields.as_ref(), false)?;
            if let Some(mut obj) = target.try_borrow_mut() {
                if let Object::Instance(inst) = &mut *obj {
                    for (key, value) in fields {
                        inst.set_field(key, value);
                    }
                }
            }
            self.assign_statics(&class, snap.static_fields.as_ref(), false)?;
            return Ok(());
        }

        let fresh = self.materialize(snap, false)?;
        if let Value::Ref(source) = &fresh {
            if !source.ptr_eq(target) {
                let content = source.borrow_mut().shallow_copy();
                refill(target, content, Refill::Rewrap);
            }
        }
        Ok(())
    }

    /// Apply recorded static field changes
    ///
    /// # Errors
    ///
    /// Returns error if a new value cannot be materialized
    pub fn update_static_fields(&mut self, diffs: &StaticFieldDiffs) -> CoreResult<()> {
        for (origin, field, entry) in diffs.entries() {
            let Some(class) = self.static_class(origin) else {
                tracing::warn!(class = origin, field, "static change for unregistered class");
                continue;
            };
            let key = self.field_key(
                &class,
                field,
                entry.modifier.as_deref(),
                entry.declaring_class.as_deref(),
            );
            let value = self.materialize(&entry.details, false)?;
            tracing::debug!(class = %class, field = %key, "static field updated");
            self.statics.set(class, key, value);
        }
        Ok(())
    }

    /// Destination class holding statics for an origin class name
    #[must_use]
    pub fn static_class(&self, origin: &str) -> Option<String> {
        self.registry
            .resolve(origin)
            .ok()
            .filter(|d| d.kind == DestKind::Class)
            .map(|d| d.name)
    }

    /// Key of a field: private fields are keyed by their declaring type,
    /// all others by the owning class
    #[must_use]
    pub fn field_key(
        &self,
        owner: &str,
        name: &str,
        modifier: Option<&str>,
        declaring: Option<&str>,
    ) -> FieldKey {
        let visibility = modifier.map_or(Visibility::Public, Visibility::from_modifier);
        match (visibility, declaring) {
            (Visibility::Private, Some(declaring)) => {
                FieldKey::new(self.registry.destination_name(declaring), name)
            }
            _ => FieldKey::new(owner, name),
        }
    }

    fn share(&mut self, snap: &ValueSnapshot, force_new: bool, fresh: Object, policy: Refill) -> Value {
        let token = if force_new { None } else { snap.token() };
        let Some(token) = token else {
            return Value::object(fresh);
        };
        if let Some(existing) = self.refs.get(token).cloned() {
            tracing::trace!(token = %token, ?policy, "refresh shared object");
            refill(&existing, fresh, policy);
            return Value::Ref(existing);
        }
        let obj = ObjRef::new(fresh);
        self.refs.insert(token.clone(), obj.clone());
        Value::Ref(obj)
    }

    fn elements(&mut self, items: Option<&[ValueSnapshot]>, force_new: bool) -> CoreResult<Vec<Value>> {
        items
            .unwrap_or_default()
            .iter()
            .map(|item| self.materialize(item, force_new))
            .collect()
    }

    fn entries(
        &mut self,
        type_name: &str,
        snap: &ValueSnapshot,
        force_new: bool,
    ) -> CoreResult<Vec<(Value, Value)>> {
        let keys = snap.keys.as_deref().unwrap_or_default();
        let values = snap.values.as_deref().unwrap_or_default();
        if keys.len() != values.len() {
            return Err(CoreError::materialization(
                type_name,
                format!("{} keys but {} values", keys.len(), values.len()),
            ));
        }
        let mut entries = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            entries.push((self.materialize(key, force_new)?, self.materialize(value, force_new)?));
        }
        Ok(dedup_entries(entries))
    }

    fn cursor(&mut self, snap: &ValueSnapshot, force_new: bool) -> CoreResult<Value> {
        let items = match snap.collection_details.as_deref() {
            Some(details) if details.collection_elements.is_some() => {
                self.elements(details.collection_elements.as_deref(), force_new)?
            }
            Some(details) if details.keys.is_some() => {
                let type_name = details.type_name.as_deref().unwrap_or("cursor");
                self.entries(type_name, details, force_new)?
                    .into_iter()
                    .map(|(k, v)| Value::tuple(vec![k, v]))
                    .collect()
            }
            _ => Vec::new(),
        };
        let fresh = Object::Cursor(ReplayCursor::from_vec(items));
        Ok(self.share(snap, force_new, fresh, Refill::Replace))
    }

    fn byte_array(&mut self, array: Option<&ValueSnapshot>) -> CoreResult<Vec<u8>> {
        let Some(array) = array else {
            return Ok(Vec::new());
        };
        let value = self.materialize(array, true)?;
        let Value::Ref(obj) = value else {
            return Ok(Vec::new());
        };
        let obj = obj.borrow();
        let Object::List(items) = &*obj else {
            return Ok(Vec::new());
        };
        items
            .iter()
            .map(|item| match item {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Value::Int(b) => Ok((b & 0xFF) as u8),
                other => Err(CoreError::materialization(
                    array.type_name.as_deref().unwrap_or("byte[]"),
                    format!("byte array element is {:?}", other.kind()),
                )),
            })
            .collect()
    }

    fn byte_input(&mut self, snap: &ValueSnapshot, force_new: bool) -> CoreResult<Value> {
        let data = self.byte_array(snap.byte_array.as_deref())?;
        let position = index(snap.position).unwrap_or(0);
        let fresh = Object::Bytes(ByteBuffer::new(data, position));
        Ok(self.share(snap, force_new, fresh, Refill::Replace))
    }

    fn byte_output(&mut self, snap: &ValueSnapshot, force_new: bool) -> CoreResult<Value> {
        let array = snap
            .sink_details
            .as_deref()
            .and_then(|sink| sink.byte_array.as_deref())
            .or(snap.byte_array.as_deref());
        let mut data = self.byte_array(array)?;
        let size = index(snap.size).unwrap_or(data.len()).min(data.len());
        data.truncate(size);
        let position = index(snap.position).unwrap_or(size);
        let fresh = Object::Bytes(ByteBuffer::new(data, position));
        Ok(self.share(snap, force_new, fresh, Refill::Replace))
    }

    fn char_buffer(&mut self, snap: &ValueSnapshot, force_new: bool) -> CoreResult<Value> {
        let note = snap.special_note.as_deref();
        if let Some(stream) = note.and_then(StdStream::from_note) {
            return Ok(Value::Std(stream));
        }
        if note == Some("byte_stream") {
            return match snap.byte_stream.as_deref() {
                Some(inner) => self.materialize(inner, force_new),
                None => Ok(Value::Null),
            };
        }
        let buffer = match (&snap.content, snap.value_text()) {
            (Some(content), _) => TextBuffer::new(content.clone(), index(snap.position).unwrap_or(0)),
            (None, Some(text)) => match index(snap.position) {
                Some(position) => TextBuffer::new(text, position),
                None => TextBuffer::at_end(text),
            },
            (None, None) => TextBuffer::default(),
        };
        Ok(self.share(snap, force_new, Object::Text(buffer), Refill::Replace))
    }

    fn buffered(
        &mut self,
        snap: &ValueSnapshot,
        force_new: bool,
        direction: StreamDirection,
    ) -> CoreResult<Value> {
        let note = snap.special_note.as_deref();
        if let Some(stream) = note.and_then(StdStream::from_note) {
            return Ok(Value::Std(stream));
        }
        let inner = match snap.stream_type.as_deref() {
            Some("byte_stream" | "file_stream") => match snap.stream_details.as_deref() {
                Some(details) => self.materialize(details, force_new)?,
                None => Value::Null,
            },
            Some(other) => {
                tracing::warn!(stream_type = other, "unsupported wrapped stream");
                Value::Null
            }
            None if note == Some("byte_stream") => match snap.byte_stream.as_deref() {
                Some(inner) => self.materialize(inner, force_new)?,
                None => Value::Null,
            },
            None => match &snap.content {
                Some(content) => Value::object(Object::Bytes(ByteBuffer::new(
                    content.clone().into_bytes(),
                    index(snap.position).unwrap_or(0),
                ))),
                None => Value::Null,
            },
        };
        let Value::Ref(inner) = inner else {
            return Ok(Value::Null);
        };
        let fresh = Object::Buffered(BufferedStream::new(direction, inner));
        Ok(self.share(snap, force_new, fresh, Refill::Rewrap))
    }

    fn text_wrapper(
        &mut self,
        snap: &ValueSnapshot,
        force_new: bool,
        direction: StreamDirection,
    ) -> CoreResult<Value> {
        if let Some(stream) = snap.special_note.as_deref().and_then(StdStream::from_note) {
            return Ok(Value::Std(stream));
        }
        if let Some(file) = snap.file_stream.as_deref() {
            return self.materialize(file, force_new);
        }
        let Some(bytes) = snap.byte_stream.as_deref() else {
            return Ok(Value::Null);
        };
        let Value::Ref(inner) = self.materialize(bytes, force_new)? else {
            return Ok(Value::Null);
        };
        let fresh = Object::Buffered(BufferedStream::new(direction, inner));
        Ok(self.share(snap, force_new, fresh, Refill::Rewrap))
    }

    fn file_stream(&mut self, type_name: &str, snap: &ValueSnapshot, force_new: bool) -> CoreResult<Value> {
        let Some(path) = snap.file_path.as_deref() else {
            return Err(CoreError::materialization(type_name, "file stream without file_path"));
        };
        let content = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path, error = %e, "file stream target unreadable, using empty content");
                Vec::new()
            }
        };
        if let Some(recorded) = index(snap.file_size) {
            if recorded != content.len() {
                tracing::warn!(path, recorded, actual = content.len(), "file size differs from recording");
            }
        }
        let position = index(snap.position).unwrap_or(0);
        let fresh = Object::File(FileBuffer::new(path, content, position));
        Ok(self.share(snap, force_new, fresh, Refill::Replace))
    }

    fn callable(&mut self, snap: &ValueSnapshot, force_new: bool) -> Value {
        let descriptor = snap.value_text().unwrap_or_default();
        let class_name = descriptor.split('@').next().unwrap_or_default();
        let target = self
            .registry
            .lookup_type(class_name)
            .filter(|d| d.kind == DestKind::Class)
            .and_then(|d| self.registry.class(&d.name))
            .map(|class| class.allocate_raw());
        let fresh = Object::Callable(CallableValue { descriptor, target });
        self.share(snap, force_new, fresh, Refill::Replace)
    }

    fn type_ref(&self, snap: &ValueSnapshot) -> Value {
        let Some(name) = snap.value_text() else {
            return Value::Null;
        };
        if name.starts_with('[') {
            return Value::Type(TypeRef::Sequence);
        }
        match self.registry.lookup_type(&name) {
            Some(dest) if dest.kind == DestKind::Null => Value::Null,
            Some(dest) if dest.kind == DestKind::Sequence => Value::Type(TypeRef::Sequence),
            Some(dest) => Value::Type(TypeRef::Named(dest.name)),
            None => {
                tracing::debug!(name = %name, "type reference to unregistered type");
                Value::Null
            }
        }
    }

    fn class_value(
        &mut self,
        type_name: &str,
        class_name: &str,
        snap: &ValueSnapshot,
        force_new: bool,
    ) -> CoreResult<Value> {
        // Object fields record the runtime value under `value`.
        if !snap.has_fields() && snap.enum_name.is_none() {
            if let Some(mut nested) = snap.nested() {
                if nested.memory_address.is_none() {
                    nested.memory_address.clone_from(&snap.memory_address);
                }
                return self.materialize(&nested, force_new);
            }
        }

        let class = self
            .registry
            .class(class_name)
            .ok_or_else(|| CoreError::schema_mapping(type_name))?;

        match class.form {
            ClassForm::Exception => Ok(Value::object(Object::Exception(
                self.exception(type_name, class_name, snap, force_new)?,
            ))),
            ClassForm::Enum => {
                let Some(name) = snap.enum_name.clone() else {
                    return Err(CoreError::materialization(type_name, "enum constant without enum_name"));
                };
                let value = match snap.enum_value.as_deref() {
                    Some(payload) => self.materialize(payload, force_new)?,
                    None => Value::Null,
                };
                let fresh = Object::Enum(EnumValue {
                    class: class_name.to_string(),
                    name,
                    value,
                });
                Ok(self.share(snap, force_new, fresh, Refill::Replace))
            }
            ClassForm::Plain => {
                let mut instance = class.allocate_raw();
                for (key, value) in self.fields(class_name, snap.instance_fields.as_ref(), force_new)? {
                    instance.set_field(key, value);
                }
                self.assign_statics(class_name, snap.static_fields.as_ref(), force_new)?;
                instance.backing = self.backing_stream(snap, force_new)?;
                Ok(self.share(snap, force_new, Object::Instance(instance), Refill::Replace))
            }
        }
    }

    fn exception(
        &mut self,
        type_name: &str,
        class_name: &str,
        snap: &ValueSnapshot,
        force_new: bool,
    ) -> CoreResult<ExceptionValue> {
        let fields = snap.instance_fields.as_ref();
        let cause = fields.and_then(|f| f.get("cause")).map(|f| &f.snapshot);
        let message = cause
            .and_then(|c| c.message.clone())
            .or_else(|| snap.message.clone())
            .or_else(|| fields.and_then(|f| f.get("detailMessage")).and_then(|f| f.snapshot.value_text()));

        let mut exception = ExceptionValue::new(class_name, message);
        if let Some(cause) = cause {
            // An exception with no cause records itself as its cause.
            let distinct = cause
                .throwable_type
                .as_deref()
                .is_some_and(|t| t != type_name);
            if distinct {
                exception.cause = Some(Box::new(self.materialize(cause, force_new)?));
            }
        }
        Ok(exception)
    }

    fn fields(
        &mut self,
        owner: &str,
        fields: Option<&FieldMap>,
        force_new: bool,
    ) -> CoreResult<Vec<(FieldKey, Value)>> {
        let Some(fields) = fields else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(fields.len());
        for (name, field) in fields.iter() {
            let declaring = field.declaring_class.as_deref();
            if declaring.is_some_and(|d| RUNTIME_DECLARERS.iter().any(|r| d.contains(r))) {
                continue;
            }
            let key = self.field_key(owner, name, field.modifier.as_deref(), declaring);
            out.push((key, self.materialize(&field.snapshot, force_new)?));
        }
        Ok(out)
    }

    fn assign_statics(&mut self, class: &str, fields: Option<&FieldMap>, force_new: bool) -> CoreResult<()> {
        for (key, value) in self.fields(class, fields, force_new)? {
            self.statics.set(class, key, value);
        }
        Ok(())
    }

    fn backing_stream(&mut self, snap: &ValueSnapshot, force_new: bool) -> CoreResult<Option<ObjRef>> {
        let value = match (snap.stream_type.as_deref(), snap.stream_details.as_deref()) {
            (Some(_), Some(details)) => self.materialize(details, force_new)?,
            _ => match &snap.content {
                Some(content) => Value::object(Object::Bytes(ByteBuffer::new(
                    content.clone().into_bytes(),
                    index(snap.position).unwrap_or(0),
                ))),
                None => return Ok(None),
            },
        };
        Ok(value.as_obj().cloned())
    }
}

/// Update a registered object from fresh content
fn refill(existing: &ObjRef, fresh: Object, policy: Refill) {
    match policy {
        Refill::Keep => {}
        Refill::Replace => {
            existing.replace(fresh);
        }
        Refill::Rewrap => {
            let current_inner = match &*existing.borrow() {
                Object::Buffered(stream) => Some(stream.inner.clone()),
                _ => None,
            };
            match (current_inner, fresh) {
                (Some(current), Object::Buffered(stream)) => {
                    if !current.ptr_eq(&stream.inner) {
                        let content = stream.inner.borrow_mut().shallow_copy();
                        current.replace(content);
                    }
                }
                (_, fresh) => {
                    existing.replace(fresh);
                }
            }
        }
    }
}

fn index(raw: Option<i64>) -> Option<usize> {
    raw.and_then(|v| usize::try_from(v).ok())
}

fn int_value(type_name: &str, raw: Option<&JsonValue>) -> CoreResult<Value> {
    let bad = |shown: &dyn std::fmt::Display| {
        CoreError::materialization(type_name, format!("not an integer: {shown}"))
    };
    match raw {
        None | Some(JsonValue::Null) => Ok(Value::Null),
        Some(JsonValue::Bool(b)) => Ok(Value::Int(i128::from(*b))),
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().and_then(integral))
            .map(Value::Int)
            .ok_or_else(|| bad(n)),
        Some(JsonValue::String(s)) => {
            let text = s.trim();
            text.parse::<i128>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(integral))
                .map(Value::Int)
                .ok_or_else(|| bad(&format!("{s:?}")))
        }
        Some(other) => Err(bad(other)),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn integral(v: f64) -> Option<i128> {
    (v.is_finite() && v.fract() == 0.0).then(|| v as i128)
}

fn float_value(type_name: &str, raw: Option<&JsonValue>) -> CoreResult<Value> {
    match raw {
        None | Some(JsonValue::Null) => Ok(Value::Null),
        Some(JsonValue::Number(n)) => n
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| CoreError::materialization(type_name, format!("not a number: {n}"))),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| CoreError::materialization(type_name, format!("not a number: {s:?}"))),
        Some(other) => Err(CoreError::materialization(type_name, format!("not a number: {other}"))),
    }
}

fn bool_value(raw: Option<&JsonValue>) -> Value {
    match raw {
        None | Some(JsonValue::Null) => Value::Null,
        Some(JsonValue::Bool(b)) => Value::Bool(*b),
        Some(JsonValue::String(s)) => Value::Bool(s.trim().eq_ignore_ascii_case("true")),
        Some(_) => Value::Bool(false),
    }
}

fn datetime_value(type_name: &str, snap: &ValueSnapshot) -> CoreResult<DateTime<FixedOffset>> {
    if let Some(ts) = snap.timestamp {
        let offset = zone_offset(snap.timezone.as_ref());
        let secs = ts.floor();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let nanos = (((ts - secs) * 1e9).round() as u32).min(999_999_999);
        #[allow(clippy::cast_possible_truncation)]
        let utc = DateTime::from_timestamp(secs as i64, nanos)
            .ok_or_else(|| CoreError::materialization(type_name, format!("timestamp out of range: {ts}")))?;
        return Ok(utc.with_timezone(&offset));
    }
    if let Some(text) = snap.instant.clone().or_else(|| snap.value_text()) {
        return DateTime::parse_from_rfc3339(&text)
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc().fixed_offset())
            })
            .ok_or_else(|| CoreError::materialization(type_name, format!("unparseable instant: {text:?}")));
    }
    Ok(DateTime::UNIX_EPOCH.fixed_offset())
}

/// Offset for a zone given as seconds, `UTC`, `Z` or `[GMT|UTC]+hh:mm`
fn zone_offset(zone: Option<&JsonValue>) -> FixedOffset {
    let utc = Utc.fix();
    let parsed = match zone {
        None | Some(JsonValue::Null) => return utc,
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .and_then(|s| i32::try_from(s).ok())
            .and_then(FixedOffset::east_opt),
        Some(JsonValue::String(s)) => parse_zone_text(s),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        tracing::warn!(zone = ?zone, "unsupported time zone, using UTC");
        utc
    })
}

fn parse_zone_text(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    let rest = text
        .strip_prefix("GMT")
        .or_else(|| text.strip_prefix("UTC"))
        .unwrap_or(text);
    if rest.is_empty() || rest == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, digits) = match rest.as_bytes().first()? {
        b'+' => (1, &rest[1..]),
        b'-' => (-1, &rest[1..]),
        _ => return None,
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if digits.len() > 2 => (digits[..2].parse().ok()?, digits[2..].parse().ok()?),
        None => (digits.parse().ok()?, 0),
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn duration_value(type_name: &str, snap: &ValueSnapshot) -> CoreResult<TimeDelta> {
    let seconds = TimeDelta::try_seconds(snap.seconds.unwrap_or(0))
        .ok_or_else(|| CoreError::materialization(type_name, "duration seconds out of range"))?;
    seconds
        .checked_add(&TimeDelta::nanoseconds(snap.nanos.unwrap_or(0)))
        .ok_or_else(|| CoreError::materialization(type_name, "duration out of range"))
}
