//! Structural equivalence between an actual and an expected value.
//!
//! The checker is total: shape mismatches resolve to `false`, never to an
//! error. Rules are tried in a fixed order, the first applicable one decides.

use crate::hash::{structural_hash, tuple_hash};
use crate::literal::logically_equal;
use crate::refs::ReferenceTable;
use crate::registry::TypeRegistry;
use crate::value::{Instance, ObjRef, Object, Value};
use chrono::TimeDelta;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Tolerances and fallbacks of the checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Durations closer than this are equal
    pub duration_tolerance_micros: i64,
    /// Accept an unequal integer that is the hash of a live object
    pub hash_recovery: bool,
    /// Accept cursors where one drained sequence contains the other as a run
    pub sublist_tolerance: bool,
}

impl CheckerConfig {
    /// Default configuration
    #[must_use]
    pub const fn new() -> Self {
        Self {
            duration_tolerance_micros: 1,
            hash_recovery: true,
            sublist_tolerance: true,
        }
    }

    /// Set the duration tolerance in microseconds
    #[must_use]
    pub const fn with_duration_tolerance_micros(mut self, micros: i64) -> Self {
        self.duration_tolerance_micros = micros;
        self
    }

    /// Enable or disable hash recovery
    #[must_use]
    pub const fn with_hash_recovery(mut self, enabled: bool) -> Self {
        self.hash_recovery = enabled;
        self
    }

    /// Enable or disable sublist tolerance for cursors
    #[must_use]
    pub const fn with_sublist_tolerance(mut self, enabled: bool) -> Self {
        self.sublist_tolerance = enabled;
        self
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Equivalence checker over one session's objects
pub struct Checker<'a> {
    registry: &'a TypeRegistry,
    refs: &'a ReferenceTable,
    config: CheckerConfig,
    in_progress: RefCell<FxHashSet<(usize, usize)>>,
}

impl<'a> Checker<'a> {
    /// Checker with the default configuration
    #[must_use]
    pub fn new(registry: &'a TypeRegistry, refs: &'a ReferenceTable) -> Self {
        Self {
            registry,
            refs,
            config: CheckerConfig::default(),
            in_progress: RefCell::default(),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: CheckerConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether `actual` is equivalent to `expected`
    #[must_use]
    pub fn equal(&self, actual: &Value, expected: &Value) -> bool {
        match (actual, expected) {
            (Value::Ref(a), Value::Ref(b)) => {
                if a.ptr_eq(b) {
                    return true;
                }
                let pair = (a.addr(), b.addr());
                if !self.in_progress.borrow_mut().insert(pair) {
                    return true;
                }
                let result = self.objects(a, b);
                self.in_progress.borrow_mut().remove(&pair);
                result
            }
            (Value::Thread(_), Value::Thread(_)) => true,
            (Value::Int(a), Value::Int(b)) => {
                a == b || (self.config.hash_recovery && self.recovers_hash(*a))
            }
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b || logically_equal(a, b),
            (Value::Ref(_), _) | (_, Value::Ref(_)) => false,
            _ => actual.kind() == expected.kind() && actual.native_eq(expected),
        }
    }

    fn objects(&self, a: &ObjRef, b: &ObjRef) -> bool {
        if let (Some(left), Some(right)) = (drain_cursor(a), drain_cursor(b)) {
            return self.cursors(&left, &right);
        }

        let (Some(x), Some(y)) = (a.try_borrow(), b.try_borrow()) else {
            return false;
        };
        match (&*x, &*y) {
            (Object::Enum(p), Object::Enum(q)) => p.name == q.name && self.equal(&p.value, &q.value),
            (Object::Exception(p), Object::Exception(q)) => {
                self.registry.is_subclass(&p.class, &q.class)
                    || self.registry.is_subclass(&q.class, &p.class)
            }
            (Object::Duration(p), Object::Duration(q)) => {
                let tolerance = TimeDelta::microseconds(self.config.duration_tolerance_micros);
                p.checked_sub(q).is_some_and(|d| d.abs() < tolerance)
            }
            (p, q) if p.kind() != q.kind() => false,
            (Object::Bytes(p), Object::Bytes(q)) => p.contents() == q.contents(),
            (Object::Text(p), Object::Text(q)) => p.contents() == q.contents(),
            (Object::Map(p), Object::Map(q)) => self.maps(p, q),
            (Object::List(p), Object::List(q))
            | (Object::Tuple(p), Object::Tuple(q))
            | (Object::ValueView(p), Object::ValueView(q)) => self.sequences(p, q),
            (Object::Set(p), Object::Set(q)) => {
                p.len() == q.len() && p.iter().all(|m| q.iter().any(|n| self.equal(m, n)))
            }
            (Object::KeyView(p), Object::KeyView(q)) => {
                p.len() == q.len() && p.iter().all(|m| q.iter().any(|n| m.native_eq(n)))
            }
            (Object::DateTime(p), Object::DateTime(q)) => p == q,
            (Object::Instance(p), Object::Instance(q)) => self.instances(p, q),
            (Object::Callable(p), Object::Callable(q)) => match (&p.target, &q.target) {
                (Some(s), Some(t)) => self.instances(s, t),
                _ => true,
            },
            (Object::Buffered(p), Object::Buffered(q)) => {
                p.direction == q.direction
                    && self.equal(&Value::Ref(p.inner.clone()), &Value::Ref(q.inner.clone()))
            }
            (Object::File(p), Object::File(q)) => {
                p.path == q.path && p.bytes.contents() == q.bytes.contents()
            }
            _ => false,
        }
    }

    fn sequences(&self, p: &[Value], q: &[Value]) -> bool {
        p.len() == q.len() && p.iter().zip(q).all(|(m, n)| self.equal(m, n))
    }

    /// Same key set under built-in equality, values equivalent
    fn maps(&self, p: &[(Value, Value)], q: &[(Value, Value)]) -> bool {
        p.len() == q.len()
            && p.iter().all(|(key, value)| {
                q.iter()
                    .find(|(k, _)| k.native_eq(key))
                    .is_some_and(|(_, v)| self.equal(value, v))
            })
    }

    /// Fields the actual side has but the expected side lacks are ignored
    fn instances(&self, actual: &Instance, expected: &Instance) -> bool {
        let fields_match = expected.fields.iter().all(|(key, value)| {
            actual
                .fields
                .get(key)
                .is_some_and(|mine| self.equal(mine, value))
        });
        let backing_match = match (&actual.backing, &expected.backing) {
            (Some(p), Some(q)) => self.equal(&Value::Ref(p.clone()), &Value::Ref(q.clone())),
            _ => true,
        };
        fields_match && backing_match
    }

    fn cursors(&self, actual: &[Value], expected: &[Value]) -> bool {
        if self.sequences(actual, expected) {
            return true;
        }
        self.config.sublist_tolerance
            && (self.contains_run(actual, expected) || self.contains_run(expected, actual))
    }

    /// Whether `run` occurs contiguously in `seq`
    fn contains_run(&self, seq: &[Value], run: &[Value]) -> bool {
        run.is_empty() || seq.windows(run.len()).any(|w| self.sequences(w, run))
    }

    /// Whether `candidate` is the hash of a live object or of its fields
    fn recovers_hash(&self, candidate: i128) -> bool {
        let hit = |h: Option<i64>| h.is_some_and(|h| i128::from(h) == candidate);
        for object in self.refs.objects() {
            if hit(structural_hash(&Value::Ref(object.clone()))) {
                tracing::debug!(candidate, "integer matched an object hash");
                return true;
            }
            let Some(guard) = object.try_borrow() else {
                continue;
            };
            let Some(instance) = guard.as_instance() else {
                continue;
            };
            let fields: Vec<&Value> = instance.fields.values().collect();
            for f1 in &fields {
                if hit(tuple_hash(&[&Value::Null, f1])) || hit(tuple_hash(&[f1, &Value::Null])) {
                    return true;
                }
                for f2 in &fields {
                    let (Some(h1), Some(h2), Some(pair)) =
                        (structural_hash(f1), structural_hash(f2), tuple_hash(&[f1, f2]))
                    else {
                        continue;
                    };
                    if hit(Some(h1)) || hit(Some(h2)) || hit(Some(pair)) {
                        tracing::debug!(candidate, class = %instance.class, "integer matched a field hash");
                        return true;
                    }
                }
            }
        }
        false
    }
}

/// Full element list of a cursor, leaving its position unchanged
fn drain_cursor(object: &ObjRef) -> Option<Vec<Value>> {
    let mut guard = object.try_borrow_mut()?;
    match &mut *guard {
        Object::Cursor(cursor) => Some(cursor.to_list()),
        _ => None,
    }
}
