//! Per-test-case replay context.
//!
//! Generated test code drives everything through one [`ReplaySession`]:
//! materialize inputs, run the destination code, compare results and
//! statics, then [`ReplaySession::reset`] before the next case.

use crate::equiv::{Checker, CheckerConfig};
use crate::materialize::Materializer;
use crate::refs::ReferenceTable;
use crate::registry::TypeRegistry;
use crate::snapshot::{StaticFieldDiffs, ValueSnapshot};
use crate::statics::StaticStore;
use crate::value::Value;
use retrace_core::CoreResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Session configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Equivalence tolerances and fallbacks
    #[serde(flatten)]
    pub equivalence: CheckerConfig,
}

impl SessionConfig {
    /// Default configuration
    #[must_use]
    pub const fn new() -> Self {
        Self {
            equivalence: CheckerConfig::new(),
        }
    }

    /// Replace the equivalence settings
    #[must_use]
    pub const fn with_equivalence(mut self, equivalence: CheckerConfig) -> Self {
        self.equivalence = equivalence;
        self
    }
}

/// Reference table, statics and registry for one test case
#[derive(Debug)]
pub struct ReplaySession {
    registry: Arc<TypeRegistry>,
    refs: ReferenceTable,
    statics: StaticStore,
    config: SessionConfig,
}

impl ReplaySession {
    /// Fresh session over a registry
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            refs: ReferenceTable::new(),
            statics: StaticStore::new(),
            config: SessionConfig::default(),
        }
    }

    /// Set the configuration
    #[must_use]
    pub const fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Type registry
    #[must_use]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Objects materialized so far
    #[must_use]
    pub const fn refs(&self) -> &ReferenceTable {
        &self.refs
    }

    /// Static field store
    #[must_use]
    pub const fn statics(&self) -> &StaticStore {
        &self.statics
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn materializer(&mut self) -> Materializer<'_> {
        Materializer::new(&self.registry, &mut self.refs, &mut self.statics)
    }

    /// Rebuild a snapshot as a live value.
    ///
    /// With `force_new` the value and everything inside it are fresh
    /// objects that are not registered under their tokens.
    ///
    /// # Errors
    ///
    /// Returns error if a type is unregistered or required data is missing
    pub fn materialize(&mut self, snap: &ValueSnapshot, force_new: bool) -> CoreResult<Value> {
        self.materializer().materialize(snap, force_new)
    }

    /// Rebuild a snapshot given as JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a snapshot or cannot be materialized
    pub fn materialize_json(&mut self, raw: &str, force_new: bool) -> CoreResult<Value> {
        let snap = ValueSnapshot::from_json(raw)?;
        self.materialize(&snap, force_new)
    }

    /// Overwrite the fields of an existing value from a snapshot
    ///
    /// # Errors
    ///
    /// Returns error if a field value cannot be materialized
    pub fn set_instance_fields(&mut self, target: &Value, snap: &ValueSnapshot) -> CoreResult<()> {
        self.materializer().set_instance_fields(target, snap)
    }

    /// Apply recorded static field changes
    ///
    /// # Errors
    ///
    /// Returns error if a new value cannot be materialized
    pub fn update_static_fields(&mut self, diffs: &StaticFieldDiffs) -> CoreResult<()> {
        self.materializer().update_static_fields(diffs)
    }

    /// Current static field of an origin class, by name
    #[must_use]
    pub fn static_field(&self, origin_class: &str, name: &str) -> Option<&Value> {
        let class = self.registry.resolve(origin_class).ok()?.name;
        self.statics.get_named(&class, name)
    }

    /// Whether the live statics match recorded static field values.
    ///
    /// Fields never assigned compare as null. Classes that are not
    /// registered are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if an expected value cannot be materialized
    pub fn static_fields_match(&mut self, diffs: &StaticFieldDiffs) -> CoreResult<bool> {
        let mut pairs = Vec::new();
        for (origin, field, entry) in diffs.entries() {
            let mut materializer = self.materializer();
            let Some(class) = materializer.static_class(origin) else {
                tracing::warn!(class = origin, field, "static check for unregistered class");
                continue;
            };
            let key = materializer.field_key(
                &class,
                field,
                entry.modifier.as_deref(),
                entry.declaring_class.as_deref(),
            );
            let expected = materializer.materialize(&entry.details, true)?;
            let current = self.statics.get(&class, &key).cloned().unwrap_or(Value::Null);
            pairs.push((current, expected));
        }
        Ok(pairs.iter().all(|(current, expected)| self.equal(current, expected)))
    }

    /// Whether `actual` is equivalent to `expected`
    #[must_use]
    pub fn equal(&self, actual: &Value, expected: &Value) -> bool {
        Checker::new(&self.registry, &self.refs)
            .with_config(self.config.equivalence)
            .equal(actual, expected)
    }

    /// Forget every object and static, ready for the next test case
    pub fn reset(&mut self) {
        tracing::debug!(objects = self.refs.len(), classes = self.statics.class_count(), "session reset");
        self.refs.clear();
        self.statics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ClassDef, ClassForm};
    use crate::value::Object;

    fn session() -> ReplaySession {
        let mut registry = TypeRegistry::new();
        registry.register_class("src.main.org.acme.Config", ClassDef::new("Config"));
        registry.register_class(
            "src.main.org.acme.Level",
            ClassDef::new("Level").with_form(ClassForm::Enum),
        );
        ReplaySession::new(Arc::new(registry))
    }

    fn ints(items: &[i128]) -> Value {
        Value::list(items.iter().copied().map(Value::Int).collect())
    }

    const SNAPSHOTS: [&str; 8] = [
        r#"{"type":"int","value":"7"}"#,
        r#"{"type":"java.lang.String","value":"text"}"#,
        r#"{"type":"java.util.ArrayList","memory_address":1,"collection_elements":[{"type":"int","value":"1"},{"type":"int","value":"2"}]}"#,
        r#"{"type":"java.util.HashMap","memory_address":2,"keys":[{"type":"java.lang.String","value":"k"}],"values":[{"type":"double","value":"1.5"}]}"#,
        r#"{"type":"java.util.HashSet","collection_elements":[{"type":"int","value":"3"}]}"#,
        r#"{"type":"java.time.Duration","seconds":"4","nanos":"0"}"#,
        r#"{"type":"src.main.org.acme.Config","memory_address":3,"instance_fields":{"name":{"modifier":"private","declaring_class":"src.main.org.acme.Config","type":"java.lang.String","value":"a"}}}"#,
        r#"{"type":"src.main.org.acme.Level","enum_name":"HIGH","memory_address":4}"#,
    ];

    #[test]
    fn test_same_token_is_same_object() {
        let mut s = session();
        let first = s
            .materialize_json(r#"{"type":"java.util.ArrayList","memory_address":42,"collection_elements":[]}"#, false)
            .unwrap();
        let second = s
            .materialize_json(
                r#"{"type":"java.util.ArrayList","memory_address":42,"collection_elements":[{"type":"int","value":"9"}]}"#,
                false,
            )
            .unwrap();
        assert!(first.as_obj().unwrap().ptr_eq(second.as_obj().unwrap()));
        assert!(s.equal(&first, &ints(&[9])));
    }

    #[test]
    fn test_reflexive_and_fresh_copies_equal() {
        let mut s = session();
        for raw in SNAPSHOTS {
            let a = s.materialize_json(raw, true).unwrap();
            let b = s.materialize_json(raw, true).unwrap();
            assert!(s.equal(&a, &a), "not reflexive: {raw}");
            assert!(s.equal(&a, &b), "fresh copies differ: {raw}");
        }
    }

    #[test]
    fn test_duration_tolerance() {
        let mut s = session();
        let base = s
            .materialize_json(r#"{"type":"java.time.Duration","seconds":"1","nanos":"0"}"#, true)
            .unwrap();
        let close = s
            .materialize_json(r#"{"type":"java.time.Duration","seconds":"1","nanos":"500"}"#, true)
            .unwrap();
        let far = s
            .materialize_json(r#"{"type":"java.time.Duration","seconds":"2","nanos":"500000000"}"#, true)
            .unwrap();
        assert!(s.equal(&base, &close));
        assert!(!s.equal(&base, &far));
    }

    #[test]
    fn test_opposite_extreme_durations_differ() {
        let mut s = session();
        let pos = s
            .materialize_json(r#"{"type":"java.time.Duration","seconds":"9000000000000000","nanos":"0"}"#, true)
            .unwrap();
        let neg = s
            .materialize_json(r#"{"type":"java.time.Duration","seconds":"-9000000000000000","nanos":"0"}"#, true)
            .unwrap();
        assert!(!s.equal(&pos, &neg));
        assert!(!s.equal(&neg, &pos));
        assert!(s.equal(&pos, &pos));
    }

    #[test]
    fn test_exception_supertype_matches() {
        let mut s = session();
        let narrow = s
            .materialize_json(
                r#"{"type":"java.lang.Throwable","throwable_type":"java.io.FileNotFoundException","message":"missing a.txt"}"#,
                true,
            )
            .unwrap();
        let broad = s
            .materialize_json(
                r#"{"type":"java.lang.Throwable","throwable_type":"java.io.IOException","message":"something else"}"#,
                true,
            )
            .unwrap();
        assert!(s.equal(&narrow, &broad));
        assert!(s.equal(&broad, &narrow));
    }

    #[test]
    fn test_in_place_update_seen_by_all_holders() {
        let mut s = session();
        let list = s
            .materialize_json(r#"{"type":"java.util.ArrayList","memory_address":77,"collection_elements":[]}"#, false)
            .unwrap();
        let holder = Value::list(vec![list.clone()]);
        s.materialize_json(
            r#"{"type":"java.util.ArrayList","memory_address":77,"collection_elements":[
                {"type":"int","value":"1"},{"type":"int","value":"2"},{"type":"int","value":"3"}]}"#,
            false,
        )
        .unwrap();
        assert!(s.equal(&list, &ints(&[1, 2, 3])));
        match &*holder.as_obj().unwrap().borrow() {
            Object::List(items) => assert!(s.equal(&items[0], &ints(&[1, 2, 3]))),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_statics_update_and_match() {
        let mut s = session();
        let diffs = StaticFieldDiffs::from_json(
            r#"[{"src.main.org.acme.Config":[{"limit":{"modifier":"public static","details":{"type":"int","value":"10"}}}]}]"#,
        )
        .unwrap();
        assert!(!s.static_fields_match(&diffs).unwrap());
        s.update_static_fields(&diffs).unwrap();
        assert!(s.static_field("src.main.org.acme.Config", "limit").unwrap().native_eq(&Value::Int(10)));
        assert!(s.static_fields_match(&diffs).unwrap());

        s.reset();
        assert!(s.refs().is_empty());
        assert_eq!(s.statics().class_count(), 0);
    }

    #[test]
    fn test_set_instance_fields() {
        let mut s = session();
        let config = s.materialize_json(SNAPSHOTS[6], false).unwrap();
        let update = ValueSnapshot::from_json(
            r#"{"type":"src.main.org.acme.Config","instance_fields":{"name":{"modifier":"private","declaring_class":"src.main.org.acme.Config","type":"java.lang.String","value":"b"}}}"#,
        )
        .unwrap();
        s.set_instance_fields(&config, &update).unwrap();
        let borrowed = config.as_obj().unwrap().borrow();
        let name = borrowed.as_instance().unwrap().field("name").unwrap();
        assert!(name.native_eq(&Value::str("b")));
    }

    #[test]
    fn test_config_disables_fallbacks() {
        let s = session().with_config(
            SessionConfig::new().with_equivalence(CheckerConfig::new().with_duration_tolerance_micros(0)),
        );
        assert_eq!(s.config().equivalence.duration_tolerance_micros, 0);
        let parsed: SessionConfig = serde_json::from_str(r#"{"sublist_tolerance":false}"#).unwrap();
        assert!(!parsed.equivalence.sublist_tolerance);
        assert!(parsed.equivalence.hash_recovery);
    }
}
