//! Class-level field store.
//!
//! Statics belong to the session, not to a process-wide global, so two
//! sessions never observe each other's writes.

use crate::value::Value;
use indexmap::IndexMap;
use retrace_core::FieldKey;

/// Static field values per destination class
#[derive(Debug, Default)]
pub struct StaticStore {
    classes: IndexMap<String, IndexMap<FieldKey, Value>>,
}

impl StaticStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a static field of a class
    pub fn set(&mut self, class: impl Into<String>, key: FieldKey, value: Value) {
        self.classes.entry(class.into()).or_default().insert(key, value);
    }

    /// Static field by exact key
    #[must_use]
    pub fn get(&self, class: &str, key: &FieldKey) -> Option<&Value> {
        self.classes.get(class)?.get(key)
    }

    /// Static field by name, preferring the one the class declares itself
    #[must_use]
    pub fn get_named(&self, class: &str, name: &str) -> Option<&Value> {
        let fields = self.classes.get(class)?;
        fields
            .get(&FieldKey::new(class, name))
            .or_else(|| fields.iter().find(|(k, _)| k.name == name).map(|(_, v)| v))
    }

    /// Fields of one class
    pub fn fields(&self, class: &str) -> impl Iterator<Item = (&FieldKey, &Value)> {
        self.classes.get(class).into_iter().flat_map(|fields| fields.iter())
    }

    /// Number of classes with statics
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Forget every static
    pub fn clear(&mut self) {
        self.classes.clear();
    }
}
