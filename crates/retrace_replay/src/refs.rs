//! Identity token to live object table.

use crate::value::ObjRef;
use indexmap::IndexMap;
use retrace_core::IdentityToken;

/// Objects materialized so far in a session, keyed by identity token
#[derive(Debug, Default)]
pub struct ReferenceTable {
    objects: IndexMap<IdentityToken, ObjRef>,
}

impl ReferenceTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Object registered for a token
    #[must_use]
    pub fn get(&self, token: &IdentityToken) -> Option<&ObjRef> {
        self.objects.get(token)
    }

    /// Register an object; a previous entry for the token is replaced
    pub fn insert(&mut self, token: IdentityToken, object: ObjRef) {
        self.objects.insert(token, object);
    }

    /// Whether a token is registered
    #[must_use]
    pub fn contains(&self, token: &IdentityToken) -> bool {
        self.objects.contains_key(token)
    }

    /// All registered objects in registration order
    pub fn objects(&self) -> impl Iterator<Item = &ObjRef> {
        self.objects.values()
    }

    /// Number of tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Forget every object
    pub fn clear(&mut self) {
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Object;

    #[test]
    fn test_insert_and_replace() {
        let mut table = ReferenceTable::new();
        let first = ObjRef::new(Object::List(Vec::new()));
        let second = ObjRef::new(Object::Set(Vec::new()));
        table.insert(IdentityToken::from(7), first.clone());
        assert!(table.get(&IdentityToken::from("7")).unwrap().ptr_eq(&first));
        table.insert(IdentityToken::from(7), second.clone());
        assert!(table.get(&IdentityToken::from(7)).unwrap().ptr_eq(&second));
        assert_eq!(table.len(), 1);
        table.clear();
        assert!(table.is_empty());
    }
}
