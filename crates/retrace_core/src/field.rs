//! Field addressing for reconstructed objects.
//!
//! A class hierarchy may declare the same field name more than once. Keying
//! every field by its declaring type keeps shadowed fields apart without any
//! name mangling.

use serde::{Deserialize, Serialize};

/// Declared visibility of a recorded field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible only inside the declaring type
    Private,
    /// Visible to subtypes
    Protected,
    /// Visible everywhere
    #[default]
    Public,
}

impl Visibility {
    /// Parse the recorder's modifier text, e.g. `"private static final"`
    #[must_use]
    pub fn from_modifier(text: &str) -> Self {
        if text.contains("private") {
            Self::Private
        } else if text.contains("protected") {
            Self::Protected
        } else {
            Self::Public
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Protected => write!(f, "protected"),
            Self::Public => write!(f, "public"),
        }
    }
}

/// (declaring-type, field-name) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    /// Destination type that declares the field
    pub declaring: String,
    /// Field name
    pub name: String,
}

impl FieldKey {
    /// Create a new field key
    #[must_use]
    pub fn new(declaring: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring: declaring.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.declaring, self.name)
    }
}
