//! Profile field group definition.

use serde::{Deserialize, Serialize};

/// Named, ordered container of profile fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldGroup {
    /// Group id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Raw description
    pub description: String,
    /// Display order among groups
    pub group_order: u32,
    /// Whether the group may be removed
    pub can_delete: bool,
}

/// Attributes of a group to create.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFieldGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub group_order: u32,
    #[serde(default = "default_true")]
    pub can_delete: bool,
}

impl NewFieldGroup {
    /// Creates a deletable group with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            group_order: 0,
            can_delete: true,
        }
    }
}

fn default_true() -> bool {
    true
}
