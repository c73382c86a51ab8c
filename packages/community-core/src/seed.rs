//! Seed files: members and profile field groups loaded at startup.
//!
//! ```json
//! {
//!   "members": [{ "name": "Admin", "role": "administrator", "token": "s3cret" }],
//!   "groups": [{
//!     "name": "Base",
//!     "fields": [{ "type": "textbox", "name": "Name", "can_delete": false }]
//!   }]
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::community::Community;
use crate::error::CommunityError;
use crate::member::{Member, Role};
use crate::profile::{FieldType, NewField, NewFieldGroup, NewOption, OrderBy, VisibilityLevel};

/// Seed file contents.
#[derive(Debug, Deserialize, Default)]
pub struct SeedFile {
    #[serde(default)]
    pub members: Vec<SeedMember>,
    #[serde(default)]
    pub groups: Vec<SeedGroup>,
}

/// A member to register.
#[derive(Debug, Deserialize)]
pub struct SeedMember {
    pub name: String,
    pub role: Role,
    /// Generated when absent
    #[serde(default)]
    pub token: Option<String>,
}

/// A group and the fields it holds.
#[derive(Debug, Deserialize)]
pub struct SeedGroup {
    #[serde(flatten)]
    pub group: NewFieldGroup,
    #[serde(default)]
    pub fields: Vec<SeedField>,
}

/// A field inside a seed group; the group id is assigned while seeding.
#[derive(Debug, Deserialize)]
pub struct SeedField {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default = "default_true")]
    pub can_delete: bool,
    #[serde(default)]
    pub field_order: u32,
    #[serde(default)]
    pub order_by: OrderBy,
    #[serde(default)]
    pub visibility_level: VisibilityLevel,
    #[serde(default)]
    pub options: Vec<NewOption>,
}

impl SeedField {
    fn into_new_field(self, group_id: u64) -> NewField {
        NewField {
            description: self.description,
            is_required: self.is_required,
            can_delete: self.can_delete,
            field_order: self.field_order,
            order_by: self.order_by,
            visibility_level: self.visibility_level,
            options: self.options,
            ..NewField::new(group_id, self.field_type, self.name)
        }
    }
}

/// What a seed run created.
#[derive(Debug, Default)]
pub struct SeedSummary {
    pub members: Vec<Member>,
    pub groups: usize,
    pub fields: usize,
}

impl SeedFile {
    /// Reads and parses a seed file.
    pub fn load(path: &Path) -> Result<Self, CommunityError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CommunityError::SeedError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&contents)
    }

    /// Parses seed JSON.
    pub fn parse(contents: &str) -> Result<Self, CommunityError> {
        serde_json::from_str(contents)
            .map_err(|e| CommunityError::SeedError(format!("invalid seed file: {}", e)))
    }

    /// Registers every member, group and field into `community`.
    pub fn apply(self, community: &Community) -> Result<SeedSummary, CommunityError> {
        let mut summary = SeedSummary::default();

        for member in self.members {
            summary
                .members
                .push(community.add_member(member.name, member.role, member.token)?);
        }

        for seed_group in self.groups {
            let group = community.create_group(seed_group.group)?;
            summary.groups += 1;
            for field in seed_group.fields {
                community.create_field(field.into_new_field(group.id))?;
                summary.fields += 1;
            }
        }

        tracing::info!(
            "Seeded {} members, {} groups, {} fields",
            summary.members.len(),
            summary.groups,
            summary.fields
        );
        Ok(summary)
    }
}

fn default_true() -> bool {
    true
}
