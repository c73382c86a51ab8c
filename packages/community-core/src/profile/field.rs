//! Profile field definition and its enumerated attributes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::CommunityError;
use crate::member::Member;

/// Form control type of a profile field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum FieldType {
    Checkbox,
    Datebox,
    Multiselectbox,
    Number,
    Radio,
    Selectbox,
    Telephone,
    Textarea,
    Textbox,
    Url,
    WpBiography,
    WpTextbox,
    /// Child entry of a choice field. Never creatable directly.
    Option,
}

impl FieldType {
    /// Types accepted when creating or updating a field.
    pub const CREATABLE: [FieldType; 12] = [
        FieldType::Checkbox,
        FieldType::Datebox,
        FieldType::Multiselectbox,
        FieldType::Number,
        FieldType::Radio,
        FieldType::Selectbox,
        FieldType::Telephone,
        FieldType::Textarea,
        FieldType::Textbox,
        FieldType::Url,
        FieldType::WpBiography,
        FieldType::WpTextbox,
    ];

    /// Returns the wire name of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Checkbox => "checkbox",
            FieldType::Datebox => "datebox",
            FieldType::Multiselectbox => "multiselectbox",
            FieldType::Number => "number",
            FieldType::Radio => "radio",
            FieldType::Selectbox => "selectbox",
            FieldType::Telephone => "telephone",
            FieldType::Textarea => "textarea",
            FieldType::Textbox => "textbox",
            FieldType::Url => "url",
            FieldType::WpBiography => "wp-biography",
            FieldType::WpTextbox => "wp-textbox",
            FieldType::Option => "option",
        }
    }

    /// Whether the type carries child options.
    pub fn is_choice(self) -> bool {
        matches!(
            self,
            FieldType::Checkbox
                | FieldType::Multiselectbox
                | FieldType::Radio
                | FieldType::Selectbox
        )
    }

    /// Wire names of every creatable type.
    pub fn creatable_names() -> Vec<&'static str> {
        Self::CREATABLE.iter().map(|t| t.as_str()).collect()
    }
}

impl FromStr for FieldType {
    type Err = CommunityError;

    /// Parses a creatable type. `option` and unknown names are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::CREATABLE
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CommunityError::InvalidFieldType {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for FieldType {
    type Error = CommunityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction applied to a choice field's options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum OrderBy {
    #[default]
    Asc,
    Desc,
}

impl OrderBy {
    /// Upper-case wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderBy::Asc => "ASC",
            OrderBy::Desc => "DESC",
        }
    }
}

impl FromStr for OrderBy {
    type Err = CommunityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(OrderBy::Asc),
            "desc" => Ok(OrderBy::Desc),
            other => Err(CommunityError::invalid(
                "order_by",
                format!("'{}' is not one of ASC, DESC", other),
            )),
        }
    }
}

impl TryFrom<String> for OrderBy {
    type Error = CommunityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for OrderBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Access tier gating who may see a field and its member data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum VisibilityLevel {
    #[default]
    Public,
    LoggedIn,
    Friends,
    AdminsOnly,
}

impl VisibilityLevel {
    pub const ALL: [VisibilityLevel; 4] = [
        VisibilityLevel::Public,
        VisibilityLevel::LoggedIn,
        VisibilityLevel::Friends,
        VisibilityLevel::AdminsOnly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VisibilityLevel::Public => "public",
            VisibilityLevel::LoggedIn => "loggedin",
            VisibilityLevel::Friends => "friends",
            VisibilityLevel::AdminsOnly => "adminsonly",
        }
    }

    /// Whether `viewer` may see something at this level.
    ///
    /// `owner` is the member whose data is being looked at; it is `None`
    /// for field definitions. There is no friendship graph, so `friends`
    /// only admits the owner and moderators.
    pub fn permits(self, viewer: Option<&Member>, owner: Option<u64>) -> bool {
        match self {
            VisibilityLevel::Public => true,
            VisibilityLevel::LoggedIn => viewer.is_some(),
            VisibilityLevel::Friends | VisibilityLevel::AdminsOnly => viewer
                .map(|v| v.can_moderate() || Some(v.id) == owner)
                .unwrap_or(false),
        }
    }
}

impl FromStr for VisibilityLevel {
    type Err = CommunityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s.trim())
            .ok_or_else(|| {
                CommunityError::invalid(
                    "visibility_level",
                    format!("'{}' is not one of public, loggedin, friends, adminsonly", s),
                )
            })
    }
}

impl TryFrom<String> for VisibilityLevel {
    type Error = CommunityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for VisibilityLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A stored profile field definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileField {
    pub id: u64,
    pub group_id: u64,
    /// Owning choice field for options, 0 for top-level fields
    pub parent_id: u64,
    pub field_type: FieldType,
    pub name: String,
    /// Raw description as entered
    pub description: String,
    pub is_required: bool,
    pub can_delete: bool,
    pub field_order: u32,
    pub option_order: u32,
    pub order_by: OrderBy,
    pub is_default_option: bool,
    pub visibility_level: VisibilityLevel,
}

impl ProfileField {
    /// Applies every scalar attribute present in `changes`.
    ///
    /// Options are handled by the store since they are separate rows.
    pub(crate) fn apply(&mut self, changes: &FieldChanges) {
        if let Some(group_id) = changes.group_id {
            self.group_id = group_id;
        }
        if let Some(parent_id) = changes.parent_id {
            self.parent_id = parent_id;
        }
        if let Some(field_type) = changes.field_type {
            self.field_type = field_type;
        }
        if let Some(name) = &changes.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = &changes.description {
            self.description = description.clone();
        }
        if let Some(is_required) = changes.is_required {
            self.is_required = is_required;
        }
        if let Some(can_delete) = changes.can_delete {
            self.can_delete = can_delete;
        }
        if let Some(field_order) = changes.field_order {
            self.field_order = field_order;
        }
        if let Some(option_order) = changes.option_order {
            self.option_order = option_order;
        }
        if let Some(order_by) = changes.order_by {
            self.order_by = order_by;
        }
        if let Some(is_default_option) = changes.is_default_option {
            self.is_default_option = is_default_option;
        }
        if let Some(visibility_level) = changes.visibility_level {
            self.visibility_level = visibility_level;
        }
    }
}

/// Attributes of a field to create.
#[derive(Debug, Clone, Deserialize)]
pub struct NewField {
    pub group_id: u64,
    #[serde(default)]
    pub parent_id: u64,
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
    pub option_order: u32,
    #[serde(default)]
    pub order_by: OrderBy,
    #[serde(default)]
    pub is_default_option: bool,
    #[serde(default)]
    pub visibility_level: VisibilityLevel,
    #[serde(default)]
    pub options: Vec<NewOption>,
}

impl NewField {
    /// Creates a field description with default attributes.
    pub fn new(group_id: u64, field_type: FieldType, name: impl Into<String>) -> Self {
        Self {
            group_id,
            parent_id: 0,
            field_type,
            name: name.into(),
            description: String::new(),
            is_required: false,
            can_delete: true,
            field_order: 0,
            option_order: 0,
            order_by: OrderBy::Asc,
            is_default_option: false,
            visibility_level: VisibilityLevel::Public,
            options: Vec::new(),
        }
    }
}

/// One option of a choice field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewOption {
    pub name: String,
    #[serde(default)]
    pub is_default_option: bool,
}

impl NewOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_default_option: false,
        }
    }
}

/// Partial update of a field. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct FieldChanges {
    pub group_id: Option<u64>,
    pub parent_id: Option<u64>,
    pub field_type: Option<FieldType>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_required: Option<bool>,
    pub can_delete: Option<bool>,
    pub field_order: Option<u32>,
    pub option_order: Option<u32>,
    pub order_by: Option<OrderBy>,
    pub is_default_option: Option<bool>,
    pub visibility_level: Option<VisibilityLevel>,
    /// Replaces every option of a choice field when present
    pub options: Option<Vec<NewOption>>,
}

/// Filters for listing top-level fields.
#[derive(Debug, Clone, Default)]
pub struct FieldQuery {
    /// Only fields of these groups
    pub include_groups: Option<Vec<u64>>,
    /// Never fields of these groups
    pub exclude_groups: Vec<u64>,
    /// Never these fields
    pub exclude_fields: Vec<u64>,
    /// Only fields of this group
    pub profile_group_id: Option<u64>,
}

impl FieldQuery {
    pub(crate) fn matches(&self, field: &ProfileField) -> bool {
        if let Some(groups) = &self.include_groups {
            if !groups.contains(&field.group_id) {
                return false;
            }
        }
        if let Some(group_id) = self.profile_group_id {
            if field.group_id != group_id {
                return false;
            }
        }
        !self.exclude_groups.contains(&field.group_id) && !self.exclude_fields.contains(&field.id)
    }
}

fn default_true() -> bool {
    true
}
