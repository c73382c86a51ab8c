//! Profile field groups and profile field definitions.

pub mod field;
pub mod group;

pub use field::{
    FieldChanges, FieldQuery, FieldType, NewField, NewOption, OrderBy, ProfileField,
    VisibilityLevel,
};
pub use group::{FieldGroup, NewFieldGroup};
