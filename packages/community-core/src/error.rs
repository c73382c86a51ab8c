//! Community storage error types.

use thiserror::Error;

/// Errors raised by the member, profile and avatar stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommunityError {
    /// Member id does not resolve to a registered member
    #[error("Member {id} not found")]
    MemberNotFound { id: u64 },

    /// Profile field not found
    #[error("Profile field {id} not found")]
    FieldNotFound { id: u64 },

    /// Profile field group not found
    #[error("Profile field group {id} not found")]
    FieldGroupNotFound { id: u64 },

    /// Field type outside the allowed set
    #[error("'{value}' is not a valid profile field type")]
    InvalidFieldType { value: String },

    /// A supplied attribute failed validation
    #[error("Invalid value for '{param}': {message}")]
    InvalidValue { param: String, message: String },

    /// Field is flagged as non-deletable
    #[error("Profile field {id} cannot be deleted")]
    FieldNotDeletable { id: u64 },

    /// Field, its options or its meta changed since they were read
    #[error("Profile field {id} changed while the request was in progress")]
    FieldChanged { id: u64 },

    /// Upload carried no image bytes
    #[error("No image file was provided")]
    MissingAvatarFile,

    /// Upload exceeds the configured size limit
    #[error("Avatar file is {size} bytes, the limit is {limit} bytes")]
    AvatarTooLarge { size: usize, limit: usize },

    /// Upload is not one of the accepted image types
    #[error("'{file_name}' is not an accepted image type (jpg, jpeg, png, gif)")]
    UnsupportedImageType { file_name: String },

    /// Member has no uploaded avatar to remove
    #[error("Member {member_id} has no uploaded avatar")]
    NoUploadedAvatar { member_id: u64 },

    /// Extension field name registered twice
    #[error("Extension field '{name}' is already registered")]
    ExtensionAlreadyRegistered { name: String },

    /// API token collides with an existing member's token
    #[error("API token is already assigned to member {member_id}")]
    DuplicateToken { member_id: u64 },

    /// Lock poisoned (RwLock poisoned)
    #[error("Lock poisoned")]
    LockPoisoned,

    /// I/O error in the avatar store
    #[error("I/O error: {0}")]
    IoError(String),

    /// Seed file could not be read or applied
    #[error("Seed error: {0}")]
    SeedError(String),
}

impl CommunityError {
    pub(crate) fn io(context: &str, error: std::io::Error) -> Self {
        CommunityError::IoError(format!("{}: {}", context, error))
    }

    pub(crate) fn invalid(param: &str, message: impl Into<String>) -> Self {
        CommunityError::InvalidValue {
            param: param.to_string(),
            message: message.into(),
        }
    }
}
