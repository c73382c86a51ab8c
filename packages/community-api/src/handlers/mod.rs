//! HTTP endpoint implementations for member avatars and profile fields.

pub mod avatar_handlers;
pub mod field_handlers;
pub mod options_handlers;
pub mod params;
pub mod request_utils;
pub mod response;

pub use avatar_handlers::{create_avatar, delete_avatar, get_avatar};
pub use field_handlers::{create_field, delete_field, get_field, list_fields, update_field};
pub use options_handlers::options;
pub use response::{error_response, success_response, ApiError, ApiResponse, ErrorResponse};
