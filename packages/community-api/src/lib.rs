//! REST API for member avatars and profile fields.
//!
//! Provides route registration, per-request authentication context,
//! handlers for the avatar and profile field resources, OPTIONS schemas,
//! and the hyper server loop.

pub mod context;
pub mod handlers;
pub mod router;
pub mod schema;
pub mod server;
