//! Storage layer for the community REST service.
//!
//! Holds members, profile field groups, profile fields and their meta,
//! the disk-backed avatar store, and the registry of plugin-style
//! extension fields layered onto the profile field resource.

pub mod avatar;
pub mod community;
pub mod config;
pub mod error;
pub mod extension;
pub mod member;
pub mod profile;
pub mod render;
pub mod seed;

pub use community::Community;
pub use error::CommunityError;
