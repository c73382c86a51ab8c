//! Site configuration.

use std::path::PathBuf;

/// Bytes allowed on top of an avatar file for multipart headers and boundaries.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Feature toggles an administrator flips for the whole site.
///
/// These travel with every request through the request context rather than
/// being read from global state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteSettings {
    /// Anonymous visitors may not read community resources
    pub community_visibility_private: bool,
    /// Members may not upload avatars
    pub avatar_uploads_disabled: bool,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// REST namespace (first path segment)
    pub namespace: String,
    /// REST version (second path segment)
    pub version: String,
    /// Path segment of the profile component
    pub profile_component: String,
    /// Public base URL used to build avatar URLs
    pub base_url: String,
    /// Data directory holding uploaded avatars
    pub data_dir: PathBuf,
    /// Feature toggles
    pub settings: SiteSettings,
    /// Request body read timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Largest request body accepted outside avatar uploads, in bytes
    pub max_body_size: usize,
    /// Width and height of the full avatar rendition in pixels
    pub avatar_full_size: u32,
    /// Width and height of the thumbnail avatar rendition in pixels
    pub avatar_thumb_size: u32,
    /// Maximum accepted avatar upload in bytes
    pub avatar_max_filesize: usize,
}

impl SiteConfig {
    /// Path prefix shared by every route, e.g. `/buddypress/v1`.
    pub fn route_prefix(&self) -> String {
        format!("/{}/{}", self.namespace, self.version)
    }

    /// Largest request body accepted by the avatar upload route: the file
    /// limit plus room for the multipart envelope.
    pub fn max_upload_body_size(&self) -> usize {
        self.avatar_max_filesize.saturating_add(MULTIPART_OVERHEAD)
    }

    /// Directory holding per-member avatar directories.
    pub fn avatar_dir(&self) -> PathBuf {
        self.data_dir.join("avatars")
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            namespace: "buddypress".to_string(),
            version: "v1".to_string(),
            profile_component: "xprofile".to_string(),
            base_url: "http://localhost:8080/uploads".to_string(),
            data_dir: PathBuf::from("./data"),
            settings: SiteSettings::default(),
            request_timeout_ms: 5000,
            max_body_size: 1_048_576,
            avatar_full_size: 150,
            avatar_thumb_size: 50,
            avatar_max_filesize: 5_120_000,
        }
    }
}
