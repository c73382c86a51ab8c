//! Disk-backed member avatars.
//!
//! An avatar is not a record of its own: it is the pair of files found in
//! `<data_dir>/avatars/<member_id>/`, named `<hash>-bpfull.<ext>` and
//! `<hash>-bpthumb.<ext>`. Uploading replaces both files, deleting removes
//! the directory's avatar files. The uploaded image is stored as-is for
//! both renditions.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::config::SiteConfig;
use crate::error::CommunityError;
use crate::render::html_escape;

const FULL_SUFFIX: &str = "-bpfull";
const THUMB_SUFFIX: &str = "-bpthumb";
const ACCEPTED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// URLs (or HTML fragments) of a member's two avatar renditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvatarUrls {
    pub full: String,
    pub thumb: String,
}

/// Avatar rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarKind {
    Full,
    Thumb,
}

impl AvatarKind {
    fn suffix(self) -> &'static str {
        match self {
            AvatarKind::Full => FULL_SUFFIX,
            AvatarKind::Thumb => THUMB_SUFFIX,
        }
    }

    fn css(self) -> &'static str {
        match self {
            AvatarKind::Full => "full",
            AvatarKind::Thumb => "thumb",
        }
    }
}

/// An uploaded image file.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    /// Client-supplied file name
    pub file_name: String,
    /// Client-supplied MIME type, if any
    pub content_type: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

impl AvatarUpload {
    /// Lowercase extension of the client file name.
    fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Stores and resolves member avatars under a root directory.
#[derive(Debug, Clone)]
pub struct AvatarStore {
    root: PathBuf,
    base_url: String,
    full_size: u32,
    thumb_size: u32,
    max_filesize: usize,
    /// Held across every change to the avatar directories
    writer: Arc<Mutex<()>>,
}

impl AvatarStore {
    /// Creates a store rooted at the configured avatar directory.
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            root: config.avatar_dir(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            full_size: config.avatar_full_size,
            thumb_size: config.avatar_thumb_size,
            max_filesize: config.avatar_max_filesize,
            writer: Arc::new(Mutex::new(())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, CommunityError> {
        self.writer.lock().map_err(|_| CommunityError::LockPoisoned)
    }

    fn member_dir(&self, member_id: u64) -> PathBuf {
        self.root.join(member_id.to_string())
    }

    fn url_for(&self, member_id: u64, file_name: &str) -> String {
        format!("{}/avatars/{}/{}", self.base_url, member_id, file_name)
    }

    /// Avatar shown when a member never uploaded one.
    pub fn default_avatar(&self) -> AvatarUrls {
        AvatarUrls {
            full: format!("{}/avatars/default/mystery-man.jpg", self.base_url),
            thumb: format!("{}/avatars/default/mystery-man-50.jpg", self.base_url),
        }
    }

    /// Names of every avatar rendition file in the member's directory, sorted.
    fn avatar_files(&self, member_id: u64) -> Result<Vec<String>, CommunityError> {
        let entries = match fs::read_dir(self.member_dir(member_id)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CommunityError::io("reading avatar directory", e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CommunityError::io("reading avatar directory", e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if rendition_hash(&name, FULL_SUFFIX).is_some()
                || rendition_hash(&name, THUMB_SUFFIX).is_some()
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Files of the member's uploaded avatar, as (full, thumb) names of the
    /// same upload.
    fn uploaded_files(&self, member_id: u64) -> Result<Option<(String, String)>, CommunityError> {
        let names = self.avatar_files(member_id)?;
        for full in &names {
            let Some(hash) = rendition_hash(full, FULL_SUFFIX) else {
                continue;
            };
            let thumb = names
                .iter()
                .find(|n| rendition_hash(n, THUMB_SUFFIX) == Some(hash));
            if let Some(thumb) = thumb {
                return Ok(Some((full.clone(), thumb.clone())));
            }
        }
        Ok(None)
    }

    /// Returns the uploaded avatar of a member, if there is one.
    pub fn uploaded(&self, member_id: u64) -> Result<Option<AvatarUrls>, CommunityError> {
        Ok(self
            .uploaded_files(member_id)?
            .map(|(full, thumb)| AvatarUrls {
                full: self.url_for(member_id, &full),
                thumb: self.url_for(member_id, &thumb),
            }))
    }

    /// Returns the uploaded avatar of a member, falling back to the default.
    pub fn fetch(&self, member_id: u64) -> Result<AvatarUrls, CommunityError> {
        Ok(self
            .uploaded(member_id)?
            .unwrap_or_else(|| self.default_avatar()))
    }

    /// Validates an upload against the size limit and accepted types.
    pub fn validate(&self, upload: &AvatarUpload) -> Result<String, CommunityError> {
        if upload.bytes.is_empty() {
            return Err(CommunityError::MissingAvatarFile);
        }
        if upload.bytes.len() > self.max_filesize {
            return Err(CommunityError::AvatarTooLarge {
                size: upload.bytes.len(),
                limit: self.max_filesize,
            });
        }
        let unsupported = || CommunityError::UnsupportedImageType {
            file_name: upload.file_name.clone(),
        };
        let extension = upload
            .extension()
            .filter(|e| ACCEPTED_EXTENSIONS.contains(&e.as_str()))
            .ok_or_else(unsupported)?;
        if let Some(content_type) = &upload.content_type {
            if !content_type.starts_with("image/") {
                return Err(unsupported());
            }
        }
        Ok(extension)
    }

    /// Stores an upload as the member's avatar, replacing any previous one.
    pub fn store(&self, member_id: u64, upload: &AvatarUpload) -> Result<AvatarUrls, CommunityError> {
        let extension = self.validate(upload)?;
        let _writer = self.lock()?;

        let dir = self.member_dir(member_id);
        fs::create_dir_all(&dir).map_err(|e| CommunityError::io("creating avatar directory", e))?;
        self.remove_files(member_id)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&member_id.to_le_bytes());
        hasher.update(&upload.bytes);
        let hash = format!("{:08x}", hasher.finalize());

        for kind in [AvatarKind::Full, AvatarKind::Thumb] {
            let name = format!("{}{}.{}", hash, kind.suffix(), extension);
            fs::write(dir.join(&name), &upload.bytes)
                .map_err(|e| CommunityError::io("writing avatar file", e))?;
        }

        tracing::info!(
            "Stored avatar for member {} ({} bytes)",
            member_id,
            upload.bytes.len()
        );
        self.uploaded(member_id)?
            .ok_or_else(|| CommunityError::IoError("avatar files vanished after upload".to_string()))
    }

    /// Removes the member's uploaded avatar, returning what was removed.
    pub fn delete(&self, member_id: u64) -> Result<AvatarUrls, CommunityError> {
        let _writer = self.lock()?;
        let previous = self
            .uploaded(member_id)?
            .ok_or(CommunityError::NoUploadedAvatar { member_id })?;
        self.remove_files(member_id)?;
        tracing::info!("Deleted avatar of member {}", member_id);
        Ok(previous)
    }

    /// Removes every rendition file of the member, not just the current pair.
    fn remove_files(&self, member_id: u64) -> Result<(), CommunityError> {
        let dir = self.member_dir(member_id);
        for name in self.avatar_files(member_id)? {
            match fs::remove_file(dir.join(&name)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(CommunityError::io("removing avatar file", e)),
            }
        }
        Ok(())
    }

    /// Wraps an avatar URL in an `<img>` tag sized for its rendition.
    pub fn img_tag(&self, url: &str, kind: AvatarKind, member_id: u64, alt: &str) -> String {
        let size = match kind {
            AvatarKind::Full => self.full_size,
            AvatarKind::Thumb => self.thumb_size,
        };
        format!(
            "<img src=\"{}\" class=\"avatar user-{}-avatar avatar-{} {} photo\" width=\"{}\" height=\"{}\" alt=\"{}\" />",
            html_escape(url),
            member_id,
            size,
            kind.css(),
            size,
            size,
            html_escape(alt)
        )
    }

    /// Converts both URLs of an avatar to `<img>` fragments.
    pub fn to_html(&self, urls: &AvatarUrls, member_id: u64, alt: &str) -> AvatarUrls {
        AvatarUrls {
            full: self.img_tag(&urls.full, AvatarKind::Full, member_id, alt),
            thumb: self.img_tag(&urls.thumb, AvatarKind::Thumb, member_id, alt),
        }
    }
}

/// Hash part of `<hash><suffix>.<ext>`, if `name` is a rendition of that kind.
fn rendition_hash<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    stem.strip_suffix(suffix)
}
