//! Persistence for uploaded images and synthesized speech.
//!
//! [`MediaStore`] writes files under a static root that the web layer serves
//! at `/static`. Images land in `uploads/images/`, audio in `audio/`.
//! Directories are created on first write.

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DEFAULT_MAX_UPLOAD_BYTES;

/// URL prefix the static root is mounted under.
pub const STATIC_PREFIX: &str = "/static";

const IMAGE_DIR: &str = "uploads/images";
const AUDIO_DIR: &str = "audio";

/// Extensions an upload may be stored under. Anything else is saved as
/// `.img`, which the static server sends as opaque bytes.
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "avif", "heic", "heif", "tif", "tiff",
];

/// Errors from storing media.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The declared content type is not `image/*`.
    #[error("file must be an image (got {0})")]
    NotAnImage(String),

    /// SVG can carry script and uploads are served from the API's origin.
    #[error("SVG images are not accepted (got {0})")]
    ScriptableImage(String),

    /// The payload exceeds the upload ceiling.
    #[error("file is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MediaError {
    /// Rejections caused by the client's input rather than the server.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            MediaError::NotAnImage(_) | MediaError::ScriptableImage(_) | MediaError::TooLarge { .. }
        )
    }
}

/// A file written by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMedia {
    pub file_name: String,
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path below the server root, e.g. `/static/audio/<file_name>`.
    pub relative_url: String,
}

impl StoredMedia {
    /// Public URL under `base` (scheme and host, no trailing path).
    pub fn url(&self, base: &str) -> String {
        public_url(base, &self.relative_url)
    }
}

/// Join a request-derived base address with a relative media URL.
pub fn public_url(base: &str, relative_url: &str) -> String {
    format!("{}{relative_url}", base.trim_end_matches('/'))
}

/// Filesystem-backed media store.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    max_upload_bytes: usize,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Reject anything whose content type is not `image/*`, and SVG.
    pub fn check_content_type(&self, content_type: &str) -> Result<(), MediaError> {
        let normalized = content_type.trim().to_ascii_lowercase();
        match normalized.strip_prefix("image/") {
            Some(subtype) if subtype.starts_with("svg") => {
                Err(MediaError::ScriptableImage(content_type.to_string()))
            }
            Some(_) => Ok(()),
            None => Err(MediaError::NotAnImage(content_type.to_string())),
        }
    }

    /// Reject payloads over the upload ceiling. Exactly the limit is allowed.
    pub fn check_size(&self, size: usize) -> Result<(), MediaError> {
        if size > self.max_upload_bytes {
            Err(MediaError::TooLarge {
                size,
                limit: self.max_upload_bytes,
            })
        } else {
            Ok(())
        }
    }

    /// Validate and persist an uploaded image.
    ///
    /// `original_name` only contributes its extension; when it has no known
    /// image extension the content-type subtype is tried, then `img`.
    pub async fn store_upload(
        &self,
        bytes: &[u8],
        content_type: &str,
        original_name: Option<&str>,
    ) -> Result<StoredMedia, MediaError> {
        self.check_content_type(content_type)?;
        self.check_size(bytes.len())?;

        let ext = original_name
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .and_then(image_extension)
            .or_else(|| {
                content_type
                    .split('/')
                    .nth(1)
                    .and_then(|sub| image_extension(sub.split('+').next().unwrap_or(sub)))
            })
            .unwrap_or_else(|| "img".to_string());

        let stored = self.write(IMAGE_DIR, "image", &ext, bytes).await?;
        info!(
            "stored upload {} ({} bytes, {content_type})",
            stored.file_name,
            bytes.len()
        );
        Ok(stored)
    }

    /// Persist synthesized speech as an `.mp3`.
    pub async fn store_synthesized_audio(&self, bytes: &[u8]) -> Result<StoredMedia, MediaError> {
        let stored = self.write(AUDIO_DIR, "response", "mp3", bytes).await?;
        debug!("stored audio {} ({} bytes)", stored.file_name, bytes.len());
        Ok(stored)
    }

    async fn write(
        &self,
        subdir: &str,
        prefix: &str,
        ext: &str,
        bytes: &[u8],
    ) -> Result<StoredMedia, MediaError> {
        let dir = self.root.join(subdir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| MediaError::Io {
                path: dir.clone(),
                source,
            })?;

        let file_name = unique_file_name(prefix, ext);
        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| MediaError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(StoredMedia {
            relative_url: format!("{STATIC_PREFIX}/{subdir}/{file_name}"),
            file_name,
            path,
        })
    }
}

/// `<prefix>-<UTC timestamp with millis>-<8 random hex>.<ext>`
fn unique_file_name(prefix: &str, ext: &str) -> String {
    let ts = Utc::now().format("%Y%m%d%H%M%S%3f");
    let id = uuid::Uuid::new_v4().simple().to_string();
    let short = id.get(..8).unwrap_or(&id);
    format!("{prefix}-{ts}-{short}.{ext}")
}

/// Lowercase ASCII alphanumerics of `raw`, if that is a known image extension.
fn image_extension(raw: &str) -> Option<String> {
    let clean: String = raw
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(10)
        .collect::<String>()
        .to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(&clean.as_str()).then_some(clean)
}
