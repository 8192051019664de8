//! File intake: MIME/size validation and collision-free storage of uploaded images.
//!
//! Files are streamed to disk chunk by chunk. The type filter runs before a
//! file is opened and the size limit is enforced on every chunk, so a rejected
//! part never leaves bytes behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::models::UploadedAsset;

/// Subdirectory of the upload root reserved for generated outfit previews.
pub const PREVIEWS_DIR: &str = "previews";

/// MIME type assumed for parts that do not declare one.
pub const FALLBACK_MIME: &str = "application/octet-stream";

const MAX_NAME_ATTEMPTS: usize = 8;
const MAX_EXTENSION_LEN: usize = 10;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("No files uploaded")]
    NoFiles,

    #[error("Invalid file type: {mime}. Only JPEG, JPG, PNG and WebP are allowed.")]
    UnsupportedType { mime: String },

    #[error("File {name} is too large. Max size is {limit_mb}MB.")]
    TooLarge {
        name: String,
        limit: u64,
        limit_mb: u64,
    },

    #[error("Too many files. At most {limit} images may be uploaded at once.")]
    TooManyFiles { limit: usize },

    #[error("Malformed upload: {0}")]
    Malformed(String),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Limits applied to every incoming file part.
#[derive(Debug, Clone)]
pub struct IntakePolicy {
    pub max_file_size: u64,
    pub max_files: usize,
    pub allowed_mime_types: Vec<String>,
}

impl From<&StorageConfig> for IntakePolicy {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            max_files: config.max_files,
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|m| normalize_mime(Some(m)))
                .collect(),
        }
    }
}

impl IntakePolicy {
    pub fn check_mime(&self, mime: &str) -> Result<(), IntakeError> {
        let normalized = normalize_mime(Some(mime));
        if self.allowed_mime_types.iter().any(|m| *m == normalized) {
            Ok(())
        } else {
            Err(IntakeError::UnsupportedType {
                mime: mime.trim().to_string(),
            })
        }
    }

    pub fn check_size(&self, name: &str, size: u64) -> Result<(), IntakeError> {
        if size > self.max_file_size {
            Err(IntakeError::TooLarge {
                name: name.to_string(),
                limit: self.max_file_size,
                limit_mb: self.max_file_size / (1024 * 1024),
            })
        } else {
            Ok(())
        }
    }

    /// Checks that accepting one more file keeps the request within `max_files`.
    pub fn check_count(&self, already_accepted: usize) -> Result<(), IntakeError> {
        if already_accepted >= self.max_files {
            Err(IntakeError::TooManyFiles {
                limit: self.max_files,
            })
        } else {
            Ok(())
        }
    }
}

/// Lowercase essence of a MIME type, parameters stripped. Missing or blank
/// types fall back to `application/octet-stream`.
pub fn normalize_mime(raw: Option<&str>) -> String {
    let essence = raw
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if essence.is_empty() {
        FALLBACK_MIME.to_string()
    } else {
        essence
    }
}

/// Extension of the original filename (dot included) when it is short and
/// alphanumeric; empty otherwise.
fn sanitized_extension(original_name: &str) -> String {
    let base = original_name
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or(original_name);
    match base.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext)
        }
        _ => String::new(),
    }
}

/// `<unix-millis>-<random below 10^9><ext>`
pub fn generate_filename(original_name: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().as_u128() % 1_000_000_000;
    format!("{}-{}{}", millis, suffix, sanitized_extension(original_name))
}

/// A file that passed intake and is fully written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub stored_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub path: PathBuf,
}

impl StoredFile {
    pub fn into_asset(self, url: String) -> UploadedAsset {
        UploadedAsset {
            id: self.stored_name,
            original_name: self.original_name,
            mime_type: self.mime_type,
            size: self.size,
            path: self.path,
            url,
            stored_at: Utc::now(),
        }
    }
}

/// A file being streamed to disk.
pub struct PendingFile {
    file: File,
    stored: StoredFile,
    limit: u64,
}

impl PendingFile {
    pub fn path(&self) -> &Path {
        &self.stored.path
    }

    pub fn written(&self) -> u64 {
        self.stored.size
    }

    /// Append a chunk. Fails without writing if the chunk would push the
    /// file over the size limit; the caller is expected to `discard`.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), IntakeError> {
        let next = self.stored.size + chunk.len() as u64;
        if next > self.limit {
            return Err(IntakeError::TooLarge {
                name: self.stored.original_name.clone(),
                limit: self.limit,
                limit_mb: self.limit / (1024 * 1024),
            });
        }
        self.file.write_all(chunk).await?;
        self.stored.size = next;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<StoredFile, IntakeError> {
        self.file.flush().await?;
        Ok(self.stored)
    }

    /// Close and remove the partially written file.
    pub async fn discard(self) {
        let path = self.stored.path.clone();
        drop(self.file);
        if let Err(e) = fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove discarded upload");
        }
    }
}

/// Files written on behalf of a single request.
#[derive(Debug, Default)]
pub struct IntakeBatch {
    files: Vec<StoredFile>,
}

impl IntakeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: StoredFile) {
        self.files.push(file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[StoredFile] {
        &self.files
    }

    pub fn into_files(self) -> Vec<StoredFile> {
        self.files
    }

    /// Remove every file in the batch from disk.
    pub async fn discard(self) {
        for file in self.files {
            match fs::remove_file(&file.path).await {
                Ok(()) => tracing::debug!(path = %file.path.display(), "Removed upload from failed request"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %file.path.display(),
                    error = %e,
                    "Failed to remove upload from failed request"
                ),
            }
        }
    }
}

/// Validating writer rooted at the upload directory.
#[derive(Debug, Clone)]
pub struct FileIntake {
    root: PathBuf,
    policy: IntakePolicy,
}

impl FileIntake {
    pub fn new(root: impl Into<PathBuf>, policy: IntakePolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.upload_path(), IntakePolicy::from(config))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.root.join(PREVIEWS_DIR)
    }

    pub fn policy(&self) -> &IntakePolicy {
        &self.policy
    }

    /// Create the upload root and its previews subdirectory.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.previews_dir())
    }

    /// Validate the declared type and open a fresh, uniquely named file for it.
    pub async fn open(&self, original_name: &str, mime: &str) -> Result<PendingFile, IntakeError> {
        self.policy.check_mime(mime)?;
        fs::create_dir_all(self.previews_dir()).await?;

        for _ in 0..MAX_NAME_ATTEMPTS {
            let stored_name = generate_filename(original_name);
            let path = self.root.join(&stored_name);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => {
                    tracing::debug!(
                        original = original_name,
                        stored = %stored_name,
                        mime = mime,
                        "Opened upload file"
                    );
                    return Ok(PendingFile {
                        file,
                        stored: StoredFile {
                            stored_name,
                            original_name: original_name.to_string(),
                            mime_type: normalize_mime(Some(mime)),
                            size: 0,
                            path,
                        },
                        limit: self.policy.max_file_size,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(IntakeError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "could not generate a unique upload filename",
        )))
    }

    /// Store an in-memory file in one step.
    pub async fn store_bytes(
        &self,
        original_name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, IntakeError> {
        self.policy.check_size(original_name, bytes.len() as u64)?;
        let mut pending = self.open(original_name, mime).await?;
        if let Err(e) = pending.write_chunk(bytes).await {
            pending.discard().await;
            return Err(e);
        }
        pending.finish().await
    }
}
