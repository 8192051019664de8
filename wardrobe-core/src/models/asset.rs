use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored image together with the URL it is served under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedAsset {
    /// Generated filename; unique within the upload directory.
    pub id: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: u64,
    pub path: PathBuf,
    pub url: String,
    pub stored_at: DateTime<Utc>,
}
