//! Wire types shared by the HTTP server and the terminal client.

use serde::{Deserialize, Serialize};

pub const UPLOAD_PATH: &str = "/api/outfits/upload";
pub const SUGGESTIONS_PATH: &str = "/api/outfits/suggestions";
pub const HEALTH_PATH: &str = "/api/health";

/// Multipart field carrying image parts.
pub const IMAGES_FIELD: &str = "images";
/// Multipart text field / query parameter carrying the free-text prompt.
pub const PROMPT_FIELD: &str = "prompt";

pub const UPLOAD_SUCCESS_MESSAGE: &str = "Images processed successfully";
pub const INTERNAL_DETAILS: &str = "Check server logs for more information";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadResponse {
    pub message: String,
    pub count: usize,
    pub files: Vec<String>,
    pub suggestions: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestionsResponse {
    pub suggestions: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            details: None,
        }
    }

    pub fn with_details(msg: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            details: Some(details.into()),
        }
    }
}
