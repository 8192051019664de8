use serde::{Deserialize, Serialize};

/// Free-text preferences handed to the agent next to the image URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// The single JSON argument passed to the agent process.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuggestionRequest {
    pub images: Vec<String>,
    pub preferences: Preferences,
}

impl SuggestionRequest {
    /// Request for an upload: the URLs are also echoed into the preferences.
    pub fn for_upload(urls: Vec<String>, prompt: impl Into<String>) -> Self {
        Self {
            preferences: Preferences {
                prompt: prompt.into(),
                images: Some(urls.clone()),
            },
            images: urls,
        }
    }

    pub fn for_prompt(prompt: impl Into<String>) -> Self {
        Self {
            images: Vec::new(),
            preferences: Preferences {
                prompt: prompt.into(),
                images: None,
            },
        }
    }
}

/// Opaque agent result. Only required to be a JSON object or array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SuggestionResponse(pub serde_json::Value);

impl SuggestionResponse {
    /// Accepts only structured values (objects and arrays).
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        if value.is_object() || value.is_array() {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Body value for the prompt-only endpoint: `null` collapses to `[]`.
    pub fn or_empty(self) -> serde_json::Value {
        if self.0.is_null() {
            serde_json::json!([])
        } else {
            self.0
        }
    }
}
