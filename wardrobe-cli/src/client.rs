//! Async HTTP client for the wardrobe relay.
//!
//! GET calls retry connection failures with exponential backoff. Uploads
//! are sent once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use wardrobe_core::api::{
    ErrorBody, HealthResponse, SuggestionsResponse, UploadResponse, HEALTH_PATH, IMAGES_FIELD,
    PROMPT_FIELD, SUGGESTIONS_PATH, UPLOAD_PATH,
};

/// Attempts made for idempotent GET calls.
pub const GET_ATTEMPTS: usize = 3;

/// Default per-request timeout; the agent may take minutes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("cannot reach {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned {status}: {message}")]
    Server {
        status: u16,
        message: String,
        details: Option<String>,
    },

    #[error("invalid response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// Only connection-level failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Connect { .. })
    }
}

#[derive(Debug, Clone)]
pub struct WardrobeClient {
    http: reqwest::Client,
    base_url: String,
    retry_delay_ms: u64,
}

impl WardrobeClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            retry_delay_ms: 200,
        })
    }

    /// Rebuild the HTTP client with a different per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ClientError> {
        self.http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Override the first backoff delay (tests use a short one).
    pub fn with_retry_delay(mut self, millis: u64) -> Self {
        self.retry_delay_ms = millis;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /api/health
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = format!("{}{}", self.base_url, HEALTH_PATH);
        self.get_with_retry(&url, &[]).await
    }

    /// GET /api/outfits/suggestions?prompt=...
    pub async fn suggestions(&self, prompt: &str) -> Result<SuggestionsResponse, ClientError> {
        let url = format!("{}{}", self.base_url, SUGGESTIONS_PATH);
        self.get_with_retry(&url, &[(PROMPT_FIELD, prompt)]).await
    }

    /// POST /api/outfits/upload with every file as an `images` part.
    pub async fn upload(&self, files: &[PathBuf], prompt: &str) -> Result<UploadResponse, ClientError> {
        let url = format!("{}{}", self.base_url, UPLOAD_PATH);

        let mut form = Form::new();
        for path in files {
            let data = tokio::fs::read(path)
                .await
                .map_err(|source| ClientError::ReadFile {
                    path: path.display().to_string(),
                    source,
                })?;
            let part = Part::bytes(data)
                .file_name(file_name(path))
                .mime_str(&guess_mime(path))?;
            form = form.part(IMAGES_FIELD, part);
        }
        form = form.text(PROMPT_FIELD, prompt.to_string());

        tracing::debug!(url = %url, files = files.len(), "Uploading");
        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| connect_error(&url, source))?;
        parse_response(&url, resp).await
    }

    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let strategy = ExponentialBackoff::from_millis(self.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(GET_ATTEMPTS - 1);

        RetryIf::spawn(
            strategy,
            || self.get_once(url, query),
            |e: &ClientError| {
                if e.is_transient() {
                    tracing::warn!(url = %url, error = %e, "Request failed, retrying");
                }
                e.is_transient()
            },
        )
        .await
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| connect_error(url, source))?;
        parse_response(url, resp).await
    }
}

/// A request that timed out may already be running on the server, so only
/// refused or unreachable connections become `Connect`.
fn connect_error(url: &str, source: reqwest::Error) -> ClientError {
    if source.is_connect() {
        ClientError::Connect {
            url: url.to_string(),
            source,
        }
    } else {
        ClientError::Http(source)
    }
}

async fn parse_response<T: DeserializeOwned>(
    url: &str,
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(|source| ClientError::Decode {
            url: url.to_string(),
            source,
        });
    }

    let text = resp.text().await.unwrap_or_default();
    let (message, details) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.error, body.details),
        Err(_) if text.trim().is_empty() => (status.to_string(), None),
        Err(_) => (text, None),
    };
    Err(ClientError::Server {
        status: status.as_u16(),
        message,
        details,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

/// MIME type sent for a local file, from its extension.
pub fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
