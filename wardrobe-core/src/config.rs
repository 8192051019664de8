use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Default per-file upload limit (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of image parts accepted in a single upload.
pub const DEFAULT_MAX_FILES: usize = 10;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WardrobeConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Externally advertised base URL for stored assets. Falls back to
    /// `http://localhost:<port>` when unset.
    pub public_base_url: Option<String>,
    pub allowed_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_base_url: None,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

impl HttpConfig {
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) if !url.trim().is_empty() => url.trim().trim_end_matches('/').to_string(),
            _ => format!("http://localhost:{}", self.port),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: String,
    /// Route prefix the static file boundary is mounted under.
    pub route: String,
    pub max_file_size: u64,
    pub max_files: usize,
    pub allowed_mime_types: Vec<String>,
    /// Remove files already written by a request when a later step fails.
    pub cleanup_on_failure: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".to_string(),
            route: "/uploads".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: DEFAULT_MAX_FILES,
            allowed_mime_types: vec![
                "image/jpeg".to_string(),
                "image/jpg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "application/octet-stream".to_string(),
            ],
            cleanup_on_failure: true,
        }
    }
}

impl StorageConfig {
    /// Upload directory with `~` and `$VARS` expanded.
    pub fn upload_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::full(&self.upload_dir).map_or_else(
            |_| self.upload_dir.clone(),
            |expanded| expanded.into_owned(),
        ))
    }

    /// Normalized route prefix: leading slash, no trailing slash.
    pub fn route_prefix(&self) -> String {
        let trimmed = self.route.trim().trim_matches('/');
        format!("/{}", trimmed)
    }

    /// Largest request body the upload endpoint accepts, multipart framing included.
    pub fn request_body_limit(&self) -> usize {
        let files = self.max_file_size.saturating_mul(self.max_files as u64);
        usize::try_from(files.saturating_add(1024 * 1024)).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    /// `subprocess` or `echo`.
    pub backend: String,
    pub program: String,
    pub args: Vec<String>,
    pub script: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend: "subprocess".to_string(),
            program: "python3".to_string(),
            args: vec!["-u".to_string()],
            script: Some("agents/outfit_agent.py".to_string()),
            timeout_seconds: 120,
        }
    }
}

impl WardrobeConfig {
    /// Load from an optional TOML file, then overlay `WARDROBE__SECTION__KEY`
    /// environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("WARDROBE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("http.allowed_origins")
                    .with_list_parse_key("storage.allowed_mime_types")
                    .with_list_parse_key("agent.args")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }
}
