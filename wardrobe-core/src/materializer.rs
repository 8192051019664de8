//! Stored-path → public URL conversion.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::config::WardrobeConfig;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("{path} is not inside the upload directory {root}")]
    OutsideRoot { path: String, root: String },
}

/// Pure function of (storage root, base URL, route prefix, file path).
#[derive(Debug, Clone)]
pub struct UrlMaterializer {
    root: PathBuf,
    base_url: String,
    route: String,
}

impl UrlMaterializer {
    pub fn new(root: impl Into<PathBuf>, base_url: &str, route: &str) -> Self {
        let route = route.trim().trim_matches('/');
        Self {
            root: root.into(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            route: if route.is_empty() {
                String::new()
            } else {
                format!("/{}", route)
            },
        }
    }

    pub fn from_config(config: &WardrobeConfig) -> Self {
        Self::new(
            config.storage.upload_path(),
            &config.http.base_url(),
            &config.storage.route_prefix(),
        )
    }

    /// `<base_url><route>/<relative path with '/' separators>`
    pub fn url_for(&self, path: &Path) -> Result<String, MaterializeError> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| MaterializeError::OutsideRoot {
                path: path.display().to_string(),
                root: self.root.display().to_string(),
            })?;

        Ok(format!(
            "{}{}/{}",
            self.base_url,
            self.route,
            relative_url_path(relative)
        ))
    }
}

/// Join path components with `/`, splitting any backslash-separated
/// component so Windows-style names produce the same URL.
pub fn relative_url_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .flat_map(|part| {
            part.split('\\')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .join("/")
}
