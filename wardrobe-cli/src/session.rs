//! Local view state for one client session.
//!
//! Staged assets are an optimistic overlay: they appear as `Pending` before
//! the server answers and are reconciled against the upload response. Each
//! staged asset holds a preview handle issued from a `PreviewRegistry`;
//! handles are revoked when the asset is removed, on clear, and when the
//! session is dropped.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;
use wardrobe_core::api::{SuggestionsResponse, UploadResponse};

// ============================================================================
// Preview handles
// ============================================================================

/// Opaque reference to a locally displayed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewHandle(Uuid);

/// Tracks which preview handles are still live. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    live: Arc<Mutex<HashSet<PreviewHandle>>>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> PreviewHandle {
        let handle = PreviewHandle(Uuid::new_v4());
        self.lock().insert(handle);
        handle
    }

    /// Returns false if the handle was already revoked.
    pub fn revoke(&self, handle: PreviewHandle) -> bool {
        self.lock().remove(&handle)
    }

    pub fn is_live(&self, handle: PreviewHandle) -> bool {
        self.lock().contains(&handle)
    }

    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<PreviewHandle>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// Staged assets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStatus {
    Pending,
    Confirmed(String),
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct StagedAsset {
    pub id: Uuid,
    pub path: PathBuf,
    pub preview: PreviewHandle,
    pub status: AssetStatus,
}

impl StagedAsset {
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

// ============================================================================
// Suggestion view
// ============================================================================

/// Renderable view of one suggestion object. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionCard {
    pub title: Option<String>,
    pub outfit_description: Option<String>,
    pub outfit_preview: Option<String>,
    pub items: Vec<String>,
    pub colors: Vec<String>,
    pub accessories: Vec<String>,
    pub style_tips: Vec<String>,
    pub avoid: Vec<String>,
}

impl SuggestionCard {
    pub fn from_value(value: &Value) -> Self {
        Self {
            title: string_field(value, "title"),
            outfit_description: string_field(value, "outfit_description"),
            outfit_preview: string_field(value, "outfit_preview"),
            items: string_list(value.get("items")),
            colors: string_list(value.get("colors")),
            accessories: string_list(value.get("accessories")),
            style_tips: string_list(value.get("style_tips")),
            avoid: string_list(value.get("avoid")),
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    other => other.get("url").and_then(Value::as_str).map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Category → item URLs grouping from `wardrobe_items`. Items may be URL
/// strings or `{url}` objects; non-list categories are skipped.
pub fn categorize(wardrobe_items: &Value) -> BTreeMap<String, Vec<String>> {
    wardrobe_items
        .as_object()
        .map(|categories| {
            categories
                .iter()
                .filter(|(_, items)| items.is_array())
                .map(|(category, items)| (category.clone(), string_list(Some(items))))
                .collect()
        })
        .unwrap_or_default()
}

/// Interpret an agent result: array (or single object as a one-element
/// array); the first element supplies the grouping and the suggestion list.
pub fn interpret_result(result: &Value) -> (Vec<SuggestionCard>, BTreeMap<String, Vec<String>>) {
    let first = match result {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(result),
        _ => None,
    };
    let Some(first) = first else {
        return (Vec::new(), BTreeMap::new());
    };

    let categories = first.get("wardrobe_items").map(categorize).unwrap_or_default();

    let cards = match first.get("suggestions") {
        Some(suggestions) if suggestions.is_object() => {
            let mut merged = suggestions.clone();
            if let (Some(obj), Some(preview)) = (
                merged.as_object_mut(),
                first.get("outfit_preview").filter(|p| !p.is_null()),
            ) {
                obj.insert("outfit_preview".to_string(), preview.clone());
            }
            vec![SuggestionCard::from_value(&merged)]
        }
        Some(Value::Array(list)) => list.iter().map(SuggestionCard::from_value).collect(),
        _ => Vec::new(),
    };

    (cards, categories)
}

// ============================================================================
// WardrobeSession
// ============================================================================

#[derive(Debug)]
pub struct WardrobeSession {
    assets: Vec<StagedAsset>,
    previews: PreviewRegistry,
    prompt: String,
    loading: bool,
    suggestions: Vec<SuggestionCard>,
    categories: BTreeMap<String, Vec<String>>,
    last_result: Option<Value>,
}

impl WardrobeSession {
    pub fn new() -> Self {
        Self::with_registry(PreviewRegistry::new())
    }

    pub fn with_registry(previews: PreviewRegistry) -> Self {
        Self {
            assets: Vec::new(),
            previews,
            prompt: String::new(),
            loading: false,
            suggestions: Vec::new(),
            categories: BTreeMap::new(),
            last_result: None,
        }
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn assets(&self) -> &[StagedAsset] {
        &self.assets
    }

    pub fn suggestions(&self) -> &[SuggestionCard] {
        &self.suggestions
    }

    pub fn categories(&self) -> &BTreeMap<String, Vec<String>> {
        &self.categories
    }

    pub fn last_result(&self) -> Option<&Value> {
        self.last_result.as_ref()
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Add files as `Pending` assets before the server has seen them.
    pub fn stage(&mut self, paths: impl IntoIterator<Item = PathBuf>) -> Vec<Uuid> {
        paths
            .into_iter()
            .map(|path| {
                let asset = StagedAsset {
                    id: Uuid::new_v4(),
                    path,
                    preview: self.previews.issue(),
                    status: AssetStatus::Pending,
                };
                let id = asset.id;
                self.assets.push(asset);
                id
            })
            .collect()
    }

    /// Paths of every asset still waiting for the server, in staging order.
    pub fn pending_paths(&self) -> Vec<PathBuf> {
        self.assets
            .iter()
            .filter(|a| a.status == AssetStatus::Pending)
            .map(|a| a.path.clone())
            .collect()
    }

    pub fn begin_request(&mut self) {
        self.loading = true;
    }

    /// Reconcile pending assets with the returned URLs in order, then
    /// replace suggestions and grouping with the server's.
    pub fn apply_upload(&mut self, response: &UploadResponse) {
        let mut urls = response.files.iter();
        for asset in self
            .assets
            .iter_mut()
            .filter(|a| a.status == AssetStatus::Pending)
        {
            asset.status = match urls.next() {
                Some(url) => AssetStatus::Confirmed(url.clone()),
                None => AssetStatus::Rejected("no URL returned by server".to_string()),
            };
        }
        self.apply_result(&response.suggestions);
    }

    pub fn apply_suggestions(&mut self, response: &SuggestionsResponse) {
        self.apply_result(&response.suggestions);
    }

    /// Mark every pending asset rejected.
    pub fn apply_failure(&mut self, reason: &str) {
        for asset in self
            .assets
            .iter_mut()
            .filter(|a| a.status == AssetStatus::Pending)
        {
            asset.status = AssetStatus::Rejected(reason.to_string());
        }
        self.loading = false;
    }

    fn apply_result(&mut self, result: &Value) {
        let (cards, categories) = interpret_result(result);
        self.suggestions = cards;
        self.categories = categories;
        self.last_result = Some(result.clone());
        self.loading = false;
    }

    /// Remove one asset. Suggestions no longer match the inputs and are cleared.
    pub fn remove(&mut self, id: Uuid) -> bool {
        let Some(index) = self.assets.iter().position(|a| a.id == id) else {
            return false;
        };
        let asset = self.assets.remove(index);
        self.previews.revoke(asset.preview);
        self.clear_suggestions();
        true
    }

    pub fn clear(&mut self) {
        for asset in self.assets.drain(..) {
            self.previews.revoke(asset.preview);
        }
        self.clear_suggestions();
    }

    fn clear_suggestions(&mut self) {
        self.suggestions.clear();
        self.categories.clear();
        self.last_result = None;
    }
}

impl Default for WardrobeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WardrobeSession {
    fn drop(&mut self) {
        for asset in &self.assets {
            self.previews.revoke(asset.preview);
        }
    }
}
