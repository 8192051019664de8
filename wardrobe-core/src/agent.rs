//! Agent invoker: the capability boundary to the outfit recommendation engine.
//!
//! Provides an `AgentBackend` trait with implementations for:
//! - **subprocess**: launches the external agent with the request as a single
//!   JSON argument and scans its output (see `subprocess_agent`)
//! - **echo**: in-process stand-in that derives a suggestion set from the request

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::config::AgentConfig;
use crate::models::{SuggestionRequest, SuggestionResponse};
use crate::subprocess_agent::SubprocessAgent;

/// Most recent diagnostic lines kept per invocation.
pub const MAX_DIAGNOSTIC_LINES: usize = 200;

// ============================================================================
// AgentBackend trait
// ============================================================================

/// Abstraction over suggestion providers.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Run one suggestion request. Exactly one underlying call per invocation.
    async fn invoke(&self, request: &SuggestionRequest) -> Result<SuggestionResponse, AgentError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent script not found at: {path}")]
    ScriptNotFound { path: String },

    #[error("Failed to launch agent '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent process exited with {status}")]
    Exited { status: String, diagnostics: String },

    #[error("No valid JSON output received from agent")]
    NoValidOutput { diagnostics: String },

    #[error("Agent did not finish within {seconds}s")]
    Timeout { seconds: u64, diagnostics: String },

    #[error("Failed to encode agent request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Agent I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown agent backend: {0}")]
    UnknownBackend(String),
}

impl AgentError {
    /// Output accumulated from the agent before it failed, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            AgentError::Exited { diagnostics, .. }
            | AgentError::NoValidOutput { diagnostics }
            | AgentError::Timeout { diagnostics, .. } => Some(diagnostics.as_str()),
            _ => None,
        }
    }
}

// ============================================================================
// Output collection
// ============================================================================

/// Applies the output policy: the first line that parses as a JSON object or
/// array is the result; every other line is diagnostic context.
#[derive(Debug, Default)]
pub struct OutputCollector {
    result: Option<SuggestionResponse>,
    diagnostics: VecDeque<String>,
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stdout(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        if self.result.is_none() {
            if let Some(parsed) = serde_json::from_str(trimmed)
                .ok()
                .and_then(SuggestionResponse::from_value)
            {
                self.result = Some(parsed);
                return;
            }
        }
        self.push_diagnostic(trimmed);
    }

    pub fn push_diagnostic(&mut self, line: impl Into<String>) {
        if self.diagnostics.len() >= MAX_DIAGNOSTIC_LINES {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(line.into());
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    pub fn diagnostics(&self) -> String {
        self.diagnostics
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Resolve a cleanly exited run.
    pub fn finish(self) -> Result<SuggestionResponse, AgentError> {
        let diagnostics = self.diagnostics();
        self.result
            .ok_or(AgentError::NoValidOutput { diagnostics })
    }
}

// ============================================================================
// EchoAgent
// ============================================================================

/// In-process backend returning a fixed-shape suggestion set built from the
/// request. Mirrors the structure the external agent emits.
#[derive(Debug, Clone, Default)]
pub struct EchoAgent;

#[async_trait]
impl AgentBackend for EchoAgent {
    async fn invoke(&self, request: &SuggestionRequest) -> Result<SuggestionResponse, AgentError> {
        let prompt = request.preferences.prompt.trim();
        let description = if prompt.is_empty() {
            "An everyday outfit built from your wardrobe".to_string()
        } else {
            format!("Outfit ideas for: {}", prompt)
        };

        Ok(SuggestionResponse(json!([{
            "wardrobe_items": { "others": request.images },
            "suggestions": {
                "outfit_description": description,
                "colors": [],
                "style_tips": [],
                "accessories": [],
                "avoid": []
            },
            "outfit_preview": null
        }])))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Create the backend selected by `[agent] backend`.
pub fn create_backend(config: &AgentConfig) -> Result<Box<dyn AgentBackend>, AgentError> {
    match config.backend.as_str() {
        "subprocess" => Ok(Box::new(SubprocessAgent::from_config(config))),
        "echo" => Ok(Box::new(EchoAgent)),
        other => Err(AgentError::UnknownBackend(other.to_string())),
    }
}
