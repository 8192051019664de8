use std::sync::Arc;

use wardrobe_core::api::{SuggestionsResponse, UploadResponse, UPLOAD_SUCCESS_MESSAGE};
use wardrobe_core::{
    create_backend, AgentBackend, FileIntake, IntakeBatch, IntakeError, SuggestionRequest,
    UploadedAsset, UrlMaterializer, WardrobeConfig, WardrobeError,
};

/// Error message for the prompt-only endpoint when no prompt was sent.
pub const NO_PROMPT: &str = "No prompt provided";

/// Intake → materialize → agent composition shared by the HTTP handlers.
#[derive(Clone)]
pub struct Pipeline {
    intake: FileIntake,
    materializer: UrlMaterializer,
    agent: Arc<dyn AgentBackend>,
    cleanup_on_failure: bool,
}

impl Pipeline {
    pub fn new(
        intake: FileIntake,
        materializer: UrlMaterializer,
        agent: Arc<dyn AgentBackend>,
        cleanup_on_failure: bool,
    ) -> Self {
        Self {
            intake,
            materializer,
            agent,
            cleanup_on_failure,
        }
    }

    pub fn from_config(config: &WardrobeConfig) -> Result<Self, WardrobeError> {
        let agent: Arc<dyn AgentBackend> = Arc::from(create_backend(&config.agent)?);
        Ok(Self::new(
            FileIntake::from_config(&config.storage),
            UrlMaterializer::from_config(config),
            agent,
            config.storage.cleanup_on_failure,
        ))
    }

    pub fn intake(&self) -> &FileIntake {
        &self.intake
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    /// Materialize every stored file and ask the agent about them.
    pub async fn upload_and_suggest(
        &self,
        batch: IntakeBatch,
        prompt: String,
    ) -> Result<UploadResponse, WardrobeError> {
        if batch.is_empty() {
            return Err(IntakeError::NoFiles.into());
        }

        let urls = match batch
            .files()
            .iter()
            .map(|f| self.materializer.url_for(&f.path))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(urls) => urls,
            Err(e) => {
                self.cleanup(batch).await;
                return Err(e.into());
            }
        };

        let request = SuggestionRequest::for_upload(urls.clone(), prompt);
        let result = match self.agent.invoke(&request).await {
            Ok(result) => result,
            Err(e) => {
                self.cleanup(batch).await;
                return Err(e.into());
            }
        };

        let assets: Vec<UploadedAsset> = batch
            .into_files()
            .into_iter()
            .zip(urls.iter().cloned())
            .map(|(file, url)| file.into_asset(url))
            .collect();
        for asset in &assets {
            tracing::info!(
                id = %asset.id,
                original = %asset.original_name,
                mime = %asset.mime_type,
                size = asset.size,
                url = %asset.url,
                "Stored asset"
            );
        }

        Ok(UploadResponse {
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            count: assets.len(),
            files: urls,
            suggestions: result.into_value(),
        })
    }

    /// Prompt-only suggestion. A missing or blank prompt is a client error.
    pub async fn suggest(&self, prompt: Option<&str>) -> Result<SuggestionsResponse, WardrobeError> {
        let prompt = match prompt {
            Some(p) if !p.trim().is_empty() => p,
            _ => return Err(WardrobeError::BadRequest(NO_PROMPT.to_string())),
        };

        let result = self.agent.invoke(&SuggestionRequest::for_prompt(prompt)).await?;
        Ok(SuggestionsResponse {
            suggestions: result.or_empty(),
        })
    }

    async fn cleanup(&self, batch: IntakeBatch) {
        if self.cleanup_on_failure {
            tracing::info!(files = batch.len(), "Removing uploads from failed request");
            batch.discard().await;
        } else {
            tracing::info!(files = batch.len(), "Keeping uploads from failed request");
        }
    }
}
