//! Multipart → intake adapter for the upload endpoint.

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use wardrobe_core::api::{IMAGES_FIELD, PROMPT_FIELD};
use wardrobe_core::intake::FALLBACK_MIME;
use wardrobe_core::{FileIntake, IntakeBatch, IntakeError, WardrobeError};

/// Everything the upload form carried.
#[derive(Debug)]
pub struct ReceivedUpload {
    pub batch: IntakeBatch,
    pub prompt: String,
}

/// Stream every `images` part through intake and collect the `prompt` field.
/// On any failure the files already written for this request are removed.
pub async fn receive_upload(
    intake: &FileIntake,
    mut multipart: Multipart,
) -> Result<ReceivedUpload, WardrobeError> {
    let mut batch = IntakeBatch::new();
    let mut prompt = String::new();

    match read_fields(intake, &mut multipart, &mut batch, &mut prompt).await {
        Ok(()) => Ok(ReceivedUpload { batch, prompt }),
        Err(e) => {
            batch.discard().await;
            Err(e)
        }
    }
}

async fn read_fields(
    intake: &FileIntake,
    multipart: &mut Multipart,
    batch: &mut IntakeBatch,
    prompt: &mut String,
) -> Result<(), WardrobeError> {
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            IMAGES_FIELD => {
                intake.policy().check_count(batch.len())?;
                store_field(intake, field, batch).await?;
            }
            PROMPT_FIELD => {
                *prompt = field.text().await.map_err(malformed)?;
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }
    Ok(())
}

async fn store_field(
    intake: &FileIntake,
    mut field: Field<'_>,
    batch: &mut IntakeBatch,
) -> Result<(), WardrobeError> {
    let original_name = field.file_name().unwrap_or("upload").to_string();
    let mime = field.content_type().unwrap_or(FALLBACK_MIME).to_string();

    let mut pending = match intake.open(&original_name, &mime).await {
        Ok(pending) => pending,
        Err(e) => {
            tracing::warn!(original = %original_name, mime = %mime, error = %e, "Upload rejected");
            return Err(e.into());
        }
    };

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                pending.discard().await;
                return Err(malformed(e));
            }
        };
        if let Err(e) = pending.write_chunk(&chunk).await {
            tracing::warn!(
                original = %original_name,
                written = pending.written(),
                error = %e,
                "Upload rejected mid-stream"
            );
            pending.discard().await;
            return Err(e.into());
        }
    }

    let stored = pending.finish().await?;
    tracing::info!(
        original = %stored.original_name,
        stored = %stored.stored_name,
        size = stored.size,
        "Upload written"
    );
    batch.push(stored);
    Ok(())
}

fn malformed(e: MultipartError) -> WardrobeError {
    IntakeError::Malformed(e.to_string()).into()
}
