//! Media preparation.
//!
//! Converts a user-supplied inline image into a provider-consumable
//! reference by invoking the external upload collaborator. Runs before
//! any credits are reserved or any provider is contacted: an unresolved
//! image makes every downstream attempt pointless.

use std::time::Duration;

use base64::Engine;
use tracing::{debug, warn};

use gentask_models::{GenerationSpec, ImageSource};
use gentask_provider::MediaUploader;

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::retry::{retry_async, RetryConfig};

/// Upload retry policy: 3 attempts total, 1s base backoff capped at 5s.
fn upload_retry_config() -> RetryConfig {
    RetryConfig::new("image_upload")
        .with_max_retries(2)
        .with_base_delay(Duration::from_secs(1))
}

/// Resolve the spec's image into a reference.
///
/// A reference passes through unchanged; inline bytes are uploaded.
pub async fn resolve_image(
    spec: GenerationSpec,
    uploader: &dyn MediaUploader,
) -> OrchestratorResult<GenerationSpec> {
    let (data, mime_type) = match &spec.image {
        Some(ImageSource::Inline { data, mime_type }) => (data.clone(), mime_type.clone()),
        // Nothing to do for absent images or existing references
        _ => return Ok(spec),
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.as_bytes())
        .map_err(|e| OrchestratorError::upload_failed(format!("invalid base64 image: {}", e)))?;

    if bytes.is_empty() {
        return Err(OrchestratorError::upload_failed("empty image payload"));
    }

    let config = upload_retry_config();
    let result = retry_async(&config, || uploader.upload(bytes.clone(), &mime_type)).await;

    let url = result.into_result().map_err(|e| {
        warn!(error = %e, "Image upload exhausted retries");
        OrchestratorError::upload_failed(e.to_string())
    })?;

    debug!(url = %url, "Resolved inline image to reference");
    let mut spec = spec;
    spec.image = Some(ImageSource::Reference { url });
    Ok(spec)
}
