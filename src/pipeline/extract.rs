//! Page extraction: one page image → [`ExtractionResult`] via the VLM.
//!
//! ## Message Layout
//!
//! 1. **System message**: the extraction prompt (or the configured override)
//! 2. **User message**: the page as a base64 PNG attachment, no text
//!
//! The request carries the `extractionResult` schema; the reply is validated
//! locally before it is returned.

use crate::backend::{InferenceBackend, InferenceRequest, RequestMessage};
use crate::config::DigestConfig;
use crate::error::DigestError;
use crate::output::{ExtractionResult, PageImage};
use crate::pipeline::encode::ImageEncoder;
use crate::pipeline::llm::{call_backend, RetryPolicy};
use crate::prompts::EXTRACTION_PROMPT;
use crate::schema::{extraction_schema, parse_structured, OutputSchema};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Extracts structured content from single page images.
pub struct PageExtractor {
    backend: Arc<dyn InferenceBackend>,
    encoder: ImageEncoder,
    schema: OutputSchema,
    model: String,
    prompt: String,
    max_tokens: usize,
    temperature: f32,
    timeout: Duration,
    retry: RetryPolicy,
}

/// Human-readable target used in logs and errors.
pub fn page_target(page: &PageImage) -> String {
    format!("page {} of '{}'", page.page, page.pdf_path.display())
}

impl PageExtractor {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: &DigestConfig) -> Result<Self, DigestError> {
        Ok(Self {
            backend,
            encoder: ImageEncoder::new(config.download_timeout())?,
            schema: extraction_schema(),
            model: config.model.clone(),
            prompt: config
                .extraction_prompt
                .clone()
                .unwrap_or_else(|| EXTRACTION_PROMPT.to_string()),
            max_tokens: config.page_max_tokens,
            temperature: config.temperature,
            timeout: config.api_timeout(),
            retry: RetryPolicy::from_config(config),
        })
    }

    /// Extract one page.
    ///
    /// The credential is checked before the image is even loaded, so a
    /// misconfigured run fails without touching the network.
    pub async fn extract(&self, page: &PageImage) -> Result<ExtractionResult, DigestError> {
        self.backend.check_credential()?;

        let target = page_target(page);
        let image = self.encoder.encode_path(&page.image_path).await?;

        let request = InferenceRequest {
            model: self.model.clone(),
            messages: vec![
                RequestMessage::system(self.prompt.as_str()),
                RequestMessage::user_image(image),
            ],
            schema: self.schema.clone(),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };

        let reply = call_backend(
            self.backend.as_ref(),
            &request,
            self.timeout,
            self.retry,
            &target,
        )
        .await?;

        if reply.truncated {
            warn!(
                "{}: output hit the {}-token bound; the payload is likely incomplete",
                target, self.max_tokens
            );
        }

        let result: ExtractionResult = parse_structured(&self.schema, &reply.content, &target)?;
        debug!("{}: {} chars of markdown", target, result.content.len());
        Ok(result)
    }
}
