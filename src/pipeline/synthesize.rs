//! Review synthesis: every assembled paper → one [`ReviewPaperResult`].
//!
//! ## Message Layout
//!
//! 1. **System message**: the review prompt (or the configured override)
//! 2. **One user message per paper**, in input order: `Title: <title>` then
//!    the paper file's content verbatim
//!
//! The request is bounded by `review_max_tokens`. A review the backend cuts
//! short at that bound is salvaged: the partial payload is closed and parsed
//! with [`parse_truncated`], the result is flagged as truncated, and a
//! warning is logged. A truncated reply with nothing recoverable fails with a
//! `SchemaViolation` whose detail names the `review_max_tokens` bound.

use crate::backend::{InferenceBackend, InferenceRequest, RequestMessage};
use crate::config::DigestConfig;
use crate::error::DigestError;
use crate::output::{PaperArtifact, ReviewPaperResult};
use crate::pipeline::llm::{call_backend, RetryPolicy};
use crate::prompts::{paper_message, REVIEW_PROMPT};
use crate::schema::{parse_structured, parse_truncated, review_schema, OutputSchema};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const TARGET: &str = "review synthesis";

/// A validated review plus whether the backend truncated it.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub review: ReviewPaperResult,
    pub truncated: bool,
}

/// Builds and sends the single review request.
pub struct ReviewSynthesizer {
    backend: Arc<dyn InferenceBackend>,
    schema: OutputSchema,
    model: String,
    prompt: String,
    max_tokens: usize,
    temperature: f32,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ReviewSynthesizer {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: &DigestConfig) -> Self {
        Self {
            backend,
            schema: review_schema(),
            model: config.effective_review_model().to_string(),
            prompt: config
                .review_prompt
                .clone()
                .unwrap_or_else(|| REVIEW_PROMPT.to_string()),
            max_tokens: config.review_max_tokens,
            temperature: config.temperature,
            timeout: config.review_timeout(),
            retry: RetryPolicy::from_config(config),
        }
    }

    /// Synthesise a review of `papers`.
    pub async fn synthesize(&self, papers: &[PaperArtifact]) -> Result<ReviewPaperResult, DigestError> {
        self.synthesize_detailed(papers).await.map(|s| s.review)
    }

    /// Like [`Self::synthesize`], also reporting truncation.
    pub async fn synthesize_detailed(
        &self,
        papers: &[PaperArtifact],
    ) -> Result<Synthesis, DigestError> {
        self.backend.check_credential()?;
        if papers.is_empty() {
            return Err(DigestError::InvalidConfig(
                "review synthesis needs at least one paper".into(),
            ));
        }

        let mut messages = Vec::with_capacity(papers.len() + 1);
        messages.push(RequestMessage::system(self.prompt.as_str()));
        for paper in papers {
            let content = read_paper(paper).await?;
            messages.push(RequestMessage::user(paper_message(&paper.title, &content)));
        }

        let request = InferenceRequest {
            model: self.model.clone(),
            messages,
            schema: self.schema.clone(),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };

        info!("Synthesising review of {} papers with {}", papers.len(), self.model);
        let reply = call_backend(
            self.backend.as_ref(),
            &request,
            self.timeout,
            self.retry,
            TARGET,
        )
        .await?;

        if reply.truncated {
            warn!(
                "Review output hit the {}-token bound and was truncated by the backend",
                self.max_tokens
            );
        }

        let review: ReviewPaperResult = match parse_structured(&self.schema, &reply.content, TARGET)
        {
            Ok(review) => review,
            Err(_) if reply.truncated => self.salvage(&reply.content)?,
            Err(e) => return Err(e),
        };

        let dangling = review.dangling_citations();
        if !dangling.is_empty() {
            warn!(
                "Review cites {:?} but lists only {} references",
                dangling,
                review.references.len()
            );
        }

        Ok(Synthesis {
            review,
            truncated: reply.truncated,
        })
    }

    /// Recover the part of a cut-off review that arrived before the bound.
    fn salvage(&self, content: &str) -> Result<ReviewPaperResult, DigestError> {
        parse_truncated(&self.schema, content, TARGET).map_err(|e| {
            let detail = match e {
                DigestError::SchemaViolation { detail, .. } => detail,
                other => other.to_string(),
            };
            DigestError::SchemaViolation {
                schema: self.schema.name.to_string(),
                target: TARGET.to_string(),
                detail: format!(
                    "review cut off at the review_max_tokens bound of {} tokens \
                     and could not be salvaged: {detail}",
                    self.max_tokens
                ),
            }
        })
    }
}

/// Read a paper file verbatim; missing, unreadable and empty files are errors.
async fn read_paper(paper: &PaperArtifact) -> Result<String, DigestError> {
    let content = tokio::fs::read_to_string(&paper.path)
        .await
        .map_err(|e| DigestError::PaperUnreadable {
            path: paper.path.clone(),
            reason: e.to_string(),
        })?;
    if content.is_empty() {
        return Err(DigestError::PaperUnreadable {
            path: paper.path.clone(),
            reason: "file is empty".into(),
        });
    }
    Ok(content)
}
