//! Pipeline driver: assemble every paper, then synthesise and write the review.
//!
//! Papers are processed one after another in input order. The first paper
//! that fails aborts the whole run with [`DigestError::PipelineAborted`]; the
//! review stage is never reached with an incomplete paper set.

use crate::backend::openai::OpenAiBackend;
use crate::backend::provider::ProviderBackend;
use crate::backend::InferenceBackend;
use crate::config::DigestConfig;
use crate::error::DigestError;
use crate::output::{DigestOutput, DigestStats, PaperArtifact};
use crate::pipeline::assemble::{artifact_path, PaperAssembler};
use crate::pipeline::extract::PageExtractor;
use crate::pipeline::rasterize::{PageRasterizer, PdftoppmRasterizer};
use crate::pipeline::synthesize::ReviewSynthesizer;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// A configured pipeline: rasteriser, backends and stages wired together.
pub struct Pipeline {
    config: DigestConfig,
    assembler: PaperAssembler,
    synthesizer: ReviewSynthesizer,
}

impl Pipeline {
    /// Wire up the stages from `config`.
    ///
    /// Fails with [`DigestError::MissingCredential`] only for provider-backed
    /// runs whose provider cannot be built; the OpenAI key is checked lazily,
    /// right before the first request.
    pub fn new(config: DigestConfig) -> Result<Self, DigestError> {
        let (page_backend, review_backend) = resolve_backends(&config)?;
        let rasterizer: Arc<dyn PageRasterizer> = match &config.rasterizer {
            Some(r) => Arc::clone(r),
            None => Arc::new(PdftoppmRasterizer::from_config(&config)),
        };

        let extractor = PageExtractor::new(page_backend, &config)?;
        let assembler = PaperAssembler::new(rasterizer, extractor)
            .with_progress(config.progress_callback.clone());
        let synthesizer = ReviewSynthesizer::new(review_backend, &config);

        Ok(Self {
            config,
            assembler,
            synthesizer,
        })
    }

    pub fn config(&self) -> &DigestConfig {
        &self.config
    }

    /// Assemble every PDF in order, stopping at the first failure.
    ///
    /// Returns the artifacts without synthesising a review.
    pub async fn assemble_all(
        &self,
        pdf_paths: &[PathBuf],
        output_dir: &Path,
    ) -> Result<Vec<PaperArtifact>, DigestError> {
        self.check_inputs(pdf_paths, output_dir)?;

        if let Some(cb) = &self.config.progress_callback {
            cb.on_run_start(pdf_paths.len());
        }

        let mut papers = Vec::with_capacity(pdf_paths.len());
        for (paper_index, pdf) in pdf_paths.iter().enumerate() {
            match self.assembler.assemble(pdf, output_dir).await {
                Ok(paper) => papers.push(paper),
                Err(e) => {
                    warn!(
                        "Paper {} ('{}') failed, aborting run: {}",
                        paper_index,
                        pdf.display(),
                        e
                    );
                    return Err(DigestError::PipelineAborted {
                        paper_index,
                        pdf: pdf.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(papers)
    }

    /// Run the whole pipeline and write the review into `output_dir`.
    pub async fn run(
        &self,
        pdf_paths: &[PathBuf],
        output_dir: &Path,
    ) -> Result<DigestOutput, DigestError> {
        let start = Instant::now();
        info!(
            "Starting digest of {} papers into '{}'",
            pdf_paths.len(),
            output_dir.display()
        );

        // ── Step 1: Assemble papers ──────────────────────────────────────
        let papers = self.assemble_all(pdf_paths, output_dir).await?;

        // ── Step 2: Synthesise review ────────────────────────────────────
        if let Some(cb) = &self.config.progress_callback {
            cb.on_review_start(papers.len());
        }
        let synthesis = self.synthesizer.synthesize_detailed(&papers).await?;

        // ── Step 3: Write final artifact ─────────────────────────────────
        let review_path = output_dir.join(&self.config.review_file_name);
        write_review(review_path.clone(), synthesis.review.content.clone()).await?;
        if let Some(cb) = &self.config.progress_callback {
            cb.on_review_complete(synthesis.review.content.len());
        }

        let stats = DigestStats {
            papers: papers.len(),
            pages: papers.iter().map(|p| p.pages).sum(),
            duration_ms: start.elapsed().as_millis() as u64,
            review_truncated: synthesis.truncated,
        };
        info!(
            "Digest complete: {} papers, {} pages, {}ms → '{}'",
            stats.papers,
            stats.pages,
            stats.duration_ms,
            review_path.display()
        );

        Ok(DigestOutput {
            papers,
            review: synthesis.review,
            review_path,
            stats,
        })
    }

    /// Reject inputs that would make two artifacts share a file.
    fn check_inputs(&self, pdf_paths: &[PathBuf], output_dir: &Path) -> Result<(), DigestError> {
        if pdf_paths.is_empty() {
            return Err(DigestError::InvalidConfig("no input PDFs given".into()));
        }
        let review_path = output_dir.join(&self.config.review_file_name);
        let mut seen = HashSet::new();
        for pdf in pdf_paths {
            let md = artifact_path(pdf, output_dir);
            if md == review_path {
                return Err(DigestError::InvalidConfig(format!(
                    "'{}' would be written to the review file '{}'",
                    pdf.display(),
                    review_path.display()
                )));
            }
            if !seen.insert(md.clone()) {
                return Err(DigestError::InvalidConfig(format!(
                    "two inputs map to the same paper file '{}'",
                    md.display()
                )));
            }
        }
        Ok(())
    }
}

/// Digest `pdf_paths` into `output_dir` using `config`.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// [`DigestError::PipelineAborted`] if any paper fails (carrying the paper's
/// 0-based index and the underlying cause); synthesis and write errors are
/// returned as-is.
pub async fn digest(
    pdf_paths: &[PathBuf],
    output_dir: impl AsRef<Path>,
    config: &DigestConfig,
) -> Result<DigestOutput, DigestError> {
    Pipeline::new(config.clone())?
        .run(pdf_paths, output_dir.as_ref())
        .await
}

/// Synchronous wrapper around [`digest`].
///
/// Creates a temporary tokio runtime internally.
pub fn digest_sync(
    pdf_paths: &[PathBuf],
    output_dir: impl AsRef<Path>,
    config: &DigestConfig,
) -> Result<DigestOutput, DigestError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DigestError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(digest(pdf_paths, output_dir, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Pick the backends for extraction and synthesis, most specific first:
///
/// 1. **Pre-built backend** (`config.backend`): used for both stages.
/// 2. **Named provider** (`config.provider_name`): one edgequake-llm provider
///    per model, since providers are bound to a model at construction.
/// 3. **OpenAI** with `config.api_key`.
fn resolve_backends(
    config: &DigestConfig,
) -> Result<(Arc<dyn InferenceBackend>, Arc<dyn InferenceBackend>), DigestError> {
    if let Some(backend) = &config.backend {
        return Ok((Arc::clone(backend), Arc::clone(backend)));
    }

    if let Some(name) = &config.provider_name {
        let page: Arc<dyn InferenceBackend> =
            Arc::new(ProviderBackend::from_name(name, &config.model)?);
        let review_model = config.effective_review_model();
        let review: Arc<dyn InferenceBackend> = if review_model == config.model {
            Arc::clone(&page)
        } else {
            Arc::new(ProviderBackend::from_name(name, review_model)?)
        };
        return Ok((page, review));
    }

    let openai: Arc<dyn InferenceBackend> = Arc::new(OpenAiBackend::new(
        config.api_key.clone(),
        config.api_base_url.as_str(),
    )?);
    Ok((Arc::clone(&openai), openai))
}

/// Run [`write_atomic`] on the blocking pool.
async fn write_review(path: PathBuf, content: String) -> Result<(), DigestError> {
    tokio::task::spawn_blocking(move || write_atomic(&path, &content))
        .await
        .map_err(|e| DigestError::Internal(format!("Review write task panicked: {}", e)))?
}

/// Write `content` to `path` via a temp file in the same directory + rename.
fn write_atomic(path: &Path, content: &str) -> Result<(), DigestError> {
    let failed = |source: std::io::Error| DigestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(failed)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(content.as_bytes()).map_err(failed)?;
    tmp.persist(path).map_err(|e| failed(e.error))?;
    Ok(())
}
