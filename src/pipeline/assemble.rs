//! Paper assembly: rasterise one PDF and fold every page into a Markdown file.
//!
//! Pages are processed strictly in ascending page order. After each page:
//!
//! 1. its content is appended to `<output_dir>/<pdf stem>.md`, followed by a
//!    `Page <n>` marker line and a blank line;
//! 2. its transient image is deleted.
//!
//! Any failure aborts the paper immediately. Pages not yet reached keep their
//! images and the partial Markdown file stays on disk for inspection; the
//! caller must not hand a failed paper to the review stage.

use crate::error::DigestError;
use crate::output::{PaperArtifact, PageImage};
use crate::pipeline::extract::PageExtractor;
use crate::pipeline::rasterize::PageRasterizer;
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// The text appended to a paper file for one page.
pub fn page_chunk(content: &str, page: usize) -> String {
    format!("{content}\nPage {page}\n\n")
}

/// Where the Markdown for `pdf_path` lives inside `output_dir`.
pub fn artifact_path(pdf_path: &Path, output_dir: &Path) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "paper".to_string());
    output_dir.join(format!("{stem}.md"))
}

/// Drives rasterisation and per-page extraction for one paper at a time.
pub struct PaperAssembler {
    rasterizer: Arc<dyn PageRasterizer>,
    extractor: PageExtractor,
    progress: Option<ProgressCallback>,
}

impl PaperAssembler {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, extractor: PageExtractor) -> Self {
        Self {
            rasterizer,
            extractor,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Assemble `pdf_path` into a Markdown file under `output_dir`.
    ///
    /// No file is created if rasterisation fails.
    pub async fn assemble(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
    ) -> Result<PaperArtifact, DigestError> {
        info!("Assembling '{}'", pdf_path.display());

        let mut pages = self.rasterizer.rasterize(pdf_path).await?;
        if pages.is_empty() {
            return Err(DigestError::RasterizationFailed {
                pdf: pdf_path.to_path_buf(),
                detail: "no page images were produced".into(),
            });
        }
        pages.sort_by_key(|p| p.page);
        let total = pages.len();

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| DigestError::OutputWriteFailed {
                path: output_dir.to_path_buf(),
                source: e,
            })?;

        let path = artifact_path(pdf_path, output_dir);
        let write_failed = |e: std::io::Error| DigestError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        };
        let mut file = tokio::fs::File::create(&path).await.map_err(write_failed)?;

        if let Some(cb) = &self.progress {
            cb.on_paper_start(pdf_path, total);
        }

        let mut first_page = None;
        for page in &pages {
            let result = self.extractor.extract(page).await?;

            file.write_all(page_chunk(&result.content, page.page).as_bytes())
                .await
                .map_err(write_failed)?;
            file.flush().await.map_err(write_failed)?;

            if let Some(cb) = &self.progress {
                cb.on_page_complete(pdf_path, page.page, total, result.content.len());
            }
            let content_len = result.content.len();
            if first_page.is_none() {
                first_page = Some(result);
            }

            discard_image(page).await;
            debug!(
                "'{}': page {}/{} folded in ({} chars)",
                pdf_path.display(),
                page.page,
                total,
                content_len
            );
        }

        // `pages` is non-empty, so the first page was captured.
        let first = first_page.ok_or_else(|| {
            DigestError::Internal(format!("no pages folded for '{}'", pdf_path.display()))
        })?;

        info!(
            "Assembled '{}' → '{}' ({} pages, title: {:?})",
            pdf_path.display(),
            path.display(),
            total,
            first.title
        );
        if let Some(cb) = &self.progress {
            cb.on_paper_complete(pdf_path, &first.title);
        }

        Ok(PaperArtifact {
            title: first.title,
            authors: first.authors,
            created_at: first.created_at,
            path,
            pages: total,
            source_pdf: pdf_path.to_path_buf(),
        })
    }
}

/// Delete a consumed page image. A leftover temp file is not worth failing
/// the paper over.
async fn discard_image(page: &PageImage) {
    if let Err(e) = tokio::fs::remove_file(&page.image_path).await {
        warn!(
            "Could not delete page image '{}': {}",
            page.image_path.display(),
            e
        );
    }
}
