//! PDF rasterisation: run `pdftoppm` and collect the page images it wrote.
//!
//! `pdftoppm -png -progress <pdf> <work_dir>/<base>` writes one PNG per page
//! and reports each on stderr as `<page> <last-page> <path>`. The same stream
//! also carries human-readable diagnostics ("Syntax Error: …", "Syntax
//! Warning: …") interleaved with the records, so only lines matching the
//! record shape are treated as image paths.
//!
//! Images are left on disk; [`crate::pipeline::assemble::PaperAssembler`]
//! deletes each one after its page is consumed.

use crate::config::DigestConfig;
use crate::error::DigestError;
use crate::output::PageImage;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Turns one PDF into its ordered page images.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Rasterise `pdf_path`. Pages are returned in emission order with
    /// 1-based, gap-free `page` numbers.
    async fn rasterize(&self, pdf_path: &Path) -> Result<Vec<PageImage>, DigestError>;
}

/// `<page> <last-page> <path>`; the path may contain spaces.
static PROGRESS_RECORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+)\s+(\d+)\s+(\S.*?)\s*$").expect("valid progress regex"));

/// Parse a `pdftoppm -progress` stream into page images for `pdf_path`.
///
/// Non-record lines are skipped. Page numbers are assigned from emission
/// order, starting at 1.
pub fn parse_progress(stream: &str, pdf_path: &Path) -> Vec<PageImage> {
    let mut pages = Vec::new();
    for line in stream.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(caps) = PROGRESS_RECORD.captures(line) else {
            debug!("Skipping rasteriser diagnostic: {}", line);
            continue;
        };
        pages.push(PageImage {
            pdf_path: pdf_path.to_path_buf(),
            page: pages.len() + 1,
            image_path: PathBuf::from(&caps[3]),
        });
    }
    pages
}

/// [`PageRasterizer`] backed by poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: PathBuf,
    work_dir: PathBuf,
    base_name: String,
    timeout: Duration,
}

impl PdftoppmRasterizer {
    pub fn new(
        program: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        base_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
            base_name: base_name.into(),
            timeout,
        }
    }

    pub fn from_config(config: &DigestConfig) -> Self {
        Self::new(
            &config.pdftoppm_path,
            &config.work_dir,
            &config.image_base_name,
            config.rasterize_timeout(),
        )
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf_path: &Path) -> Result<Vec<PageImage>, DigestError> {
        let failed = |detail: String| DigestError::RasterizationFailed {
            pdf: pdf_path.to_path_buf(),
            detail,
        };

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| {
                failed(format!(
                    "cannot create work dir '{}': {e}",
                    self.work_dir.display()
                ))
            })?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("-png")
            .arg("-progress")
            .arg(pdf_path)
            .arg(self.work_dir.join(&self.base_name))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(failed(format!(
                    "could not run '{}': {e}",
                    self.program.display()
                )))
            }
            Err(_) => {
                return Err(failed(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(failed(format!("{}: {}", output.status, stderr.trim())));
        }

        let pages = parse_progress(&stderr, pdf_path);
        info!("Rasterised '{}': {} pages", pdf_path.display(), pages.len());
        Ok(pages)
    }
}
