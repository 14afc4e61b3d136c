//! In-memory stand-ins for the two external black boxes: the rasteriser and
//! the inference backend. Shared by the integration test binaries.

#![allow(dead_code)]

use async_trait::async_trait;
use paper_digest::{
    BackendError, DigestConfig, DigestError, InferenceBackend, InferenceReply, InferenceRequest,
    PageImage, PageRasterizer,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Rasteriser ───────────────────────────────────────────────────────────────

/// Writes `pages` tiny real PNGs per PDF into a scratch directory.
///
/// PDFs registered with [`FakeRasterizer::fail_on`] fail with
/// `RasterizationFailed`; unknown PDFs rasterise to one page.
pub struct FakeRasterizer {
    work_dir: PathBuf,
    page_counts: HashMap<PathBuf, usize>,
    failing: HashSet<PathBuf>,
    calls: Mutex<Vec<PathBuf>>,
}

impl FakeRasterizer {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            page_counts: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn pages(mut self, pdf: impl Into<PathBuf>, count: usize) -> Self {
        self.page_counts.insert(pdf.into(), count);
        self
    }

    pub fn fail_on(mut self, pdf: impl Into<PathBuf>) -> Self {
        self.failing.insert(pdf.into());
        self
    }

    /// PDFs rasterised so far, in call order.
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    /// Path the image for `page` of `pdf` is written to.
    pub fn image_path(&self, pdf: &Path, page: usize) -> PathBuf {
        let stem = pdf.file_stem().unwrap().to_string_lossy();
        self.work_dir.join(format!("{stem}-{page}.png"))
    }
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    async fn rasterize(&self, pdf_path: &Path) -> Result<Vec<PageImage>, DigestError> {
        self.calls.lock().unwrap().push(pdf_path.to_path_buf());
        if self.failing.contains(pdf_path) {
            return Err(DigestError::RasterizationFailed {
                pdf: pdf_path.to_path_buf(),
                detail: "Syntax Error: Couldn't read xref table".into(),
            });
        }

        std::fs::create_dir_all(&self.work_dir).unwrap();
        let count = self.page_counts.get(pdf_path).copied().unwrap_or(1);
        let pages = (1..=count)
            .map(|page| {
                let image_path = self.image_path(pdf_path, page);
                // Shade varies with the page so every image is distinct.
                let shade = (page * 40 % 256) as u8;
                image::RgbImage::from_pixel(4, 4, image::Rgb([shade, shade, shade]))
                    .save(&image_path)
                    .unwrap();
                PageImage {
                    pdf_path: pdf_path.to_path_buf(),
                    page,
                    image_path,
                }
            })
            .collect();
        Ok(pages)
    }
}

// ── Inference backend ────────────────────────────────────────────────────────

/// Replays queued replies in order and records every request it receives.
///
/// Paths passed to [`ScriptedBackend::watch`] are checked for existence at
/// the start of every call, which lets tests observe when page images are
/// deleted relative to the requests.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<InferenceReply, BackendError>>>,
    requests: Mutex<Vec<InferenceRequest>>,
    watched: Mutex<Vec<PathBuf>>,
    snapshots: Mutex<Vec<Vec<bool>>>,
    has_credential: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            watched: Mutex::new(Vec::new()),
            snapshots: Mutex::new(Vec::new()),
            has_credential: true,
        }
    }

    /// A backend whose credential check always fails.
    pub fn without_credential() -> Self {
        Self {
            has_credential: false,
            ..Self::new()
        }
    }

    pub fn reply(self, content: impl Into<String>) -> Self {
        self.queue(content.into(), false)
    }

    /// Queue a reply the backend reports as cut off at its token bound.
    pub fn truncated_reply(self, content: impl Into<String>) -> Self {
        self.queue(content.into(), true)
    }

    fn queue(self, content: String, truncated: bool) -> Self {
        self.replies.lock().unwrap().push_back(Ok(InferenceReply {
            content,
            prompt_tokens: 10,
            completion_tokens: 20,
            truncated,
        }));
        self
    }

    /// Queue a well-formed extraction payload.
    pub fn page(self, title: &str, content: &str) -> Self {
        self.reply(page_json(title, content))
    }

    pub fn fail(self, error: BackendError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn watch(&self, paths: impl IntoIterator<Item = PathBuf>) {
        self.watched.lock().unwrap().extend(paths);
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Schema name of every request, in call order.
    pub fn schema_names(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.schema.name.to_string())
            .collect()
    }

    /// One existence vector (in `watch` order) per call.
    pub fn snapshots(&self) -> Vec<Vec<bool>> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn check_credential(&self) -> Result<(), DigestError> {
        if self.has_credential {
            Ok(())
        } else {
            Err(DigestError::MissingCredential {
                hint: "set OPENAI_API_KEY".into(),
            })
        }
    }

    async fn complete(&self, request: &InferenceRequest) -> Result<InferenceReply, BackendError> {
        let snapshot = self
            .watched
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.exists())
            .collect();
        self.snapshots.lock().unwrap().push(snapshot);
        self.requests.lock().unwrap().push(request.clone());

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::EmptyResponse("no scripted reply left".into())))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

pub fn page_json(title: &str, content: &str) -> String {
    serde_json::json!({
        "title": title,
        "authors": ["Ada Lovelace", "Alan Turing"],
        "content": content,
        "createdAt": "2017-06-12",
    })
    .to_string()
}

pub fn review_json(title: &str, content: &str, references: &[&str]) -> String {
    serde_json::json!({
        "title": title,
        "content": content,
        "references": references,
    })
    .to_string()
}

/// A config wired to the fakes, with no retries and short timeouts.
pub fn test_config(
    backend: Arc<ScriptedBackend>,
    rasterizer: Arc<FakeRasterizer>,
) -> DigestConfig {
    DigestConfig::builder()
        .backend(backend)
        .rasterizer(rasterizer)
        .api_timeout_secs(5)
        .review_timeout_secs(5)
        .build()
        .unwrap()
}
