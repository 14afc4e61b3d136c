//! Configuration for a paper-digest run.
//!
//! All pipeline behaviour is controlled through [`DigestConfig`], built via
//! its [`DigestConfigBuilder`]. The API credential is part of the config: it
//! is read from the environment once, by [`DigestConfig::from_env`], and then
//! injected into the backend at construction time. Nothing else in the crate
//! looks at environment variables.

use crate::backend::openai::{API_KEY_ENV, DEFAULT_BASE_URL};
use crate::backend::InferenceBackend;
use crate::error::DigestError;
use crate::pipeline::rasterize::PageRasterizer;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a paper-digest run.
///
/// Built via [`DigestConfig::builder()`] or using [`DigestConfig::default()`].
///
/// # Example
/// ```rust
/// use paper_digest::DigestConfig;
///
/// let config = DigestConfig::builder()
///     .model("gpt-4o")
///     .api_key("sk-...")
///     .review_max_tokens(16_384)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DigestConfig {
    /// Model used for per-page extraction. Default: `gpt-4o`.
    pub model: String,

    /// Model used for review synthesis. If None, uses `model`.
    pub review_model: Option<String>,

    /// edgequake-llm provider name (e.g. "anthropic", "gemini", "ollama").
    /// If None, the OpenAI backend is used.
    pub provider_name: Option<String>,

    /// Pre-constructed inference backend. Takes precedence over `provider_name`.
    pub backend: Option<Arc<dyn InferenceBackend>>,

    /// Pre-constructed rasteriser. If None, `pdftoppm` is used.
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,

    /// OpenAI API key. Absence is reported as
    /// [`DigestError::MissingCredential`] before any network call.
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API. Default: `https://api.openai.com/v1`.
    pub api_base_url: String,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription and synthesis both benefit from a model that stays close
    /// to its input.
    pub temperature: f32,

    /// Output-token bound for each page extraction. Default: 4096.
    pub page_max_tokens: usize,

    /// Output-token bound for the review. Default: 16384.
    ///
    /// If the review would need more, the backend truncates it. Truncation is
    /// logged, not treated as an error.
    pub review_max_tokens: usize,

    /// Rasteriser executable. Default: `pdftoppm`.
    pub pdftoppm_path: PathBuf,

    /// Directory for transient page images. Default: `./tmp`.
    pub work_dir: PathBuf,

    /// Fixed base name for page images; pdftoppm appends `-<n>.png`.
    /// Default: `tmpPdfImage`.
    pub image_base_name: String,

    /// File name of the final review inside the output directory.
    /// Default: `review.md`.
    pub review_file_name: String,

    /// Custom extraction prompt. If None, uses [`crate::prompts::EXTRACTION_PROMPT`].
    pub extraction_prompt: Option<String>,

    /// Custom review prompt. If None, uses [`crate::prompts::REVIEW_PROMPT`].
    pub review_prompt: Option<String>,

    /// Deadline for rasterising one PDF, in seconds. Default: 300.
    pub rasterize_timeout_secs: u64,

    /// Deadline for loading one image (file read or HTTP fetch), in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Deadline for one page-extraction call, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Deadline for the review call, in seconds. Default: 600.
    ///
    /// The review request carries every paper in full and asks for a long
    /// answer; it routinely takes minutes.
    pub review_timeout_secs: u64,

    /// Retries of a failed inference call. Default: 0 (no retry).
    ///
    /// Only [`DigestError::InferenceFailed`] is retried. Schema violations and
    /// missing credentials fail the same way every time.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            review_model: None,
            provider_name: None,
            backend: None,
            rasterizer: None,
            api_key: None,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.1,
            page_max_tokens: 4096,
            review_max_tokens: 16_384,
            pdftoppm_path: PathBuf::from("pdftoppm"),
            work_dir: PathBuf::from("./tmp"),
            image_base_name: "tmpPdfImage".to_string(),
            review_file_name: "review.md".to_string(),
            extraction_prompt: None,
            review_prompt: None,
            rasterize_timeout_secs: 300,
            download_timeout_secs: 60,
            api_timeout_secs: 120,
            review_timeout_secs: 600,
            max_retries: 0,
            retry_backoff_ms: 500,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DigestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestConfig")
            .field("model", &self.model)
            .field("review_model", &self.review_model)
            .field("provider_name", &self.provider_name)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn PageRasterizer>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("temperature", &self.temperature)
            .field("page_max_tokens", &self.page_max_tokens)
            .field("review_max_tokens", &self.review_max_tokens)
            .field("pdftoppm_path", &self.pdftoppm_path)
            .field("work_dir", &self.work_dir)
            .field("review_file_name", &self.review_file_name)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl DigestConfig {
    /// Create a new builder for `DigestConfig`.
    pub fn builder() -> DigestConfigBuilder {
        DigestConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults plus the API key from `OPENAI_API_KEY`, if set and non-empty.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()),
            ..Self::default()
        }
    }

    /// The model used for synthesis.
    pub fn effective_review_model(&self) -> &str {
        self.review_model.as_deref().unwrap_or(&self.model)
    }

    pub fn rasterize_timeout(&self) -> Duration {
        Duration::from_secs(self.rasterize_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn review_timeout(&self) -> Duration {
        Duration::from_secs(self.review_timeout_secs)
    }
}

/// Builder for [`DigestConfig`].
pub struct DigestConfigBuilder {
    config: DigestConfig,
}

impl fmt::Debug for DigestConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl DigestConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn review_model(mut self, model: impl Into<String>) -> Self {
        self.config.review_model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn page_max_tokens(mut self, n: usize) -> Self {
        self.config.page_max_tokens = n;
        self
    }

    pub fn review_max_tokens(mut self, n: usize) -> Self {
        self.config.review_max_tokens = n;
        self
    }

    pub fn pdftoppm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdftoppm_path = path.into();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn image_base_name(mut self, name: impl Into<String>) -> Self {
        self.config.image_base_name = name.into();
        self
    }

    pub fn review_file_name(mut self, name: impl Into<String>) -> Self {
        self.config.review_file_name = name.into();
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn review_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.review_prompt = Some(prompt.into());
        self
    }

    pub fn rasterize_timeout_secs(mut self, secs: u64) -> Self {
        self.config.rasterize_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn review_timeout_secs(mut self, secs: u64) -> Self {
        self.config.review_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DigestConfig, DigestError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(DigestError::InvalidConfig("model must not be empty".into()));
        }
        if matches!(c.review_model.as_deref(), Some(m) if m.trim().is_empty()) {
            return Err(DigestError::InvalidConfig(
                "review model must not be empty".into(),
            ));
        }
        if c.image_base_name.is_empty() || c.image_base_name.contains(['/', '\\']) {
            return Err(DigestError::InvalidConfig(format!(
                "image base name must be a bare file name, got '{}'",
                c.image_base_name
            )));
        }
        if c.review_file_name.is_empty() || c.review_file_name.contains(['/', '\\']) {
            return Err(DigestError::InvalidConfig(format!(
                "review file name must be a bare file name, got '{}'",
                c.review_file_name
            )));
        }
        let timeouts = [
            ("rasterize", c.rasterize_timeout_secs),
            ("download", c.download_timeout_secs),
            ("api", c.api_timeout_secs),
            ("review", c.review_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(DigestError::InvalidConfig(format!(
                "{name} timeout must be ≥ 1s"
            )));
        }
        if c.page_max_tokens == 0 || c.review_max_tokens == 0 {
            return Err(DigestError::InvalidConfig(
                "max token bounds must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
