//! Error types for the paper-digest library.
//!
//! Every stage returns `Result<_, DigestError>` and fails fast. Each variant
//! carries enough context (PDF path, page number, file path or a short
//! `target` description) for the caller to report exactly where the run
//! stopped.
//!
//! Inference backends speak their own smaller [`crate::backend::BackendError`];
//! the stage that issued the request maps it into
//! [`DigestError::InferenceFailed`] and attaches the page or synthesis target.
//!
//! There is no "partial success" variant: a paper either assembles
//! completely or the run aborts with [`DigestError::PipelineAborted`].

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the paper-digest library.
#[derive(Debug, Error)]
pub enum DigestError {
    // ── Rasterisation ─────────────────────────────────────────────────────
    /// The external rasteriser exited non-zero, could not be spawned, timed
    /// out, or produced no page images. `detail` holds its diagnostic stream.
    #[error("Rasterisation failed for '{pdf}': {detail}")]
    RasterizationFailed { pdf: PathBuf, detail: String },

    // ── Image encoding ────────────────────────────────────────────────────
    /// The image could not be read from disk or fetched from its URL.
    #[error("Image source '{location}' is unreadable: {reason}")]
    SourceUnreadable { location: String, reason: String },

    /// The bytes were read but are not a raster image we can decode.
    #[error("Image '{location}' cannot be decoded: {detail}")]
    DecodeUnsupported { location: String, detail: String },

    // ── Inference ─────────────────────────────────────────────────────────
    /// No API credential was configured for the inference backend.
    #[error("No API credential configured.\n{hint}")]
    MissingCredential { hint: String },

    /// Transport or backend failure (including timeouts) for `target`.
    #[error("Inference failed for {target}: {detail}")]
    InferenceFailed { target: String, detail: String },

    /// The backend answered, but the payload does not satisfy `schema`.
    #[error("Response for {target} violates schema '{schema}': {detail}")]
    SchemaViolation {
        schema: String,
        target: String,
        detail: String,
    },

    // ── Review synthesis ──────────────────────────────────────────────────
    /// A paper artifact is missing, unreadable, or empty at synthesis time.
    #[error("Paper file '{path}' is unreadable: {reason}")]
    PaperUnreadable { path: PathBuf, reason: String },

    // ── Driver ────────────────────────────────────────────────────────────
    /// Paper `paper_index` (0-based, input order) failed; no review was produced.
    #[error("Pipeline aborted at paper {paper_index} ('{pdf}'): {source}")]
    PipelineAborted {
        paper_index: usize,
        pdf: PathBuf,
        #[source]
        source: Box<DigestError>,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create, append to, or rename an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DigestError {
    /// The innermost error, looking through any [`DigestError::PipelineAborted`] wrapper.
    pub fn root_cause(&self) -> &DigestError {
        match self {
            DigestError::PipelineAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether a caller-level retry policy may reasonably try again.
    ///
    /// Only transport/backend failures qualify; credential, schema and I/O
    /// errors will fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DigestError::InferenceFailed { .. })
    }
}
