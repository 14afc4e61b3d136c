//! # paper-digest
//!
//! Digest PDF research papers into Markdown with a Vision Language Model,
//! then synthesise a single review paper across all of them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDFs (in order)
//!  │
//!  ├─ 1. Rasterise   pdftoppm → ordered page images
//!  ├─ 2. Encode      image → canonical base64 PNG
//!  ├─ 3. Extract     one schema-constrained VLM call per page
//!  │                 {title, authors, content, createdAt}
//!  ├─ 4. Assemble    append "<content>\nPage <n>\n\n" per page to <stem>.md,
//!  │                 delete each page image once consumed
//!  ├─ 5. Synthesise  one schema-constrained call over every paper file
//!  │                 {title, content, references}
//!  └─ 6. Output      review content written to <output_dir>/review.md
//! ```
//!
//! Everything runs sequentially. The first failing paper aborts the run with
//! [`DigestError::PipelineAborted`]; no review is produced from a partial set.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper_digest::{digest, DigestConfig};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads OPENAI_API_KEY once; nothing else touches the environment.
//!     let config = DigestConfig::from_env();
//!     let pdfs = vec![PathBuf::from("a.pdf"), PathBuf::from("b.pdf")];
//!     let output = digest(&pdfs, "out", &config).await?;
//!     println!("{}", output.review.title);
//!     eprintln!("review written to {}", output.review_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paper-digest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External Requirements
//!
//! Rasterisation shells out to poppler's `pdftoppm`, which must be on `PATH`
//! (or configured via [`DigestConfig::pdftoppm_path`]). Any other rasteriser
//! can be plugged in through [`PageRasterizer`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod digest;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{BackendError, InferenceBackend, InferenceReply, InferenceRequest, RequestMessage, Role};
pub use config::{DigestConfig, DigestConfigBuilder};
pub use digest::{digest, digest_sync, Pipeline};
pub use error::DigestError;
pub use output::{
    DigestOutput, DigestStats, ExtractionResult, PageImage, PaperArtifact, ReviewPaperResult,
};
pub use pipeline::assemble::PaperAssembler;
pub use pipeline::encode::{EncodedImage, ImageEncoder};
pub use pipeline::extract::PageExtractor;
pub use pipeline::rasterize::{PageRasterizer, PdftoppmRasterizer};
pub use pipeline::synthesize::ReviewSynthesizer;
pub use progress::{DigestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::OutputSchema;
