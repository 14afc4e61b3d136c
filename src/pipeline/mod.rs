//! Pipeline stages for paper digestion.
//!
//! Each submodule implements exactly one step. The two external black boxes
//! (the rasteriser process and the inference backend) sit behind traits, so
//! every stage can be exercised with in-memory fakes.
//!
//! ## Data Flow
//!
//! ```text
//! rasterize ──▶ encode ──▶ extract ──▶ assemble ──▶ synthesize
//! (pdftoppm)    (PNG/b64)  (VLM, 1pg)  (paper .md)   (VLM, all papers)
//! ```
//!
//! 1. [`rasterize`]: run the rasteriser, parse its progress stream into
//!    ordered [`crate::output::PageImage`]s
//! 2. [`encode`]: load an image from disk or URL, re-encode as base64 PNG
//! 3. [`extract`]: one schema-constrained VLM call per page
//! 4. [`assemble`]: fold pages into the paper's Markdown file, in order,
//!    deleting each page image once consumed
//! 5. [`synthesize`]: one schema-constrained call over all paper files
//!
//! [`llm`] holds the deadline/retry wrapper both VLM stages share.

pub mod assemble;
pub mod encode;
pub mod extract;
pub mod llm;
pub mod rasterize;
pub mod synthesize;
