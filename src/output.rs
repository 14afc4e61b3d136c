//! Data that flows between pipeline stages, plus the final run output.
//!
//! ```text
//! PageImage ──▶ ExtractionResult ──▶ PaperArtifact ──▶ ReviewPaperResult
//! (rasterise)   (one page, VLM)      (one paper, .md)   (all papers, VLM)
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// One rasterised page of a source PDF.
///
/// `page` is 1-based and follows the rasteriser's emission order, so within
/// one rasterisation run it is strictly increasing with no gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    /// The PDF this page was rendered from.
    pub pdf_path: PathBuf,
    /// 1-indexed page number.
    pub page: usize,
    /// Where the rendered image lives (transient; deleted once consumed).
    pub image_path: PathBuf,
}

/// Structured content the model extracted from one page image.
///
/// Field names on the wire follow the `extractionResult` schema
/// (`createdAt` is camelCase). Unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExtractionResult {
    pub title: String,
    pub authors: Vec<String>,
    /// Page content as Markdown. Never null; may be empty.
    pub content: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// An assembled paper: its Markdown file plus the metadata taken from page 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperArtifact {
    /// Title captured from the first page; never overwritten.
    pub title: String,
    /// Authors captured from the first page.
    pub authors: Vec<String>,
    /// Creation date captured from the first page (free-form, as extracted).
    pub created_at: String,
    /// The accumulated Markdown file.
    pub path: PathBuf,
    /// Number of pages folded into `path`.
    pub pages: usize,
    /// The PDF this artifact was assembled from.
    pub source_pdf: PathBuf,
}

/// The synthesised cross-paper review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ReviewPaperResult {
    pub title: String,
    /// Review body as Markdown with inline `[n]` citations.
    pub content: String,
    /// Citation strings; entry `n - 1` is what `[n]` refers to.
    pub references: Vec<String>,
}

static CITATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d{1,4})\]").expect("valid citation regex"));

impl ReviewPaperResult {
    /// Inline citation numbers that have no matching entry in `references`.
    ///
    /// Returns them sorted and deduplicated. An empty result means every
    /// `[n]` in `content` resolves to `references[n - 1]`.
    pub fn dangling_citations(&self) -> Vec<usize> {
        let cited: BTreeSet<usize> = CITATION
            .captures_iter(&self.content)
            .filter_map(|c| c[1].parse::<usize>().ok())
            .collect();
        cited
            .into_iter()
            .filter(|&n| n == 0 || n > self.references.len())
            .collect()
    }
}

/// Aggregate statistics for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestStats {
    /// Papers assembled.
    pub papers: usize,
    /// Pages extracted across all papers.
    pub pages: usize,
    /// Wall-clock time for the whole run.
    pub duration_ms: u64,
    /// Whether the backend reported the review as cut off at the token bound.
    pub review_truncated: bool,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestOutput {
    /// Assembled papers, in input order.
    pub papers: Vec<PaperArtifact>,
    /// The synthesised review.
    pub review: ReviewPaperResult,
    /// Path of the final review file.
    pub review_path: PathBuf,
    pub stats: DigestStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(content: &str, refs: usize) -> ReviewPaperResult {
        ReviewPaperResult {
            title: "Review".into(),
            content: content.into(),
            references: (1..=refs).map(|i| format!("ref {i}")).collect(),
        }
    }

    #[test]
    fn citations_within_references_are_clean() {
        let r = review("Transformers [1] beat RNNs [2], see also [1].", 2);
        assert!(r.dangling_citations().is_empty());
    }

    #[test]
    fn citations_beyond_references_are_reported() {
        let r = review("As shown in [3] and [5], and [0].", 3);
        assert_eq!(r.dangling_citations(), vec![0, 5]);
    }

    #[test]
    fn extraction_result_uses_camel_case_created_at() {
        let json = r#"{"title":"T","authors":["A"],"content":"c","createdAt":"2024"}"#;
        let parsed: ExtractionResult = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.created_at, "2024");
    }

    #[test]
    fn extraction_result_rejects_unknown_fields() {
        let json = r#"{"title":"T","authors":[],"content":"","createdAt":"","extra":1}"#;
        assert!(serde_json::from_str::<ExtractionResult>(json).is_err());
    }
}
