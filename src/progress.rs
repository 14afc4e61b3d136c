//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn DigestProgressCallback>`] via
//! [`crate::config::DigestConfigBuilder::progress_callback`] to receive events
//! as papers are assembled and the review is synthesised. The CLI uses it to
//! drive its progress bar; a library user might forward events to a channel
//! or a log.
//!
//! The pipeline is sequential, so events arrive in order: one
//! `on_paper_start`, then that paper's `on_page_complete` calls in page order,
//! then `on_paper_complete`, and so on.

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline as it makes progress.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait DigestProgressCallback: Send + Sync {
    /// Called once before the first paper is rasterised.
    fn on_run_start(&self, total_papers: usize) {
        let _ = total_papers;
    }

    /// Called after a paper has been rasterised, before its first page is extracted.
    fn on_paper_start(&self, pdf: &Path, total_pages: usize) {
        let _ = (pdf, total_pages);
    }

    /// Called after a page's content has been appended to the paper file.
    fn on_page_complete(&self, pdf: &Path, page: usize, total_pages: usize, content_len: usize) {
        let _ = (pdf, page, total_pages, content_len);
    }

    /// Called once all of a paper's pages are folded in.
    fn on_paper_complete(&self, pdf: &Path, title: &str) {
        let _ = (pdf, title);
    }

    /// Called before the review request is sent.
    fn on_review_start(&self, paper_count: usize) {
        let _ = paper_count;
    }

    /// Called after the review file has been written.
    fn on_review_complete(&self, content_len: usize) {
        let _ = content_len;
    }
}

/// Convenience type alias for an optional, shareable progress callback.
pub type ProgressCallback = Arc<dyn DigestProgressCallback>;

/// A no-op implementation, useful as a default or in tests.
pub struct NoopProgressCallback;

impl DigestProgressCallback for NoopProgressCallback {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl DigestProgressCallback for Recorder {
        fn on_paper_start(&self, pdf: &Path, total_pages: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start {} {}", pdf.display(), total_pages));
        }

        fn on_page_complete(&self, _pdf: &Path, page: usize, _total: usize, _len: usize) {
            self.events.lock().unwrap().push(format!("page {page}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2);
        cb.on_paper_start(Path::new("a.pdf"), 3);
        cb.on_page_complete(Path::new("a.pdf"), 1, 3, 42);
        cb.on_paper_complete(Path::new("a.pdf"), "A");
        cb.on_review_start(2);
        cb.on_review_complete(1000);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let rec = Recorder::default();
        rec.on_paper_start(Path::new("a.pdf"), 2);
        rec.on_page_complete(Path::new("a.pdf"), 1, 2, 10);
        rec.on_review_start(1);
        assert_eq!(
            *rec.events.lock().unwrap(),
            vec!["start a.pdf 2".to_string(), "page 1".to_string()]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
    }
}
