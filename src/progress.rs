//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks the statement's pages.
//!
//! # Example
//!
//! ```rust
//! use edgequake_statement::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RecordCounter {
//!     records: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for RecordCounter {
//!     fn on_page_complete(&self, _page: usize, _total: usize, records: usize) {
//!         self.records.fetch_add(records, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(RecordCounter { records: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pages are handled sequentially, but the trait is
/// `Send + Sync` so one callback can be shared across concurrent requests.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once OCR and rendering are done and the page count is known.
    fn on_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the extraction model is invoked for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called after a page's extraction call returned.
    ///
    /// `records` is zero when the reply was degraded.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, records: usize) {
        let _ = (page_num, total_pages, records);
    }

    /// Called for a page that has no table markup or no image.
    fn on_page_skipped(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called once after every page has been handled.
    fn on_complete(&self, total_records: usize) {
        let _ = total_records;
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        started: AtomicUsize,
        skipped: AtomicUsize,
        records: AtomicUsize,
    }

    impl ExtractionProgressCallback for Tracking {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, records: usize) {
            self.records.fetch_add(records, Ordering::SeqCst);
        }

        fn on_page_skipped(&self, _page_num: usize, _total_pages: usize) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_start(3);
        cb.on_page_start(1, 3);
        cb.on_page_complete(1, 3, 12);
        cb.on_page_skipped(2, 3);
        cb.on_complete(12);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let cb: Arc<dyn ExtractionProgressCallback> = Arc::new(Tracking::default());
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 5);
        cb.on_page_skipped(2, 2);

        let t = Tracking::default();
        t.on_page_start(1, 1);
        t.on_page_complete(1, 1, 7);
        t.on_page_skipped(1, 1);
        assert_eq!(t.started.load(Ordering::SeqCst), 1);
        assert_eq!(t.records.load(Ordering::SeqCst), 7);
        assert_eq!(t.skipped.load(Ordering::SeqCst), 1);
    }
}
