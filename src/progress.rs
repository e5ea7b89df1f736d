//! Progress-callback trait for batch conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as [`crate::convert_batch`] works through its inputs.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a database record or a terminal progress bar
//! without the library knowing how the host application communicates. The
//! trait is `Send + Sync` because documents are converted concurrently.
//!
//! # Example
//!
//! ```rust
//! use edgequake_office2md::{ConversionProgressCallback, ConversionConfig, ConversionStats};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, input: &str, stats: &ConversionStats) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{input}: {} images", stats.images_total);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ConversionStats;
use std::sync::Arc;

/// Called by [`crate::convert_batch`] as documents start and finish.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Up to `concurrency` documents run at once, so `on_document_*` may be
/// called concurrently. Protect shared mutable state with `Mutex` or atomics.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first document starts.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document is picked up.
    fn on_document_start(&self, input: &str) {
        let _ = input;
    }

    /// Called when a document's Markdown has been written.
    fn on_document_complete(&self, input: &str, stats: &ConversionStats) {
        let _ = (input, stats);
    }

    /// Called when a document failed fatally.
    fn on_document_error(&self, input: &str, error: &str) {
        let _ = (input, error);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
