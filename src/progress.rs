//! Progress-callback trait for per-image batch events.
//!
//! Inject an [`Arc<dyn EnhanceProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the batch entry points process each image.
//!
//! # Example
//!
//! ```rust
//! use docnorm::{EnhanceProgressCallback, PipelineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl EnhanceProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, index: usize, total: usize, elapsed_ms: u64) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Image {}/{} done in {}ms", index + 1, total, elapsed_ms);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn EnhanceProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch entry points as they process each image.
///
/// Images run concurrently on blocking worker threads, so `on_image_start`,
/// `on_image_complete`, and `on_image_error` may be called from different
/// threads at once. All methods default to no-ops.
pub trait EnhanceProgressCallback: Send + Sync {
    /// Called once before any image is processed.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a worker picks up an image.
    ///
    /// # Arguments
    /// * `index` — 0-based position of the image in the batch
    /// * `total` — batch size
    fn on_image_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when an image has passed all five stages.
    fn on_image_complete(&self, index: usize, total: usize, elapsed_ms: u64) {
        let _ = (index, total, elapsed_ms);
    }

    /// Called when a stage fails for an image.
    fn on_image_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every image has been attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl EnhanceProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn EnhanceProgressCallback>;
