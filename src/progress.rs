//! Progress-callback trait for batch intake events.
//!
//! Pass an [`Arc<dyn IngestProgressCallback>`] to
//! [`crate::intake::ingest_all`] to hear about each raw file as it is taken
//! over. Callbacks run on the task driving the batch, never while the
//! pending-job queue is locked.
//!
//! # Example
//!
//! ```rust
//! use edgequake_spool::IngestProgressCallback;
//! use std::path::Path;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     queued: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, raw: &Path, descriptor: &Path, queued: bool) {
//!         if queued {
//!             self.queued.fetch_add(1, Ordering::SeqCst);
//!         }
//!         eprintln!("{} → {}", raw.display(), descriptor.display());
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::intake::ingest_all`] as it processes each raw file.
///
/// All methods have default no-op implementations. With concurrency above 1,
/// `on_file_complete` and `on_file_error` may arrive in any order.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once before any file is processed.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a raw file became a persisted descriptor.
    ///
    /// `queued` is false when an identical job was already pending.
    fn on_file_complete(&self, raw: &Path, descriptor: &Path, queued: bool) {
        let _ = (raw, descriptor, queued);
    }

    /// Called when intake of a raw file failed.
    fn on_file_error(&self, raw: &Path, error: &str) {
        let _ = (raw, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias for a shared callback.
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
