//! # edgequake-spool
//!
//! Take ownership of raw print-spooler output and queue it for conversion.
//!
//! ## Why this crate?
//!
//! A print spooler drops one raw file per job (usually PostScript) into a
//! watched folder and may delete or overwrite it at any moment. The
//! converter that turns those files into documents runs on its own schedule.
//! This crate sits between the two: it copies each raw file into a private
//! spool workspace, records who printed what and on which printer, persists
//! that as a job descriptor, and hands descriptors to exactly one consumer in
//! submission order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! raw spool file
//!  │
//!  ├─ 1. Intake    validate → allocate workspace → copy → describe → persist
//!  │               (blocking I/O, one spawn_blocking task per file)
//!  ├─ 2. Queue     FIFO, deduplicated by canonical descriptor path
//!  │               └─ new-arrival broadcast to subscribers
//!  └─ 3. Consumer  peek → convert (not part of this crate) → remove
//! ```
//!
//! An intake either yields a complete descriptor or leaves nothing behind:
//! every failure after the workspace exists removes it again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_spool::{Intake, JsonDescriptorStore, PendingJobQueue, SpoolConfig};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SpoolConfig::builder()
//!         .spool_folder("/var/spool/edgequake")
//!         .default_printer("HP-Default")
//!         .build()?;
//!     let intake = Intake::new(&config);
//!     let queue = PendingJobQueue::new(Arc::new(JsonDescriptorStore), config.notification_capacity);
//!
//!     let job = intake.take_ownership("/tmp/job.ps", &config.spool_folder, "")?;
//!     queue.add(job);
//!
//!     while let Some(job) = queue.peek() {
//!         println!("converting {}", job.descriptor_path.display());
//!         queue.remove_and_delete(&job);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `spoolq` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-spool = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod format;
pub mod host;
pub mod intake;
pub mod job;
pub mod progress;
pub mod queue;
pub mod store;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{SettingsProvider, SpoolConfig, SpoolConfigBuilder};
pub use error::{IntakeError, StoreError};
pub use format::{FormatHandler, PdfHandler, PostScriptHandler, SourceFormat};
pub use host::{HostIdentity, StaticIdentity, SystemIdentity};
pub use intake::{ingest_all, IngestOutcome, Intake};
pub use job::{JobDescriptor, RawInputFile, SourceFileRecord};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use queue::{ArrivalStream, PendingJobQueue};
pub use store::{DescriptorStore, JsonDescriptorStore};
pub use workspace::WorkspaceAllocator;
