//! Error types for the edgequake-spool library.
//!
//! Two distinct error types reflect two distinct failure domains:
//!
//! * [`IntakeError`]: **terminal for one intake attempt**. The raw file could
//!   not be turned into a persisted job descriptor. Nothing is retried
//!   internally; the producer decides whether to re-observe the file later.
//!
//! * [`StoreError`]: a descriptor could not be written, read or deleted by a
//!   [`crate::store::DescriptorStore`]. During intake it is wrapped in
//!   [`IntakeError::PersistFailed`]; on queue removal it is only logged.

use crate::format::SourceFormat;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by [`crate::intake::Intake::take_ownership`].
///
/// Every variant from [`IntakeError::WorkspaceAllocationFailed`] onward is
/// produced only after any workspace created by the attempt has been removed.
#[derive(Debug, Error)]
pub enum IntakeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The raw file path was empty or otherwise unusable.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The raw file does not exist on disk.
    #[error("Spool file not found: '{path}'\nThe spooler may already have removed it.")]
    SourceNotFound { path: PathBuf },

    /// The file exists but its format handler rejected it.
    #[error("'{path}' is not a valid {format} file")]
    UnsupportedOrCorruptFormat { path: PathBuf, format: SourceFormat },

    /// The same raw file is already being taken over by another intake.
    #[error("Intake of '{path}' is already in progress")]
    InProgress { path: PathBuf },

    // ── Spool errors ──────────────────────────────────────────────────────
    /// No fresh workspace directory could be created.
    #[error("Could not allocate a spool workspace for '{name}' in '{base}': {detail}")]
    WorkspaceAllocationFailed {
        base: PathBuf,
        name: String,
        detail: String,
    },

    /// Copying the raw file into its workspace failed.
    #[error("Failed to copy '{from}' to '{to}': {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job descriptor could not be written.
    #[error("Failed to persist job descriptor '{path}': {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a worker task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures of a [`crate::store::DescriptorStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading, writing or deleting a file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The descriptor could not be encoded.
    #[error("Failed to encode job descriptor: {0}")]
    Encode(#[source] serde_json::Error),

    /// A descriptor file exists but does not contain a valid descriptor.
    #[error("Job descriptor '{path}' is malformed: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A descriptor must reference at least one source file.
    #[error("Job descriptor '{path}' has no source files")]
    Empty { path: PathBuf },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
