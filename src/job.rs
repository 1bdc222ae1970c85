//! Job data model: raw inputs, source-file records and job descriptors.

use crate::format::SourceFormat;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// A raw spool file as reported by the producer. Never owned by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInputFile {
    pub path: PathBuf,
    /// Printer the spooler received the job on, if known.
    pub printer_hint: Option<String>,
}

impl RawInputFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            printer_hint: None,
        }
    }

    pub fn with_printer(mut self, printer: impl Into<String>) -> Self {
        self.printer_hint = Some(printer.into());
        self
    }
}

/// One physical input captured for a job. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileRecord {
    /// Path of the private copy inside the spool workspace.
    pub filename: PathBuf,
    /// User the job was printed by.
    pub author: String,
    pub client_computer: String,
    pub copies: u32,
    pub document_title: String,
    pub job_counter: u32,
    pub job_id: u32,
    pub printer_name: String,
    pub session_id: u32,
    pub total_pages: u32,
    #[serde(rename = "type")]
    pub format: SourceFormat,
    /// Terminal-services station name, when the session has one.
    pub win_station: Option<String>,
}

/// One unit of pending conversion work.
///
/// Its identity is the location of its descriptor file; see
/// [`JobDescriptor::identity_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub source_files: Vec<SourceFileRecord>,
    /// Where the descriptor is persisted. Not part of the encoded body.
    #[serde(skip)]
    pub descriptor_path: PathBuf,
    /// Spool workspace owning the descriptor and its source copies.
    #[serde(skip)]
    pub workspace: PathBuf,
}

impl JobDescriptor {
    /// Build a descriptor whose file lives at `descriptor_path`.
    ///
    /// The workspace is the directory containing the descriptor file.
    pub fn new(source_files: Vec<SourceFileRecord>, descriptor_path: impl Into<PathBuf>) -> Self {
        let descriptor_path = descriptor_path.into();
        let workspace = descriptor_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            source_files,
            descriptor_path,
            workspace,
        }
    }

    /// The first (and for spooled jobs, only) source file.
    pub fn primary_source(&self) -> Option<&SourceFileRecord> {
        self.source_files.first()
    }

    /// Canonical identity used to deduplicate pending jobs.
    ///
    /// The deepest existing ancestor of the descriptor path is resolved
    /// (symlinks, `.` and `..`) and the missing tail appended, so the key is
    /// the same before and after the descriptor file is deleted.
    /// Comparison is byte-exact: paths differing only in case are distinct
    /// jobs, even on case-insensitive filesystems.
    pub fn identity_key(&self) -> PathBuf {
        canonical_key(&self.descriptor_path)
    }
}

pub(crate) fn canonical_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut existing = absolute.as_path();
    let mut missing: Vec<&OsStr> = Vec::new();
    loop {
        if let Ok(mut resolved) = std::fs::canonicalize(existing) {
            resolved.extend(missing.iter().rev());
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            // Root reached, or a `..` in the missing tail.
            _ => return absolute.clone(),
        }
    }
}
