//! Durable job descriptors.
//!
//! [`DescriptorStore`] is the seam between the pipeline and whatever encodes
//! descriptors on disk. [`JsonDescriptorStore`] is the bundled codec: one
//! pretty-printed JSON document per job, written atomically next to the
//! source copy it describes.

use crate::error::StoreError;
use crate::job::JobDescriptor;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tracing::{debug, warn};

/// File extension of descriptor files inside a spool workspace.
pub const DESCRIPTOR_EXTENSION: &str = "inf";

/// Persists, loads and deletes job descriptors and their source copies.
pub trait DescriptorStore: Send + Sync {
    /// Write `job` to `path`, replacing nothing: the path is freshly chosen
    /// inside a new workspace.
    fn save(&self, job: &JobDescriptor, path: &Path) -> Result<(), StoreError>;

    /// Read the descriptor stored at `path`.
    fn load(&self, path: &Path) -> Result<JobDescriptor, StoreError>;

    /// Delete the descriptor file and every source file it references.
    ///
    /// Files that are already gone are not an error, so a retried cleanup
    /// converges.
    fn delete_descriptor_and_sources(&self, job: &JobDescriptor) -> Result<(), StoreError>;
}

/// JSON-encoded descriptors on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDescriptorStore;

impl DescriptorStore for JsonDescriptorStore {
    fn save(&self, job: &JobDescriptor, path: &Path) -> Result<(), StoreError> {
        if job.source_files.is_empty() {
            return Err(StoreError::Empty {
                path: path.to_path_buf(),
            });
        }
        let body = serde_json::to_vec_pretty(job).map_err(StoreError::Encode)?;

        // Atomic write: temp file in the same directory, then rename.
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        tmp.write_all(&body)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| StoreError::io(path, e.error))?;

        debug!("Saved job descriptor {}", path.display());
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<JobDescriptor, StoreError> {
        let body = std::fs::read(path).map_err(|e| StoreError::io(path, e))?;
        let decoded: JobDescriptor =
            serde_json::from_slice(&body).map_err(|source| StoreError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        if decoded.source_files.is_empty() {
            return Err(StoreError::Empty {
                path: path.to_path_buf(),
            });
        }
        Ok(JobDescriptor::new(decoded.source_files, path))
    }

    fn delete_descriptor_and_sources(&self, job: &JobDescriptor) -> Result<(), StoreError> {
        let mut first_error: Option<StoreError> = None;

        let targets = job
            .source_files
            .iter()
            .map(|s| s.filename.as_path())
            .chain(std::iter::once(job.descriptor_path.as_path()));
        for target in targets {
            match std::fs::remove_file(target) {
                Ok(()) => debug!("Deleted {}", target.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Could not delete {}: {}", target.display(), e);
                    if first_error.is_none() {
                        first_error = Some(StoreError::io(target, e));
                    }
                }
            }
        }

        // The workspace goes too, but only once nothing else lives in it.
        if !job.workspace.as_os_str().is_empty() {
            match std::fs::remove_dir(&job.workspace) {
                Ok(()) => debug!("Removed workspace {}", job.workspace.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => debug!("Keeping workspace {}: {}", job.workspace.display(), e),
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SourceFormat;
    use crate::job::SourceFileRecord;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn job_in(ws: &Path) -> JobDescriptor {
        let source = ws.join("job.ps");
        std::fs::write(&source, b"%!PS\n").unwrap();
        let record = SourceFileRecord {
            filename: source,
            author: "alice".into(),
            client_computer: "WS01".into(),
            copies: 1,
            document_title: "/in/job.ps".into(),
            job_counter: 0,
            job_id: 0,
            printer_name: "HP-Default".into(),
            session_id: 0,
            total_pages: 2,
            format: SourceFormat::PostScript,
            win_station: None,
        };
        JobDescriptor::new(vec![record], ws.join("job.ps.inf"))
    }

    fn workspace(dir: &TempDir) -> PathBuf {
        let ws = dir.path().join("job.ps");
        std::fs::create_dir(&ws).unwrap();
        ws
    }

    #[test]
    fn save_then_load_restores_location() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let job = job_in(&ws);
        JsonDescriptorStore.save(&job, &job.descriptor_path).unwrap();

        let loaded = JsonDescriptorStore.load(&job.descriptor_path).unwrap();
        assert_eq!(loaded, job);
        assert_eq!(loaded.workspace, ws);
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let job = job_in(&ws);
        JsonDescriptorStore.save(&job, &job.descriptor_path).unwrap();
        assert_eq!(std::fs::read_dir(&ws).unwrap().count(), 2);
    }

    #[test]
    fn save_rejects_empty_descriptor() {
        let dir = TempDir::new().unwrap();
        let job = JobDescriptor::new(vec![], dir.path().join("x.inf"));
        let err = JsonDescriptorStore.save(&job, &job.descriptor_path).unwrap_err();
        assert!(matches!(err, StoreError::Empty { .. }));
        assert!(!job.descriptor_path.exists());
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.inf");
        std::fs::write(&path, b"[printer]\nname=x").unwrap();
        assert!(matches!(
            JsonDescriptorStore.load(&path),
            Err(StoreError::Decode { .. })
        ));
    }

    #[test]
    fn delete_removes_files_and_workspace() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let job = job_in(&ws);
        JsonDescriptorStore.save(&job, &job.descriptor_path).unwrap();

        JsonDescriptorStore.delete_descriptor_and_sources(&job).unwrap();
        assert!(!ws.exists());
        // Second pass has nothing left to do and still succeeds.
        JsonDescriptorStore.delete_descriptor_and_sources(&job).unwrap();
    }

    #[test]
    fn delete_keeps_workspace_with_foreign_files() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(&dir);
        let job = job_in(&ws);
        JsonDescriptorStore.save(&job, &job.descriptor_path).unwrap();
        std::fs::write(ws.join("converter.log"), b"...").unwrap();

        JsonDescriptorStore.delete_descriptor_and_sources(&job).unwrap();
        assert!(ws.join("converter.log").exists());
        assert!(!job.descriptor_path.exists());
    }
}
