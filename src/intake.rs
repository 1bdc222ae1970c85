//! Intake: take ownership of one raw spool file.
//!
//! ## Steps
//!
//! ```text
//! raw file
//!  │
//!  ├─ 1. Check    non-empty path, file exists, not already being taken over
//!  ├─ 2. Validate format handler gate, against the original in place
//!  ├─ 3. Allocate fresh workspace under the spool folder
//!  ├─ 4. Copy     raw file → workspace
//!  ├─ 5. Describe SourceFileRecord (pages counted on the original)
//!  └─ 6. Persist  descriptor file written into the workspace
//! ```
//!
//! Every failure after step 3 removes the workspace before the error is
//! returned, so an attempt leaves either one complete workspace or none.
//! Cleanup problems are logged and never replace the original error.
//!
//! Intake does blocking filesystem I/O. [`Intake::take_ownership_async`]
//! moves each call onto tokio's blocking pool so one slow copy does not hold
//! up the detection of other files.

use crate::config::{SettingsProvider, SpoolConfig};
use crate::error::IntakeError;
use crate::format::{FormatHandler, SourceFormat};
use crate::host::{HostIdentity, SystemIdentity};
use crate::job::{canonical_key, JobDescriptor, RawInputFile, SourceFileRecord};
use crate::progress::ProgressCallback;
use crate::queue::PendingJobQueue;
use crate::store::{DescriptorStore, JsonDescriptorStore, DESCRIPTOR_EXTENSION};
use crate::workspace::WorkspaceAllocator;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, info_span, warn, Span};

type CopyFn = fn(&Path, &Path) -> std::io::Result<u64>;

fn copy_file(from: &Path, to: &Path) -> std::io::Result<u64> {
    std::fs::copy(from, to)
}

/// Turns raw spool files into persisted [`JobDescriptor`]s.
///
/// Cheap to clone; clones share the store, settings and the set of raw
/// files currently being taken over.
#[derive(Clone)]
pub struct Intake {
    format: Option<SourceFormat>,
    allocator: WorkspaceAllocator,
    store: Arc<dyn DescriptorStore>,
    settings: Arc<dyn SettingsProvider>,
    identity: Arc<dyn HostIdentity>,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    copy: CopyFn,
    span: Span,
}

impl Intake {
    /// Intake with the JSON descriptor store and the process identity.
    pub fn new(config: &SpoolConfig) -> Self {
        let span = info_span!("intake");
        Self {
            format: config.format,
            allocator: WorkspaceAllocator::new(config.max_allocation_attempts)
                .with_span(span.clone()),
            store: Arc::new(JsonDescriptorStore),
            settings: Arc::new(config.clone()),
            identity: Arc::new(SystemIdentity),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            copy: copy_file,
            span,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DescriptorStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn HostIdentity>) -> Self {
        self.identity = identity;
        self
    }

    /// Emit intake and workspace events under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.allocator = self.allocator.with_span(span.clone());
        self.span = span;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_copier(mut self, copy: CopyFn) -> Self {
        self.copy = copy;
        self
    }

    /// Take ownership of `raw_file`: copy it into a fresh workspace under
    /// `spool_folder` and persist a descriptor for it.
    ///
    /// A blank `printer_hint` falls back to the configured default printer.
    ///
    /// # Errors
    /// Any [`IntakeError`]; no workspace is left behind on failure.
    pub fn take_ownership(
        &self,
        raw_file: impl AsRef<Path>,
        spool_folder: impl AsRef<Path>,
        printer_hint: &str,
    ) -> Result<JobDescriptor, IntakeError> {
        let raw = raw_file.as_ref();
        let spool_folder = spool_folder.as_ref();
        let _entered = self.span.enter();

        // ── Step 1: Check input ──────────────────────────────────────────
        if raw.as_os_str().is_empty() {
            error!("Launched job without file");
            return Err(IntakeError::InvalidInput {
                reason: "raw file path is empty".into(),
            });
        }
        let Some(file_name) = raw.file_name() else {
            return Err(IntakeError::InvalidInput {
                reason: format!("'{}' does not name a file", raw.display()),
            });
        };
        if !raw.is_file() {
            error!("The file '{}' does not exist", raw.display());
            return Err(IntakeError::SourceNotFound {
                path: raw.to_path_buf(),
            });
        }
        let _claim = InFlight::claim(&self.in_flight, canonical_key(raw)).ok_or_else(|| {
            warn!("Intake of '{}' already running", raw.display());
            IntakeError::InProgress {
                path: raw.to_path_buf(),
            }
        })?;

        // ── Step 2: Validate format ──────────────────────────────────────
        let handler = self.resolve_handler(raw)?;

        // ── Step 3: Allocate workspace ───────────────────────────────────
        let desired_name = file_name.to_string_lossy().into_owned();
        let workspace = self.allocator.allocate(spool_folder, &desired_name)?;
        let mut guard = WorkspaceGuard::new(workspace.clone());

        let printer_name = if printer_hint.trim().is_empty() {
            self.settings.default_printer()
        } else {
            printer_hint.to_string()
        };

        // ── Step 4: Copy ─────────────────────────────────────────────────
        let copy_target = workspace.join(file_name);
        (self.copy)(raw, &copy_target).map_err(|source| {
            error!(
                "Error while copying '{}' to spool folder: {}",
                raw.display(),
                source
            );
            IntakeError::CopyFailed {
                from: raw.to_path_buf(),
                to: copy_target.clone(),
                source,
            }
        })?;
        debug!("Copied spool file to {}", copy_target.display());

        // ── Step 5: Describe ─────────────────────────────────────────────
        let record = SourceFileRecord {
            filename: copy_target,
            author: self.identity.user_name(),
            client_computer: self.identity.machine_name().replace('\\', ""),
            copies: 1,
            document_title: raw.display().to_string(),
            job_counter: 0,
            job_id: 0,
            printer_name,
            session_id: self.identity.session_id(),
            total_pages: handler.count_pages(raw),
            format: handler.format(),
            win_station: self.identity.session_label(),
        };
        let descriptor_path = workspace.join(format!("{desired_name}.{DESCRIPTOR_EXTENSION}"));
        let job = JobDescriptor::new(vec![record], &descriptor_path);

        // ── Step 6: Persist ──────────────────────────────────────────────
        self.store.save(&job, &descriptor_path).map_err(|source| {
            error!(
                "Error while writing job descriptor '{}': {}",
                descriptor_path.display(),
                source
            );
            IntakeError::PersistFailed {
                path: descriptor_path.clone(),
                source,
            }
        })?;

        guard.disarm();
        info!(
            pages = job.source_files[0].total_pages,
            printer = %job.source_files[0].printer_name,
            "Took ownership of '{}' as {}",
            raw.display(),
            descriptor_path.display()
        );
        Ok(job)
    }

    /// [`take_ownership`](Self::take_ownership) on tokio's blocking pool.
    pub async fn take_ownership_async(
        &self,
        raw: RawInputFile,
        spool_folder: PathBuf,
    ) -> Result<JobDescriptor, IntakeError> {
        let intake = self.clone();
        tokio::task::spawn_blocking(move || {
            let hint = raw.printer_hint.as_deref().unwrap_or("");
            intake.take_ownership(&raw.path, &spool_folder, hint)
        })
        .await
        .map_err(|e| IntakeError::Internal(format!("Intake task panicked: {}", e)))?
    }

    /// Pick the handler for `raw` and run its validation gate.
    ///
    /// A pinned format wins, then the file extension; files with neither
    /// are probed against every format in [`SourceFormat::ALL`] order.
    fn resolve_handler(&self, raw: &Path) -> Result<&'static dyn FormatHandler, IntakeError> {
        let rejected = |format: SourceFormat| {
            error!("'{}' is not a valid {} file", raw.display(), format);
            IntakeError::UnsupportedOrCorruptFormat {
                path: raw.to_path_buf(),
                format,
            }
        };

        if let Some(format) = self.format.or_else(|| SourceFormat::detect(raw)) {
            let handler = format.handler();
            return if handler.validate(raw) {
                Ok(handler)
            } else {
                Err(rejected(format))
            };
        }

        SourceFormat::ALL
            .into_iter()
            .map(SourceFormat::handler)
            .find(|handler| handler.validate(raw))
            .ok_or_else(|| rejected(SourceFormat::PostScript))
    }
}

impl std::fmt::Debug for Intake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intake")
            .field("format", &self.format)
            .field("allocator", &self.allocator)
            .field("store", &"<dyn DescriptorStore>")
            .field("settings", &"<dyn SettingsProvider>")
            .field("identity", &"<dyn HostIdentity>")
            .finish()
    }
}

/// Removes a workspace on drop unless disarmed.
struct WorkspaceGuard {
    path: PathBuf,
    armed: bool,
}

impl WorkspaceGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed workspace {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(
                "Could not remove workspace {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Marks a raw file as being taken over until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    key: PathBuf,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<PathBuf>>, key: PathBuf) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then_some(Self { set, key })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// The outcome of one file in [`ingest_all`].
#[derive(Debug)]
pub struct IngestOutcome {
    pub raw: RawInputFile,
    pub result: Result<JobDescriptor, IntakeError>,
}

/// Take ownership of every file in `files` and queue each success.
///
/// Up to `concurrency` intakes run at once on the blocking pool. Jobs enter
/// `queue` as their intake completes, so queue order is completion order.
/// Outcomes are returned in completion order as well.
pub async fn ingest_all(
    intake: &Intake,
    queue: &PendingJobQueue,
    files: Vec<RawInputFile>,
    spool_folder: &Path,
    concurrency: usize,
    progress: Option<ProgressCallback>,
) -> Vec<IngestOutcome> {
    let total = files.len();
    if let Some(ref cb) = progress {
        cb.on_batch_start(total);
    }

    let outcomes: Vec<IngestOutcome> = stream::iter(files.into_iter().map(|raw| {
        let spool_folder = spool_folder.to_path_buf();
        async move {
            let result = intake.take_ownership_async(raw.clone(), spool_folder).await;
            IngestOutcome { raw, result }
        }
    }))
    .buffer_unordered(concurrency.max(1))
    .map(|outcome| {
        match &outcome.result {
            Ok(job) => {
                let queued = queue.add(job.clone());
                if let Some(ref cb) = progress {
                    cb.on_file_complete(&outcome.raw.path, &job.descriptor_path, queued);
                }
            }
            Err(e) => {
                if let Some(ref cb) = progress {
                    cb.on_file_error(&outcome.raw.path, &e.to_string());
                }
            }
        }
        outcome
    })
    .collect()
    .await;

    let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
    info!("Ingested {}/{} spool files", succeeded, total);
    if let Some(ref cb) = progress {
        cb.on_batch_complete(total, succeeded);
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::host::StaticIdentity;
    use tempfile::TempDir;

    const THREE_PAGES: &[u8] = b"%!PS-Adobe-3.0\n%%Pages: 3\n%%EndComments\n\
%%Page: 1 1\nshowpage\n%%Page: 2 2\nshowpage\n%%Page: 3 3\nshowpage\n%%EOF\n";

    struct FailingStore;

    impl DescriptorStore for FailingStore {
        fn save(&self, _job: &JobDescriptor, path: &Path) -> Result<(), StoreError> {
            // Leave a partial file behind, as a crashed writer would.
            std::fs::write(path, b"{").map_err(|e| StoreError::io(path, e))?;
            Err(StoreError::io(path, std::io::Error::other("disk full")))
        }

        fn load(&self, path: &Path) -> Result<JobDescriptor, StoreError> {
            Err(StoreError::Empty {
                path: path.to_path_buf(),
            })
        }

        fn delete_descriptor_and_sources(&self, _job: &JobDescriptor) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn disk_full(_from: &Path, to: &Path) -> std::io::Result<u64> {
        std::fs::write(to, b"%!PS-Adob")?;
        Err(std::io::Error::other("No space left on device"))
    }

    fn intake() -> Intake {
        let config = SpoolConfig::builder()
            .default_printer("HP-Default")
            .build()
            .unwrap();
        Intake::new(&config).with_identity(Arc::new(StaticIdentity {
            user_name: "alice".into(),
            machine_name: "DOMAIN\\WS01".into(),
            session_id: 2,
            session_label: Some("Console".into()),
        }))
    }

    fn raw(dir: &TempDir, name: &str, body: &[u8]) -> PathBuf {
        let inbox = dir.path().join("inbox");
        std::fs::create_dir_all(&inbox).unwrap();
        let path = inbox.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn takes_ownership_of_valid_postscript() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "job.ps", THREE_PAGES);

        let job = intake().take_ownership(&src, &spool, "").unwrap();

        assert_eq!(job.workspace, spool.join("job.ps"));
        assert_eq!(job.descriptor_path, spool.join("job.ps").join("job.ps.inf"));
        assert_eq!(entries(&job.workspace), 2);
        assert!(src.exists(), "raw file is not consumed");

        let record = &job.source_files[0];
        assert_eq!(record.filename, job.workspace.join("job.ps"));
        assert_eq!(std::fs::read(&record.filename).unwrap(), THREE_PAGES);
        assert_eq!(record.printer_name, "HP-Default");
        assert_eq!(record.total_pages, 3);
        assert_eq!(record.format, SourceFormat::PostScript);
        assert_eq!(record.author, "alice");
        assert_eq!(record.client_computer, "DOMAINWS01");
        assert_eq!(record.copies, 1);
        assert_eq!(record.session_id, 2);
        assert_eq!(record.win_station.as_deref(), Some("Console"));
        assert_eq!(record.document_title, src.display().to_string());

        let stored = JsonDescriptorStore.load(&job.descriptor_path).unwrap();
        assert_eq!(stored, job);
    }

    #[test]
    fn printer_hint_wins_when_not_blank() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "job.ps", THREE_PAGES);

        let hinted = intake().take_ownership(&src, &spool, "Office-Color").unwrap();
        assert_eq!(hinted.source_files[0].printer_name, "Office-Color");

        let blank = intake().take_ownership(&src, &spool, "   ").unwrap();
        assert_eq!(blank.source_files[0].printer_name, "HP-Default");
    }

    #[test]
    fn repeated_intake_gets_fresh_workspace() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "job.ps", THREE_PAGES);
        let intake = intake();

        let first = intake.take_ownership(&src, &spool, "").unwrap();
        let second = intake.take_ownership(&src, &spool, "").unwrap();
        assert_ne!(first.workspace, second.workspace);
        assert_eq!(second.workspace, spool.join("job.ps_2"));
        assert_eq!(second.descriptor_path, spool.join("job.ps_2").join("job.ps.inf"));
    }

    #[test]
    fn empty_path_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let err = intake().take_ownership("", &spool, "").unwrap_err();
        assert!(matches!(err, IntakeError::InvalidInput { .. }));
        assert!(!spool.exists());
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let err = intake()
            .take_ownership(dir.path().join("gone.ps"), &spool, "")
            .unwrap_err();
        assert!(matches!(err, IntakeError::SourceNotFound { .. }));
        assert!(!spool.exists());
    }

    #[test]
    fn invalid_format_creates_no_workspace() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "job.ps", b"plain text, not PostScript");
        let err = intake().take_ownership(&src, &spool, "").unwrap_err();
        assert!(matches!(
            err,
            IntakeError::UnsupportedOrCorruptFormat {
                format: SourceFormat::PostScript,
                ..
            }
        ));
        assert!(!spool.exists());
    }

    #[test]
    fn unknown_extension_is_probed() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "FP0001.SPL", b"%PDF-1.4\n3 0 obj << /Type /Page >> endobj\n");
        let job = intake().take_ownership(&src, &spool, "").unwrap();
        assert_eq!(job.source_files[0].format, SourceFormat::Pdf);
        assert_eq!(job.source_files[0].total_pages, 1);
    }

    #[test]
    fn pinned_format_overrides_extension() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "job.pdf", THREE_PAGES);
        let config = SpoolConfig::builder()
            .format(SourceFormat::PostScript)
            .build()
            .unwrap();
        let job = Intake::new(&config).take_ownership(&src, &spool, "").unwrap();
        assert_eq!(job.source_files[0].format, SourceFormat::PostScript);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        std::fs::write(&spool, b"not a directory").unwrap();
        let src = raw(&dir, "job.ps", THREE_PAGES);
        let err = intake().take_ownership(&src, &spool, "").unwrap_err();
        assert!(matches!(err, IntakeError::WorkspaceAllocationFailed { .. }));
    }

    #[test]
    fn copy_failure_removes_workspace() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "job.ps", THREE_PAGES);
        let err = intake()
            .with_copier(disk_full)
            .take_ownership(&src, &spool, "")
            .unwrap_err();
        assert!(matches!(err, IntakeError::CopyFailed { .. }));
        assert!(!spool.join("job.ps").exists());
        assert_eq!(entries(&spool), 0);
    }

    #[test]
    fn persist_failure_removes_workspace() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "job.ps", THREE_PAGES);
        let err = intake()
            .with_store(Arc::new(FailingStore))
            .take_ownership(&src, &spool, "")
            .unwrap_err();
        assert!(matches!(err, IntakeError::PersistFailed { .. }));
        assert_eq!(entries(&spool), 0);
    }

    #[test]
    fn concurrent_intake_of_same_file_is_refused() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "job.ps", THREE_PAGES);
        let intake = intake();

        let claim = InFlight::claim(&intake.in_flight, canonical_key(&src)).unwrap();
        let err = intake.take_ownership(&src, &spool, "").unwrap_err();
        assert!(matches!(err, IntakeError::InProgress { .. }));
        assert!(!spool.exists());

        drop(claim);
        assert!(intake.take_ownership(&src, &spool, "").is_ok());
    }

    #[test]
    fn failed_intake_releases_claim() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "job.ps", THREE_PAGES);
        let intake = intake();

        let _ = intake
            .clone()
            .with_copier(disk_full)
            .take_ownership(&src, &spool, "");
        assert!(intake.in_flight.lock().unwrap().is_empty());
        assert!(intake.take_ownership(&src, &spool, "").is_ok());
    }

    #[tokio::test]
    async fn async_intake_runs_on_blocking_pool() {
        let dir = TempDir::new().unwrap();
        let spool = dir.path().join("spool");
        let src = raw(&dir, "job.ps", THREE_PAGES);
        let job = intake()
            .take_ownership_async(RawInputFile::new(&src).with_printer("Lab"), spool.clone())
            .await
            .unwrap();
        assert_eq!(job.source_files[0].printer_name, "Lab");
        assert!(job.descriptor_path.exists());
    }
}
