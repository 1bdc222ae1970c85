//! Spool workspace allocation: one fresh, empty directory per job.
//!
//! Uniqueness comes from `create_dir`, which fails atomically when the
//! directory already exists. Two concurrent intakes asking for the same name
//! therefore race on the filesystem, not on in-process state, and can never
//! be handed the same directory.
//!
//! Collision naming is deterministic: `job.ps`, `job.ps_2`, `job.ps_3`, …
//! up to the configured number of attempts.

use crate::error::IntakeError;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info_span, Span};

/// Creates collision-free workspace directories under a spool folder.
#[derive(Debug, Clone)]
pub struct WorkspaceAllocator {
    max_attempts: u32,
    span: Span,
}

impl WorkspaceAllocator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            span: info_span!("workspace"),
        }
    }

    /// Emit this allocator's events under `span` instead of its own.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Create a new, empty directory under `base` named after `desired_name`.
    ///
    /// `base` is created if missing. The returned directory did not exist
    /// before the call.
    ///
    /// # Errors
    /// [`IntakeError::WorkspaceAllocationFailed`] when the name is not a
    /// plain file name, the base folder cannot be created, a candidate cannot
    /// be created for a reason other than already existing, or every
    /// candidate is taken.
    pub fn allocate(&self, base: &Path, desired_name: &str) -> Result<PathBuf, IntakeError> {
        let _entered = self.span.enter();
        let fail = |detail: String| IntakeError::WorkspaceAllocationFailed {
            base: base.to_path_buf(),
            name: desired_name.to_string(),
            detail,
        };

        if !is_plain_name(desired_name) {
            return Err(fail("name must be a single path component".into()));
        }
        std::fs::create_dir_all(base)
            .map_err(|e| fail(format!("cannot create spool folder: {e}")))?;

        for attempt in 0..self.max_attempts {
            let candidate = base.join(candidate_name(desired_name, attempt));
            match std::fs::create_dir(&candidate) {
                Ok(()) => {
                    debug!(attempt, "Created spool workspace {}", candidate.display());
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(fail(format!("cannot create '{}': {e}", candidate.display())));
                }
            }
        }

        Err(fail(format!(
            "{} candidates already taken",
            self.max_attempts
        )))
    }
}

fn candidate_name(desired: &str, attempt: u32) -> String {
    match attempt {
        0 => desired.to_string(),
        n => format!("{desired}_{}", n + 1),
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
