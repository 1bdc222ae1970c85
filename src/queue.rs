//! The pending-job queue between intake and the conversion worker.
//!
//! ## Consistency
//!
//! The ordered entries and the set of identity keys are one unit guarded by
//! a single mutex: every operation, reads included, sees them in lockstep.
//! No file I/O happens while the lock is held; descriptor deletion on
//! [`PendingJobQueue::remove_and_delete`] runs after the lock is released.
//!
//! ## Notifications
//!
//! New arrivals are published on a `tokio::sync::broadcast` channel. Sending
//! never blocks: a subscriber that falls behind by more than the channel
//! capacity loses the oldest notifications and is told so via
//! `RecvError::Lagged`. Producers never wait on subscribers.

use crate::job::{canonical_key, JobDescriptor};
use crate::store::DescriptorStore;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info_span, warn, Span};

/// A boxed stream of newly queued descriptors.
pub type ArrivalStream = Pin<Box<dyn Stream<Item = JobDescriptor> + Send>>;

#[derive(Default)]
struct QueueState {
    /// Arrival order; each entry carries the key it was admitted under.
    entries: VecDeque<(PathBuf, JobDescriptor)>,
    keys: HashSet<PathBuf>,
}

/// FIFO of job descriptors awaiting conversion, deduplicated by identity.
pub struct PendingJobQueue {
    state: Mutex<QueueState>,
    store: Arc<dyn DescriptorStore>,
    arrivals: broadcast::Sender<JobDescriptor>,
    span: Span,
}

impl PendingJobQueue {
    /// Create an empty queue that deletes through `store`.
    ///
    /// `notification_capacity` is the per-subscriber backlog (minimum 1).
    pub fn new(store: Arc<dyn DescriptorStore>, notification_capacity: usize) -> Self {
        let (arrivals, _) = broadcast::channel(notification_capacity.max(1));
        Self {
            state: Mutex::new(QueueState::default()),
            store,
            arrivals,
            span: info_span!("pending_jobs"),
        }
    }

    /// Emit this queue's events under `span` instead of its own.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Critical sections never panic mid-update.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `job` unless a job with the same identity is already pending.
    ///
    /// Returns `true` when the job was queued. Subscribers are notified only
    /// for queued jobs.
    pub fn add(&self, job: JobDescriptor) -> bool {
        let _entered = self.span.enter();
        let key = job.identity_key();
        if let Some(source) = job.primary_source() {
            debug!(
                title = %source.document_title,
                printer = %source.printer_name,
                session = source.session_id,
                pages = source.total_pages,
                "New job descriptor {}",
                key.display()
            );
        }

        let mut state = self.lock();
        if !state.keys.insert(key.clone()) {
            debug!("Already pending, ignoring {}", key.display());
            return false;
        }
        state.entries.push_back((key.clone(), job.clone()));
        debug!(pending = state.entries.len(), "Queued {}", key.display());

        // Sent under the lock so notification order matches queue order.
        // `send` only fails when nobody is subscribed.
        let _ = self.arrivals.send(job);
        true
    }

    /// [`add`](Self::add) each job in order. Returns how many were queued.
    pub fn add_batch(&self, jobs: impl IntoIterator<Item = JobDescriptor>) -> usize {
        jobs.into_iter()
            .map(|job| self.add(job))
            .filter(|&queued| queued)
            .count()
    }

    /// The oldest pending job, without removing it.
    pub fn peek(&self) -> Option<JobDescriptor> {
        self.lock().entries.front().map(|(_, job)| job.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Whether a job with the same identity as `job` is pending.
    pub fn contains(&self, job: &JobDescriptor) -> bool {
        let key = job.identity_key();
        self.lock().keys.contains(&key)
    }

    /// All pending jobs in arrival order.
    pub fn snapshot(&self) -> Vec<JobDescriptor> {
        self.lock().entries.iter().map(|(_, job)| job.clone()).collect()
    }

    /// Drop `job` from the queue without touching its files.
    ///
    /// Used when ownership of the job passes elsewhere. Returns `false` if
    /// it was not pending; removing twice is not an error.
    pub fn remove(&self, job: &JobDescriptor) -> bool {
        let _entered = self.span.enter();
        self.remove_entry(job)
    }

    /// Drop `job` from the queue and delete its descriptor and source files.
    ///
    /// Deletion is attempted even when the job was no longer pending, so a
    /// retried cleanup converges. Deletion failures are logged, not returned.
    pub fn remove_and_delete(&self, job: &JobDescriptor) -> bool {
        let _entered = self.span.enter();
        let removed = self.remove_entry(job);
        if let Err(e) = self.store.delete_descriptor_and_sources(job) {
            warn!(
                "Could not delete files of {}: {}",
                job.descriptor_path.display(),
                e
            );
        }
        removed
    }

    fn remove_entry(&self, job: &JobDescriptor) -> bool {
        let key = canonical_key(&job.descriptor_path);
        let mut state = self.lock();
        let position = state
            .entries
            .iter()
            .position(|(k, queued)| *k == key || queued.descriptor_path == job.descriptor_path);
        match position.and_then(|i| state.entries.remove(i)) {
            Some((admitted_key, _)) => {
                state.keys.remove(&admitted_key);
                debug!(pending = state.entries.len(), "Removed {}", key.display());
                true
            }
            None => {
                state.keys.remove(&key);
                debug!("Not pending: {}", key.display());
                false
            }
        }
    }

    /// Receive every job queued after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobDescriptor> {
        self.arrivals.subscribe()
    }

    /// Stream of jobs queued after this call. Lagged notifications are
    /// logged and skipped.
    pub fn arrivals(&self) -> ArrivalStream {
        let span = self.span.clone();
        let stream = BroadcastStream::new(self.subscribe()).filter_map(move |item| match item {
            Ok(job) => Some(job),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                span.in_scope(|| warn!(missed, "Arrival subscriber fell behind"));
                None
            }
        });
        Box::pin(stream)
    }
}

impl std::fmt::Debug for PendingJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingJobQueue")
            .field("pending", &self.len())
            .field("subscribers", &self.arrivals.receiver_count())
            .finish()
    }
}
