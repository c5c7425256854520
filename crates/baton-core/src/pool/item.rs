//! Work item: one schedulable unit of work.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::error;

use crate::domain::{Affinity, WorkItemId, WorkItemStatus};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work owned by exactly one queue at a time.
///
/// Items are shared as `Arc<WorkItem>`: the queue holds one reference while
/// the item is pending, the submitter may keep another to watch `status()`.
/// The item is freed once it has been processed and every holder released it.
///
/// The job runs at most once. A panic inside the job aborts the process:
/// items often carry owed rollbacks, and losing one silently would leave the
/// engine in a half-applied state.
pub struct WorkItem {
    id: WorkItemId,
    affinity: Affinity,
    status: AtomicU8,
    job: Mutex<Option<Job>>,
}

impl WorkItem {
    pub fn new(affinity: Affinity, job: impl FnOnce() + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            id: WorkItemId::generate(),
            affinity,
            status: AtomicU8::new(WorkItemStatus::Pending.as_u8()),
            job: Mutex::new(Some(Box::new(job))),
        })
    }

    /// Item for any background worker.
    pub fn background(job: impl FnOnce() + Send + 'static) -> Arc<Self> {
        Self::new(Affinity::Background, job)
    }

    /// Item that only the primary thread may run.
    pub fn primary(job: impl FnOnce() + Send + 'static) -> Arc<Self> {
        Self::new(Affinity::Primary, job)
    }

    pub fn id(&self) -> WorkItemId {
        self.id
    }

    pub fn affinity(&self) -> Affinity {
        self.affinity
    }

    pub fn is_primary_only(&self) -> bool {
        self.affinity == Affinity::Primary
    }

    pub fn status(&self) -> WorkItemStatus {
        WorkItemStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Run the job on the calling thread.
    ///
    /// Returns `false` if the job had already been taken.
    pub fn process(&self) -> bool {
        let job = self
            .job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(job) = job else {
            return false;
        };

        self.set_status(WorkItemStatus::Processing);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!(
                item = %self.id,
                panic = panic_message(payload.as_ref()),
                "work item panicked, aborting"
            );
            std::process::abort();
        }
        self.set_status(WorkItemStatus::Done);
        true
    }

    fn set_status(&self, status: WorkItemStatus) {
        self.status.store(status.as_u8(), Ordering::Release);
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("affinity", &self.affinity)
            .field("status", &self.status())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
