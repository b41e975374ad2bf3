use crate::errors::{JobError, Result};
use crate::types::JobId;
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tokio_util::sync::CancellationToken;

/// Index of the jobs that can currently be cancelled.
///
/// An id missing from the registry means the job is either unknown or already
/// finished; only the execution store can tell which. The lock is held for the
/// map operation alone, never across I/O.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, CancellationToken>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        // every critical section is a single map operation, so a panic cannot leave it half-updated
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, job_id: JobId, cancel: CancellationToken) -> Result<()> {
        match self.jobs().entry(job_id) {
            Entry::Occupied(entry) => Err(JobError::AlreadyExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(cancel);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, job_id: &str) -> Result<CancellationToken> {
        self.jobs()
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Idempotent; returns the handle if one was registered.
    pub fn remove(&self, job_id: &str) -> Option<CancellationToken> {
        self.jobs().remove(job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
