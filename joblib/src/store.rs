mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::events::{JobStatus, UnknownStatus};
use crate::types::{Args, JobId, Program};
use chrono::{DateTime, Utc};
use std::{path::PathBuf, result, sync::Arc};
use thiserror::Error;
use tokio::task;

/// The durable record of one job.
#[derive(Clone, Debug, PartialEq)]
pub struct Execution {
    pub id: JobId,
    pub command: Program,
    pub args: Args,
    pub status: JobStatus,
    /// Only meaningful once `status` is terminal.
    pub exit_code: i32,
    pub output_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// A freshly started job.
    pub fn running(id: JobId, command: Program, args: Args, output_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id,
            command,
            args,
            status: JobStatus::Running,
            exit_code: 0,
            output_path,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no execution with id {0}")]
    NotFound(JobId),
    #[error("an execution with id {0} already exists")]
    Conflict(JobId),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("args encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("corrupt execution record: unknown status {0:?}")]
    CorruptStatus(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<UnknownStatus> for StoreError {
    fn from(UnknownStatus(status): UnknownStatus) -> Self {
        StoreError::CorruptStatus(status)
    }
}

pub type Result<T> = result::Result<T, StoreError>;

/// Persistence contract for execution records.
///
/// Methods may block; async callers go through [`blocking`].
/// Implementations must be safe to call concurrently for different ids.
pub trait ExecutionStore: Send + Sync + 'static {
    /// Idempotent schema initialization, run once at startup.
    fn migrate(&self) -> Result<()>;

    fn get_execution(&self, id: &str) -> Result<Execution>;

    /// Fails with [`StoreError::Conflict`] on a duplicate id.
    fn create_execution(&self, execution: &Execution) -> Result<()>;

    /// Replaces the stored record and bumps `updated_at`.
    /// Fails with [`StoreError::NotFound`] if the id was never created.
    fn update_execution(&self, execution: &Execution) -> Result<()>;
}

/// Runs a store call on the blocking pool.
pub(crate) async fn blocking<T, F>(store: &Arc<dyn ExecutionStore>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn ExecutionStore) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|err| StoreError::Unavailable(err.to_string()))?
}
