use crate::store::StoreError;
use crate::types::JobId;
use std::{io, path::PathBuf, result};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("command must not be empty")]
    InvalidArgument,
    #[error("no such job: {0}")]
    NotFound(JobId),
    #[error("job {0} is already registered")]
    AlreadyExists(JobId),
    #[error("failed to launch process: {0}")]
    LaunchFailure(#[source] io::Error),
    #[error("failed to kill process: {0}")]
    KillFailure(#[source] io::Error),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
    #[error("no execution record for job {0}")]
    RecordMissing(JobId),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("output file {path:?} unavailable: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl JobError {
    /// Maps a store lookup failure for `job_id` onto the caller-facing error.
    pub(crate) fn from_lookup(job_id: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => JobError::NotFound(job_id.to_string()),
            other => JobError::Persistence(other),
        }
    }
}

pub type Result<T> = result::Result<T, JobError>;
