use crate::types::JobId;
use std::{fmt, str::FromStr};

/// Lifecycle state of a job as recorded in the execution store.
///
/// `Running` is the only non-terminal state; a record never leaves a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Running,
    Complete,
    Stopped,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Complete => "COMPLETE",
            JobStatus::Stopped => "STOPPED",
            JobStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETE" => Ok(JobStatus::Complete),
            "STOPPED" => Ok(JobStatus::Stopped),
            "ERROR" => Ok(JobStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// The single terminal outcome of a job, sent from its process runner to the
/// completion notifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub exit_code: i32,
}

impl CompletionEvent {
    pub fn complete(job_id: JobId, exit_code: i32) -> Self {
        Self {
            job_id,
            status: JobStatus::Complete,
            exit_code,
        }
    }

    pub fn stopped(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Stopped,
            exit_code: 0,
        }
    }

    pub fn error(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Error,
            exit_code: -1,
        }
    }
}
