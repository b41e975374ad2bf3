use crate::actors::notifier::NotifierHandle;
use crate::errors::{JobError, Result};
use crate::output::{self, OutputStream};
use crate::registry::JobRegistry;
use crate::runner::{self, Launch};
use crate::store::{self, Execution, ExecutionStore};
use crate::types::{Args, JobId, Program};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A `JobCoordinator` which provides functionality for managing jobs and querying job state.
///
/// Cloning is cheap and every clone drives the same jobs. `start_job` and `stop_job` never
/// wait for a process to finish: outcomes reach the execution store through the completion
/// notifier, and callers poll `get_job_status` or read `stream_output`.
#[derive(Clone)]
pub struct JobCoordinator {
    store: Arc<dyn ExecutionStore>,
    registry: Arc<JobRegistry>,
    notifier: NotifierHandle,
    output_dir: Arc<PathBuf>,
}

impl JobCoordinator {
    /// Spawn a coordinator and its completion notifier.
    ///
    /// Job output files are created in `output_dir`, which must already exist.
    pub fn spawn(store: Arc<dyn ExecutionStore>, output_dir: impl Into<PathBuf>) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let notifier = NotifierHandle::spawn(Arc::clone(&store), Arc::clone(&registry));
        Self {
            store,
            registry,
            notifier,
            output_dir: Arc::new(output_dir.into()),
        }
    }

    /// Start a new job and return its id without waiting for it to finish.
    pub async fn start_job(&self, cmd: Program, args: Args) -> Result<JobId> {
        if cmd.trim().is_empty() {
            return Err(JobError::InvalidArgument);
        }
        // runs detached: once its record is persisted, a job is always registered and launched
        let this = self.clone();
        tokio::spawn(async move { this.start(cmd, args).await })
            .await
            .map_err(|err| JobError::Internal(err.to_string()))?
    }

    async fn start(self, cmd: Program, args: Args) -> Result<JobId> {
        let job_id = Uuid::new_v4().to_string();
        let output_path = self.output_dir.join(format!("{}.txt", job_id));
        let sink = File::create(&output_path)
            .await
            .map_err(|source| JobError::Output {
                path: output_path.clone(),
                source,
            })?;

        let cancel = CancellationToken::new();
        if let Err(err) = self.registry.register(job_id.clone(), cancel.clone()) {
            remove_output(&job_id, &output_path).await;
            return Err(err);
        }

        let execution = Execution::running(
            job_id.clone(),
            cmd.clone(),
            args.clone(),
            output_path.clone(),
        );
        let created = store::blocking(&self.store, move |store| {
            store.create_execution(&execution)
        })
        .await;
        if let Err(err) = created {
            tracing::error!(job_id = %job_id, error = %err, "failed to persist new job");
            self.registry.remove(&job_id);
            remove_output(&job_id, &output_path).await;
            return Err(err.into());
        }

        tracing::info!(job_id = %job_id, cmd = %cmd, args = ?args, "job created");
        runner::launch(
            Launch {
                job_id: job_id.clone(),
                cmd: &cmd,
                args: &args,
                sink,
                cancel,
            },
            self.notifier.sender(),
        );
        Ok(job_id)
    }

    /// Snapshot of the job's execution record.
    pub async fn get_job_status(&self, job_id: &str) -> Result<Execution> {
        let lookup_id = job_id.to_string();
        store::blocking(&self.store, move |store| store.get_execution(&lookup_id))
            .await
            .map_err(|err| JobError::from_lookup(job_id, err))
    }

    /// Request cancellation of a job.
    ///
    /// Idempotent: stopping a job that already finished succeeds without doing anything.
    /// Returns as soon as cancellation is signalled; the process may still be exiting.
    pub async fn stop_job(&self, job_id: &str) -> Result<JobId> {
        let execution = self.get_job_status(job_id).await?;
        if execution.status.is_terminal() {
            tracing::debug!(job_id, status = %execution.status, "stop on finished job");
            return Ok(execution.id);
        }
        match self.registry.lookup(job_id) {
            Ok(cancel) => {
                cancel.cancel();
                tracing::info!(job_id, "stop requested");
            }
            // the notifier finalized it between our two lookups
            Err(_) => tracing::debug!(job_id, "job finished before it could be stopped"),
        }
        Ok(execution.id)
    }

    /// Lines of the job's combined output, read up to the current end of its output file.
    pub async fn stream_output(&self, job_id: &str) -> Result<OutputStream> {
        let execution = self.get_job_status(job_id).await?;
        output::snapshot(execution.id, execution.output_path).await
    }

    /// Number of jobs that can currently be stopped.
    pub fn running_jobs(&self) -> usize {
        self.registry.len()
    }
}

// output file of a job that never got started
async fn remove_output(job_id: &str, path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        tracing::warn!(job_id, path = ?path, error = %err, "failed to remove output file");
    }
}
