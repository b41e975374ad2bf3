use crate::errors::{JobError, Result};
use crate::events::CompletionEvent;
use crate::registry::JobRegistry;
use crate::store::{self, ExecutionStore, StoreError};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct Actor {
    inbox: mpsc::UnboundedReceiver<CompletionEvent>,
    store: Arc<dyn ExecutionStore>,
    registry: Arc<JobRegistry>,
}

impl Actor {
    pub fn spawn(
        inbox: mpsc::UnboundedReceiver<CompletionEvent>,
        store: Arc<dyn ExecutionStore>,
        registry: Arc<JobRegistry>,
    ) {
        let actor = Self {
            inbox,
            store,
            registry,
        };
        tokio::spawn(async move { actor.run().await });
    }

    async fn run(mut self) {
        while let Some(event) = self.inbox.recv().await {
            self.complete(event).await;
        }
        tracing::info!("completion channel closed, notifier stopping");
    }

    async fn complete(&self, event: CompletionEvent) {
        let job_id = event.job_id.clone();
        match self.record(event).await {
            Ok(()) => {}
            Err(err @ JobError::RecordMissing(_)) => {
                tracing::warn!(job_id = %job_id, error = %err, "dropping completion event");
            }
            // No retry: the record stays RUNNING, but the job must not outlive its process
            // in the registry.
            Err(err) => {
                tracing::error!(
                    job_id = %job_id,
                    error = %err,
                    "failed to record job completion"
                );
            }
        }
        self.registry.remove(&job_id);
    }

    async fn record(&self, event: CompletionEvent) -> Result<()> {
        let CompletionEvent {
            job_id,
            status,
            exit_code,
        } = event;
        let lookup_id = job_id.clone();
        let outcome = store::blocking(&self.store, move |store| {
            let mut execution = store.get_execution(&lookup_id)?;
            if execution.status.is_terminal() {
                return Ok(Some(execution.status));
            }
            execution.status = status;
            execution.exit_code = exit_code;
            store.update_execution(&execution)?;
            Ok(None)
        })
        .await;

        match outcome {
            Ok(None) => {
                tracing::info!(job_id = %job_id, %status, exit_code, "job finished");
                Ok(())
            }
            Ok(Some(recorded)) => {
                tracing::warn!(
                    job_id = %job_id,
                    recorded = %recorded,
                    ignored = %status,
                    "job already finished, keeping recorded outcome"
                );
                Ok(())
            }
            Err(StoreError::NotFound(_)) => Err(JobError::RecordMissing(job_id)),
            Err(err) => Err(err.into()),
        }
    }
}
