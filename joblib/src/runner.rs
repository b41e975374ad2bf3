use crate::errors::JobError;
use crate::events::CompletionEvent;
use crate::types::{JobId, OutputBlob};

use bytes::BytesMut;
use std::{io, process::Stdio, time::Duration};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufWriter},
    process::{Child, Command},
    select,
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// How long a finished job's pipes may keep draining before they are abandoned.
/// Background processes the job left behind can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Everything the runner needs to start one job.
pub struct Launch<'a> {
    pub job_id: JobId,
    pub cmd: &'a str,
    pub args: &'a [String],
    /// Receives the job's combined stdout and stderr.
    pub sink: File,
    pub cancel: CancellationToken,
}

/// Start the process for a job and supervise it in the background.
///
/// Returns once the OS process exists (or failed to start), so a cancellation
/// requested after this call always has a process to kill. Exactly one
/// [`CompletionEvent`] is later sent on `done_tx`, after the output sink has
/// been flushed and closed.
pub fn launch(launch: Launch<'_>, done_tx: mpsc::UnboundedSender<CompletionEvent>) {
    let Launch {
        job_id,
        cmd,
        args,
        sink,
        cancel,
    } = launch;

    let mut child = match spawn_child(cmd, args) {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(job_id = %job_id, cmd, error = %err, "job failed to start");
            drop(sink);
            let _ = done_tx.send(CompletionEvent::error(job_id));
            return;
        }
    };
    tracing::info!(job_id = %job_id, cmd, pid = ?child.id(), "job launched");

    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump(stdout, output_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump(stderr, output_tx));
    }
    let mut writer = write_output(sink, output_rx);

    tokio::spawn(async move {
        let event = supervise(job_id.clone(), &mut child, cancel).await;
        let written = match timeout(DRAIN_GRACE, &mut writer).await {
            Ok(written) => written,
            Err(_) => {
                tracing::debug!(job_id = %job_id, "output pipes still open after exit");
                pumps.iter().for_each(JoinHandle::abort);
                writer.await
            }
        };
        match written {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(job_id = %job_id, error = %err, "failed to write job output")
            }
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "job output writer panicked")
            }
        }
        let _ = done_tx.send(event);
    });
}

fn spawn_child(cmd: &str, args: &[String]) -> Result<Child, JobError> {
    Command::new(cmd)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(JobError::LaunchFailure)
}

/// Wait for whichever comes first: natural exit or cancellation.
async fn supervise(
    job_id: JobId,
    child: &mut Child,
    cancel: CancellationToken,
) -> CompletionEvent {
    select! {
        exit_status = child.wait() => match exit_status {
            // killed by a signal we did not send: there is no exit code to report
            Ok(exit_status) => {
                CompletionEvent::complete(job_id, exit_status.code().unwrap_or(-1))
            }
            Err(err) => {
                tracing::warn!(job_id = %job_id, error = %err, "failed to wait on job");
                CompletionEvent::error(job_id)
            }
        },
        _ = cancel.cancelled() => stop_outcome(job_id, kill(child).await),
    }
}

/// Outcome of a cancelled job, given how the kill went.
fn stop_outcome(job_id: JobId, killed: Result<(), JobError>) -> CompletionEvent {
    match killed {
        Ok(()) => CompletionEvent::stopped(job_id),
        Err(err) => {
            tracing::warn!(job_id = %job_id, error = %err, "failed to stop job");
            CompletionEvent::error(job_id)
        }
    }
}

/// A single forceful kill attempt; no escalation and no retry.
async fn kill(child: &mut Child) -> Result<(), JobError> {
    child.kill().await.map_err(JobError::KillFailure)
}

// forward everything read from a child pipe to the output writer
fn pump<R>(mut pipe: R, output_tx: mpsc::UnboundedSender<OutputBlob>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(4096);
        loop {
            match pipe.read_buf(&mut buf).await {
                Ok(n) if n > 0 => {
                    // move the bytes out of buf and into a message
                    if output_tx.send(buf.split().freeze()).is_err() {
                        break;
                    }
                }
                _ => break,
            }
        }
    })
}

/// Drains both pipes into the sink. Finishes once every pump is done.
///
/// Everything received is flushed as soon as the queue runs dry, so readers of a
/// running job's file see output without waiting for the job to end.
fn write_output(
    sink: File,
    mut output_rx: mpsc::UnboundedReceiver<OutputBlob>,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(async move {
        let mut sink = BufWriter::new(sink);
        while let Some(blob) = output_rx.recv().await {
            sink.write_all(&blob).await?;
            while let Ok(blob) = output_rx.try_recv() {
                sink.write_all(&blob).await?;
            }
            sink.flush().await?;
        }
        sink.flush().await?;
        sink.into_inner().sync_all().await
    })
}
