use crate::errors::{JobError, Result};
use crate::types::{JobId, OutputLine};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::{io, path::PathBuf};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};

/// A finite stream of output lines.
pub type OutputStream = BoxStream<'static, Result<OutputLine>>;

/// Opens a job's output file for a snapshot read.
///
/// The stream ends at the first end-of-file it reaches, even if the job is
/// still running and writes more later.
pub async fn snapshot(job_id: JobId, path: PathBuf) -> Result<OutputStream> {
    let file = match File::open(&path).await {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(JobError::NotFound(job_id));
        }
        Err(source) => return Err(JobError::Output { path, source }),
    };

    let reader = Some(BufReader::new(file));
    let lines = stream::unfold((reader, path), |(reader, path)| async move {
        let mut reader = reader?;
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(trim_line(line)), (Some(reader), path))),
            Err(source) => {
                let err = JobError::Output {
                    path: path.clone(),
                    source,
                };
                Some((Err(err), (None, path)))
            }
        }
    });
    Ok(lines.boxed())
}

fn trim_line(mut line: Vec<u8>) -> OutputLine {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
    Bytes::from(line)
}
