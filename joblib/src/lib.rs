mod actors;
mod coordinator;
pub mod errors;
mod events;
pub mod output;
pub mod registry;
mod runner;
pub mod store;
pub mod types;

pub use coordinator::JobCoordinator;
pub use events::{CompletionEvent, JobStatus, UnknownStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::JobError;
    use crate::store::{Execution, ExecutionStore, MemoryStore, SqliteStore, StoreError};
    use futures::TryStreamExt;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    fn coordinator_with(store: Arc<dyn ExecutionStore>) -> (JobCoordinator, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        (JobCoordinator::spawn(store, dir.path()), dir)
    }

    fn coordinator() -> (JobCoordinator, TempDir) {
        coordinator_with(Arc::new(MemoryStore::new()))
    }

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    async fn wait_for_terminal(coordinator: &JobCoordinator, job_id: &str) -> Execution {
        timeout(Duration::from_secs(10), async {
            loop {
                let execution = coordinator.get_job_status(job_id).await.unwrap();
                if execution.status.is_terminal() {
                    return execution;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("job never reached a terminal state")
    }

    async fn wait_for_empty_registry(coordinator: &JobCoordinator) {
        timeout(Duration::from_secs(10), async {
            while coordinator.running_jobs() > 0 {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("registry never drained");
    }

    async fn output_lines(coordinator: &JobCoordinator, job_id: &str) -> Vec<String> {
        let lines: Vec<_> = coordinator
            .stream_output(job_id)
            .await
            .expect("output stream")
            .try_collect()
            .await
            .expect("output read");
        lines
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    #[tokio::test]
    async fn echo_completes_with_its_output() {
        let (coordinator, _dir) = coordinator();
        let job_id = coordinator
            .start_job("echo".into(), args(&["hi"]))
            .await
            .expect("job start err");

        let execution = wait_for_terminal(&coordinator, &job_id).await;
        assert_eq!(execution.status, JobStatus::Complete);
        assert_eq!(execution.exit_code, 0);
        assert_eq!(execution.command, "echo");
        assert_eq!(execution.args, args(&["hi"]));
        assert_eq!(output_lines(&coordinator, &job_id).await, vec!["hi"]);
    }

    #[tokio::test]
    async fn non_zero_exit_is_recorded() {
        let (coordinator, _dir) = coordinator();
        let job_id = coordinator
            .start_job("sh".into(), args(&["-c", "echo boom >&2; exit 42"]))
            .await
            .unwrap();

        let execution = wait_for_terminal(&coordinator, &job_id).await;
        assert_eq!(execution.status, JobStatus::Complete);
        assert_eq!(execution.exit_code, 42);
        assert_eq!(output_lines(&coordinator, &job_id).await, vec!["boom"]);
    }

    #[tokio::test]
    async fn fresh_job_is_running_and_stops() {
        let (coordinator, _dir) = coordinator();
        let job_id = coordinator
            .start_job("sleep".into(), args(&["5"]))
            .await
            .unwrap();
        assert_eq!(
            coordinator.get_job_status(&job_id).await.unwrap().status,
            JobStatus::Running
        );
        assert_eq!(coordinator.running_jobs(), 1);

        assert_eq!(coordinator.stop_job(&job_id).await.unwrap(), job_id);
        // a repeated stop while the kill is in flight is harmless
        assert_eq!(coordinator.stop_job(&job_id).await.unwrap(), job_id);

        let stopped = wait_for_terminal(&coordinator, &job_id);
        let execution = timeout(Duration::from_secs(2), stopped)
            .await
            .expect("stop took too long");
        assert_eq!(execution.status, JobStatus::Stopped);
        assert_eq!(execution.exit_code, 0);

        assert_eq!(coordinator.stop_job(&job_id).await.unwrap(), job_id);
        wait_for_empty_registry(&coordinator).await;
    }

    #[tokio::test]
    async fn stopping_a_completed_job_is_a_no_op() {
        let (coordinator, _dir) = coordinator();
        let job_id = coordinator.start_job("true".into(), vec![]).await.unwrap();
        wait_for_terminal(&coordinator, &job_id).await;

        assert_eq!(coordinator.stop_job(&job_id).await.unwrap(), job_id);
        let execution = coordinator.get_job_status(&job_id).await.unwrap();
        assert_eq!(execution.status, JobStatus::Complete);
        assert_eq!(execution.exit_code, 0);
    }

    #[tokio::test]
    async fn missing_binary_ends_in_error() {
        let (coordinator, _dir) = coordinator();
        let job_id = coordinator
            .start_job("/no/such/binary".into(), vec![])
            .await
            .expect("start succeeds even if the process cannot");

        let execution = wait_for_terminal(&coordinator, &job_id).await;
        assert_eq!(execution.status, JobStatus::Error);
        assert_eq!(execution.exit_code, -1);
        assert!(output_lines(&coordinator, &job_id).await.is_empty());
        wait_for_empty_registry(&coordinator).await;
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let (coordinator, _dir) = coordinator();
        for cmd in ["", "   "] {
            assert!(matches!(
                coordinator.start_job(cmd.into(), args(&["x"])).await,
                Err(JobError::InvalidArgument)
            ));
        }
        assert_eq!(coordinator.running_jobs(), 0);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (coordinator, _dir) = coordinator();
        assert!(matches!(
            coordinator.get_job_status("nope").await,
            Err(JobError::NotFound(id)) if id == "nope"
        ));
        assert!(matches!(
            coordinator.stop_job("nope").await,
            Err(JobError::NotFound(_))
        ));
        assert!(matches!(
            coordinator.stream_output("nope").await,
            Err(JobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleted_output_file_is_not_found() {
        let (coordinator, _dir) = coordinator();
        let job_id = coordinator
            .start_job("echo".into(), args(&["gone"]))
            .await
            .unwrap();
        let execution = wait_for_terminal(&coordinator, &job_id).await;
        tokio::fs::remove_file(&execution.output_path).await.unwrap();

        assert!(matches!(
            coordinator.stream_output(&job_id).await,
            Err(JobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn output_of_a_running_job_is_a_snapshot() {
        let (coordinator, _dir) = coordinator();
        let job_id = coordinator
            .start_job("sh".into(), args(&["-c", "echo first; sleep 30"]))
            .await
            .unwrap();

        let lines = timeout(Duration::from_secs(5), async {
            loop {
                let lines = output_lines(&coordinator, &job_id).await;
                if !lines.is_empty() {
                    return lines;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("first line never appeared");
        assert_eq!(lines, vec!["first"]);
        assert_eq!(
            coordinator.get_job_status(&job_id).await.unwrap().status,
            JobStatus::Running
        );

        coordinator.stop_job(&job_id).await.unwrap();
        wait_for_terminal(&coordinator, &job_id).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_starts_never_collide() {
        let (coordinator, _dir) = coordinator();
        let starts: Vec<_> = (0..64)
            .map(|i| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    let job_id = coordinator
                        .start_job("echo".into(), vec![format!("job-{}", i)])
                        .await
                        .unwrap();
                    (i, job_id)
                })
            })
            .collect();

        let mut jobs = Vec::new();
        for start in starts {
            jobs.push(start.await.unwrap());
        }
        let unique: HashSet<_> = jobs.iter().map(|(_, id)| id.clone()).collect();
        assert_eq!(unique.len(), jobs.len());

        for (i, job_id) in &jobs {
            let execution = wait_for_terminal(&coordinator, job_id).await;
            assert_eq!(execution.status, JobStatus::Complete);
            assert_eq!(
                output_lines(&coordinator, job_id).await,
                vec![format!("job-{}", i)]
            );
        }
        wait_for_empty_registry(&coordinator).await;
    }

    /// Counts terminal writes per job id.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        updates: Mutex<HashMap<String, usize>>,
    }

    impl ExecutionStore for CountingStore {
        fn migrate(&self) -> store::Result<()> {
            self.inner.migrate()
        }

        fn get_execution(&self, id: &str) -> store::Result<Execution> {
            self.inner.get_execution(id)
        }

        fn create_execution(&self, execution: &Execution) -> store::Result<()> {
            self.inner.create_execution(execution)
        }

        fn update_execution(&self, execution: &Execution) -> store::Result<()> {
            *self
                .updates
                .lock()
                .unwrap()
                .entry(execution.id.clone())
                .or_default() += 1;
            self.inner.update_execution(execution)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_start_and_stop_record_exactly_one_outcome() {
        let store = Arc::new(CountingStore::default());
        let (coordinator, _dir) = coordinator_with(store.clone());

        let pairs: Vec<_> = (0..32)
            .map(|i| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    // short jobs race their own stop, long ones are always killed
                    let (cmd, args) = if i % 2 == 0 {
                        ("true", vec![])
                    } else {
                        ("sleep", vec!["5".to_string()])
                    };
                    let job_id = coordinator.start_job(cmd.into(), args).await.unwrap();
                    coordinator.stop_job(&job_id).await.unwrap();
                    coordinator.stop_job(&job_id).await.unwrap();
                    job_id
                })
            })
            .collect();

        let mut ids = Vec::new();
        for pair in pairs {
            ids.push(pair.await.unwrap());
        }
        for job_id in &ids {
            let execution = wait_for_terminal(&coordinator, job_id).await;
            assert!(matches!(
                execution.status,
                JobStatus::Complete | JobStatus::Stopped
            ));
        }
        wait_for_empty_registry(&coordinator).await;

        let updates = store.updates.lock().unwrap();
        for job_id in &ids {
            assert_eq!(updates.get(job_id), Some(&1), "job {}", job_id);
        }
    }

    /// A store that refuses the writes it is told to refuse.
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStore,
        fail_creates: bool,
        fail_updates: bool,
    }

    impl ExecutionStore for FailingStore {
        fn migrate(&self) -> store::Result<()> {
            self.inner.migrate()
        }

        fn get_execution(&self, id: &str) -> store::Result<Execution> {
            self.inner.get_execution(id)
        }

        fn create_execution(&self, execution: &Execution) -> store::Result<()> {
            if self.fail_creates {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.create_execution(execution)
        }

        fn update_execution(&self, execution: &Execution) -> store::Result<()> {
            if self.fail_updates {
                return Err(StoreError::Unavailable("disk full".into()));
            }
            self.inner.update_execution(execution)
        }
    }

    #[tokio::test]
    async fn lost_terminal_write_leaves_a_stoppable_running_record() {
        let store = FailingStore {
            fail_updates: true,
            ..Default::default()
        };
        let (coordinator, _dir) = coordinator_with(Arc::new(store));
        let job_id = coordinator.start_job("true".into(), vec![]).await.unwrap();

        // the job is unregistered even though its outcome was never recorded
        wait_for_empty_registry(&coordinator).await;
        let execution = coordinator.get_job_status(&job_id).await.unwrap();
        assert_eq!(execution.status, JobStatus::Running);

        assert_eq!(coordinator.stop_job(&job_id).await.unwrap(), job_id);
        assert_eq!(coordinator.stop_job(&job_id).await.unwrap(), job_id);
    }

    #[tokio::test]
    async fn failed_persist_leaves_nothing_behind() {
        let store = FailingStore {
            fail_creates: true,
            ..Default::default()
        };
        let (coordinator, dir) = coordinator_with(Arc::new(store));

        assert!(matches!(
            coordinator.start_job("echo".into(), args(&["hi"])).await,
            Err(JobError::Persistence(StoreError::Unavailable(_)))
        ));
        assert_eq!(coordinator.running_jobs(), 0);
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_backed_jobs_round_trip() {
        let db_dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(db_dir.path().join("executions.db")).unwrap();
        store.migrate().unwrap();
        let (coordinator, _dir) = coordinator_with(Arc::new(store));

        let job_id = coordinator
            .start_job("printf".into(), args(&["a\\nb\\n"]))
            .await
            .unwrap();
        let execution = wait_for_terminal(&coordinator, &job_id).await;
        assert_eq!(execution.status, JobStatus::Complete);
        assert_eq!(execution.args, args(&["a\\nb\\n"]));
        assert_eq!(output_lines(&coordinator, &job_id).await, vec!["a", "b"]);
    }
}
