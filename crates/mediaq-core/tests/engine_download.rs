//! Integration test: download jobs driven through the engine.
//!
//! Uses a scripted command runner to observe the progress codes a job walks
//! through across retries, and (on unix) real `sh` processes through the
//! download service to check atomic artifact delivery and ranged reads.

use async_trait::async_trait;
use mediaq_core::command::{CommandError, CommandRunner, CommandSpec, Invocation};
use mediaq_core::config::{DownloadConfig, EngineConfig, MediaqConfig, RetryConfig};
use mediaq_core::download::{DownloadJob, DownloadOptions, DownloadRequest};
use mediaq_core::engine::{EngineError, JobEngine};
use mediaq_core::job::{Job, Progress, RetrySignal};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;

type Log = Arc<Mutex<Vec<i64>>>;

/// Fails every execution; logs the job's progress while the command "runs".
struct FailingRunner {
    job: Mutex<Option<Weak<DownloadJob>>>,
    log: Log,
}

#[async_trait]
impl CommandRunner for FailingRunner {
    async fn run(&self, invocation: Invocation) -> Result<(), CommandError> {
        if let Some(job) = self.job.lock().as_ref().and_then(Weak::upgrade) {
            self.log.lock().push(job.progress().code());
        }
        Err(CommandError::Timeout {
            program: invocation.program,
            limit: Duration::from_millis(1),
        })
    }
}

/// Logs progress on construction and after every execution.
struct Recorded {
    inner: Arc<DownloadJob>,
    log: Log,
}

#[async_trait]
impl Job for Recorded {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn progress(&self) -> Progress {
        self.inner.progress()
    }

    async fn execute(&self) -> bool {
        let ok = self.inner.execute().await;
        self.log.lock().push(self.inner.progress().code());
        ok
    }

    fn request_retry(&self) -> Option<RetrySignal> {
        self.inner.request_retry()
    }

    fn cancel(&self) {
        self.inner.cancel()
    }
}

fn engine(workers: usize) -> JobEngine {
    JobEngine::new(&EngineConfig {
        workers,
        queue_factor: 4,
        ..EngineConfig::default()
    })
}

fn recorded_failing_job(
    engine: &JobEngine,
    dir: &std::path::Path,
    id: &str,
    max_attempts: u32,
    retry_delay: Duration,
) -> (Arc<Recorded>, Log) {
    let log: Log = Arc::default();
    let runner = Arc::new(FailingRunner {
        job: Mutex::new(None),
        log: Arc::clone(&log),
    });
    let inner = Arc::new(DownloadJob::new(
        &engine.root_token(),
        DownloadRequest {
            id: id.to_string(),
            url: "https://example.com/v".into(),
            destination: dir.join(format!("{id}.mp4")),
        },
        DownloadOptions {
            retry_delay,
            max_attempts,
            max_duration: Duration::ZERO,
        },
        CommandSpec {
            program: "scripted".into(),
            args: vec!["{output}".into()],
        },
        runner.clone(),
    ));
    *runner.job.lock() = Some(Arc::downgrade(&inner));
    log.lock().push(inner.progress().code());
    (Arc::new(Recorded { inner, log: Arc::clone(&log) }), log)
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn always_failing_download_walks_retry_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let e = engine(2);
    e.run().unwrap();
    let (job, log) = recorded_failing_job(&e, dir.path(), "seq", 3, Duration::from_millis(10));
    e.submit(job.clone()).await.unwrap();

    wait_until(|| job.progress() == Progress::Failed).await;
    wait_until(|| e.progress("seq").is_err()).await;
    assert_eq!(*log.lock(), vec![0, 30, -2, 30, -2, 30, -1]);
    assert_eq!(job.inner.attempt(), 3);
    assert!(!dir.path().join("seq.mp4").exists());
    e.shutdown().await;
}

#[tokio::test]
async fn single_attempt_fails_without_retrying() {
    let dir = tempfile::tempdir().unwrap();
    let e = engine(1);
    e.run().unwrap();
    let (job, log) = recorded_failing_job(&e, dir.path(), "once", 0, Duration::ZERO);
    e.submit(job.clone()).await.unwrap();

    wait_until(|| job.progress() == Progress::Failed).await;
    assert_eq!(*log.lock(), vec![0, 30, -1]);
    e.shutdown().await;
}

#[tokio::test]
async fn cancel_while_waiting_for_retry_is_final() {
    let dir = tempfile::tempdir().unwrap();
    let e = engine(1);
    e.run().unwrap();
    let (job, log) = recorded_failing_job(&e, dir.path(), "wait", 5, Duration::from_secs(30));
    e.submit(job.clone()).await.unwrap();
    wait_until(|| e.stats().pending_retry == 1).await;

    assert_eq!(e.cancel("wait"), Ok(Progress::Retrying));
    assert_eq!(job.progress(), Progress::Cancelled);
    assert_eq!(e.progress("wait"), Err(EngineError::NotFound("wait".into())));
    assert_eq!(*log.lock(), vec![0, 30, -2]);
    e.shutdown().await;
}

#[cfg(unix)]
mod process {
    use super::*;
    use mediaq_core::artifact;
    use mediaq_core::service::DownloadService;

    fn config(root: &std::path::Path, script: &str) -> MediaqConfig {
        MediaqConfig {
            engine: EngineConfig {
                workers: 2,
                queue_factor: 2,
                shutdown_grace_secs: 1,
            },
            download: DownloadConfig {
                root: root.to_path_buf(),
                program: "sh".into(),
                args: vec!["-c".into(), script.into(), "{output}".into(), "{url}".into()],
                max_duration_secs: 10,
            },
            retry: RetryConfig {
                max_attempts: 2,
                delay_ms: 10,
            },
        }
    }

    #[tokio::test]
    async fn service_delivers_artifact_and_serves_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), r#"printf '%s' "$1" > "$0""#);
        let e = JobEngine::new(&cfg.engine);
        let svc = DownloadService::from_config(e.clone(), &cfg);
        e.run().unwrap();

        let sub = svc.submit("https://example.com/clip").await.unwrap();
        wait_until(|| svc.status(&sub.job_id) == Ok(Progress::Completed)).await;

        let (range, size, bytes) =
            artifact::fetch(dir.path(), &sub.artifact_id, Some("bytes=8-18"))
                .await
                .unwrap();
        assert_eq!(size, "https://example.com/clip".len() as u64);
        assert_eq!(range, 8..19);
        assert_eq!(bytes, b"example.com");
        assert!(!dir
            .path()
            .join(format!("{}.part", sub.artifact_id))
            .exists());
        e.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_kills_running_download_and_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), r#"echo partial > "$0"; sleep 30"#);
        let e = JobEngine::new(&cfg.engine);
        let svc = DownloadService::from_config(e.clone(), &cfg);
        e.run().unwrap();

        let sub = svc.submit("https://example.com/slow").await.unwrap();
        wait_until(|| svc.status(&sub.job_id) == Ok(Progress::Running)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        tokio::time::timeout(Duration::from_secs(10), e.shutdown())
            .await
            .expect("shutdown should kill the child");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
}
