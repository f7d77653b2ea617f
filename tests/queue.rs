//! Job queue integration tests: lifecycle, retries and the status document.

use async_trait::async_trait;
use futures::StreamExt;
use statement_parser::error::StageError;
use statement_parser::{
    watch_job, JobLifecycleAdapter, JobOptions, JobQueue, JobState, JobStatus, LlmClient,
    ParserConfig, QueueConfig, StatementError, StatementParser, TextExtractor, Upload,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use tokio::time::Instant;

// ── Test helpers ─────────────────────────────────────────────────────────────

const GOOD: &str = r#"{"name":"Jane Doe","address":"1 Main St","documentDate":"2024-01-31",
  "startBalance":100,"endBalance":150,
  "transactions":[{"date":"2024-01-02","description":"Deposit","amount":50}]}"#;

struct Fixed;

impl TextExtractor for Fixed {
    fn extract(&self, _pdf: &[u8]) -> Result<String, StageError> {
        Ok("Opening balance 100.00 Deposit 50.00 Closing balance 150.00".into())
    }
}

/// Fails the first `failures` calls, then replies with [`GOOD`].
struct Flaky {
    failures: usize,
    calls: AtomicUsize,
    started: Mutex<Vec<Instant>>,
}

impl Flaky {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// When each call was made, on the tokio clock.
    fn started(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn create_response(&self, _system: &str, _user: &str) -> Result<String, StageError> {
        self.started.lock().unwrap().push(Instant::now());
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(StageError::LlmCall {
                provider: "flaky".into(),
                detail: format!("rate limited (call {})", n + 1),
            })
        } else {
            Ok(GOOD.to_string())
        }
    }
}

/// Blocks until `n` calls are in flight at once.
struct Gate(Barrier);

#[async_trait]
impl LlmClient for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    async fn create_response(&self, _system: &str, _user: &str) -> Result<String, StageError> {
        self.0.wait().await;
        Ok(GOOD.to_string())
    }
}

fn start(client: Arc<dyn LlmClient>, workers: usize, attempts: u32) -> JobQueue {
    let config = ParserConfig::default();
    let parser = StatementParser::with_parts(Arc::new(Fixed), client, &config);
    let queue_config = QueueConfig::builder()
        .workers(workers)
        .attempts(attempts)
        .backoff_delay_ms(5)
        .build()
        .unwrap();
    JobQueue::start(JobLifecycleAdapter::new(Arc::new(parser)), queue_config)
}

fn upload(name: &str) -> Upload {
    Upload::from_bytes(name, b"%PDF-1.7\n%fake".to_vec(), &ParserConfig::default()).unwrap()
}

/// Every distinct status the job goes through, ending with the terminal one.
async fn follow(queue: &JobQueue, job_id: &str) -> Vec<JobStatus> {
    let watch = watch_job(queue.clone(), job_id, Duration::from_millis(2))
        .map(|s| s.unwrap())
        .collect::<Vec<_>>();
    tokio::time::timeout(Duration::from_secs(10), watch)
        .await
        .expect("job did not finish in time")
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn submitted_job_is_acknowledged() {
    let queue = start(Flaky::new(0), 1, 1);
    let ack = queue.submit(upload("jan.pdf"), JobOptions::default()).await.unwrap();

    assert_eq!(ack.status, "queued");
    assert_eq!(ack.file_name, "jan.pdf");
    assert_eq!(ack.message, "File queued successfully for processing");
    assert!(ack.job_id.starts_with("pdf-"), "{}", ack.job_id);

    let json = serde_json::to_value(&ack).unwrap();
    assert!(json.get("jobId").is_some());
    assert!(json.get("queuedAt").is_some());
}

#[tokio::test]
async fn successful_job_completes_with_result() {
    let queue = start(Flaky::new(0), 1, 3);
    let ack = queue.submit(upload("jan.pdf"), JobOptions::default()).await.unwrap();

    let history = follow(&queue, &ack.job_id).await;
    let last = history.last().unwrap();
    assert_eq!(last.status, JobState::Completed);
    assert_eq!(last.progress, 100);
    assert_eq!(last.attempts_made, 1);

    let progress: Vec<u8> = history.iter().map(|s| s.progress).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");

    let json = serde_json::to_value(last).unwrap();
    assert_eq!(json["jobType"], "pdf-parsing");
    assert_eq!(json["fileName"], "jan.pdf");
    assert_eq!(json["result"]["isReconciled"], true);
    assert_eq!(json["result"]["transactions"][0]["amount"], 50.0);
    assert!(json.get("error").is_none());
    assert!(json.get("processedAt").is_some());
    assert!(json.get("completedAt").is_some());
    assert!(json["processingTime"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let client = Flaky::new(2);
    let queue = start(client.clone(), 1, 3);
    let ack = queue.submit(upload("jan.pdf"), JobOptions::default()).await.unwrap();

    let last = follow(&queue, &ack.job_id).await.pop().unwrap();
    assert_eq!(last.status, JobState::Completed);
    assert_eq!(last.attempts_made, 3);
    assert!(last.error.is_none());
    assert_eq!(client.calls(), 3);
}

#[tokio::test]
async fn exhausted_attempts_fail_the_job() {
    let client = Flaky::new(usize::MAX);
    let queue = start(client.clone(), 1, 2);
    let ack = queue.submit(upload("jan.pdf"), JobOptions::default()).await.unwrap();

    let last = follow(&queue, &ack.job_id).await.pop().unwrap();
    assert_eq!(last.status, JobState::Failed);
    assert_eq!(last.attempts_made, 2);
    assert!(last.result.is_none());
    assert_eq!(client.calls(), 2);

    let error = last.error.unwrap();
    assert_eq!(
        error.message,
        "Failed to parse bank statement: Failed to get response from flaky: rate limited (call 2)"
    );
    let stack = error.stack.unwrap();
    assert!(stack.contains("Caused by: Failed to get response from flaky"), "{stack}");
}

#[tokio::test]
async fn per_job_attempts_override_queue_default() {
    let client = Flaky::new(usize::MAX);
    let queue = start(client.clone(), 1, 5);
    let ack = queue
        .submit(upload("jan.pdf"), JobOptions::default().with_attempts(1))
        .await
        .unwrap();

    let last = follow(&queue, &ack.job_id).await.pop().unwrap();
    assert_eq!(last.status, JobState::Failed);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn workers_run_jobs_in_parallel() {
    let queue = start(Arc::new(Gate(Barrier::new(2))), 2, 1);
    let a = queue.submit(upload("a.pdf"), JobOptions::default()).await.unwrap();
    let b = queue.submit(upload("b.pdf"), JobOptions::default()).await.unwrap();

    let (ha, hb) = tokio::join!(follow(&queue, &a.job_id), follow(&queue, &b.job_id));
    assert_eq!(ha.last().unwrap().status, JobState::Completed);
    assert_eq!(hb.last().unwrap().status, JobState::Completed);
}

// ── Backoff ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_attempt_is_delayed_for_the_backoff() {
    let client = Flaky::new(1);
    let queue = start(client.clone(), 1, 2);
    let ack = queue
        .submit(upload("jan.pdf"), JobOptions::default().with_backoff_delay_ms(1_000))
        .await
        .unwrap();

    let history = follow(&queue, &ack.job_id).await;
    let states: Vec<JobState> = history.iter().map(|s| s.status).collect();
    let delayed = states.iter().position(|s| *s == JobState::Delayed);
    assert!(delayed.is_some(), "{states:?}");
    assert_eq!(states.last(), Some(&JobState::Completed));
    assert_eq!(history[delayed.unwrap()].attempts_made, 1);

    let started = client.started();
    assert_eq!(started.len(), 2);
    assert!(
        started[1] - started[0] >= Duration::from_millis(1_000),
        "retry started after {:?}",
        started[1] - started[0]
    );
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_between_retries() {
    let client = Flaky::new(2);
    let queue = start(client.clone(), 1, 3);
    let ack = queue
        .submit(upload("jan.pdf"), JobOptions::default().with_backoff_delay_ms(1_000))
        .await
        .unwrap();

    let last = follow(&queue, &ack.job_id).await.pop().unwrap();
    assert_eq!(last.status, JobState::Completed);

    let started = client.started();
    assert_eq!(started.len(), 3);
    assert!(started[1] - started[0] >= Duration::from_millis(1_000));
    assert!(started[2] - started[1] >= Duration::from_millis(2_000));
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_backoff_fails_the_job() {
    let client = Flaky::new(usize::MAX);
    let queue = start(client.clone(), 1, 3);
    let ack = queue
        .submit(upload("jan.pdf"), JobOptions::default().with_backoff_delay_ms(60_000))
        .await
        .unwrap();

    for _ in 0..1_000 {
        if queue.status(&ack.job_id).await.unwrap().status == JobState::Delayed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(queue.status(&ack.job_id).await.unwrap().status, JobState::Delayed);

    queue.shutdown().await;

    let status = queue.status(&ack.job_id).await.unwrap();
    assert_eq!(status.status, JobState::Failed);
    assert_eq!(status.attempts_made, 1);
    assert!(status.completed_at.is_some());
    let error = status.error.unwrap();
    assert!(error.message.ends_with("rate limited (call 1)"), "{}", error.message);

    // The retry timer firing later must not bring the job back.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(queue.status(&ack.job_id).await.unwrap().status, JobState::Failed);
    assert_eq!(client.calls(), 1);
}

// ── Identity and lookup ──────────────────────────────────────────────────────

#[tokio::test]
async fn caller_supplied_id_is_kept() {
    let queue = start(Flaky::new(0), 1, 1);
    let ack = queue
        .submit(upload("jan.pdf"), JobOptions::default().with_job_id("statement-42"))
        .await
        .unwrap();
    assert_eq!(ack.job_id, "statement-42");

    let status = queue.status("statement-42").await.unwrap();
    assert_eq!(status.job_id, "statement-42");
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let queue = start(Flaky::new(0), 1, 1);
    let options = JobOptions::default().with_job_id("dup");
    queue.submit(upload("a.pdf"), options.clone()).await.unwrap();

    let err = queue.submit(upload("b.pdf"), options).await.unwrap_err();
    assert!(matches!(err, StatementError::DuplicateJob { ref job_id } if job_id == "dup"));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let queue = start(Flaky::new(0), 1, 1);
    let err = queue.status("missing").await.unwrap_err();
    assert_eq!(err.to_string(), "PDF parsing job missing not found");

    let mut watch = watch_job(queue.clone(), "missing", Duration::from_millis(1));
    assert!(matches!(
        watch.next().await,
        Some(Err(StatementError::JobNotFound { .. }))
    ));
    assert!(watch.next().await.is_none());
}
