//! In-process job queue.
//!
//! Jobs are kept in a shared table keyed by id; workers pull ids from an
//! unbounded channel and run one attempt at a time through the
//! [`JobLifecycleAdapter`]. A failed attempt is retried after an
//! exponential backoff until the job's attempt budget is spent.
//!
//! The uploaded buffer lives only as long as the job can still run: it is
//! dropped as soon as the job completes or fails for good.
//!
//! Only [`JobQueue`] handles own the sending half of the channel. Once the
//! last handle is dropped the workers drain what is left and exit.

use super::processor::{JobHandle, JobLifecycleAdapter};
use super::status::JobStatus;
use super::{
    generate_job_id, iso8601, now_millis, JobOptions, JobSnapshot, JobState, SubmittedJob,
};
use crate::config::QueueConfig;
use crate::error::{JobError, StatementError};
use crate::pipeline::input::Upload;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct JobEntry {
    snapshot: JobSnapshot,
    buffer: Option<Arc<Vec<u8>>>,
    /// Queue policy with this job's overrides applied.
    policy: QueueConfig,
}

impl JobEntry {
    fn finish(&mut self, state: JobState) {
        self.snapshot.state = state;
        self.snapshot.finished_on = Some(now_millis());
        self.buffer = None;
    }

    /// Fail a job that can no longer run because the queue is closed.
    fn abandon(&mut self) {
        if self.snapshot.failed_reason.is_none() {
            self.snapshot.failed_reason = Some(JobError {
                message: StatementError::QueueClosed.to_string(),
                stack: None,
            });
        }
        self.finish(JobState::Failed);
    }
}

struct Shared {
    jobs: RwLock<HashMap<String, JobEntry>>,
    config: QueueConfig,
    /// Used by retry timers; upgrading fails once every handle is gone.
    requeue: mpsc::WeakUnboundedSender<String>,
    closed: AtomicBool,
    stop: watch::Sender<bool>,
}

/// Handle to a running queue. Clones share the same jobs and workers.
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<Shared>,
    sender: mpsc::UnboundedSender<String>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl JobQueue {
    /// Spawn `config.workers` workers on the current tokio runtime.
    pub fn start(adapter: JobLifecycleAdapter, config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (stop, _) = watch::channel(false);
        let receiver = Arc::new(Mutex::new(receiver));
        let adapter = Arc::new(adapter);
        let worker_count = config.workers.max(1);

        let shared = Arc::new(Shared {
            jobs: RwLock::new(HashMap::new()),
            config,
            requeue: sender.downgrade(),
            closed: AtomicBool::new(false),
            stop,
        });

        let workers = (0..worker_count)
            .map(|index| {
                tokio::spawn(worker_loop(
                    index,
                    Arc::clone(&shared),
                    Arc::clone(&adapter),
                    Arc::clone(&receiver),
                ))
            })
            .collect();

        info!("Job queue started with {} worker(s)", worker_count);
        Self {
            shared,
            sender,
            workers: Arc::new(Mutex::new(workers)),
        }
    }

    /// Accept an upload as a new job in the `waiting` state.
    pub async fn submit(
        &self,
        upload: Upload,
        options: JobOptions,
    ) -> Result<SubmittedJob, StatementError> {
        if self.is_closed() {
            return Err(StatementError::QueueClosed);
        }

        let job_id = options
            .job_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_job_id);

        let mut policy = self.shared.config.clone();
        if let Some(attempts) = options.attempts {
            policy.attempts = attempts.max(1);
        }
        if let Some(ms) = options.backoff_delay_ms {
            policy.backoff_delay_ms = ms;
        }

        let created_on = now_millis();
        let size = upload.bytes.len();
        {
            let mut jobs = self.shared.jobs.write().await;
            if jobs.contains_key(&job_id) {
                return Err(StatementError::DuplicateJob { job_id });
            }
            jobs.insert(
                job_id.clone(),
                JobEntry {
                    snapshot: JobSnapshot {
                        id: job_id.clone(),
                        file_name: upload.file_name.clone(),
                        state: JobState::Waiting,
                        progress: 0,
                        attempts_made: 0,
                        created_on,
                        processed_on: None,
                        finished_on: None,
                        result: None,
                        failed_reason: None,
                    },
                    buffer: Some(Arc::new(upload.bytes)),
                    policy,
                },
            );
        }

        if self.sender.send(job_id.clone()).is_err() {
            self.shared.jobs.write().await.remove(&job_id);
            return Err(StatementError::QueueClosed);
        }

        info!(
            "Queued PDF parsing job {} for file: {} ({} bytes)",
            job_id, upload.file_name, size
        );

        Ok(SubmittedJob {
            message: "File queued successfully for processing".to_string(),
            job_id,
            file_name: upload.file_name,
            status: "queued".to_string(),
            queued_at: iso8601(created_on),
        })
    }

    /// Status document for `job_id`.
    pub async fn status(&self, job_id: &str) -> Result<JobStatus, StatementError> {
        self.snapshot(job_id)
            .await
            .map(|s| JobStatus::from_snapshot(&s))
            .ok_or_else(|| StatementError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Raw bookkeeping for `job_id`, if the queue knows it.
    pub async fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        let jobs = self.shared.jobs.read().await;
        jobs.get(job_id).map(|entry| entry.snapshot.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs and wait for the workers to exit.
    ///
    /// An attempt already in flight runs to completion. Jobs that are still
    /// `waiting` or `delayed` afterwards are failed and their buffers dropped.
    pub async fn shutdown(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.stop.send_replace(true);

        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Worker ended abnormally: {}", e);
            }
        }

        let mut abandoned = 0;
        let mut jobs = self.shared.jobs.write().await;
        for entry in jobs.values_mut() {
            if matches!(entry.snapshot.state, JobState::Waiting | JobState::Delayed) {
                entry.abandon();
                abandoned += 1;
            }
        }
        if abandoned > 0 {
            warn!("Failed {} pending job(s) at shutdown", abandoned);
        }
        info!("Job queue shut down");
    }

    #[cfg(test)]
    async fn holds_buffer(&self, job_id: &str) -> bool {
        let jobs = self.shared.jobs.read().await;
        jobs.get(job_id).is_some_and(|e| e.buffer.is_some())
    }
}

/// A job as handed to the adapter for one attempt.
struct QueuedJob {
    shared: Arc<Shared>,
    id: String,
    file_name: String,
    buffer: Arc<Vec<u8>>,
}

#[async_trait]
impl JobHandle for QueuedJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    async fn update_progress(&self, percent: u8) {
        let mut jobs = self.shared.jobs.write().await;
        if let Some(entry) = jobs.get_mut(&self.id) {
            entry.snapshot.progress = percent.min(100);
        }
    }
}

async fn worker_loop(
    index: usize,
    shared: Arc<Shared>,
    adapter: Arc<JobLifecycleAdapter>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
) {
    debug!("Worker {} started", index);
    let mut stop = shared.stop.subscribe();
    loop {
        if *stop.borrow() {
            break;
        }
        let next = tokio::select! {
            _ = stop.changed() => break,
            next = async { receiver.lock().await.recv().await } => next,
        };
        let Some(job_id) = next else {
            break;
        };
        run_attempt(&shared, &adapter, job_id).await;
    }
    debug!("Worker {} stopped", index);
}

async fn run_attempt(shared: &Arc<Shared>, adapter: &JobLifecycleAdapter, job_id: String) {
    let job = {
        let mut jobs = shared.jobs.write().await;
        let Some(entry) = jobs.get_mut(&job_id) else {
            warn!("Job {} vanished before it could run", job_id);
            return;
        };
        if entry.snapshot.state != JobState::Waiting {
            return;
        }
        let Some(buffer) = entry.buffer.clone() else {
            return;
        };
        entry.snapshot.state = JobState::Active;
        entry.snapshot.processed_on = Some(now_millis());
        QueuedJob {
            shared: Arc::clone(shared),
            id: job_id.clone(),
            file_name: entry.snapshot.file_name.clone(),
            buffer,
        }
    };

    let outcome = adapter.process(&job).await;

    let retry_in = {
        let mut jobs = shared.jobs.write().await;
        let Some(entry) = jobs.get_mut(&job_id) else {
            return;
        };
        entry.snapshot.attempts_made += 1;

        match outcome {
            Ok(record) => {
                info!(
                    "Job {} completed: {} transactions",
                    job_id,
                    record.transaction_count()
                );
                entry.snapshot.result = Some(record);
                entry.snapshot.failed_reason = None;
                entry.finish(JobState::Completed);
                None
            }
            Err(err) => {
                entry.snapshot.failed_reason = Some(JobError::from_error(&err));
                let made = entry.snapshot.attempts_made;
                let allowed = entry.policy.attempts;
                if made < allowed && !shared.closed.load(Ordering::SeqCst) {
                    let delay = entry.policy.backoff_for(made);
                    warn!(
                        "Job {} failed attempt {}/{}, retrying in {} ms",
                        job_id, made, allowed, delay
                    );
                    entry.snapshot.state = JobState::Delayed;
                    Some(delay)
                } else {
                    error!("Job {} failed after {} attempt(s): {}", job_id, made, err);
                    entry.finish(JobState::Failed);
                    None
                }
            }
        }
    };

    if let Some(delay_ms) = retry_in {
        schedule_retry(Arc::clone(shared), job_id, delay_ms);
    }
}

/// Move a delayed job back to `waiting` once its backoff has elapsed.
fn schedule_retry(shared: Arc<Shared>, job_id: String, delay_ms: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        {
            let mut jobs = shared.jobs.write().await;
            let Some(entry) = jobs.get_mut(&job_id) else {
                return;
            };
            if entry.snapshot.state != JobState::Delayed {
                return;
            }
            let sender = match shared.requeue.upgrade() {
                Some(sender) if !shared.closed.load(Ordering::SeqCst) => sender,
                _ => {
                    entry.abandon();
                    return;
                }
            };
            entry.snapshot.state = JobState::Waiting;
            if sender.send(job_id.clone()).is_err() {
                warn!("Could not re-queue job {}: no workers left", job_id);
                entry.abandon();
            }
        }
    });
}
