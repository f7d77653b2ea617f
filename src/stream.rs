//! Streaming status API: follow a job until it finishes.
//!
//! Polling [`JobQueue::status`] by hand means writing the same loop in every
//! caller. [`watch_job`] does it once and yields a status document each time
//! the job's state or progress changes, ending after the first terminal
//! (`completed` or `failed`) document.

use crate::error::StatementError;
use crate::job::queue::JobQueue;
use crate::job::status::JobStatus;
use crate::job::JobState;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;

/// A boxed stream of job status documents.
pub type StatusStream = Pin<Box<dyn Stream<Item = Result<JobStatus, StatementError>> + Send>>;

struct Watch {
    queue: JobQueue,
    job_id: String,
    last: Option<(JobState, u8)>,
}

/// Poll `job_id` every `poll_interval`, yielding only changes.
///
/// An unknown id yields a single [`StatementError::JobNotFound`] and ends
/// the stream.
pub fn watch_job(
    queue: JobQueue,
    job_id: impl Into<String>,
    poll_interval: Duration,
) -> StatusStream {
    let start = Watch {
        queue,
        job_id: job_id.into(),
        last: None,
    };

    stream::unfold(Some(start), move |watch| async move {
        let mut watch = watch?;
        loop {
            if watch.last.is_some() {
                tokio::time::sleep(poll_interval).await;
            }
            match watch.queue.status(&watch.job_id).await {
                Err(e) => return Some((Err(e), None)),
                Ok(status) => {
                    let key = (status.status, status.progress);
                    if watch.last == Some(key) {
                        continue;
                    }
                    watch.last = Some(key);
                    let next = if status.is_terminal() { None } else { Some(watch) };
                    return Some((Ok(status), next));
                }
            }
        }
    })
    .boxed()
}
