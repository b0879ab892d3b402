//! Polling fallback for task status.
//!
//! Push delivery is at-most-once and nothing is replayed after a reconnect,
//! so a view following a task also polls its status on a fixed period. The
//! poll stops for good as soon as a terminal status is seen, either by the
//! poll itself or by a push event reported through
//! [`PollHandle::observe_final`]. Dropping the handle stops it too.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::job::JobRecord;

/// Source of point-in-time task status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetches the current state of task `id`.
    async fn fetch_status(&self, id: &str) -> Result<JobRecord>;
}

/// Spawns status polls on a fixed period.
#[derive(Debug, Clone, Copy)]
pub struct StatusPoller {
    period: Duration,
}

impl Default for StatusPoller {
    fn default() -> Self {
        Self::new(Duration::from_millis(3000))
    }
}

impl StatusPoller {
    /// Creates a poller with the given period.
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// The poll period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Starts polling `task_id`.
    ///
    /// `on_update` runs on the polling task for every successful fetch,
    /// including the final one. Fetch failures are logged and retried on the
    /// next period. Must be called from within a Tokio runtime.
    pub fn spawn<S, F>(&self, task_id: impl Into<String>, source: Arc<S>, mut on_update: F) -> PollHandle
    where
        S: StatusSource + ?Sized + 'static,
        F: FnMut(JobRecord) + Send + 'static,
    {
        let task_id = task_id.into();
        let period = self.period;
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));

        let task = {
            let token = token.clone();
            let finished = finished.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => break,
                        () = tokio::time::sleep(period) => {},
                    }

                    let fetched = tokio::select! {
                        biased;
                        () = token.cancelled() => break,
                        fetched = source.fetch_status(&task_id) => fetched,
                    };

                    match fetched {
                        Ok(record) => {
                            let is_final = record.is_final();
                            on_update(record);
                            if is_final {
                                tracing::debug!(task_id = %task_id, "poll observed final status");
                                break;
                            }
                        },
                        Err(err) => {
                            tracing::warn!(task_id = %task_id, error = %err, "status poll failed");
                        },
                    }
                }
                finished.store(true, Ordering::SeqCst);
            })
        };

        PollHandle {
            task_id,
            token,
            finished,
            task: Some(task),
        }
    }
}

/// Handle to a running poll. Dropping it stops the poll.
#[must_use = "dropping the handle stops the poll"]
#[derive(Debug)]
pub struct PollHandle {
    task_id: String,
    token: CancellationToken,
    finished: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Task being polled.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Reports a terminal status seen on the push channel; no further poll
    /// is issued.
    pub fn observe_final(&self) {
        self.token.cancel();
    }

    /// Stops the poll.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the polling task has exited.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Waits for the polling task to exit.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(task_id = %self.task_id, error = %err, "poll task aborted");
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
