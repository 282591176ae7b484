//! Waiting for extraction work on content to finish.
//!
//! Waiting is a caller-driven polling loop. Each round long-polls the
//! service for the content id and then reads the tasks bound to it. Ids are
//! processed in order; the first failure (transport error, failed task,
//! cancellation or deadline) aborts the remaining ids and is returned.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Task, TaskTracker};
use crate::error::{IndexifyError, Result};

/// Where completion state comes from.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    /// Long-poll until the service reports the content settled.
    async fn await_content(&self, content_id: &str) -> Result<()>;

    /// Current tasks bound to the content id.
    async fn content_tasks(&self, content_id: &str) -> Result<Vec<Task>>;
}

/// Polls a [`CompletionSource`] until content ids resolve.
pub struct CompletionWaiter<'a, S: CompletionSource + ?Sized> {
    source: &'a S,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl<'a, S: CompletionSource + ?Sized> CompletionWaiter<'a, S> {
    pub fn new(source: &'a S, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
            timeout: None,
        }
    }

    /// Give up once `timeout` has elapsed across all ids.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait until every id's tasks are terminal.
    pub async fn wait<I: AsRef<str>>(&self, content_ids: &[I], cancel: &CancellationToken) -> Result<()> {
        let deadline = self.timeout.map(|t| Instant::now() + t);

        for content_id in content_ids {
            let content_id = content_id.as_ref();
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, self.wait_one(content_id, cancel))
                    .await
                    .map_err(|_| {
                        warn!(content_id, "Deadline reached while waiting for extraction");
                        IndexifyError::TimedOut {
                            content_id: content_id.to_string(),
                        }
                    })??,
                None => self.wait_one(content_id, cancel).await?,
            }
        }

        Ok(())
    }

    async fn wait_one(&self, content_id: &str, cancel: &CancellationToken) -> Result<()> {
        let mut tracker = TaskTracker::new();
        let mut round = 0u32;

        loop {
            round += 1;
            let tasks = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IndexifyError::Cancelled),
                tasks = self.poll(content_id) => tasks?,
            };

            let progress = tracker.observe_all(&tasks);
            if let Some(failed) = progress.failure {
                warn!(
                    content_id,
                    task_id = %failed.id,
                    policy_id = %failed.policy_id,
                    "Extraction task failed"
                );
                return Err(IndexifyError::TaskFailed {
                    content_id: content_id.to_string(),
                    task_id: failed.id,
                    policy_id: failed.policy_id,
                });
            }

            if progress.is_resolved() {
                info!(content_id, tasks = progress.total, rounds = round, "Extraction completed");
                return Ok(());
            }

            debug!(
                content_id,
                pending = progress.pending,
                succeeded = progress.succeeded,
                round,
                "Extraction still in progress"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IndexifyError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn poll(&self, content_id: &str) -> Result<Vec<Task>> {
        self.source.await_content(content_id).await?;
        self.source.content_tasks(content_id).await
    }
}
