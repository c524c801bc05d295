//! Best-effort background archive writes
//!
//! The read path hands freshly fetched pages to a [`BackgroundArchiver`] and
//! moves on. A single worker task drains the queue in submission order and
//! reports failures to a hook; nothing flows back to the submitter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::activity::{AccountId, Activity};
use crate::error::ArchiveError;
use crate::store::ArchiveStore;

/// A background write that did not make it to disk
#[derive(Debug)]
pub struct ArchiveFailure {
    pub account_id: AccountId,
    pub records: usize,
    pub error: ArchiveError,
}

/// Receives background write failures
pub type FailureHook = Arc<dyn Fn(&ArchiveFailure) + Send + Sync>;

enum Job {
    Archive {
        account_id: AccountId,
        records: Vec<Activity>,
        key: String,
        now: DateTime<Utc>,
    },
    Flush(oneshot::Sender<()>),
}

/// Queue + worker for archive writes
pub struct BackgroundArchiver {
    tx: mpsc::UnboundedSender<Job>,
    handle: JoinHandle<()>,
}

impl BackgroundArchiver {
    /// Spawn a worker that logs failures.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<ArchiveStore>) -> Self {
        Self::with_failure_hook(
            store,
            Arc::new(|failure: &ArchiveFailure| {
                error!(
                    account_id = failure.account_id,
                    records = failure.records,
                    error = %failure.error,
                    "Background archive failed"
                );
            }),
        )
    }

    /// Spawn a worker that reports failures to `hook`.
    pub fn with_failure_hook(store: Arc<ArchiveStore>, hook: FailureHook) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(store, rx, hook));
        Self { tx, handle }
    }

    /// Queue a write. Never blocks, never fails.
    pub fn submit(&self, account_id: AccountId, records: Vec<Activity>, key: &str) {
        self.submit_at(account_id, records, key, Utc::now());
    }

    /// [`submit`](Self::submit) with the clock the freshness window is
    /// measured against when the write runs.
    pub fn submit_at(
        &self,
        account_id: AccountId,
        records: Vec<Activity>,
        key: &str,
        now: DateTime<Utc>,
    ) {
        if records.is_empty() {
            return;
        }
        let job = Job::Archive {
            account_id,
            records,
            key: key.to_string(),
            now,
        };
        if self.tx.send(job).is_err() {
            warn!(account_id, "Background archiver stopped, dropping write");
        }
    }

    /// Wait until every write submitted before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Job::Flush(done_tx)).is_ok() {
            done_rx.await.ok();
        }
    }

    /// Stop accepting writes, drain the queue and join the worker.
    pub async fn shutdown(self) {
        let Self { tx, handle } = self;
        drop(tx);
        if let Err(e) = handle.await {
            error!(error = %e, "Background archiver panicked");
        }
    }
}

async fn run_worker(
    store: Arc<ArchiveStore>,
    mut rx: mpsc::UnboundedReceiver<Job>,
    hook: FailureHook,
) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Archive {
                account_id,
                records,
                key,
                now,
            } => match store.archive_at(account_id, &records, &key, now).await {
                Ok(report) => {
                    debug!(
                        account_id,
                        archived = report.archived,
                        skipped_recent = report.skipped_recent,
                        months = report.months_written.len(),
                        "Background archive complete"
                    );
                }
                Err(error) => hook(&ArchiveFailure {
                    account_id,
                    records: records.len(),
                    error,
                }),
            },
            Job::Flush(done) => {
                done.send(()).ok();
            }
        }
    }
    debug!("Background archiver drained");
}
