//! Sync orchestrator
//!
//! Answers "all activities for account X in window W" by combining the
//! archive with the remote source.
//!
//! ## Policy
//!
//! - **Past year**: the archive is authoritative. A non-empty cached year is
//!   returned without any remote call. Edits made at the source after a year
//!   was archived are never seen; this staleness is accepted.
//! - **Current year**: cached months up to the current month are read, and
//!   the remote fetch starts at the newest cached timestamp.
//! - **All time**: remote only, no cache read.
//!
//! Every fetched page is queued on the [`BackgroundArchiver`] with the same
//! clock the read used; the response never waits for those writes.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::activity::{merge_by_id, sort_newest_first, AccountId, Activity, Month};
use crate::background::BackgroundArchiver;
use crate::config::Config;
use crate::error::ArchiveError;
use crate::source::{ActivitySource, PageQuery};
use crate::store::ArchiveStore;

/// Requested time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    AllTime,
    Year(i32),
}

impl Window {
    /// Year `0` is the all-time sentinel.
    pub fn from_year(year: i32) -> Self {
        if year == 0 {
            Window::AllTime
        } else {
            Window::Year(year)
        }
    }
}

/// Pagination policy
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub page_size: u32,
    /// Stop after this many pages even if the source keeps returning data
    pub max_pages: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 1000,
        }
    }
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size,
            max_pages: config.max_pages,
        }
    }
}

pub struct SyncOrchestrator<S> {
    store: Arc<ArchiveStore>,
    source: S,
    archiver: BackgroundArchiver,
    options: SyncOptions,
}

impl<S: ActivitySource> SyncOrchestrator<S> {
    /// Create an orchestrator with its own background archiver.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<ArchiveStore>, source: S, options: SyncOptions) -> Self {
        let archiver = BackgroundArchiver::spawn(Arc::clone(&store));
        Self::with_archiver(store, source, archiver, options)
    }

    pub fn with_archiver(
        store: Arc<ArchiveStore>,
        source: S,
        archiver: BackgroundArchiver,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            source,
            archiver,
            options,
        }
    }

    pub fn store(&self) -> &Arc<ArchiveStore> {
        &self.store
    }

    pub fn archiver(&self) -> &BackgroundArchiver {
        &self.archiver
    }

    /// Activities for `window`, newest first.
    pub async fn activities(
        &self,
        account_id: AccountId,
        access_token: &str,
        key: &str,
        window: Window,
    ) -> Result<Vec<Activity>, ArchiveError> {
        self.activities_at(account_id, access_token, key, window, Utc::now())
            .await
    }

    /// [`activities`](Self::activities) with an explicit clock.
    pub async fn activities_at(
        &self,
        account_id: AccountId,
        access_token: &str,
        key: &str,
        window: Window,
        now: DateTime<Utc>,
    ) -> Result<Vec<Activity>, ArchiveError> {
        match window {
            Window::AllTime => {
                let fetched = self
                    .fetch_pages(account_id, access_token, key, 0, now.timestamp(), now)
                    .await?;
                let mut merged = merge_by_id(Vec::new(), fetched);
                sort_newest_first(&mut merged);
                Ok(merged)
            }
            Window::Year(year) => self.year(account_id, access_token, key, year, now).await,
        }
    }

    async fn year(
        &self,
        account_id: AccountId,
        access_token: &str,
        key: &str,
        year: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Activity>, ArchiveError> {
        let (year_start, year_end) = year_bounds(year)?;
        let current = Month::of(&now);

        // Never read months that have not started yet
        let months: Vec<Month> = Month::months_of_year(year)
            .into_iter()
            .filter(|m| *m <= current)
            .collect();
        let mut cached = if months.is_empty() {
            Vec::new()
        } else {
            self.store.get_cached_months(account_id, key, months).await
        };

        if year < now.year() && !cached.is_empty() {
            info!(account_id, year, records = cached.len(), "Serving past year from archive");
            sort_newest_first(&mut cached);
            return Ok(cached);
        }

        let mut after = year_start;
        if let Some(latest) = cached
            .iter()
            .filter_map(|a| a.timestamp().ok())
            .map(|ts| ts.with_timezone(&Utc))
            .max()
        {
            if latest > after {
                after = latest;
            }
        }

        debug!(
            account_id,
            year,
            cached = cached.len(),
            after = %after,
            "Fetching remainder of year"
        );

        let fetched = self
            .fetch_pages(
                account_id,
                access_token,
                key,
                after.timestamp(),
                year_end.timestamp(),
                now,
            )
            .await?;

        let mut merged = merge_by_id(cached, fetched);
        sort_newest_first(&mut merged);
        Ok(merged)
    }

    /// Fetch pages until an empty one, queueing each page for archival.
    async fn fetch_pages(
        &self,
        account_id: AccountId,
        access_token: &str,
        key: &str,
        after: i64,
        before: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Activity>, ArchiveError> {
        let mut all = Vec::new();
        let mut page = 1;

        loop {
            if page > self.options.max_pages {
                warn!(
                    account_id,
                    max_pages = self.options.max_pages,
                    "Page limit reached, returning partial window"
                );
                break;
            }

            let query = PageQuery {
                after: Some(after),
                before: Some(before),
                page,
                per_page: self.options.page_size,
            };
            let batch = self.source.fetch(access_token, &query).await?;
            if batch.is_empty() {
                break;
            }

            debug!(account_id, page, records = batch.len(), "Fetched page");
            self.archiver.submit_at(account_id, batch.clone(), key, now);
            all.extend(batch);
            page += 1;
        }

        Ok(all)
    }

    /// Drain pending background writes and stop the archiver.
    pub async fn shutdown(self) {
        self.archiver.shutdown().await;
    }
}

/// `[Jan 1 of year, Jan 1 of next year)` in UTC
fn year_bounds(year: i32) -> Result<(DateTime<Utc>, DateTime<Utc>), ArchiveError> {
    let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single();
    let end = year
        .checked_add(1)
        .and_then(|next| Utc.with_ymd_and_hms(next, 1, 1, 0, 0, 0).single());
    match (start, end) {
        (Some(start), Some(end)) if year > 0 => Ok((start, end)),
        _ => Err(ArchiveError::InvalidWindow(format!("year {year}"))),
    }
}
