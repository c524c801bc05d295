//! Month-partitioned encrypted archive
//!
//! One directory per account, one sealed file per month:
//!
//! ```text
//! <cache-root>/
//! └── <account_id>/
//!     ├── 2024-01.bin    # nonce || ciphertext of gzip(JSON array of records)
//!     └── 2024-02.bin
//! ```
//!
//! Writes read the existing partition, merge by id and replace the file via
//! temp-file + rename. A partition that cannot be opened (missing, rotated
//! key, corrupted) is treated as empty on write and skipped on read.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::activity::{merge_by_id, AccountId, Activity, Month};
use crate::codec;
use crate::config::Config;
use crate::error::{ArchiveError, CodecError};

/// Default partition file extension
pub const DEFAULT_EXTENSION: &str = "bin";

/// Records newer than this are still mutable at the source and never archived
pub const DEFAULT_FRESHNESS_DAYS: i64 = 7;

/// Outcome of one `archive` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveReport {
    /// Partitions rewritten, in month order
    pub months_written: Vec<Month>,
    /// Records handed to partitions
    pub archived: usize,
    /// Records inside the freshness window
    pub skipped_recent: usize,
    /// Records with an unparseable `start_date`
    pub skipped_invalid: usize,
}

enum PartitionRead {
    Missing,
    Loaded(Vec<Activity>),
    Unreadable(ArchiveError),
}

/// Archive store handle
///
/// Holds no open files; every operation goes to the filesystem. Dropping the
/// handle releases the in-process partition locks.
pub struct ArchiveStore {
    /// Cache root containing one directory per account
    root_dir: PathBuf,
    extension: String,
    freshness: Duration,
    /// Serializes read-merge-write cycles on the same partition
    locks: DashMap<(AccountId, Month), Arc<Mutex<()>>>,
}

impl ArchiveStore {
    /// Open (creating if needed) an archive rooted at `root_dir`.
    pub async fn open<P: AsRef<Path>>(root_dir: P) -> Result<Self, ArchiveError> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir).await?;

        info!(path = %root_dir.display(), "Opened activity archive");

        Ok(Self {
            root_dir,
            extension: DEFAULT_EXTENSION.to_string(),
            freshness: Duration::days(DEFAULT_FRESHNESS_DAYS),
            locks: DashMap::new(),
        })
    }

    /// Open the archive described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self, ArchiveError> {
        config.validate()?;
        Ok(Self::open(&config.cache_dir)
            .await?
            .with_extension(&config.file_extension)
            .with_freshness_window(Duration::days(config.freshness_days)))
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn with_freshness_window(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Directory holding an account's partitions
    pub fn account_dir(&self, account_id: AccountId) -> PathBuf {
        self.root_dir.join(account_id.to_string())
    }

    /// Path of one partition file
    pub fn partition_path(&self, account_id: AccountId, month: Month) -> PathBuf {
        self.account_dir(account_id)
            .join(format!("{}.{}", month, self.extension))
    }

    fn partition_lock(&self, account_id: AccountId, month: Month) -> Arc<Mutex<()>> {
        self.locks
            .entry((account_id, month))
            .or_default()
            .clone()
    }

    /// Archive `records` for `account_id`, skipping anything newer than the
    /// freshness window.
    pub async fn archive(
        &self,
        account_id: AccountId,
        records: &[Activity],
        key: &str,
    ) -> Result<ArchiveReport, ArchiveError> {
        self.archive_at(account_id, records, key, Utc::now()).await
    }

    /// [`archive`](Self::archive) with an explicit clock.
    pub async fn archive_at(
        &self,
        account_id: AccountId,
        records: &[Activity],
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<ArchiveReport, ArchiveError> {
        let mut report = ArchiveReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        let cutoff = now - self.freshness;
        let mut by_month: BTreeMap<Month, Vec<Activity>> = BTreeMap::new();

        for record in records {
            let ts = match record.timestamp() {
                Ok(ts) => ts,
                Err(e) => {
                    warn!(account_id, id = record.id, error = %e, "Skipping record with bad start_date");
                    report.skipped_invalid += 1;
                    continue;
                }
            };
            if ts.with_timezone(&Utc) >= cutoff {
                report.skipped_recent += 1;
                continue;
            }
            by_month.entry(Month::of(&ts)).or_default().push(record.clone());
        }

        if by_month.is_empty() {
            debug!(
                account_id,
                skipped_recent = report.skipped_recent,
                "Nothing old enough to archive"
            );
            return Ok(report);
        }

        fs::create_dir_all(self.account_dir(account_id)).await?;

        // Months are independent; one failed partition does not stop the rest
        let mut first_error = None;
        for (month, fresh) in by_month {
            let count = fresh.len();
            match self.write_partition(account_id, month, fresh, key).await {
                Ok(()) => {
                    report.archived += count;
                    report.months_written.push(month);
                }
                Err(e) => {
                    warn!(account_id, month = %month, error = %e, "Failed to write partition");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    async fn write_partition(
        &self,
        account_id: AccountId,
        month: Month,
        fresh: Vec<Activity>,
        key: &str,
    ) -> Result<(), ArchiveError> {
        let lock = self.partition_lock(account_id, month);
        let result = {
            let _guard = lock.lock().await;
            self.merge_into_partition(account_id, month, fresh, key).await
        };

        // Drop the entry once only the map and this writer hold it
        self.locks
            .remove_if(&(account_id, month), |_, l| Arc::strong_count(l) == 2);
        result
    }

    /// Read-merge-write of one partition. Caller holds the partition lock.
    async fn merge_into_partition(
        &self,
        account_id: AccountId,
        month: Month,
        fresh: Vec<Activity>,
        key: &str,
    ) -> Result<(), ArchiveError> {
        let path = self.partition_path(account_id, month);
        let existing = match read_partition(&path, key).await {
            PartitionRead::Loaded(records) => records,
            PartitionRead::Missing => Vec::new(),
            PartitionRead::Unreadable(e) => {
                warn!(
                    account_id,
                    month = %month,
                    error = %e,
                    "Existing partition unreadable, overwriting"
                );
                Vec::new()
            }
        };

        let merged = merge_by_id(existing, fresh);
        let blob = codec::seal(&merged, key)?;
        write_atomic(&path, &blob).await?;

        debug!(
            account_id,
            month = %month,
            records = merged.len(),
            bytes = blob.len(),
            "Wrote partition"
        );
        Ok(())
    }

    /// Read cached records for an account, one month or all of them.
    ///
    /// Unreadable partitions are logged and skipped; a missing account or
    /// month yields an empty result. Order across partitions is not
    /// meaningful.
    pub async fn get_cached(
        &self,
        account_id: AccountId,
        key: &str,
        month: Option<Month>,
    ) -> Vec<Activity> {
        let months = match month {
            Some(month) => vec![month],
            None => self.list_months(account_id).await,
        };
        self.get_cached_months(account_id, key, months).await
    }

    /// Read cached records for the given months.
    pub async fn get_cached_months(
        &self,
        account_id: AccountId,
        key: &str,
        months: impl IntoIterator<Item = Month>,
    ) -> Vec<Activity> {
        let mut all = Vec::new();

        for month in months {
            let path = self.partition_path(account_id, month);
            match read_partition(&path, key).await {
                PartitionRead::Loaded(records) => all.extend(records),
                PartitionRead::Missing => {}
                PartitionRead::Unreadable(e) => {
                    warn!(
                        account_id,
                        month = %month,
                        error = %e,
                        "Ignoring unreadable partition"
                    );
                }
            }
        }

        all
    }

    /// Months with a partition file on disk, ascending.
    pub async fn list_months(&self, account_id: AccountId) -> Vec<Month> {
        let dir = self.account_dir(account_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %dir.display(), error = %e, "Cannot list account directory");
                }
                return Vec::new();
            }
        };

        let suffix = format!(".{}", self.extension);
        let mut months = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Stopped listing account directory");
                    break;
                }
            };
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(stem) = name.strip_suffix(&suffix) else {
                continue;
            };
            match stem.parse::<Month>() {
                Ok(month) => months.push(month),
                Err(_) => debug!(file = %name, "Skipping non-partition file"),
            }
        }

        months.sort();
        months
    }
}

async fn read_partition(path: &Path, key: &str) -> PartitionRead {
    let blob = match fs::read(path).await {
        Ok(blob) => blob,
        Err(e) if e.kind() == ErrorKind::NotFound => return PartitionRead::Missing,
        Err(e) => return PartitionRead::Unreadable(e.into()),
    };

    match codec::open::<Vec<Activity>>(&blob, key) {
        Ok(records) => PartitionRead::Loaded(records),
        Err(e) => {
            if matches!(e, CodecError::TooShort { .. } | CodecError::Decompress(_)) {
                debug!(path = %path.display(), "Partition looks truncated or corrupted");
            }
            PartitionRead::Unreadable(e.into())
        }
    }
}

/// Replace `path` with `data` so readers never see a partial file.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ArchiveError> {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = fs::write(&tmp_path, data).await {
        fs::remove_file(&tmp_path).await.ok();
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp_path, path).await {
        fs::remove_file(&tmp_path).await.ok();
        return Err(e.into());
    }
    Ok(())
}
