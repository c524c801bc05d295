//! Activity Archive - encrypted local cache for fitness activity records
//!
//! Sits between a remote activity API and its consumers, giving offline-first
//! reads of past years and incremental backfill of the current one.
//!
//! ## Architecture
//!
//! - **codec**: value ⇄ `nonce || ChaCha20-Poly1305(gzip(JSON))`, keyed by a caller string
//! - **store**: one sealed partition per account and month, merge-on-write, union-on-read
//! - **sync**: decides what to read from the archive and what to fetch remotely
//! - **background**: queue that writes fetched pages back without blocking reads
//!
//! ## Storage Layout
//!
//! ```text
//! <cache-root>/
//! ├── 12345/                 # account id
//! │   ├── 2024-01.bin        # one sealed blob per month
//! │   └── 2024-02.bin
//! └── 67890/
//! ```
//!
//! An unreadable partition (rotated key, corruption) is never an error for
//! callers; it reads as empty and is overwritten by the next write.

pub mod activity;
pub mod background;
pub mod codec;
pub mod config;
pub mod error;
pub mod source;
pub mod stats;
pub mod store;
pub mod sync;

// Re-exports
pub use activity::{merge_by_id, sort_newest_first, AccountId, Activity, Month};
pub use background::{ArchiveFailure, BackgroundArchiver, FailureHook};
pub use codec::{open, seal};
pub use config::Config;
pub use error::{ArchiveError, CodecError, SourceError};
pub use source::{ActivitySource, HttpActivitySource, PageQuery};
pub use stats::{activities_in_year, calculate_stats, ActivityStats};
pub use store::{ArchiveReport, ArchiveStore};
pub use sync::{SyncOptions, SyncOrchestrator, Window};
