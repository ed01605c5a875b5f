//! ApodSync - Concurrent, rate-aware downloader for NASA's Astronomy Picture of the Day
//!
//! This library resolves a date selection into concrete archive dates, fetches the
//! metadata record for each of them, and stores the referenced image (or direct
//! video) together with its metadata in a local directory.
//!
//! # Features
//!
//! - **Date Selections**: single date, inclusive range, last N days, latest, random
//! - **Bounded Concurrency**: a hard cap on tasks with network work in flight
//! - **Automatic Retry**: exponential backoff for rate limits and transient failures
//! - **Anonymous-Tier Spacing**: one shared gate spaces requests made with `DEMO_KEY`
//! - **Atomic Writes**: files are written to `.part` and renamed into place
//! - **Partial Failure**: every date gets its own outcome; one failure never aborts the run
//!
//! # Example
//!
//! ```no_run
//! use apodsync::{download_apod, DateSelection, DownloadConfig};
//! use chrono::NaiveDate;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownloadConfig::default();
//! let selection = DateSelection::Range {
//!     start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
//!     end: NaiveDate::from_ymd_opt(2023, 1, 5).unwrap(),
//! };
//!
//! let report = download_apod(&config, selection).await?;
//! println!("{} of {} saved", report.succeeded(), report.len());
//! # Ok(())
//! # }
//! ```

pub mod download;
pub mod error;
pub mod metadata;
pub mod naming;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod selection;
pub mod service;
pub mod shutdown;
pub mod types;

pub use download::MediaDownloader;
pub use error::{ApodError, ErrorKind};
pub use metadata::MetadataFetcher;
pub use orchestrator::{download_apod, download_selection, DownloadCoordinator};
pub use rate_limit::RequestSpacer;
pub use retry::RetryPolicy;
pub use selection::{archive_date, archive_today, resolve, ArchiveBounds};
pub use service::{ApodService, ByteStream, HttpApodService, MediaBody};
pub use shutdown::{SharedShutdown, ShutdownCoordinator};
pub use types::{
    DateSelection, DownloadConfig, DownloadOutcome, MediaRecord, MediaType, OutcomeStatus,
    RunReport, Target, TargetDate,
};
