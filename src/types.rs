//! Data structures for APOD download operations.

use crate::error::ErrorKind;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A calendar date the downloader attempts to obtain one record for.
pub type TargetDate = NaiveDate;

/// Public endpoint of the APOD service.
pub const DEFAULT_API_URL: &str = "https://api.nasa.gov/planetary/apod";

/// Anonymous API key accepted by api.nasa.gov with a low hourly/daily quota.
pub const ANONYMOUS_API_KEY: &str = "DEMO_KEY";

/// First date the APOD archive has an entry for.
pub fn apod_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1995, 6, 16).expect("valid calendar date")
}

/// How the caller selects which entries to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSelection {
    /// Exactly one date.
    SingleDate(NaiveDate),
    /// Every date from `start` to `end`, both inclusive.
    Range { start: NaiveDate, end: NaiveDate },
    /// The `n` days ending at (and including) `reference`.
    LastNDays { n: i64, reference: NaiveDate },
    /// Whatever the service currently publishes as today's entry.
    Latest,
    /// One entry picked by the service.
    Random,
}

/// One unit of work for the coordinator.
///
/// `Latest` and `Random` are placeholders whose actual date is only known
/// once the service has answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    Date(NaiveDate),
    Latest,
    Random,
}

impl Target {
    /// The date this target is pinned to, if the caller chose it.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Target::Date(d) => Some(*d),
            Target::Latest | Target::Random => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Target::Latest => f.write_str("latest"),
            Target::Random => f.write_str("random"),
        }
    }
}

/// Kind of media an entry links to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaType {
    Image,
    Video,
    Other(String),
}

impl From<String> for MediaType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "image" => MediaType::Image,
            "video" => MediaType::Video,
            _ => MediaType::Other(s),
        }
    }
}

impl From<MediaType> for String {
    fn from(m: MediaType) -> Self {
        m.to_string()
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Image => f.write_str("image"),
            MediaType::Video => f.write_str("video"),
            MediaType::Other(s) => f.write_str(s),
        }
    }
}

/// Metadata for one published entry, as returned by the service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MediaRecord {
    /// Publication date of the entry.
    pub date: NaiveDate,
    /// Entry title.
    #[serde(default)]
    pub title: String,
    /// Standard resolution media URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// High resolution media URL, only published for images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hdurl: Option<String>,
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_version: Option<String>,
}

impl MediaRecord {
    /// The URL to download: `hdurl` when preferred and present, else `url`.
    pub fn media_url(&self, prefer_hd: bool) -> Option<&str> {
        let hd = if prefer_hd { self.hdurl.as_deref() } else { None };
        hd.or(self.url.as_deref()).filter(|u| !u.trim().is_empty())
    }
}

/// Terminal state of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Media (and metadata, if enabled) persisted at `path`.
    Success { path: PathBuf },
    /// The archive has no entry for this date. Not an error.
    NoRecord,
    /// The entry exists but links to nothing we can download.
    SkippedUnsupportedType { media_type: String },
    /// Fetching or persisting failed.
    Failed { kind: ErrorKind, message: String },
}

/// Per-target result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadOutcome {
    /// The date of the entry. For `Latest`/`Random` targets this is the
    /// date the service answered with, or `None` if it never answered.
    pub date: Option<NaiveDate>,
    #[serde(skip)]
    pub target: Target,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }
}

/// Ordered outcomes of one run, ascending by date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<DownloadOutcome>,
}

impl RunReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn no_record(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::NoRecord))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::SkippedUnsupportedType { .. }))
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Configuration for downloading APOD entries.
///
/// # Example
///
/// ```
/// use apodsync::DownloadConfig;
///
/// let config = DownloadConfig {
///     api_key: "my-key".to_string(),
///     output_dir: "wallpapers".into(),
///     max_concurrent_downloads: 8,
///     ..DownloadConfig::default()
/// };
/// assert!(!config.is_anonymous());
/// ```
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Metadata endpoint (e.g., `<https://api.nasa.gov/planetary/apod>`)
    pub api_url: String,
    /// API key; `DEMO_KEY` selects the anonymous tier.
    pub api_key: String,
    /// Root directory for media and metadata files, created if absent.
    pub output_dir: PathBuf,
    /// Maximum number of tasks with network work in flight (default: 5).
    pub max_concurrent_downloads: usize,
    /// Timeout applied to every individual request attempt.
    pub request_timeout: Duration,
    /// Attempt budget, applied separately to metadata and media fetches.
    pub retry_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt.
    pub backoff_base: Duration,
    /// Upper bound for a single backoff delay.
    pub backoff_max: Duration,
    /// Minimum spacing between any two requests on the anonymous tier.
    pub min_request_interval: Duration,
    /// Write `<name>.json` next to every downloaded file.
    pub save_metadata: bool,
    /// Download `hdurl` instead of `url` when both exist.
    pub prefer_hd: bool,
    /// Earliest date the archive can answer for.
    pub earliest_date: NaiveDate,
    /// How long in-flight tasks may keep running after cancellation.
    pub shutdown_grace: Duration,
}

impl DownloadConfig {
    /// Whether requests go out on the anonymous quota.
    pub fn is_anonymous(&self) -> bool {
        self.api_key.is_empty() || self.api_key == ANONYMOUS_API_KEY
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: ANONYMOUS_API_KEY.to_string(),
            output_dir: PathBuf::from("apod_images"),
            max_concurrent_downloads: 5,
            request_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            min_request_interval: Duration::from_secs(1),
            save_metadata: true,
            prefer_hd: true,
            earliest_date: apod_epoch(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}
