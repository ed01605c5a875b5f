//! Main orchestration logic for downloading APOD entries.

use crate::download::MediaDownloader;
use crate::error::ApodError;
use crate::metadata::MetadataFetcher;
use crate::rate_limit::RequestSpacer;
use crate::retry::RetryPolicy;
use crate::selection::{archive_today, resolve, ArchiveBounds};
use crate::service::{ApodService, HttpApodService};
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};
use crate::types::{DateSelection, DownloadConfig, DownloadOutcome, OutcomeStatus, RunReport, Target};
use chrono::NaiveDate;
use indicatif::ProgressBar;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Where a task currently is. Tasks only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Pending,
    FetchingMetadata,
    DownloadingMedia,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => f.write_str("pending"),
            TaskState::FetchingMetadata => f.write_str("fetching metadata"),
            TaskState::DownloadingMedia => f.write_str("downloading media"),
        }
    }
}

fn outcome(target: Target, date: Option<NaiveDate>, status: OutcomeStatus) -> DownloadOutcome {
    DownloadOutcome {
        date,
        target,
        status,
    }
}

fn failed(target: Target, date: Option<NaiveDate>, err: &ApodError) -> DownloadOutcome {
    outcome(
        target,
        date,
        OutcomeStatus::Failed {
            kind: err.kind(),
            message: err.to_string(),
        },
    )
}

/// Runs one task per target over a bounded pool and collects the outcomes.
#[derive(Clone)]
pub struct DownloadCoordinator {
    fetcher: MetadataFetcher,
    downloader: MediaDownloader,
    max_concurrency: usize,
    shutdown: SharedShutdown,
    shutdown_grace: Duration,
    progress: ProgressBar,
}

impl DownloadCoordinator {
    /// Builds a coordinator that talks to `service` using `config`.
    ///
    /// When the configured key is the anonymous one, every request of every
    /// task passes through one shared [`RequestSpacer`].
    pub fn new(service: Arc<dyn ApodService>, config: &DownloadConfig) -> Self {
        let spacer = if config.is_anonymous() {
            Arc::new(RequestSpacer::new(config.min_request_interval))
        } else {
            Arc::new(RequestSpacer::unlimited())
        };
        let policy = RetryPolicy::from_config(config);

        let fetcher = MetadataFetcher::new(Arc::clone(&service), Arc::clone(&spacer), policy);
        let downloader = MediaDownloader::new(service, spacer, policy, config.output_dir.clone())
            .save_metadata(config.save_metadata)
            .prefer_hd(config.prefer_hd);

        Self {
            fetcher,
            downloader,
            max_concurrency: config.max_concurrent_downloads.max(1),
            shutdown: ShutdownCoordinator::shared(),
            shutdown_grace: config.shutdown_grace,
            progress: ProgressBar::hidden(),
        }
    }

    /// Use an externally owned cancellation signal.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Report progress through `progress` (hidden by default).
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn shutdown_handle(&self) -> SharedShutdown {
        Arc::clone(&self.shutdown)
    }

    /// Processes every target and returns one outcome per target, ordered by
    /// date.
    ///
    /// A failing target never affects its siblings. At most
    /// `max_concurrent_downloads` tasks hold a slot at any time; a slot is
    /// held from the first metadata attempt until the media is persisted,
    /// including backoff sleeps between retries.
    pub async fn run(&self, targets: Vec<Target>) -> RunReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        self.progress.set_length(targets.len() as u64);
        self.progress
            .set_message(format!("📦 Downloading {} entries", targets.len()));

        let mut tasks = Vec::with_capacity(targets.len());
        for target in targets {
            let semaphore = Arc::clone(&semaphore);
            let this = self.clone();

            let task = tokio::spawn(async move {
                let outcome = this.run_task(target, semaphore).await;
                this.progress.inc(1);
                outcome
            });
            tasks.push((target, task));
        }

        // One slot per target, filled in target order.
        let mut outcomes = Vec::with_capacity(tasks.len());
        for (target, task) in tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.is_cancelled() => {
                    warn!("Task for {} was aborted", target);
                    outcomes.push(failed(target, target.date(), &ApodError::Cancelled));
                }
                Err(e) => {
                    error!("Task for {} panicked: {}", target, e);
                    let err = ApodError::Panicked(e.to_string());
                    outcomes.push(failed(target, target.date(), &err));
                }
            }
        }
        outcomes.sort_by_key(|o| o.date);

        if self.shutdown.is_shutdown_requested() {
            match self.downloader.remove_partial_files().await {
                Ok(0) => {}
                Ok(n) => info!("Removed {} partial files after cancellation", n),
                Err(e) => warn!("Failed to clean partial files: {}", e),
            }
        }

        let report = RunReport { outcomes };
        self.progress.finish_with_message(format!(
            "✅ {} saved, {} without entry, {} skipped, {} failed",
            report.succeeded(),
            report.no_record(),
            report.skipped(),
            report.failed()
        ));
        report
    }

    /// Waits for a slot, then drives one target to its terminal outcome.
    async fn run_task(&self, target: Target, semaphore: Arc<Semaphore>) -> DownloadOutcome {
        let cancelled = || failed(target, target.date(), &ApodError::Cancelled);

        let permit = tokio::select! {
            biased;
            _ = self.shutdown.wait_for_shutdown() => None,
            permit = semaphore.acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            debug!("{} cancelled while {}", target, TaskState::Pending);
            return cancelled();
        };
        if self.shutdown.is_shutdown_requested() {
            return cancelled();
        }

        let grace = self.shutdown_grace;
        let shutdown = Arc::clone(&self.shutdown);
        tokio::select! {
            outcome = self.process(target) => outcome,
            _ = async move {
                shutdown.wait_for_shutdown().await;
                tokio::time::sleep(grace).await;
            } => {
                warn!("{} aborted after {:?} shutdown grace", target, grace);
                cancelled()
            }
        }
    }

    /// `Pending → FetchingMetadata → DownloadingMedia → terminal`.
    async fn process(&self, target: Target) -> DownloadOutcome {
        debug!("{}: {}", target, TaskState::FetchingMetadata);
        let record = match self.fetcher.fetch(target).await {
            Ok(record) => record,
            Err(ApodError::NotFound(_)) => {
                info!("No entry published for {}", target);
                return outcome(target, target.date(), OutcomeStatus::NoRecord);
            }
            Err(e) => {
                warn!("Metadata for {} failed: {}", target, e);
                return failed(target, target.date(), &e);
            }
        };
        let date = Some(record.date);

        debug!("{}: {}", target, TaskState::DownloadingMedia);
        self.progress
            .set_message(format!("| ⬇️  Downloading: {}", record.title));
        match self.downloader.download(&record).await {
            Ok(path) => outcome(target, date, OutcomeStatus::Success { path }),
            Err(ApodError::UnsupportedMediaType(reason)) => {
                info!("Skipping {}: {}", record.date, reason);
                outcome(
                    target,
                    date,
                    OutcomeStatus::SkippedUnsupportedType {
                        media_type: record.media_type.to_string(),
                    },
                )
            }
            Err(e) => {
                warn!("Download for {} failed: {}", record.date, e);
                failed(target, date, &e)
            }
        }
    }
}

/// Resolves `selection` and downloads every resulting target.
///
/// This is the library entry point behind the `apodsync` binary. An invalid
/// selection fails the whole run before any request is made; every other
/// failure is reported per target in the returned [`RunReport`].
///
/// # Arguments
///
/// * `config` - Download configuration
/// * `selection` - Which entries to download
/// * `today` - Latest date the archive is expected to have
/// * `coordinator` - Coordinator built from the same configuration
///
/// # Example
///
/// ```no_run
/// use apodsync::{download_selection, DateSelection, DownloadConfig, DownloadCoordinator, HttpApodService};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DownloadConfig::default();
/// let service = Arc::new(HttpApodService::new(&config)?);
/// let coordinator = DownloadCoordinator::new(service, &config);
/// let today = apodsync::archive_today();
/// let report = download_selection(&config, DateSelection::Latest, today, &coordinator).await?;
/// println!("{} saved", report.succeeded());
/// # Ok(())
/// # }
/// ```
pub async fn download_selection(
    config: &DownloadConfig,
    selection: DateSelection,
    today: NaiveDate,
    coordinator: &DownloadCoordinator,
) -> Result<RunReport, ApodError> {
    let targets = resolve(selection, ArchiveBounds::new(config.earliest_date, today))?;
    tokio::fs::create_dir_all(&config.output_dir).await?;

    info!(
        "Downloading {} target(s) into {}",
        targets.len(),
        config.output_dir.display()
    );
    Ok(coordinator.run(targets).await)
}

/// Convenience wrapper: downloads `selection` from the real service.
pub async fn download_apod(
    config: &DownloadConfig,
    selection: DateSelection,
) -> Result<RunReport, ApodError> {
    let service = Arc::new(HttpApodService::new(config)?);
    let coordinator = DownloadCoordinator::new(service, config);
    download_selection(config, selection, archive_today(), &coordinator).await
}
