use apodsync::{
    download_selection, DateSelection, DownloadConfig, DownloadCoordinator, HttpApodService,
    OutcomeStatus, ShutdownCoordinator,
};
use chrono::NaiveDate;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "apodsync")]
#[command(about = "Download NASA Astronomy Picture of the Day images", long_about = None)]
#[command(version)]
#[command(group(ArgGroup::new("mode").args(["date", "start_date", "last_days", "latest", "random"])))]
struct Args {
    /// Download the entry for a specific date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Start date for a range (YYYY-MM-DD, requires --end-date)
    #[arg(long, requires = "end_date")]
    start_date: Option<NaiveDate>,

    /// End date for a range (YYYY-MM-DD, requires --start-date)
    #[arg(long, requires = "start_date")]
    end_date: Option<NaiveDate>,

    /// Download the entries of the last N days, today included
    #[arg(long, allow_negative_numbers = true)]
    last_days: Option<i64>,

    /// Download only the latest entry (default)
    #[arg(long)]
    latest: bool,

    /// Download an entry picked at random by the service
    #[arg(long)]
    random: bool,

    /// Directory to save images
    #[arg(short, long, default_value = "apod_images")]
    output_dir: PathBuf,

    /// Do not save metadata JSON files
    #[arg(long)]
    no_metadata: bool,

    /// Download the standard resolution image even if an HD one exists
    #[arg(long)]
    no_hd: bool,

    /// NASA API key
    #[arg(long, default_value = apodsync::types::ANONYMOUS_API_KEY)]
    api_key: String,

    /// APOD metadata endpoint
    #[arg(long, default_value = apodsync::types::DEFAULT_API_URL)]
    api_url: String,

    /// Maximum number of concurrent downloads
    #[arg(long, default_value_t = 5)]
    max_workers: usize,

    /// Timeout for each request attempt (e.g. "30s", "1m")
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Number of attempts per request
    #[arg(long, default_value_t = 3)]
    retry_attempts: u32,

    /// Minimum spacing between requests when using DEMO_KEY
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    min_interval: Duration,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn selection(&self, today: NaiveDate) -> DateSelection {
        if let Some(date) = self.date {
            DateSelection::SingleDate(date)
        } else if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            DateSelection::Range { start, end }
        } else if let Some(n) = self.last_days {
            DateSelection::LastNDays { n, reference: today }
        } else if self.random {
            DateSelection::Random
        } else {
            DateSelection::Latest
        }
    }

    fn config(&self) -> DownloadConfig {
        DownloadConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            output_dir: self.output_dir.clone(),
            max_concurrent_downloads: self.max_workers,
            request_timeout: self.timeout,
            retry_attempts: self.retry_attempts,
            min_request_interval: self.min_interval,
            save_metadata: !self.no_metadata,
            prefer_hd: !self.no_hd,
            ..DownloadConfig::default()
        }
    }
}

fn progress_bar() -> indicatif::ProgressBar {
    if !atty::is(atty::Stream::Stderr) {
        return indicatif::ProgressBar::hidden();
    }
    let pb = indicatif::ProgressBar::new(0);
    if let Ok(style) = indicatif::ProgressStyle::default_bar().template(
        "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed",
    ) {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("apodsync={}", log_level))
        .init();

    let today = apodsync::archive_today();
    let selection = args.selection(today);
    let config = args.config();

    info!("🚀 ApodSync - Astronomy Picture of the Day downloader");
    info!("Selection: {:?}", selection);
    info!("Output directory: {:?}", config.output_dir);
    if config.is_anonymous() {
        info!(
            "Using the anonymous API key; requests are spaced {:?} apart",
            config.min_request_interval
        );
    }

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - finishing in-flight downloads...");
                shutdown.request_shutdown();
            }
        }
    });

    let service = Arc::new(HttpApodService::new(&config)?);
    let coordinator = DownloadCoordinator::new(service, &config)
        .with_shutdown(shutdown)
        .with_progress(progress_bar());

    let report = match download_selection(&config, selection, today, &coordinator).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(2);
        }
    };

    for outcome in &report.outcomes {
        let date = outcome
            .date
            .map(|d| d.to_string())
            .unwrap_or_else(|| outcome.target.to_string());
        match &outcome.status {
            OutcomeStatus::Success { path } => println!("✅ {}: {}", date, path.display()),
            OutcomeStatus::NoRecord => println!("➖ {}: no entry published", date),
            OutcomeStatus::SkippedUnsupportedType { media_type } => {
                println!("⏭️  {}: skipped {} entry", date, media_type)
            }
            OutcomeStatus::Failed { kind, message } => {
                println!("❌ {}: {} ({})", date, kind, message)
            }
        }
    }
    println!(
        "\nDownload complete. Successfully downloaded {} of {} entries ({} without entry, {} skipped, {} failed).",
        report.succeeded(),
        report.len(),
        report.no_record(),
        report.skipped(),
        report.failed()
    );

    if report.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
