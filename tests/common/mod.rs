//! Scripted in-memory APOD service shared by the integration tests.

#![allow(dead_code)]

use apodsync::{ApodError, ApodService, DownloadConfig, MediaBody, MediaRecord, MediaType, Target};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::{stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub const PAYLOAD: &[u8] = b"JFIF fake image bytes";

/// What the fake answers for one metadata attempt.
pub enum Reply {
    NotFound,
    Transient,
    RateLimited,
    Malformed,
    Video(&'static str),
    Panic,
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn record_for(date: NaiveDate) -> MediaRecord {
    MediaRecord {
        date,
        title: format!("Sky {}", date.format("%d")),
        url: Some(format!("https://apod.test/image/{}.jpg", date)),
        hdurl: None,
        media_type: MediaType::Image,
        explanation: Some("A picture of the sky.".into()),
        copyright: None,
        thumbnail_url: None,
        service_version: Some("v1".into()),
    }
}

/// Counts in-flight calls, so tests can check the concurrency bound.
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeApod {
    /// Replies consumed one per metadata attempt; success once drained.
    pub scripts: Mutex<HashMap<Target, VecDeque<Reply>>>,
    pub attempts: Mutex<HashMap<Target, u32>>,
    pub request_times: Mutex<Vec<Instant>>,
    pub latency: Duration,
    /// Media bodies stall forever after their first chunk.
    pub hang_media: bool,
    pub latest_date: Option<NaiveDate>,
    pub random_date: Option<NaiveDate>,
    pub current: AtomicUsize,
    pub peak: AtomicUsize,
}

impl FakeApod {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, target: Target, replies: Vec<Reply>) -> Self {
        self.scripts.lock().unwrap().insert(target, replies.into());
        self
    }

    pub fn attempts_for(&self, target: Target) -> u32 {
        self.attempts.lock().unwrap().get(&target).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApodService for FakeApod {
    async fn fetch_record(&self, target: Target) -> Result<MediaRecord, ApodError> {
        let _guard = InFlight::enter(&self.current, &self.peak);
        self.request_times.lock().unwrap().push(Instant::now());
        *self.attempts.lock().unwrap().entry(target).or_insert(0) += 1;
        tokio::time::sleep(self.latency).await;

        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&target)
            .and_then(|q| q.pop_front());

        let date = match target {
            Target::Date(date) => date,
            Target::Latest => self.latest_date.unwrap_or(d(2024, 6, 30)),
            Target::Random => self.random_date.unwrap_or(d(2001, 9, 11)),
        };

        match reply {
            None => Ok(record_for(date)),
            Some(Reply::NotFound) => Err(ApodError::NotFound(date.to_string())),
            Some(Reply::Transient) => Err(ApodError::TransientNetwork("connection reset".into())),
            Some(Reply::RateLimited) => Err(ApodError::RateLimited("OVER_RATE_LIMIT".into())),
            Some(Reply::Malformed) => Err(ApodError::Parse("expected value at line 1".into())),
            Some(Reply::Panic) => panic!("scripted panic for {}", target),
            Some(Reply::Video(url)) => Ok(MediaRecord {
                media_type: MediaType::Video,
                url: Some(url.to_string()),
                ..record_for(date)
            }),
        }
    }

    async fn open_media(&self, _url: &str) -> Result<MediaBody, ApodError> {
        let _guard = InFlight::enter(&self.current, &self.peak);
        self.request_times.lock().unwrap().push(Instant::now());
        tokio::time::sleep(self.latency).await;

        let (head, tail) = PAYLOAD.split_at(5);
        let first = stream::iter(vec![Ok::<_, ApodError>(head.to_vec())]);
        let stream = if self.hang_media {
            first.chain(stream::pending()).boxed()
        } else {
            first.chain(stream::iter(vec![Ok(tail.to_vec())])).boxed()
        };
        Ok(MediaBody {
            content_length: Some(PAYLOAD.len() as u64),
            stream,
        })
    }
}

/// Config suitable for tests: privileged key (no spacing), tiny backoff.
pub fn test_config(output_dir: &Path) -> DownloadConfig {
    DownloadConfig {
        api_key: "test-key".into(),
        output_dir: output_dir.to_path_buf(),
        max_concurrent_downloads: 3,
        request_timeout: Duration::from_secs(10),
        retry_attempts: 3,
        backoff_base: Duration::from_millis(2),
        backoff_max: Duration::from_millis(10),
        min_request_interval: Duration::ZERO,
        shutdown_grace: Duration::from_millis(50),
        ..DownloadConfig::default()
    }
}

/// File names in `dir`, sorted.
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
