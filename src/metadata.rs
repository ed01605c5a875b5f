//! Metadata fetching with retry and request spacing.

use crate::error::ApodError;
use crate::rate_limit::RequestSpacer;
use crate::retry::{retry_spaced, RetryPolicy};
use crate::service::ApodService;
use crate::types::{MediaRecord, Target};
use std::sync::Arc;
use tracing::info;

/// Retrieves the [`MediaRecord`] for one target.
#[derive(Clone)]
pub struct MetadataFetcher {
    service: Arc<dyn ApodService>,
    spacer: Arc<RequestSpacer>,
    policy: RetryPolicy,
}

impl MetadataFetcher {
    pub fn new(service: Arc<dyn ApodService>, spacer: Arc<RequestSpacer>, policy: RetryPolicy) -> Self {
        Self {
            service,
            spacer,
            policy,
        }
    }

    /// Fetches the record for `target`.
    ///
    /// Every attempt waits its turn at the shared spacing gate first.
    /// Rate-limit and transient network failures are retried within the
    /// attempt budget. `NotFound` and `Parse` end the fetch immediately.
    pub async fn fetch(&self, target: Target) -> Result<MediaRecord, ApodError> {
        let label = format!("metadata {}", target);
        let record = retry_spaced(&self.policy, &label, &self.spacer, move |_attempt| async move {
            self.service.fetch_record(target).await
        })
        .await?;

        info!("Retrieved metadata for {}: {:?}", record.date, record.title);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::service::MediaBody;
    use crate::types::MediaType;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Plays back a fixed sequence of results, one per attempt.
    struct Scripted {
        results: Mutex<Vec<Result<MediaRecord, ApodError>>>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ApodService for Scripted {
        async fn fetch_record(&self, _target: Target) -> Result<MediaRecord, ApodError> {
            *self.calls.lock().unwrap() += 1;
            self.results.lock().unwrap().remove(0)
        }

        async fn open_media(&self, _url: &str) -> Result<MediaBody, ApodError> {
            unreachable!("metadata tests never open media")
        }
    }

    fn record() -> MediaRecord {
        MediaRecord {
            date: NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(),
            title: "Comet".into(),
            url: Some("https://x/a.jpg".into()),
            hdurl: None,
            media_type: MediaType::Image,
            explanation: None,
            copyright: None,
            thumbnail_url: None,
            service_version: None,
        }
    }

    fn fetcher(results: Vec<Result<MediaRecord, ApodError>>, attempts: u32) -> (MetadataFetcher, Arc<Scripted>) {
        let service = Arc::new(Scripted {
            results: Mutex::new(results),
            calls: Mutex::new(0),
        });
        let policy = RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            attempt_timeout: Duration::from_secs(5),
        };
        let fetcher = MetadataFetcher::new(service.clone(), Arc::new(RequestSpacer::unlimited()), policy);
        (fetcher, service)
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let (fetcher, service) = fetcher(
            vec![Err(ApodError::RateLimited("429".into())), Ok(record())],
            3,
        );
        let rec = fetcher.fetch(Target::Latest).await.unwrap();
        assert_eq!(rec, record());
        assert_eq!(*service.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_terminal() {
        let (fetcher, service) = fetcher(vec![Err(ApodError::NotFound("gap".into())), Ok(record())], 3);
        let err = fetcher
            .fetch(Target::Date(NaiveDate::from_ymd_opt(1995, 6, 17).unwrap()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(*service.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transient_budget_exhausted() {
        let (fetcher, service) = fetcher(
            (0..4).map(|_| Err(ApodError::TransientNetwork("reset".into()))).collect(),
            4,
        );
        let err = fetcher.fetch(Target::Random).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert_eq!(*service.calls.lock().unwrap(), 4);
    }
}
