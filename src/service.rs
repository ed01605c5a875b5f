//! Remote APOD service contract and its HTTP implementation.

use crate::error::ApodError;
use crate::types::{DownloadConfig, MediaRecord, Target};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::StatusCode;
use tracing::debug;

/// Body chunks of a media download.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ApodError>>;

/// An opened media response.
pub struct MediaBody {
    /// Announced size, if the server sent `Content-Length`.
    pub content_length: Option<u64>,
    pub stream: ByteStream,
}

/// One request against the service. Implementations perform a single
/// attempt; retries and spacing are layered on top by the callers.
#[async_trait]
pub trait ApodService: Send + Sync {
    /// Fetches the record for a date, or the service-chosen latest/random one.
    async fn fetch_record(&self, target: Target) -> Result<MediaRecord, ApodError>;

    /// Starts downloading a media file.
    async fn open_media(&self, url: &str) -> Result<MediaBody, ApodError>;
}

/// [`ApodService`] backed by api.nasa.gov (or a compatible endpoint).
#[derive(Debug, Clone)]
pub struct HttpApodService {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpApodService {
    pub fn new(config: &DownloadConfig) -> Result<Self, ApodError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .user_agent(concat!("apodsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, &config.api_url, &config.api_key))
    }

    pub fn with_client(client: reqwest::Client, api_url: &str, api_key: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn query_params(&self, target: Target) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("api_key", self.api_key.clone()),
            ("thumbs", "true".to_string()),
        ];
        match target {
            Target::Date(date) => params.push(("date", date.format("%Y-%m-%d").to_string())),
            Target::Random => params.push(("count", "1".to_string())),
            Target::Latest => {}
        }
        params
    }
}

/// Maps a non-success HTTP status onto the error taxonomy.
pub(crate) fn status_error(status: StatusCode, context: &str, body: &str) -> ApodError {
    let detail = format!("{}: HTTP {} {}", context, status, body.trim());
    match status.as_u16() {
        404 => ApodError::NotFound(detail),
        429 => ApodError::RateLimited(detail),
        408 => ApodError::TransientNetwork(detail),
        _ if status.is_server_error() => ApodError::TransientNetwork(detail),
        _ => ApodError::Parse(detail),
    }
}

/// Parses a metadata body. `count` queries answer with a one-element array.
pub(crate) fn parse_record(target: Target, body: &str) -> Result<MediaRecord, ApodError> {
    if target == Target::Random {
        let mut records: Vec<MediaRecord> = serde_json::from_str(body)?;
        return match records.len() {
            1 => Ok(records.remove(0)),
            n => Err(ApodError::Parse(format!("expected one random entry, got {}", n))),
        };
    }
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl ApodService for HttpApodService {
    async fn fetch_record(&self, target: Target) -> Result<MediaRecord, ApodError> {
        debug!("Retrieving metadata for {} from {}", target, self.api_url);

        let response = self
            .client
            .get(&self.api_url)
            .query(&self.query_params(target))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status, &format!("metadata for {}", target), &body));
        }

        parse_record(target, &body)
    }

    async fn open_media(&self, url: &str) -> Result<MediaBody, ApodError> {
        debug!("Opening media {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, url, &body));
        }

        let content_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|piece| piece.map(|chunk| chunk.to_vec()).map_err(ApodError::from))
            .boxed();

        Ok(MediaBody {
            content_length,
            stream,
        })
    }
}
