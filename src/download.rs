//! Media download and atomic persistence.

use crate::error::ApodError;
use crate::naming;
use crate::rate_limit::RequestSpacer;
use crate::retry::{retry_spaced, RetryPolicy};
use crate::service::ApodService;
use crate::types::{MediaRecord, MediaType};
use futures_util::StreamExt;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Suffix of files still being written.
pub const PART_SUFFIX: &str = ".part";

/// `.part` files created by one downloader that are neither committed nor
/// removed yet. Files of other processes in the same directory are never
/// listed here.
#[derive(Debug, Clone, Default)]
struct PartRegistry {
    live: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PartRegistry {
    fn live(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn track(&self, path: &Path) {
        self.live().insert(path.to_path_buf());
    }

    fn forget(&self, path: &Path) {
        self.live().remove(path);
    }

    async fn remove_all(&self) -> io::Result<usize> {
        let paths: Vec<PathBuf> = self.live().drain().collect();
        let mut removed = 0;
        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }
}

/// A `.part` file that is removed on drop unless it was renamed into place.
///
/// Dropping the owning future (cancellation, timeout) therefore never
/// leaves a partial file behind.
#[derive(Debug)]
struct PartFile {
    path: PathBuf,
    registry: PartRegistry,
    committed: bool,
}

impl PartFile {
    fn for_destination(dest: &Path, registry: &PartRegistry) -> Self {
        let mut name = dest.as_os_str().to_owned();
        name.push(PART_SUFFIX);
        let path = PathBuf::from(name);
        registry.track(&path);
        Self {
            path,
            registry: registry.clone(),
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn commit(mut self, dest: &Path) -> io::Result<()> {
        tokio::fs::rename(&self.path, dest).await?;
        self.committed = true;
        self.registry.forget(&self.path);
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => self.registry.forget(&self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.registry.forget(&self.path),
            // left tracked for the sweep after the run
            Err(e) => warn!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}

/// Writes `contents` to the `.part` sibling of `dest`.
async fn write_part(dest: &Path, contents: &[u8], registry: &PartRegistry) -> Result<PartFile, ApodError> {
    let part = PartFile::for_destination(dest, registry);
    let mut file = tokio::fs::File::create(part.path()).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    Ok(part)
}

/// Downloads the media of a record and stores it next to its metadata.
#[derive(Clone)]
pub struct MediaDownloader {
    service: Arc<dyn ApodService>,
    spacer: Arc<RequestSpacer>,
    policy: RetryPolicy,
    output_dir: PathBuf,
    save_metadata: bool,
    prefer_hd: bool,
    parts: PartRegistry,
}

impl MediaDownloader {
    pub fn new(
        service: Arc<dyn ApodService>,
        spacer: Arc<RequestSpacer>,
        policy: RetryPolicy,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service,
            spacer,
            policy,
            output_dir: output_dir.into(),
            save_metadata: true,
            prefer_hd: true,
            parts: PartRegistry::default(),
        }
    }

    pub fn save_metadata(mut self, enabled: bool) -> Self {
        self.save_metadata = enabled;
        self
    }

    pub fn prefer_hd(mut self, enabled: bool) -> Self {
        self.prefer_hd = enabled;
        self
    }

    /// The URL that would be downloaded for `record`, or why there is none.
    pub fn media_url<'a>(&self, record: &'a MediaRecord) -> Result<&'a str, ApodError> {
        match &record.media_type {
            MediaType::Image => record.media_url(self.prefer_hd).ok_or_else(|| {
                ApodError::UnsupportedMediaType(format!("image entry {} has no url", record.date))
            }),
            MediaType::Video => match record.url.as_deref() {
                Some(url) if naming::is_direct_video(url) => Ok(url),
                Some(url) => Err(ApodError::UnsupportedMediaType(format!(
                    "video entry {} is embedded ({})",
                    record.date, url
                ))),
                None => Err(ApodError::UnsupportedMediaType(format!(
                    "video entry {} has no url",
                    record.date
                ))),
            },
            MediaType::Other(kind) => Err(ApodError::UnsupportedMediaType(kind.clone())),
        }
    }

    /// Downloads `record`'s media and returns the final path.
    ///
    /// Both files appear only once complete: each is written to a `.part`
    /// file and renamed into place. The media is renamed first and the
    /// metadata second, so an interrupted process may leave a media file
    /// without its metadata but never metadata without media. If the
    /// metadata rename fails the media file is removed again.
    pub async fn download(&self, record: &MediaRecord) -> Result<PathBuf, ApodError> {
        let url = self.media_url(record)?;
        let dest = naming::media_path(&self.output_dir, record, url);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let label = format!("media {}", record.date);
        let part_dest = dest.as_path();
        let media_part = retry_spaced(&self.policy, &label, &self.spacer, move |_attempt| async move {
            self.fetch_to_part(url, part_dest).await
        })
        .await?;

        if !self.save_metadata {
            media_part.commit(&dest).await?;
            info!("Saved {} to {}", record.date, dest.display());
            return Ok(dest);
        }

        let meta_dest = naming::metadata_path(&dest);
        let json = serde_json::to_vec_pretty(record)?;
        let meta_part = write_part(&meta_dest, &json, &self.parts).await?;
        media_part.commit(&dest).await?;
        if let Err(e) = meta_part.commit(&meta_dest).await {
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(e.into());
        }

        info!("Saved {} to {}", record.date, dest.display());
        Ok(dest)
    }

    /// Removes `.part` files this downloader created that are still on
    /// disk, e.g. after a cancelled run. Returns how many were removed.
    pub async fn remove_partial_files(&self) -> io::Result<usize> {
        self.parts.remove_all().await
    }

    /// One download attempt into a `.part` file next to `dest`.
    async fn fetch_to_part(&self, url: &str, dest: &Path) -> Result<PartFile, ApodError> {
        let body = self.service.open_media(url).await?;

        let part = PartFile::for_destination(dest, &self.parts);
        let mut file = BufWriter::new(tokio::fs::File::create(part.path()).await?);
        let mut stream = body.stream;
        let mut written: u64 = 0;

        while let Some(piece) = stream.next().await {
            let chunk = piece?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.get_ref().sync_all().await?;

        match body.content_length {
            Some(expected) if expected != written => {
                warn!(
                    "Size mismatch for {}: expected {} bytes, got {} bytes",
                    url, expected, written
                );
                return Err(ApodError::TransientNetwork(format!(
                    "truncated body from {}: expected {} bytes, got {}",
                    url, expected, written
                )));
            }
            Some(_) => {}
            None => debug!("Content-Length header was not present for {}", url),
        }

        Ok(part)
    }
}
