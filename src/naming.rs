//! Deterministic file naming for downloaded entries.

use crate::types::{MediaRecord, MediaType};
use reqwest::Url;
use std::path::{Path, PathBuf};

/// Extensions of video files that can be fetched directly, as opposed to
/// embedded players (YouTube, Vimeo, interactive pages).
const DIRECT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "m4v"];

/// Replaces everything except alphanumerics, `-` and `_` with `_`.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Lower-cased extension of the URL's path, if it has one.
pub fn url_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    Path::new(parsed.path())
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
}

/// Whether a video URL points at a file rather than an embedded player.
pub fn is_direct_video(url: &str) -> bool {
    url_extension(url).is_some_and(|ext| DIRECT_VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// `.ext` for the downloaded file, falling back per media type.
pub fn media_extension(url: &str, media_type: &MediaType) -> String {
    match url_extension(url) {
        Some(ext) => format!(".{}", ext),
        None if *media_type == MediaType::Video => ".mp4".to_string(),
        None => ".jpg".to_string(),
    }
}

/// `<YYYY-MM-DD>_<sanitized title>`, shared by the media and metadata files.
pub fn file_stem(record: &MediaRecord) -> String {
    format!("{}_{}", record.date.format("%Y-%m-%d"), sanitize_title(&record.title))
}

/// Final media path under `root`.
pub fn media_path(root: &Path, record: &MediaRecord, url: &str) -> PathBuf {
    root.join(format!("{}{}", file_stem(record), media_extension(url, &record.media_type)))
}

/// Sibling metadata path for a media path.
pub fn metadata_path(media_path: &Path) -> PathBuf {
    media_path.with_extension("json")
}
