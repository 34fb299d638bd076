//! Lazy on-disk media cache.
//!
//! Every asset maps deterministically to a file under one root directory:
//!
//! | kind   | file name           |
//! |--------|---------------------|
//! | avatar | `<authorId>.png`    |
//! | cover  | `cover-<videoId>.png` |
//! | video  | `video-<videoId>.mp4` |
//!
//! The presence of a file is the cache hit signal. Downloads land in a
//! uniquely named temporary file next to the target and are renamed into place
//! only once complete, so a file at a final path is always whole.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::StreamExt;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA, RANGE, REFERER,
};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::model::VideoItem;

/// Source of "now" for avatar freshness checks.
pub type Clock = Arc<dyn Fn() -> SystemTime + Send + Sync>;

const DEFAULT_AVATAR_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Avatar,
    Cover,
    Video,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Avatar => "avatar",
            Self::Cover => "cover",
            Self::Video => "video",
        })
    }
}

/// Identifies one cached asset: its kind plus the id of the author or video
/// that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: AssetKind,
    pub owner_id: String,
}

impl CacheKey {
    pub fn new(kind: AssetKind, owner_id: impl Into<String>) -> Self {
        Self {
            kind,
            owner_id: owner_id.into(),
        }
    }

    pub fn avatar(author_id: impl Into<String>) -> Self {
        Self::new(AssetKind::Avatar, author_id)
    }

    pub fn cover(video_id: impl Into<String>) -> Self {
        Self::new(AssetKind::Cover, video_id)
    }

    pub fn video(video_id: impl Into<String>) -> Self {
        Self::new(AssetKind::Video, video_id)
    }

    pub fn file_name(&self) -> String {
        match self.kind {
            AssetKind::Avatar => format!("{}.png", self.owner_id),
            AssetKind::Cover => format!("cover-{}.png", self.owner_id),
            AssetKind::Video => format!("video-{}.mp4", self.owner_id),
        }
    }

    /// Owner ids come from the platform; reject anything that could leave the root.
    fn is_safe(&self) -> bool {
        !self.owner_id.is_empty()
            && Path::new(&self.owner_id)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            && !self.owner_id.contains(['/', '\\'])
    }
}

#[derive(Debug, Error)]
enum DownloadError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("truncated body: expected {expected} bytes, got {received}")]
    Truncated { expected: u64, received: u64 },
    #[error("empty body")]
    Empty,
}

/// A file written under a temporary name and renamed over `final_path` on
/// [`commit`](AtomicFile::commit). Dropping it uncommitted removes the
/// temporary file and leaves `final_path` untouched.
pub(crate) struct AtomicFile {
    file: Option<fs::File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
    committed: bool,
}

impl AtomicFile {
    pub async fn create(final_path: &Path) -> io::Result<Self> {
        let name = final_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = final_path.with_file_name(format!("{name}.tmp.{}", Uuid::new_v4()));
        let file = fs::File::create(&temp_path).await?;
        Ok(Self {
            file: Some(file),
            temp_path,
            final_path: final_path.to_path_buf(),
            bytes_written: 0,
            committed: false,
        })
    }

    pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("file already committed"))?;
        file.write_all(data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub async fn commit(mut self) -> io::Result<u64> {
        if let Some(file) = self.file.take() {
            file.sync_all().await?;
        }
        fs::rename(&self.temp_path, &self.final_path).await?;
        self.committed = true;
        Ok(self.bytes_written)
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.file.take());
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

/// Writes `data` to `path` through an [`AtomicFile`].
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = AtomicFile::create(path).await?;
    file.write_all(data).await?;
    file.commit().await?;
    Ok(())
}

/// Lazily downloads and caches avatars, covers and videos.
#[derive(Clone)]
pub struct MediaCache {
    root: PathBuf,
    client: Client,
    avatar_ttl: Duration,
    referer: Option<String>,
    clock: Clock,
}

impl fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaCache")
            .field("root", &self.root)
            .field("avatar_ttl", &self.avatar_ttl)
            .field("referer", &self.referer)
            .finish_non_exhaustive()
    }
}

impl MediaCache {
    pub fn new(root: impl Into<PathBuf>, client: Client) -> Self {
        Self {
            root: root.into(),
            client,
            avatar_ttl: DEFAULT_AVATAR_TTL,
            referer: None,
            clock: Arc::new(SystemTime::now),
        }
    }

    pub fn with_avatar_ttl(mut self, ttl: Duration) -> Self {
        self.avatar_ttl = ttl;
        self
    }

    /// Referer sent with video downloads.
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Returns the local path for `key`, downloading from `source` first when
    /// the cached file is missing (or, for avatars, expired).
    ///
    /// `source` is only called when a download is needed. Failures are logged
    /// and yield `None`; the next call retries.
    #[instrument(skip(self, source), fields(kind = %key.kind, owner_id = %key.owner_id))]
    pub async fn ensure<F>(&self, key: &CacheKey, source: F) -> Option<PathBuf>
    where
        F: FnOnce() -> Option<Url> + Send,
    {
        if !key.is_safe() {
            warn!("Refusing cache key with unsafe owner id");
            return None;
        }

        let path = self.path_for(key);
        if self.is_fresh(key.kind, &path).await {
            debug!(path = %path.display(), "Cache hit");
            return Some(path);
        }

        let Some(url) = source() else {
            debug!("No source url for asset");
            return None;
        };

        match self.download(key.kind, &url, &path).await {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes, "Cached asset");
                Some(path)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to cache asset");
                // an expired avatar is still a complete file
                if is_file(&path).await {
                    debug!(path = %path.display(), "Keeping previous file");
                    Some(path)
                } else {
                    None
                }
            }
        }
    }

    pub async fn ensure_avatar(&self, item: &VideoItem) -> Option<PathBuf> {
        let url = item.author.avatar_larger.clone();
        self.ensure(&CacheKey::avatar(&item.author.id), move || Some(url))
            .await
    }

    pub async fn ensure_cover(&self, item: &VideoItem) -> Option<PathBuf> {
        let url = item.video.cover.clone();
        self.ensure(&CacheKey::cover(&item.video.id), move || Some(url))
            .await
    }

    pub async fn ensure_video(&self, item: &VideoItem) -> Option<PathBuf> {
        let url = item.video.play_addr.clone();
        self.ensure(&CacheKey::video(&item.video.id), move || Some(url))
            .await
    }

    async fn is_fresh(&self, kind: AssetKind, path: &Path) -> bool {
        let Ok(meta) = fs::metadata(path).await else {
            return false;
        };
        if !meta.is_file() {
            return false;
        }
        match kind {
            AssetKind::Cover | AssetKind::Video => true,
            AssetKind::Avatar => {
                let Ok(born) = meta.created().or_else(|_| meta.modified()) else {
                    return false;
                };
                // a timestamp in the future counts as brand new
                let age = (self.clock)()
                    .duration_since(born)
                    .unwrap_or(Duration::ZERO);
                age < self.avatar_ttl
            }
        }
    }

    async fn download(&self, kind: AssetKind, url: &Url, path: &Path) -> Result<u64, DownloadError> {
        let mut request = self.client.get(url.clone());
        if kind == AssetKind::Video {
            request = request
                .header(ACCEPT, "*/*")
                .header(ACCEPT_ENCODING, "identity;q=1, *;q=0")
                .header(ACCEPT_LANGUAGE, "en-US;en;q=0.9")
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache")
                .header(RANGE, "bytes=0-");
            if let Some(referer) = &self.referer {
                request = request.header(REFERER, referer);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let accepted = status == StatusCode::OK
            || (kind == AssetKind::Video && status == StatusCode::PARTIAL_CONTENT);
        if !accepted {
            return Err(DownloadError::Status(status));
        }
        let expected = response.content_length();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = AtomicFile::create(path).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }

        check_length(expected, file.bytes_written())?;
        Ok(file.commit().await?)
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|meta| meta.is_file())
}

/// A body is complete when it is non-empty and matches the declared length.
fn check_length(expected: Option<u64>, received: u64) -> Result<(), DownloadError> {
    if received == 0 {
        return Err(DownloadError::Empty);
    }
    match expected {
        Some(expected) if expected != received => {
            Err(DownloadError::Truncated { expected, received })
        }
        _ => Ok(()),
    }
}
