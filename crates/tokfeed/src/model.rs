//! Domain types shared by the fetcher, synchronizer, store and cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A single short video as it appears in the merged feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoItem {
    pub id: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub create_time: DateTime<Utc>,
    pub video: VideoAsset,
    pub author: Author,
    #[serde(default)]
    pub is_ad: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoAsset {
    pub id: String,
    pub cover: Url,
    pub play_addr: Url,
    pub download_addr: Url,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    /// Public handle, e.g. the `@name` part of a profile URL.
    pub unique_id: String,
    pub nickname: String,
    pub avatar_thumb: Url,
    pub avatar_medium: Url,
    pub avatar_larger: Url,
    /// Bio text.
    pub signature: String,
    pub verified: bool,
    pub sec_uid: String,
}

/// A tracked creator profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub sec_uid: String,
}

impl Profile {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        sec_uid: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            sec_uid: sec_uid.into(),
        }
    }
}

/// The merged feed, newest first, plus the time it was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub items: Vec<VideoItem>,
    pub produced_at: DateTime<Utc>,
}

impl FeedSnapshot {
    /// Builds a snapshot from unordered items, applying the feed ordering.
    pub fn from_unordered(mut items: Vec<VideoItem>, produced_at: DateTime<Utc>) -> Self {
        sort_feed(&mut items);
        Self { items, produced_at }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn find(&self, id: &str) -> Option<&VideoItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// Newest first; equal timestamps are ordered by identifier so repeated runs
/// over the same data produce the same feed.
pub fn sort_feed(items: &mut [VideoItem]) {
    items.sort_by(|a, b| {
        b.create_time
            .cmp(&a.create_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}
