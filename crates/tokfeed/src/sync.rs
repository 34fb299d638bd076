//! Feed synchronization.
//!
//! [`FeedSynchronizer`] signs and fetches every tracked profile in order,
//! merges the pages, sorts the result and hands it to the [`FeedStore`].
//! Only one run may be in flight at a time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{ApiConfig, FeedConfig};
use crate::error::{SignError, SyncError};
use crate::fetcher::PageFetcher;
use crate::model::{FeedSnapshot, Profile};
use crate::signer::Signer;
use crate::store::FeedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Marks the synchronizer as running for its lifetime. A guard dropped
/// without [`finish`](RunGuard::finish), e.g. because the run future was
/// dropped, leaves the state at `Failed`.
struct RunGuard<'a> {
    state: &'a Mutex<SyncState>,
    finished: bool,
}

impl<'a> RunGuard<'a> {
    fn acquire(state: &'a Mutex<SyncState>) -> Result<Self, SyncError> {
        let mut current = state.lock();
        if *current == SyncState::Running {
            return Err(SyncError::AlreadyInProgress);
        }
        *current = SyncState::Running;
        Ok(Self {
            state,
            finished: false,
        })
    }

    fn finish(mut self, outcome: SyncState) {
        *self.state.lock() = outcome;
        self.finished = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.lock() = SyncState::Failed;
        }
    }
}

/// Builds the unsigned item list URL for `profile`.
pub fn build_query_url(api: &ApiConfig, profile: &Profile) -> Result<String, SignError> {
    let mut url = Url::parse(&api.item_list_url)
        .map_err(|e| SignError::InvalidUrl(format!("{}: {e}", api.item_list_url)))?;
    url.query_pairs_mut()
        .append_pair("aid", &api.aid)
        .append_pair("count", &api.request_count.to_string())
        .append_pair("id", &profile.id)
        .append_pair("cursor", "0")
        .append_pair("type", "1")
        .append_pair("secUid", &profile.sec_uid);
    Ok(url.into())
}

pub struct FeedSynchronizer {
    signer: Arc<dyn Signer>,
    fetcher: Arc<dyn PageFetcher>,
    store: FeedStore,
    config: FeedConfig,
    state: Mutex<SyncState>,
}

impl FeedSynchronizer {
    pub fn new(
        signer: Arc<dyn Signer>,
        fetcher: Arc<dyn PageFetcher>,
        store: FeedStore,
        config: FeedConfig,
    ) -> Self {
        Self {
            signer,
            fetcher,
            store,
            config,
            state: Mutex::new(SyncState::Idle),
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    pub fn store(&self) -> &FeedStore {
        &self.store
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Whether a run is warranted at `now`.
    ///
    /// A run is skipped only when the last successful one finished less than
    /// the cooldown ago and left a non-empty feed behind.
    pub async fn should_synchronize(&self, now: DateTime<Utc>, force: bool) -> bool {
        if force {
            return true;
        }
        let Some(last) = self.store.last_synced_at().await else {
            return true;
        };
        let has_feed = self
            .store
            .load()
            .await
            .is_some_and(|snapshot| !snapshot.is_empty());
        if !has_feed {
            return true;
        }

        let elapsed = now
            .signed_duration_since(last)
            .to_std()
            .unwrap_or(Duration::ZERO);
        elapsed >= self.config.sync.cooldown()
    }

    /// Runs over the configured profiles unless the stored feed is still fresh.
    ///
    /// Returns `None` when the run was skipped.
    pub async fn synchronize_if_stale(
        &self,
        force: bool,
    ) -> Result<Option<FeedSnapshot>, SyncError> {
        if !self.should_synchronize(Utc::now(), force).await {
            info!("Feed is fresh, skipping synchronization");
            return Ok(None);
        }
        self.synchronize(&self.config.profiles).await.map(Some)
    }

    /// Signs and fetches every profile in order and stores the merged feed.
    ///
    /// Any profile failing aborts the run; the stored feed is left as it was.
    pub async fn synchronize(&self, profiles: &[Profile]) -> Result<FeedSnapshot, SyncError> {
        let guard = RunGuard::acquire(&self.state)?;
        let run_id = Uuid::new_v4();
        let span = info_span!("sync", %run_id, profiles = profiles.len());

        let result = self.run(profiles).instrument(span.clone()).await;
        let _enter = span.enter();
        match &result {
            Ok(snapshot) => {
                guard.finish(SyncState::Completed);
                info!(items = snapshot.len(), "Synchronization completed");
            }
            Err(e) => {
                guard.finish(SyncState::Failed);
                warn!(error = %e, "Synchronization failed");
            }
        }
        result
    }

    async fn run(&self, profiles: &[Profile]) -> Result<FeedSnapshot, SyncError> {
        let mut items = Vec::new();

        for profile in profiles {
            let sign_failed = |source| SyncError::SignFailed {
                profile: profile.username.clone(),
                source,
            };

            let unsigned = build_query_url(&self.config.api, profile).map_err(sign_failed)?;
            let signed = self.signer.sign(&unsigned).await.map_err(sign_failed)?;
            let page = self
                .fetcher
                .fetch(&signed, self.config.api.page_size)
                .await
                .map_err(|source| SyncError::FetchFailed {
                    profile: profile.username.clone(),
                    source,
                })?;

            debug!(profile = %profile.username, count = page.len(), "Fetched profile");
            items.extend(page);
        }

        let snapshot = FeedSnapshot::from_unordered(items, Utc::now());
        self.store.save(&snapshot).await?;
        Ok(snapshot)
    }
}
