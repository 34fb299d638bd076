//! Tokfeed: signed short-video feed synchronization with a local media cache.
//!
//! The crate follows a small set of creator profiles on a short-video
//! platform, merges their latest posts into one feed ordered newest first, and
//! caches the media behind that feed on disk.
//!
//! ## Pipeline
//!
//! - [`Signer`] - Turns an unsigned API URL into a [`SignedRequest`], either by
//!   running the platform's scripts in a [`ScriptEngine`] or via a remote endpoint
//! - [`PageFetcher`] - Performs the authenticated call and decodes one page of posts
//! - [`FeedSynchronizer`] - Runs signer and fetcher across all profiles and orders the result
//! - [`FeedStore`] - Persists the last feed and the time of the last synchronization
//! - [`MediaCache`] - Lazily downloads avatars, covers and videos
//!
//! ## Features
//!
//! - `quickjs` - Enables [`js_engine::QuickJsEngine`] and script-mode signing
//!
//! [`ScriptEngine`]: js_engine::ScriptEngine

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod js_engine;
pub mod model;
pub mod signer;
pub mod store;
pub mod sync;

pub use cache::{AssetKind, CacheKey, MediaCache};
pub use config::FeedConfig;
pub use error::{ConfigError, FetchError, SignError, StoreError, SyncError};
pub use fetcher::{PageFetcher, ProfileFetcher};
pub use model::{Author, FeedSnapshot, Profile, VideoAsset, VideoItem};
pub use signer::{SignedRequest, Signer, create_signer};
pub use store::{FeedStore, JsonFileStore, KeyValueStore, MemoryStore, Settings};
pub use sync::{FeedSynchronizer, SyncState};
