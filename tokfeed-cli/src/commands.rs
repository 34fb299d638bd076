use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use reqwest::Client;
use tokfeed::client::create_client;
use tokfeed::config::SIGN_ENDPOINT_ENV;
use tokfeed::store::resolve_sign_endpoint;
use tokfeed::{
    FeedConfig, FeedStore, FeedSynchronizer, JsonFileStore, MediaCache, ProfileFetcher, Settings,
    create_signer,
};
use tracing::{debug, info};

use crate::cli::OutputFormat;
use crate::config::AppPaths;
use crate::output::{CacheReport, OutputManager};

pub struct CommandExecutor {
    config: FeedConfig,
    paths: AppPaths,
    store: FeedStore,
    client: Client,
    output: OutputManager,
}

impl CommandExecutor {
    pub async fn new(mut config: FeedConfig, paths: AppPaths, colored: bool) -> Result<Self> {
        let backend = JsonFileStore::open(&paths.settings_file)
            .await
            .with_context(|| format!("failed to open {}", paths.settings_file.display()))?;
        let settings = Settings::new(Arc::new(backend));

        apply_sign_endpoint(&mut config, &settings, std::env::var(SIGN_ENDPOINT_ENV).ok()).await?;

        let client = create_client(&config.http).context("failed to build HTTP client")?;
        Ok(Self {
            config,
            paths,
            store: FeedStore::new(settings),
            client,
            output: OutputManager::new(colored),
        })
    }

    pub async fn sync(&self, force: bool) -> Result<()> {
        if self.config.profiles.is_empty() {
            bail!(
                "no profiles configured; add [[profiles]] entries to {}",
                self.paths.config_file.display()
            );
        }

        let signer = create_signer(
            &self.config.signing,
            self.client.clone(),
            &self.config.http.user_agent,
        )
        .await
        .context("failed to set up request signing")?;
        let fetcher =
            ProfileFetcher::new(self.client.clone()).with_referer(&self.config.api.referer);
        let synchronizer = FeedSynchronizer::new(
            signer,
            Arc::new(fetcher),
            self.store.clone(),
            self.config.clone(),
        );

        match synchronizer.synchronize_if_stale(force).await? {
            Some(snapshot) => {
                print!("{}", self.output.format_feed(&snapshot, OutputFormat::Pretty)?);
            }
            None => {
                let age = self
                    .store
                    .last_synced_at()
                    .await
                    .map(|at| (Utc::now() - at).num_seconds().max(0));
                match age {
                    Some(secs) => println!(
                        "Feed is fresh (synchronized {secs}s ago); use --force to refresh"
                    ),
                    None => println!("Feed is fresh; use --force to refresh"),
                }
            }
        }
        Ok(())
    }

    pub async fn feed(&self, format: OutputFormat) -> Result<()> {
        let Some(snapshot) = self.store.load().await else {
            println!("No feed stored yet; run `tokfeed sync` first");
            return Ok(());
        };
        println!("{}", self.output.format_feed(&snapshot, format)?);
        Ok(())
    }

    pub async fn cache(&self, video_id: &str, format: OutputFormat) -> Result<()> {
        let snapshot = self
            .store
            .load()
            .await
            .context("no feed stored yet; run `tokfeed sync` first")?;
        let Some(item) = snapshot.find(video_id) else {
            bail!("video {video_id} is not in the stored feed");
        };

        tokio::fs::create_dir_all(&self.paths.cache_dir)
            .await
            .with_context(|| format!("failed to create {}", self.paths.cache_dir.display()))?;
        let cache = MediaCache::new(&self.paths.cache_dir, self.client.clone())
            .with_avatar_ttl(self.config.cache.avatar_ttl())
            .with_referer(&self.config.api.referer);
        debug!(root = %cache.root().display(), video_id, "Caching media");

        let report = CacheReport {
            video_id: video_id.to_string(),
            avatar: cache.ensure_avatar(item).await,
            cover: cache.ensure_cover(item).await,
            video: cache.ensure_video(item).await,
        };
        info!(
            avatar = report.avatar.is_some(),
            cover = report.cover.is_some(),
            video = report.video.is_some(),
            "Media cache updated"
        );
        println!("{}", self.output.format_cache(&report, format)?);
        Ok(())
    }

    pub fn show_config(&self) -> Result<()> {
        println!("# config file:   {}", self.paths.config_file.display());
        println!("# settings file: {}", self.paths.settings_file.display());
        println!("# media cache:   {}", self.paths.cache_dir.display());
        println!();
        print!(
            "{}",
            toml::to_string_pretty(&self.config).context("failed to render configuration")?
        );
        Ok(())
    }
}

/// Persists `SIGN_ENDPOINT` into settings and applies the resolved endpoint.
///
/// The environment always wins; a previously stored endpoint only fills in
/// when the configuration file has none.
pub(crate) async fn apply_sign_endpoint(
    config: &mut FeedConfig,
    settings: &Settings,
    env_value: Option<String>,
) -> Result<()> {
    let from_env = env_value.as_deref().is_some_and(|v| !v.trim().is_empty());
    let resolved = resolve_sign_endpoint(settings, env_value)
        .await
        .context("failed to read the stored signing endpoint")?;

    if let Some(endpoint) = resolved
        && (from_env || config.signing.endpoint.is_none())
    {
        debug!(endpoint = %endpoint, from_env, "Using signing endpoint");
        config.signing.endpoint = Some(endpoint);
    }
    Ok(())
}
