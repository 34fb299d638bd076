use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokfeed::FeedConfig;
use tracing::{debug, warn};

const APP_DIR: &str = "tokfeed";

/// Where the CLI keeps its files.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub settings_file: PathBuf,
    pub cache_dir: PathBuf,
}

impl AppPaths {
    pub fn resolve(
        config: Option<&Path>,
        settings: Option<&Path>,
        feed_config: &FeedConfig,
    ) -> Result<Self> {
        let config_file = match config {
            Some(path) => path.to_path_buf(),
            None => default_config_file()?,
        };
        let settings_file = match settings {
            Some(path) => path.to_path_buf(),
            None => dirs::data_dir()
                .context("no data directory on this platform; pass --settings")?
                .join(APP_DIR)
                .join("settings.json"),
        };
        let cache_dir = match &feed_config.cache.root {
            Some(root) => root.clone(),
            None => dirs::cache_dir()
                .context("no cache directory on this platform; set cache.root")?
                .join(APP_DIR)
                .join("media"),
        };
        Ok(Self {
            config_file,
            settings_file,
            cache_dir,
        })
    }
}

fn default_config_file() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("no config directory on this platform; pass --config")?
        .join(APP_DIR)
        .join("config.toml"))
}

/// Loads the feed configuration.
///
/// An explicit path must exist. The default location is optional and falls
/// back to built-in defaults when absent.
pub async fn load_config(path: Option<&Path>) -> Result<FeedConfig> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_file()?, false),
    };

    if !explicit && !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        warn!(path = %path.display(), "No configuration file found, using defaults");
        return Ok(FeedConfig::default());
    }

    let config = FeedConfig::load(&path)
        .await
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    debug!(path = %path.display(), profiles = config.profiles.len(), "Loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [[profiles]]
            id = "6946620569643500549"
            username = "ryukahr"
            sec_uid = "MS4wLjABAAAAiPQCRk23WZyW4B9nW"

            [cache]
            root = "/tmp/tokfeed-media"
            "#,
        )
        .unwrap();

        let config = load_config(Some(&path)).await.unwrap();
        assert_eq!(config.profiles[0].username, "ryukahr");

        let paths = AppPaths::resolve(Some(&path), Some(&dir.path().join("s.json")), &config)
            .unwrap();
        assert_eq!(paths.cache_dir, Path::new("/tmp/tokfeed-media"));
        assert_eq!(paths.settings_file, dir.path().join("s.json"));
    }

    #[tokio::test]
    async fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("missing.toml"))).await;
        assert!(result.is_err());
    }
}
