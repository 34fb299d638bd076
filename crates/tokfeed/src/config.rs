//! Configuration for the feed pipeline.
//!
//! Everything the synchronizer, signer, fetcher and cache need is carried in
//! an explicit [`FeedConfig`] rather than read from ambient state. Every field
//! has a default except the tracked profiles.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::Profile;

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Environment variable that seeds the remote signing endpoint.
pub const SIGN_ENDPOINT_ENV: &str = "SIGN_ENDPOINT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub profiles: Vec<Profile>,
    pub signing: SigningConfig,
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub http: HttpConfig,
}

impl FeedConfig {
    /// Parses a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.page_size == 0 {
            return Err(ConfigError::invalid("api.page_size must be at least 1"));
        }
        if let Some(profile) = self
            .profiles
            .iter()
            .find(|p| p.id.is_empty() || p.sec_uid.is_empty())
        {
            return Err(ConfigError::invalid(format!(
                "profile '{}' needs both an id and a sec_uid",
                profile.username
            )));
        }
        url::Url::parse(&self.api.item_list_url)
            .map_err(|e| ConfigError::invalid(format!("api.item_list_url: {e}")))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningMode {
    /// Run the platform's signing scripts in a local engine.
    #[default]
    Script,
    /// Delegate signing to a remote HTTP endpoint.
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub mode: SigningMode,
    /// Remote signing endpoint, used in [`SigningMode::Remote`].
    pub endpoint: Option<String>,
    /// Page loaded before the scripts run; establishes cookies and page state.
    pub landing_page: String,
    /// Script that installs the signing routine.
    pub signing_script: Option<PathBuf>,
    /// Script that installs the secondary parameter routine.
    pub params_script: Option<PathBuf>,
    pub sign_function: String,
    pub params_function: String,
    /// Header name carrying the secondary parameter payload.
    pub params_header: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            mode: SigningMode::default(),
            endpoint: None,
            landing_page: "https://www.tiktok.com/@rihanna?lang=en".to_string(),
            signing_script: None,
            params_script: None,
            sign_function: "window.byted_acrawler.sign".to_string(),
            params_function: "window.genXTTParams".to_string(),
            params_header: "x-tt-params".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub item_list_url: String,
    pub aid: String,
    /// Number of items requested from the platform per profile.
    pub request_count: u32,
    /// Number of items kept per profile after decoding.
    pub page_size: usize,
    pub referer: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            item_list_url: "https://m.tiktok.com/api/post/item_list/".to_string(),
            aid: "1988".to_string(),
            request_count: 30,
            page_size: 10,
            referer: "https://www.tiktok.com/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub cooldown_secs: u64,
}

impl SyncConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { cooldown_secs: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; the CLI falls back to the platform cache dir when unset.
    pub root: Option<PathBuf>,
    pub avatar_ttl_secs: u64,
}

impl CacheConfig {
    pub fn avatar_ttl(&self) -> Duration {
        Duration::from_secs(self.avatar_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            avatar_ttl_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: DEFAULT_UA.to_string(),
        }
    }
}
