//! Request signing.
//!
//! The platform rejects unsigned feed requests. A [`Signer`] turns an unsigned
//! API URL into a [`SignedRequest`]: the signed URL, the auxiliary headers the
//! API expects alongside it, and the user agent the fetch must replay.
//!
//! Two implementations exist:
//! - [`ScriptSigner`]: runs the platform's own signing scripts in a [`ScriptEngine`]
//! - [`RemoteSigner`]: posts the URL to a signing service
//!
//! [`create_signer`] picks one from [`SigningConfig`].
//!
//! [`ScriptEngine`]: crate::js_engine::ScriptEngine

mod remote;
mod script;
mod token;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::config::{SigningConfig, SigningMode};
use crate::error::{ConfigError, SignError};

pub use remote::RemoteSigner;
pub use script::{ScriptSigner, SigningScripts};
pub use token::{VERIFY_PARAM, gen_verify_fp};

/// Query parameter carrying the signature.
pub const SIGNATURE_PARAM: &str = "_signature";

/// The result of signing one request. Created fresh for every fetch and
/// never reused: the platform binds signatures to single-use tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub unsigned_url: String,
    pub signed_url: Url,
    /// Auxiliary parameters sent as request headers.
    pub extra_params: BTreeMap<String, String>,
    /// The signing environment's user agent; the fetch must send the same one.
    pub user_agent: String,
}

#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, unsigned_url: &str) -> Result<SignedRequest, SignError>;
}

#[async_trait]
impl<S: Signer + ?Sized> Signer for Arc<S> {
    async fn sign(&self, unsigned_url: &str) -> Result<SignedRequest, SignError> {
        (**self).sign(unsigned_url).await
    }
}

/// Parses `unsigned_url` and appends a fresh `verifyFp` token.
pub(crate) fn with_verify_token(unsigned_url: &str) -> Result<Url, SignError> {
    let mut url =
        Url::parse(unsigned_url).map_err(|e| SignError::InvalidUrl(format!("{unsigned_url}: {e}")))?;
    url.query_pairs_mut()
        .append_pair(VERIFY_PARAM, &gen_verify_fp());
    Ok(url)
}

/// Builds the signer selected by `config`.
///
/// Remote mode needs an endpoint; script mode needs both scripts and the
/// `quickjs` feature.
pub async fn create_signer(
    config: &SigningConfig,
    client: Client,
    user_agent: &str,
) -> Result<Arc<dyn Signer>, ConfigError> {
    match config.mode {
        SigningMode::Remote => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| ConfigError::invalid("remote signing requires an endpoint"))?;
            let signer = RemoteSigner::new(client, endpoint)?
                .with_params_header(config.params_header.clone());
            Ok(Arc::new(signer))
        }
        SigningMode::Script => create_script_signer(config, client, user_agent).await,
    }
}

#[cfg(feature = "quickjs")]
async fn create_script_signer(
    config: &SigningConfig,
    client: Client,
    user_agent: &str,
) -> Result<Arc<dyn Signer>, ConfigError> {
    use crate::js_engine::QuickJsEngine;

    let scripts = SigningScripts::from_config(config).await?;
    let engine = QuickJsEngine::new(client, user_agent)
        .map_err(|e| ConfigError::invalid(e.to_string()))?;
    let landing_page = Url::parse(&config.landing_page)
        .map_err(|e| ConfigError::invalid(format!("signing.landing_page: {e}")))?;
    Ok(Arc::new(ScriptSigner::new(engine, scripts, landing_page)))
}

#[cfg(not(feature = "quickjs"))]
async fn create_script_signer(
    _config: &SigningConfig,
    _client: Client,
    _user_agent: &str,
) -> Result<Arc<dyn Signer>, ConfigError> {
    Err(ConfigError::invalid(
        "script signing requires the `quickjs` feature; use signing.mode = \"remote\"",
    ))
}
