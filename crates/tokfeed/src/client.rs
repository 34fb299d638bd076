use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::HttpConfig;

/// Installs the process-wide rustls crypto provider once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Builds the HTTP client shared by the remote signer, fetcher and media cache.
pub fn create_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    create_client_builder(config).build()
}

fn create_client_builder(config: &HttpConfig) -> reqwest::ClientBuilder {
    install_rustls_provider();

    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .gzip(true)
        .deflate(true);
    if config.timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_secs));
    }
    builder
}

#[cfg(test)]
pub(crate) fn test_client() -> Client {
    install_rustls_provider();
    Client::new()
}
