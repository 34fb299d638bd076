use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{SignedRequest, Signer, with_verify_token};
use crate::error::{ConfigError, SignError};

const DEFAULT_PARAMS_HEADER: &str = "x-tt-params";

#[derive(Debug, Deserialize)]
struct SignResponse {
    status: String,
    data: Option<SignData>,
}

#[derive(Debug, Deserialize)]
struct SignData {
    signed_url: String,
    navigator: Navigator,
    #[serde(rename = "x-tt-params")]
    tt_params: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Navigator {
    user_agent: String,
}

/// Delegates signing to an HTTP service.
///
/// The token-augmented URL is posted as a plain-text body; the service answers
/// with the signed URL and the user agent it signed for.
#[derive(Debug, Clone)]
pub struct RemoteSigner {
    client: Client,
    endpoint: Url,
    params_header: String,
}

impl RemoteSigner {
    pub fn new(client: Client, endpoint: &str) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ConfigError::invalid(format!("signing endpoint '{endpoint}': {e}")))?;
        Ok(Self {
            client,
            endpoint,
            params_header: DEFAULT_PARAMS_HEADER.to_string(),
        })
    }

    /// Header name for the optional secondary payload in the response.
    pub fn with_params_header(mut self, header: impl Into<String>) -> Self {
        self.params_header = header.into();
        self
    }
}

#[async_trait]
impl Signer for RemoteSigner {
    #[instrument(skip(self), fields(endpoint = %self.endpoint), level = "debug")]
    async fn sign(&self, unsigned_url: &str) -> Result<SignedRequest, SignError> {
        let url = with_verify_token(unsigned_url)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(url.to_string())
            .send()
            .await
            .map_err(SignError::EndpointUnreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignError::rejected(format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(SignError::EndpointUnreachable)?;
        let parsed: SignResponse = serde_json::from_str(&body)
            .map_err(|e| SignError::rejected(format!("malformed response: {e}")))?;

        if parsed.status != "ok" {
            return Err(SignError::rejected(format!("status '{}'", parsed.status)));
        }
        let data = parsed
            .data
            .ok_or_else(|| SignError::rejected("response has no data"))?;
        let signed_url = Url::parse(&data.signed_url)
            .map_err(|e| SignError::rejected(format!("signed_url: {e}")))?;

        let mut extra_params = BTreeMap::new();
        if let Some(payload) = data.tt_params {
            extra_params.insert(self.params_header.clone(), payload);
        }

        debug!(signed_url = %signed_url, "Signed request with remote endpoint");
        Ok(SignedRequest {
            unsigned_url: unsigned_url.to_string(),
            signed_url,
            extra_params,
            user_agent: data.navigator.user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const UNSIGNED: &str = "https://m.tiktok.com/api/post/item_list/?aid=1988&id=42";

    #[tokio::test]
    async fn test_sign_posts_url_and_decodes_response() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/signature")
                    .body_contains("aid=1988&id=42&verifyFp=verify_");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "data": {
                        "signed_url": "https://m.tiktok.com/api/post/item_list/?aid=1988&id=42&_signature=abc",
                        "navigator": { "user_agent": "Remote/2.0" },
                        "x-tt-params": "PAYLOAD"
                    }
                }));
            })
            .await;

        let signer = RemoteSigner::new(crate::client::test_client(), &server.url("/signature")).unwrap();
        let signed = signer.sign(UNSIGNED).await.unwrap();

        mock.assert_async().await;
        assert_eq!(signed.unsigned_url, UNSIGNED);
        assert_eq!(signed.user_agent, "Remote/2.0");
        assert_eq!(signed.extra_params["x-tt-params"], "PAYLOAD");
        assert!(signed.signed_url.as_str().ends_with("_signature=abc"));
    }

    #[tokio::test]
    async fn test_missing_params_payload_is_allowed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/signature");
                then.status(200).json_body(json!({
                    "status": "ok",
                    "data": {
                        "signed_url": "https://m.tiktok.com/api/?_signature=abc",
                        "navigator": { "user_agent": "Remote/2.0" }
                    }
                }));
            })
            .await;

        let signer = RemoteSigner::new(crate::client::test_client(), &server.url("/signature")).unwrap();
        let signed = signer.sign(UNSIGNED).await.unwrap();
        assert!(signed.extra_params.is_empty());
    }

    #[tokio::test]
    async fn test_non_ok_status_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/signature");
                then.status(200)
                    .json_body(json!({ "status": "error", "data": null }));
            })
            .await;

        let signer = RemoteSigner::new(crate::client::test_client(), &server.url("/signature")).unwrap();
        let err = signer.sign(UNSIGNED).await.unwrap_err();
        assert!(matches!(err, SignError::EndpointRejected(_)));
    }

    #[tokio::test]
    async fn test_http_error_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/signature");
                then.status(503);
            })
            .await;

        let signer = RemoteSigner::new(crate::client::test_client(), &server.url("/signature")).unwrap();
        let err = signer.sign(UNSIGNED).await.unwrap_err();
        assert!(matches!(err, SignError::EndpointRejected(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/signature");
                then.status(200).body("<html>oops</html>");
            })
            .await;

        let signer = RemoteSigner::new(crate::client::test_client(), &server.url("/signature")).unwrap();
        let err = signer.sign(UNSIGNED).await.unwrap_err();
        assert!(matches!(err, SignError::EndpointRejected(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        // nothing listens on the discard port
        let signer = RemoteSigner::new(crate::client::test_client(), "http://127.0.0.1:9/signature").unwrap();
        let err = signer.sign(UNSIGNED).await.unwrap_err();
        assert!(matches!(err, SignError::EndpointUnreachable(_)));
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = RemoteSigner::new(crate::client::test_client(), "not a url").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
