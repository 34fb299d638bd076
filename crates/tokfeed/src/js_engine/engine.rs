//! QuickJS-backed [`ScriptEngine`].

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{SET_COOKIE, USER_AGENT};
use tracing::debug;
use url::Url;

use super::ScriptEngine;
use super::context::{PageContext, browser_env_script};
use super::error::EngineError;

/// A script engine running on an embedded QuickJS runtime.
///
/// QuickJS has no DOM, so loading a page means fetching it over HTTP to pick
/// up its cookies, then creating a fresh context with browser stubs
/// (`window`, `document`, `navigator`, `location`) describing that page.
pub struct QuickJsEngine {
    runtime: rquickjs::Runtime,
    page: Option<PageContext>,
    client: Client,
    user_agent: String,
}

impl QuickJsEngine {
    pub fn new(client: Client, user_agent: impl Into<String>) -> Result<Self, EngineError> {
        let runtime = rquickjs::Runtime::new().map_err(|e| EngineError::Setup(e.to_string()))?;
        Ok(Self {
            runtime,
            page: None,
            client,
            user_agent: user_agent.into(),
        })
    }

    async fn fetch_cookies(&self, url: &Url) -> Result<String, EngineError> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| EngineError::navigation(url.as_str(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::navigation(
                url.as_str(),
                format!("HTTP {}", response.status()),
            ));
        }

        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        Ok(cookies)
    }
}

#[async_trait]
impl ScriptEngine for QuickJsEngine {
    async fn load_page(&mut self, url: &Url) -> Result<(), EngineError> {
        let cookies = self.fetch_cookies(url).await?;
        debug!(url = %url, cookies = cookies.len(), "Loaded landing page");

        let page = PageContext::new(&self.runtime)?;
        page.eval_void(&browser_env_script(&self.user_agent, url.as_str(), &cookies))?;
        self.page = Some(page);
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, EngineError> {
        let page = self.page.as_ref().ok_or(EngineError::NoPage)?;
        page.eval_json(script)
    }
}
