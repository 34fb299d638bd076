//! Script engine boundary used by the script signer.
//!
//! The signer only needs two capabilities from an engine: load a page of the
//! target platform, and evaluate a script against that page's global scope.
//! [`ScriptEngine`] captures exactly that, so the signing flow can run against
//! the bundled QuickJS engine (feature `quickjs`) or a test fake.
//!
//! # Example
//!
//! ```ignore
//! use tokfeed::js_engine::{QuickJsEngine, ScriptEngine};
//!
//! let mut engine = QuickJsEngine::new(client, user_agent)?;
//! engine.load_page(&"https://www.tiktok.com/".parse()?).await?;
//! engine.evaluate("function greet(name) { return 'Hello, ' + name; }").await?;
//! let greeting = engine.evaluate("greet('World')").await?;
//! ```

mod context;
#[cfg(feature = "quickjs")]
mod engine;
mod error;

use async_trait::async_trait;
use url::Url;

pub use context::{BROWSER_ENV_SETUP, browser_env_script};
pub(crate) use context::js_string;
#[cfg(feature = "quickjs")]
pub use context::PageContext;
#[cfg(feature = "quickjs")]
pub use engine::QuickJsEngine;
pub use error::EngineError;

/// A scriptable, browser-like execution environment.
///
/// Implementations are stateful: scripts evaluated after [`load_page`]
/// see the globals installed by earlier evaluations on the same page.
///
/// [`load_page`]: ScriptEngine::load_page
#[async_trait]
pub trait ScriptEngine: Send {
    /// Load `url` and reset the global scope to a fresh page.
    async fn load_page(&mut self, url: &Url) -> Result<(), EngineError>;

    /// Evaluate `script` against the current page and return its result as JSON.
    ///
    /// `undefined` maps to `null`; strings map to JSON strings.
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, EngineError>;
}

#[async_trait]
impl<E: ScriptEngine + ?Sized> ScriptEngine for Box<E> {
    async fn load_page(&mut self, url: &Url) -> Result<(), EngineError> {
        (**self).load_page(url).await
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, EngineError> {
        (**self).evaluate(script).await
    }
}
