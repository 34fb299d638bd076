use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use super::{SIGNATURE_PARAM, SignedRequest, Signer, with_verify_token};
use crate::config::SigningConfig;
use crate::error::{ConfigError, SignError};
use crate::js_engine::{EngineError, ScriptEngine, js_string};

/// The two platform scripts plus the names of the routines they install.
#[derive(Debug, Clone)]
pub struct SigningScripts {
    /// Installs the signing routine into the page's global scope.
    pub signer: String,
    /// Installs the secondary parameter routine.
    pub params: String,
    pub sign_function: String,
    pub params_function: String,
    /// Header that carries the secondary routine's output.
    pub params_header: String,
}

impl SigningScripts {
    /// Script sources with the default routine names.
    pub fn new(signer: impl Into<String>, params: impl Into<String>) -> Self {
        let defaults = SigningConfig::default();
        Self {
            signer: signer.into(),
            params: params.into(),
            sign_function: defaults.sign_function,
            params_function: defaults.params_function,
            params_header: defaults.params_header,
        }
    }

    pub async fn from_config(config: &SigningConfig) -> Result<Self, ConfigError> {
        let signer = read_script(config.signing_script.as_deref(), "signing.signing_script").await?;
        let params = read_script(config.params_script.as_deref(), "signing.params_script").await?;
        Ok(Self {
            signer,
            params,
            sign_function: config.sign_function.clone(),
            params_function: config.params_function.clone(),
            params_header: config.params_header.clone(),
        })
    }
}

async fn read_script(path: Option<&Path>, key: &str) -> Result<String, ConfigError> {
    let path = path.ok_or_else(|| ConfigError::invalid(format!("{key} is required")))?;
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })
}

/// Signs requests by running the platform's scripts in a [`ScriptEngine`].
///
/// The engine is stateful and cannot serve two signing sessions at once, so
/// it sits behind an async mutex held for the whole four-step sequence.
pub struct ScriptSigner<E> {
    engine: Mutex<E>,
    scripts: SigningScripts,
    landing_page: Url,
}

impl<E: ScriptEngine> ScriptSigner<E> {
    pub fn new(engine: E, scripts: SigningScripts, landing_page: Url) -> Self {
        Self {
            engine: Mutex::new(engine),
            scripts,
            landing_page,
        }
    }

    async fn run(&self, unsigned_url: &str, url: Url) -> Result<SignedRequest, EngineError> {
        let mut engine = self.engine.lock().await;

        engine.load_page(&self.landing_page).await?;
        engine.evaluate(&self.scripts.signer).await?;
        engine.evaluate(&self.scripts.params).await?;

        let user_agent = expect_string(
            "navigator.userAgent",
            engine.evaluate("window.navigator.userAgent").await?,
        )?;

        let sign_call = format!(
            "{}({{ url: {} }})",
            self.scripts.sign_function,
            js_string(url.as_str())
        );
        let signature = expect_string(
            &self.scripts.sign_function,
            engine.evaluate(&sign_call).await?,
        )?;

        let mut signed_url = url.clone();
        signed_url
            .query_pairs_mut()
            .append_pair(SIGNATURE_PARAM, &signature);

        let query: BTreeMap<String, String> = signed_url.query_pairs().into_owned().collect();
        let query_json = serde_json::to_string(&query)
            .map_err(|e| EngineError::TypeConversion(e.to_string()))?;
        let params_call = format!("{}({})", self.scripts.params_function, query_json);
        let payload = expect_string(
            &self.scripts.params_function,
            engine.evaluate(&params_call).await?,
        )?;

        let mut extra_params = BTreeMap::new();
        extra_params.insert(self.scripts.params_header.clone(), payload);

        Ok(SignedRequest {
            unsigned_url: unsigned_url.to_string(),
            signed_url,
            extra_params,
            user_agent,
        })
    }
}

fn expect_string(what: &str, value: serde_json::Value) -> Result<String, EngineError> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        other => Err(EngineError::expected_string(what, &other)),
    }
}

#[async_trait]
impl<E: ScriptEngine> Signer for ScriptSigner<E> {
    #[instrument(skip(self), level = "debug")]
    async fn sign(&self, unsigned_url: &str) -> Result<SignedRequest, SignError> {
        let url = with_verify_token(unsigned_url)?;
        let signed = self.run(unsigned_url, url).await?;
        debug!(signed_url = %signed.signed_url, "Signed request with script engine");
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::Arc;

    #[derive(Default)]
    struct EngineLog {
        pages: Vec<String>,
        scripts: Vec<String>,
    }

    /// Records every call and answers the well-known expressions.
    struct FakeEngine {
        log: Arc<parking_lot::Mutex<EngineLog>>,
        signature: Value,
        fail_page: bool,
    }

    impl FakeEngine {
        fn new(log: Arc<parking_lot::Mutex<EngineLog>>) -> Self {
            Self {
                log,
                signature: json!("SIG123"),
                fail_page: false,
            }
        }
    }

    #[async_trait]
    impl ScriptEngine for FakeEngine {
        async fn load_page(&mut self, url: &Url) -> Result<(), EngineError> {
            if self.fail_page {
                return Err(EngineError::navigation(url.as_str(), "offline"));
            }
            self.log.lock().pages.push(url.to_string());
            Ok(())
        }

        async fn evaluate(&mut self, script: &str) -> Result<Value, EngineError> {
            self.log.lock().scripts.push(script.to_string());
            if script == "window.navigator.userAgent" {
                Ok(json!("FakeAgent/1.0"))
            } else if script.starts_with("window.byted_acrawler.sign(") {
                Ok(self.signature.clone())
            } else if script.starts_with("window.genXTTParams(") {
                Ok(json!("TTPARAMS"))
            } else {
                Ok(Value::Null)
            }
        }
    }

    fn signer(engine: FakeEngine) -> ScriptSigner<FakeEngine> {
        ScriptSigner::new(
            engine,
            SigningScripts::new("/* acrawler */", "/* tt-params */"),
            Url::parse("https://www.tiktok.com/@rihanna?lang=en").unwrap(),
        )
    }

    const UNSIGNED: &str = "https://m.tiktok.com/api/post/item_list/?aid=1988&id=42&secUid=MS4w";

    #[tokio::test]
    async fn test_sign_runs_steps_in_order() {
        let log = Arc::new(parking_lot::Mutex::new(EngineLog::default()));
        let signed = signer(FakeEngine::new(log.clone()))
            .sign(UNSIGNED)
            .await
            .unwrap();

        let log = log.lock();
        assert_eq!(log.pages, ["https://www.tiktok.com/@rihanna?lang=en"]);
        assert_eq!(log.scripts[0], "/* acrawler */");
        assert_eq!(log.scripts[1], "/* tt-params */");
        assert!(log.scripts[3].starts_with("window.byted_acrawler.sign({ url: \""));
        assert!(log.scripts[3].contains("verifyFp=verify_"));

        // the secondary routine receives the full query including the signature
        let params_call = &log.scripts[4];
        let json_arg = params_call
            .strip_prefix("window.genXTTParams(")
            .and_then(|s| s.strip_suffix(')'))
            .unwrap();
        let params: BTreeMap<String, String> = serde_json::from_str(json_arg).unwrap();
        assert_eq!(params["aid"], "1988");
        assert_eq!(params["_signature"], "SIG123");
        assert!(params["verifyFp"].starts_with("verify_"));

        assert_eq!(signed.user_agent, "FakeAgent/1.0");
        assert_eq!(signed.extra_params["x-tt-params"], "TTPARAMS");
        let query: BTreeMap<String, String> =
            signed.signed_url.query_pairs().into_owned().collect();
        assert_eq!(query["_signature"], "SIG123");
        assert_eq!(query["id"], "42");
    }

    #[tokio::test]
    async fn test_non_string_signature_fails_whole_call() {
        let log = Arc::new(parking_lot::Mutex::new(EngineLog::default()));
        let mut engine = FakeEngine::new(log.clone());
        engine.signature = Value::Null;

        let err = signer(engine).sign(UNSIGNED).await.unwrap_err();
        assert!(matches!(
            err,
            SignError::EngineFailure(EngineError::TypeConversion(_))
        ));
        // the secondary routine is never reached
        assert!(
            !log.lock()
                .scripts
                .iter()
                .any(|s| s.starts_with("window.genXTTParams("))
        );
    }

    #[tokio::test]
    async fn test_navigation_failure() {
        let log = Arc::new(parking_lot::Mutex::new(EngineLog::default()));
        let mut engine = FakeEngine::new(log.clone());
        engine.fail_page = true;

        let err = signer(engine).sign(UNSIGNED).await.unwrap_err();
        assert!(matches!(
            err,
            SignError::EngineFailure(EngineError::Navigation { .. })
        ));
        assert!(log.lock().scripts.is_empty());
    }

    #[tokio::test]
    async fn test_each_sign_uses_a_fresh_token() {
        let log = Arc::new(parking_lot::Mutex::new(EngineLog::default()));
        let signer = signer(FakeEngine::new(log));
        let first = signer.sign(UNSIGNED).await.unwrap();
        let second = signer.sign(UNSIGNED).await.unwrap();
        assert_ne!(first.signed_url, second.signed_url);
    }
}
