//! Page context setup and the QuickJS context wrapper.

#[cfg(feature = "quickjs")]
use super::error::EngineError;
#[cfg(feature = "quickjs")]
use rquickjs::CatchResultExt;

/// Default browser environment setup code.
/// Provides stubs for window, document, navigator, location.
///
/// `__USER_AGENT__`, `__PAGE_URL__` and `__COOKIE__` are replaced with
/// JSON string literals by [`browser_env_script`].
pub const BROWSER_ENV_SETUP: &str = r#"
    var window = globalThis;
    var document = document || {};
    var navigator = {
        userAgent: __USER_AGENT__,
        platform: 'Win32',
        language: 'en-US',
        appCodeName: 'Mozilla',
        appVersion: __USER_AGENT__.replace(/^Mozilla\//, ''),
        onLine: true,
        cookieEnabled: true
    };
    var location = { href: __PAGE_URL__ };
    window.navigator = navigator;
    window.location = location;
    window.innerHeight = 910;
    window.innerWidth = 1920;
    window.outerHeight = 28;
    window.outerWidth = 160;
    window.screenX = 0;
    window.screenY = 9;
    window.pageYOffset = 0;
    window.pageXOffset = 0;
    window.screen = {};
    window.addEventListener = function() {};
    window.sessionStorage = {};
    window.localStorage = {};
    document.hidden = true;
    document.webkitHidden = true;
    document.cookie = __COOKIE__;
    document.referrer = '';
    document.location = location;
    var Request = {};
    var Headers = {};
"#;

/// Render [`BROWSER_ENV_SETUP`] for a concrete page.
pub fn browser_env_script(user_agent: &str, page_url: &str, cookie: &str) -> String {
    BROWSER_ENV_SETUP
        .replace("__USER_AGENT__", &js_string(user_agent))
        .replace("__PAGE_URL__", &js_string(page_url))
        .replace("__COOKIE__", &js_string(cookie))
}

/// JSON string literals are valid JavaScript string literals.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// A wrapper around rquickjs::Context representing one loaded page.
#[cfg(feature = "quickjs")]
pub struct PageContext {
    ctx: rquickjs::Context,
}

#[cfg(feature = "quickjs")]
impl PageContext {
    /// Create a new page context from a rquickjs Runtime.
    pub fn new(runtime: &rquickjs::Runtime) -> Result<Self, EngineError> {
        let ctx =
            rquickjs::Context::full(runtime).map_err(|e| EngineError::Setup(e.to_string()))?;
        Ok(Self { ctx })
    }

    /// Evaluate JavaScript code without returning a value.
    pub fn eval_void(&self, code: &str) -> Result<(), EngineError> {
        self.ctx.with(|ctx| {
            let result: Result<(), _> = ctx.eval(code);
            result.catch(&ctx).map_err(Self::convert_caught_error)
        })
    }

    /// Evaluate JavaScript code and return the result as JSON.
    pub fn eval_json(&self, code: &str) -> Result<serde_json::Value, EngineError> {
        self.ctx.with(|ctx| -> Result<serde_json::Value, EngineError> {
            let result: Result<rquickjs::Value, _> = ctx.eval(code);
            let value = result.catch(&ctx).map_err(Self::convert_caught_error)?;

            if let Some(s) = value.as_string() {
                return Ok(serde_json::Value::String(s.to_string()?));
            }
            if value.is_undefined() {
                return Ok(serde_json::Value::Null);
            }

            match ctx.json_stringify(value)? {
                Some(json) => serde_json::from_str(&json.to_string()?)
                    .map_err(|e| EngineError::TypeConversion(e.to_string())),
                None => Ok(serde_json::Value::Null),
            }
        })
    }

    /// Convert a CaughtError to EngineError with detailed information.
    fn convert_caught_error(caught: rquickjs::CaughtError<'_>) -> EngineError {
        use rquickjs::CaughtError;
        match caught {
            CaughtError::Exception(exc) => {
                let msg = exc.message().unwrap_or_default();
                match exc.stack() {
                    Some(stack) if !stack.is_empty() => EngineError::eval_with_stack(msg, stack),
                    _ => EngineError::eval(msg),
                }
            }
            CaughtError::Value(val) => EngineError::eval(format!(
                "JS threw value: {:?}",
                val.as_string().map(|s| s.to_string())
            )),
            CaughtError::Error(err) => EngineError::eval(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_env_script_escapes_values() {
        let script = browser_env_script("UA \"quoted\"", "https://example.com/?a=1", "a=b; c=d");
        assert!(script.contains(r#""UA \"quoted\"""#));
        assert!(script.contains(r#""https://example.com/?a=1""#));
        assert!(script.contains(r#"document.cookie = "a=b; c=d";"#));
        assert!(!script.contains("__USER_AGENT__"));
        assert!(!script.contains("__PAGE_URL__"));
        assert!(!script.contains("__COOKIE__"));
    }

    #[cfg(feature = "quickjs")]
    #[test]
    fn test_eval_json_values() {
        let runtime = rquickjs::Runtime::new().unwrap();
        let page = PageContext::new(&runtime).unwrap();

        assert_eq!(page.eval_json("1 + 2").unwrap(), serde_json::json!(3));
        assert_eq!(page.eval_json("'a' + 'b'").unwrap(), serde_json::json!("ab"));
        assert_eq!(
            page.eval_json("({ x: [1, 'y'] })").unwrap(),
            serde_json::json!({ "x": [1, "y"] })
        );
        assert_eq!(page.eval_json("undefined").unwrap(), serde_json::Value::Null);
    }

    #[cfg(feature = "quickjs")]
    #[test]
    fn test_eval_error_is_reported() {
        let runtime = rquickjs::Runtime::new().unwrap();
        let page = PageContext::new(&runtime).unwrap();

        let err = page.eval_json("throw new Error('boom')").unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[cfg(feature = "quickjs")]
    #[test]
    fn test_browser_env() {
        let runtime = rquickjs::Runtime::new().unwrap();
        let page = PageContext::new(&runtime).unwrap();
        page.eval_void(&browser_env_script("test-agent", "https://example.com/", ""))
            .unwrap();

        assert_eq!(
            page.eval_json("window.navigator.userAgent").unwrap(),
            serde_json::json!("test-agent")
        );
        assert_eq!(page.eval_json("typeof window").unwrap(), serde_json::json!("object"));
    }
}
