//! Script engine error types.

use std::fmt;

/// Errors that can occur while driving a script engine.
#[derive(Debug)]
pub enum EngineError {
    /// Failed to create the engine runtime or a page context.
    Setup(String),
    /// Loading the landing page failed.
    Navigation { url: String, message: String },
    /// Script evaluation threw or failed.
    Evaluation {
        message: String,
        stack: Option<String>,
    },
    /// The script returned a value of an unexpected type.
    TypeConversion(String),
    /// A script was evaluated before any page was loaded.
    NoPage,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Setup(msg) => write!(f, "Failed to set up script engine: {}", msg),
            EngineError::Navigation { url, message } => {
                write!(f, "Failed to load page {}: {}", url, message)
            }
            EngineError::Evaluation { message, stack } => {
                if let Some(stack) = stack {
                    write!(f, "Script evaluation failed: {}\nStack: {}", message, stack)
                } else {
                    write!(f, "Script evaluation failed: {}", message)
                }
            }
            EngineError::TypeConversion(msg) => write!(f, "Script type conversion error: {}", msg),
            EngineError::NoPage => write!(f, "No page loaded"),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Create an evaluation error from a message.
    pub fn eval(message: impl Into<String>) -> Self {
        EngineError::Evaluation {
            message: message.into(),
            stack: None,
        }
    }

    /// Create an evaluation error with stack trace.
    pub fn eval_with_stack(message: impl Into<String>, stack: impl Into<String>) -> Self {
        EngineError::Evaluation {
            message: message.into(),
            stack: Some(stack.into()),
        }
    }

    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Error for a script that returned something other than a string.
    pub fn expected_string(what: &str, got: &serde_json::Value) -> Self {
        EngineError::TypeConversion(format!("{what} returned {got}, expected a string"))
    }
}

#[cfg(feature = "quickjs")]
impl From<rquickjs::Error> for EngineError {
    fn from(err: rquickjs::Error) -> Self {
        EngineError::Evaluation {
            message: err.to_string(),
            stack: None,
        }
    }
}
