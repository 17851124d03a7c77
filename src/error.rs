use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Native {operation} failed: {detail}")]
    Native {
        operation: &'static str,
        detail: String,
    },

    #[error("Tokenizer handle already released")]
    Released,

    #[error("Unsupported size: {0}")]
    UnsupportedSize(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TokenizerError {
    /// Build a native failure for `operation`, using the engine's last error
    /// message when it reported one.
    pub(crate) fn native(operation: &'static str, detail: Option<String>) -> Self {
        TokenizerError::Native {
            operation,
            detail: detail.unwrap_or_else(|| "no detail reported by the engine".to_string()),
        }
    }
}
