use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing required {registry} setting: {setting}")]
    RegistryConfig {
        registry: &'static str,
        setting: &'static str,
    },

    #[error("REGISTRY_TYPE must be one of [ghcr, harbor], got '{0}'")]
    UnknownRegistryType(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("{method} {url} returned status {status}")]
    Status {
        method: &'static str,
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Date parse error: {0}")]
    DateParse(#[from] chrono::ParseError),
}

impl AppError {
    /// True when the registry cannot perform the request at all, as opposed to a
    /// transport or API failure.
    pub fn is_unsupported(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<AppError>(), Some(AppError::Unsupported(_)))
    }
}
