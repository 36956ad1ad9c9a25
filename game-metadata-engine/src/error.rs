use thiserror::Error;

/// Failure talking to one catalog.
///
/// These never escape an adapter's description/artwork calls; they only
/// surface from `search` and from the store dispatcher, where the caller
/// decides whether to fall back to another provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// Network failure (connect, reset, DNS)
    #[error("Provider '{provider}' transport error: {message}")]
    Transport { provider: String, message: String },

    /// Request exceeded its timeout
    #[error("Provider '{provider}' timed out")]
    Timeout { provider: String },

    /// Explicit 403 from the catalog; never retried
    #[error("Provider '{provider}' throttled the request (HTTP 403)")]
    Throttled { provider: String },

    /// Non-success HTTP status other than 403
    #[error("Provider '{provider}' returned HTTP {status}")]
    Status { provider: String, status: u16 },

    /// Response body could not be decoded
    #[error("Provider '{provider}' sent an unreadable response: {message}")]
    Parse { provider: String, message: String },

    /// Identifier rejected before any network call
    #[error("Provider '{provider}' rejected id '{id}'")]
    InvalidId { provider: String, id: String },

    /// Adapter has no API key / token configured
    #[error("Provider '{provider}' has no credentials configured")]
    MissingCredentials { provider: String },
}

impl CatalogError {
    pub fn transport(provider: impl Into<String>, message: impl ToString) -> Self {
        CatalogError::Transport {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(provider: impl Into<String>, message: impl ToString) -> Self {
        CatalogError::Parse {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Classify a reqwest failure for `provider`.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CatalogError::Timeout {
                provider: provider.to_string(),
            }
        } else if err.is_decode() {
            CatalogError::parse(provider, err)
        } else if let Some(status) = err.status() {
            CatalogError::from_status(provider, status.as_u16())
        } else {
            CatalogError::transport(provider, err)
        }
    }

    pub fn from_status(provider: &str, status: u16) -> Self {
        if status == 403 {
            CatalogError::Throttled {
                provider: provider.to_string(),
            }
        } else {
            CatalogError::Status {
                provider: provider.to_string(),
                status,
            }
        }
    }

    /// Whether a retry has a chance of succeeding.
    ///
    /// Throttling is exempt: a 403 from the store means stop asking.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Transport { .. } | CatalogError::Timeout { .. } => true,
            CatalogError::Status { status, .. } => *status == 429 || *status >= 500,
            CatalogError::Throttled { .. }
            | CatalogError::Parse { .. }
            | CatalogError::InvalidId { .. }
            | CatalogError::MissingCredentials { .. } => false,
        }
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, CatalogError::Throttled { .. })
    }

    pub fn provider(&self) -> &str {
        match self {
            CatalogError::Transport { provider, .. }
            | CatalogError::Timeout { provider }
            | CatalogError::Throttled { provider }
            | CatalogError::Status { provider, .. }
            | CatalogError::Parse { provider, .. }
            | CatalogError::InvalidId { provider, .. }
            | CatalogError::MissingCredentials { provider } => provider,
        }
    }
}

/// Main error type for the metadata engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad input, rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record store or image cache failure; aborts the current refresh step
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Catalog errors that reached the engine boundary
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Refresh state machine was asked for an impossible move
    #[error("Invalid refresh transition: {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// Run abandoned through its cancel signal
    #[error("Refresh cancelled")]
    Cancelled,

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    pub fn persistence(message: impl ToString) -> Self {
        EngineError::Persistence(message.to_string())
    }

    /// Errors that must stop a refresh run.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            EngineError::Persistence(_) | EngineError::Database(_) | EngineError::Json(_)
        )
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        EngineError::Other(s)
    }
}

impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        EngineError::Other(s.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EngineError>;
