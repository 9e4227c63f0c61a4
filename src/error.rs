//! Error taxonomy for the Axosoft client.
//!
//! Every failure is handed back to the caller; nothing in this crate swallows one.
//! The command layer decides what to show, using `ApiError::user_message` for the
//! cases that have a targeted message.

use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Field the API names when a work-log duration is not a number.
pub const WORK_LOG_DURATION_FIELD: &str = "work_done.duration";

/// Network-level failure: the request never produced an HTTP response.
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("settings value for `{key}` is not valid json: {source}")]
    Encoding {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable access token, or the server rejected the one we sent.
    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    #[error("authorization code exchange failed: {0}")]
    AuthExchangeFailed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server refused a field value (e.g. a non-numeric duration).
    #[error("value rejected{}: {message}", field_suffix(.field))]
    ValueRejected {
        field: Option<String>,
        message: String,
    },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("request on {resource} failed with status {status}: {message}")]
    ResourceError {
        resource: String,
        status: u16,
        message: String,
    },

    #[error("unexpected response from server: {0}")]
    InvalidResponse(String),

    /// Item creation needs a current project and none is configured.
    #[error("no current project set")]
    SetProjectFirst,

    /// Locally edited item text that cannot be sent back.
    #[error("invalid item: {0}")]
    InvalidItem(String),

    /// Local I/O (browser launch, terminal prompts).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn field_suffix(field: &Option<String>) -> String {
    match field {
        Some(name) => format!(" for `{name}`"),
        None => String::new(),
    }
}

impl ApiError {
    /// Text the command layer shows for failures that have a dedicated message.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthenticated(_) => {
                "You must authenticate with your Axosoft API first.".to_string()
            }
            ApiError::AuthExchangeFailed(_) => "Authentication failed".to_string(),
            ApiError::ValueRejected { field, .. }
                if field.as_deref() == Some(WORK_LOG_DURATION_FIELD) =>
            {
                "Unable to log time.\nWhen entering time enter only a number.".to_string()
            }
            ApiError::SetProjectFirst => "You must first set the current project".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the caller should start the authorization flow again.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, ApiError::Unauthenticated(_))
    }
}
