//! Error types for configuration, authorization and catalog access.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading or writing the persistent config document.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the credential lifecycle. None of these are retried.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No tokens and no authorization code to obtain them with
    #[error("Missing parameters: {0}")]
    MissingParameters(String),

    /// The provider rejected the authorization code; a fresh one is needed
    #[error("Authorization code is invalid or expired")]
    InvalidOrExpiredAuthorizationCode,

    /// The provider rejected the refresh token
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Network failure, timeout or non-success response from the token endpoint
    #[error("Token exchange transport error: {0}")]
    Transport(String),

    /// An authorized call was attempted without a session
    #[error("No authenticated session")]
    NoAuthenticatedSession,

    /// Tokens were updated but could not be saved
    #[error("Failed to persist credential: {0}")]
    Persist(#[from] ConfigError),
}

/// Errors from catalog adapters.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Network failure or timeout
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// The catalog rejected a request (including playlist writes)
    #[error("Request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    /// The catalog answered with an API-level error object
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl CatalogError {
    /// Authorization errors end the whole run; everything else only affects
    /// the track or chunk being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CatalogError::Auth(_))
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CatalogError::Parse(e.to_string())
        } else {
            CatalogError::Transport(e.to_string())
        }
    }
}
