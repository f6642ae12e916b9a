//! Access/refresh token lifecycle.
//!
//! A [`Credential`] is either empty, valid or expired. The
//! [`CredentialManager`] is the only thing that changes one: it decides
//! between doing nothing, refreshing, or running the full authorization-code
//! exchange, and saves the credential after every successful change.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::{AuthError, ConfigError};

// ============================================================================
// Credential
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// At least one token missing: full authorization needed
    Empty,
    /// Both tokens present and not expired
    Valid,
    /// Both tokens present but past expiry: refresh needed
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credential {
    access_token: String,
    refresh_token: String,
    expires_at: i64,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Expiry as epoch seconds.
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn status(&self, now: i64) -> CredentialStatus {
        check_status(self, now)
    }
}

pub fn check_status(credential: &Credential, now: i64) -> CredentialStatus {
    if credential.access_token.is_empty() || credential.refresh_token.is_empty() {
        CredentialStatus::Empty
    } else if now >= credential.expires_at {
        CredentialStatus::Expired
    } else {
        CredentialStatus::Valid
    }
}

pub fn now_epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode(String),
    RefreshToken(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// The provider rejected the code or refresh token itself
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("{0}")]
    Transport(String),
}

/// Token endpoint of the destination catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, grant: TokenGrant) -> Result<TokenResponse, ExchangeError>;
}

/// Durable storage for the credential snapshot.
pub trait CredentialStore: Send {
    fn save_credential(&mut self, credential: &Credential) -> Result<(), ConfigError>;
}

// ============================================================================
// Manager
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Nothing to do, no network call made
    AlreadyValid,
    /// Expired credential refreshed
    Refreshed,
    /// Authorization code exchanged for a new credential
    Authorized,
}

pub struct CredentialManager<E, S> {
    exchanger: E,
    store: S,
    credential: Credential,
    clock: fn() -> i64,
}

impl<E, S> CredentialManager<E, S>
where
    E: TokenExchanger,
    S: CredentialStore,
{
    pub fn new(exchanger: E, store: S, credential: Credential) -> Self {
        Self {
            exchanger,
            store,
            credential,
            clock: now_epoch_seconds,
        }
    }

    /// Replace the epoch-seconds clock.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn status(&self) -> CredentialStatus {
        self.credential.status((self.clock)())
    }

    pub fn is_authenticated(&self) -> bool {
        self.status() == CredentialStatus::Valid
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Make the credential valid, using `auth_code` only when there are no
    /// tokens at all.
    pub async fn acquire_or_refresh(
        &mut self,
        auth_code: Option<&str>,
    ) -> Result<AuthOutcome, AuthError> {
        match self.status() {
            CredentialStatus::Valid => {
                debug!(target: "credential", "Skip auth, seems already ok");
                Ok(AuthOutcome::AlreadyValid)
            }
            CredentialStatus::Expired => {
                debug!(target: "credential", "Tokens found, but timestamp is old. Need update it");
                self.refresh().await?;
                Ok(AuthOutcome::Refreshed)
            }
            CredentialStatus::Empty => {
                debug!(target: "credential", "No saved tokens, try get new with auth_code");
                let code = auth_code.filter(|code| !code.is_empty()).ok_or_else(|| {
                    error!(target: "credential", "Can't get token without authorization code");
                    AuthError::MissingParameters("authorization code".to_string())
                })?;
                self.authorize(code).await?;
                Ok(AuthOutcome::Authorized)
            }
        }
    }

    /// Access token for an authorized call, refreshing first if expired.
    pub async fn access_token(&mut self) -> Result<String, AuthError> {
        match self.status() {
            CredentialStatus::Valid => {}
            CredentialStatus::Expired => self.refresh().await?,
            CredentialStatus::Empty => return Err(AuthError::NoAuthenticatedSession),
        }
        Ok(self.credential.access_token.clone())
    }

    async fn refresh(&mut self) -> Result<(), AuthError> {
        let grant = TokenGrant::RefreshToken(self.credential.refresh_token.clone());
        let response = self.exchanger.exchange(grant).await.map_err(|e| match e {
            ExchangeError::InvalidGrant(reason) => {
                warn!(target: "credential", reason = %reason, "Refresh token rejected");
                AuthError::RefreshFailed(reason)
            }
            ExchangeError::Transport(reason) => AuthError::Transport(reason),
        })?;

        let refresh_token = response
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or_else(|| self.credential.refresh_token.clone());

        self.update(response.access_token, refresh_token, response.expires_in)?;
        info!(target: "credential", expires_at = self.credential.expires_at, "Tokens refreshed");
        Ok(())
    }

    async fn authorize(&mut self, code: &str) -> Result<(), AuthError> {
        let grant = TokenGrant::AuthorizationCode(code.to_string());
        let response = self.exchanger.exchange(grant).await.map_err(|e| match e {
            ExchangeError::InvalidGrant(reason) => {
                error!(target: "credential", reason = %reason, "Need new authorization code");
                AuthError::InvalidOrExpiredAuthorizationCode
            }
            ExchangeError::Transport(reason) => AuthError::Transport(reason),
        })?;

        let refresh_token = response
            .refresh_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::Transport("token response without refresh_token".into()))?;

        self.update(response.access_token, refresh_token, response.expires_in)?;
        info!(
            target: "credential",
            expires_at = self.credential.expires_at,
            "Authorized with code"
        );
        Ok(())
    }

    fn update(
        &mut self,
        access_token: String,
        refresh_token: String,
        expires_in: i64,
    ) -> Result<(), AuthError> {
        self.credential = Credential {
            access_token,
            refresh_token,
            expires_at: (self.clock)() + expires_in,
        };
        self.store.save_credential(&self.credential)?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
