//! VK adapter: profile check and the user's audio library.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use super::SourceCatalog;
use crate::config::VkSettings;
use crate::error::{AuthError, CatalogError};
use crate::models::Track;

pub const DEFAULT_API_BASE: &str = "https://api.vk.com";
pub const API_VERSION: &str = "5.131";

/// Items returned by one `audio.get` call. Larger libraries are truncated.
pub const MAX_AUDIO_ITEMS: usize = 5000;

/// VK error code for an expired or revoked access token.
const TOKEN_EXPIRED_CODE: i64 = 5;

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    response: Option<Value>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VkUser {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
struct AudioPage {
    #[serde(default)]
    count: usize,
    #[serde(default)]
    items: Vec<VkAudio>,
}

#[derive(Debug, Deserialize)]
struct VkAudio {
    id: i64,
    owner_id: i64,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    subtitle: Option<String>,
    /// Seconds
    #[serde(default)]
    duration: u64,
}

impl From<VkAudio> for Track {
    fn from(audio: VkAudio) -> Self {
        let title = match audio.subtitle.as_deref().map(str::trim) {
            Some(subtitle) if !subtitle.is_empty() => format!("{} ({})", audio.title, subtitle),
            _ => audio.title,
        };
        Track::new(audio.artist, title, audio.duration * 1000)
            .with_id(format!("{}_{}", audio.owner_id, audio.id))
    }
}

pub struct VkCatalog {
    http: Client,
    api_base: String,
    token: String,
    login_url: Option<String>,
    user: Option<VkUser>,
}

impl VkCatalog {
    pub fn new(http: Client, settings: &VkSettings) -> Self {
        let api_base = settings
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();

        Self {
            http,
            api_base,
            token: settings.token.clone(),
            login_url: settings.url.clone(),
            user: None,
        }
    }

    pub fn user(&self) -> Option<&VkUser> {
        self.user.as_ref()
    }

    /// Call an API method. Without `force`, a verified session is required.
    async fn call<T: DeserializeOwned>(
        &self,
        api_method: &str,
        params: &[(&str, String)],
        force: bool,
    ) -> Result<T, CatalogError> {
        if !force && self.user.is_none() {
            return Err(AuthError::NoAuthenticatedSession.into());
        }

        let mut query: Vec<(&str, String)> = vec![
            ("access_token", self.token.clone()),
            ("v", API_VERSION.to_string()),
        ];
        query.extend(params.iter().cloned());

        trace!(target: "vk", method = %api_method, "API call");
        let response = self
            .http
            .post(format!("{}/method/{}", self.api_base, api_method))
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CatalogError::RequestFailed {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ApiEnvelope = response.json().await?;
        if let Some(error) = envelope.error {
            if error.error_code == TOKEN_EXPIRED_CODE {
                warn!(target: "vk", "VK token expired: {}", error.error_msg);
                if let Some(url) = &self.login_url {
                    warn!(target: "vk", "Get a new token here: {}", url);
                }
                return Err(AuthError::NoAuthenticatedSession.into());
            }
            return Err(CatalogError::Api {
                code: error.error_code,
                message: error.error_msg,
            });
        }

        let body = envelope
            .response
            .ok_or_else(|| CatalogError::Parse(format!("{}: response field missing", api_method)))?;
        serde_json::from_value(body).map_err(|e| CatalogError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SourceCatalog for VkCatalog {
    async fn verify(&mut self) -> Result<(), CatalogError> {
        if self.token.is_empty() {
            return Err(AuthError::MissingParameters("vk:token".to_string()).into());
        }

        let user: VkUser = self.call("account.getProfileInfo", &[], true).await?;
        info!(target: "vk", "Logged as {} {}", user.first_name, user.last_name);
        self.user = Some(user);
        Ok(())
    }

    async fn fetch_tracks(&mut self, owner_id: i64) -> Result<Vec<Track>, CatalogError> {
        let params = [
            ("owner_id", owner_id.to_string()),
            ("count", MAX_AUDIO_ITEMS.to_string()),
        ];
        let page: AudioPage = self.call("audio.get", &params, false).await?;

        if page.count >= MAX_AUDIO_ITEMS {
            warn!(
                target: "vk",
                "Library has {} tracks, only the first {} are fetched",
                page.count,
                MAX_AUDIO_ITEMS
            );
        }

        let tracks: Vec<Track> = page.items.into_iter().map(Track::from).collect();
        debug!(target: "vk", owner_id, count = tracks.len(), "Tracks fetched");
        Ok(tracks)
    }

    fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

// ============================================================================
// TESTS
// ============================================================================
