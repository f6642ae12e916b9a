//! Spotify adapter: token endpoint, track search and playlist writes.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, trace, warn};

use super::{DestinationCatalog, MAX_TRACKS_PER_ADD};
use crate::config::SpotifySettings;
use crate::credential::{
    AuthOutcome, CredentialManager, CredentialStore, ExchangeError, TokenExchanger, TokenGrant,
    TokenResponse,
};
use crate::error::{AuthError, CatalogError};
use crate::models::Track;

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com";
pub const DEFAULT_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";

/// Search results kept per query.
pub const SEARCH_LIMIT: usize = 5;

/// Access token lifetime assumed when the token endpoint omits it.
const DEFAULT_EXPIRES_IN: i64 = 3600;

// ============================================================================
// Token Exchange
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenEndpointBody {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Authorization-code and refresh-token grants against the accounts service.
pub struct SpotifyTokenExchanger {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    state: Option<String>,
}

impl SpotifyTokenExchanger {
    pub fn new(http: Client, settings: &SpotifySettings) -> Self {
        let accounts_base = settings
            .accounts_base
            .as_deref()
            .unwrap_or(DEFAULT_ACCOUNTS_BASE)
            .trim_end_matches('/');

        Self {
            http,
            token_url: format!("{}/api/token", accounts_base),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            redirect_url: settings.redirect_url.clone(),
            state: settings.state.clone(),
        }
    }
}

#[async_trait]
impl TokenExchanger for SpotifyTokenExchanger {
    async fn exchange(&self, grant: TokenGrant) -> Result<TokenResponse, ExchangeError> {
        let mut form: Vec<(&str, String)> = vec![
            ("client_id", self.client_id.clone()),
            ("client_secret", self.client_secret.clone()),
        ];
        match grant {
            TokenGrant::AuthorizationCode(code) => {
                form.push(("grant_type", "authorization_code".to_string()));
                form.push(("code", code));
                form.push(("redirect_uri", self.redirect_url.clone()));
                if let Some(state) = &self.state {
                    form.push(("state", state.clone()));
                }
            }
            TokenGrant::RefreshToken(refresh_token) => {
                form.push(("grant_type", "refresh_token".to_string()));
                form.push(("refresh_token", refresh_token));
            }
        }

        debug!(target: "spotify", url = %self.token_url, "Requesting token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status = response.status();
        let body: TokenEndpointBody = response.json().await.map_err(|e| {
            ExchangeError::Transport(format!("Failed to parse token response ({}): {}", status, e))
        })?;

        if let Some(code) = body.error {
            let description = body.error_description.unwrap_or_else(|| code.clone());
            if code == "invalid_grant" {
                return Err(ExchangeError::InvalidGrant(description));
            }
            return Err(ExchangeError::Transport(format!("{} ({}): {}", code, status, description)));
        }
        if !status.is_success() {
            return Err(ExchangeError::Transport(format!("Token endpoint returned {}", status)));
        }

        let access_token = body
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ExchangeError::Transport("Token response without access_token".into()))?;

        Ok(TokenResponse {
            access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
        })
    }
}

// ============================================================================
// API Payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: SearchPage,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Vec<SpotifyApiTrack>,
}

#[derive(Debug, Deserialize)]
struct SpotifyApiTrack {
    uri: String,
    name: String,
    duration_ms: u64,
    #[serde(default)]
    artists: Vec<SpotifyApiArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPlaylist {
    id: Option<String>,
}

impl From<SpotifyApiTrack> for Track {
    fn from(track: SpotifyApiTrack) -> Self {
        let artists = track
            .artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Track::new(artists, track.name, track.duration_ms).with_id(track.uri)
    }
}

/// Map unauthorized and other non-success statuses to catalog errors.
async fn check_response(response: Response) -> Result<Response, CatalogError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(AuthError::NoAuthenticatedSession.into());
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(CatalogError::RequestFailed {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

// ============================================================================
// Catalog
// ============================================================================

/// Spotify as the destination catalog. Owns its credential session; every
/// call goes through it first.
pub struct SpotifyCatalog<E, S> {
    http: Client,
    api_base: String,
    market: Option<String>,
    session: CredentialManager<E, S>,
    user: Option<SpotifyUser>,
}

impl<E, S> SpotifyCatalog<E, S>
where
    E: TokenExchanger,
    S: CredentialStore,
{
    pub fn new(http: Client, settings: &SpotifySettings, session: CredentialManager<E, S>) -> Self {
        let api_base = settings
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();

        Self {
            http,
            api_base,
            market: settings.market.clone(),
            session,
            user: None,
        }
    }

    pub fn session(&self) -> &CredentialManager<E, S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut CredentialManager<E, S> {
        &mut self.session
    }

    pub fn into_session(self) -> CredentialManager<E, S> {
        self.session
    }

    /// Obtain or refresh tokens. See [`CredentialManager::acquire_or_refresh`].
    pub async fn authorize(&mut self, auth_code: Option<&str>) -> Result<AuthOutcome, AuthError> {
        self.session.acquire_or_refresh(auth_code).await
    }

    /// Load the logged-in user. Required before creating playlists.
    pub async fn fetch_profile(&mut self) -> Result<&SpotifyUser, CatalogError> {
        let token = self.session.access_token().await?;
        let response = self
            .http
            .get(format!("{}/v1/me", self.api_base))
            .bearer_auth(token)
            .send()
            .await?;
        let user: SpotifyUser = check_response(response).await?.json().await?;

        if user.id.is_empty() {
            return Err(AuthError::NoAuthenticatedSession.into());
        }

        info!(target: "spotify", user = %user.id, "Logged as {}", user.id);
        Ok(&*self.user.insert(user))
    }
}

#[async_trait]
impl<E, S> DestinationCatalog for SpotifyCatalog<E, S>
where
    E: TokenExchanger,
    S: CredentialStore,
{
    async fn search(&mut self, query: &str) -> Result<Vec<Track>, CatalogError> {
        let token = self.session.access_token().await?;

        let limit = SEARCH_LIMIT.to_string();
        let mut params = vec![("q", query), ("type", "track"), ("limit", limit.as_str())];
        if let Some(market) = &self.market {
            params.push(("market", market.as_str()));
        }

        let response = self
            .http
            .get(format!("{}/v1/search", self.api_base))
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;
        let page: SearchResponse = check_response(response).await?.json().await?;

        let tracks: Vec<Track> = page
            .tracks
            .items
            .into_iter()
            .take(SEARCH_LIMIT)
            .map(Track::from)
            .collect();

        for track in &tracks {
            trace!(target: "spotify", "{} // {}", track.search_string, track.duration_ms);
        }
        debug!(target: "spotify", query = %query, results = tracks.len(), "Search done");
        Ok(tracks)
    }

    async fn create_playlist(&mut self, name: &str) -> Result<String, CatalogError> {
        if self.user.is_none() {
            self.fetch_profile().await?;
        }
        let user_id = match &self.user {
            Some(user) => user.id.clone(),
            None => return Err(AuthError::NoAuthenticatedSession.into()),
        };

        let token = self.session.access_token().await?;
        let response = self
            .http
            .post(format!("{}/v1/users/{}/playlists", self.api_base, user_id))
            .bearer_auth(token)
            .json(&json!({
                "name": name,
                "public": false,
                "collaborative": false,
                "description": "",
            }))
            .send()
            .await?;
        let created: CreatedPlaylist = check_response(response).await?.json().await?;

        match created.id.filter(|id| !id.is_empty()) {
            Some(id) => {
                debug!(target: "spotify", "Create new playlist with id: {}", id);
                Ok(id)
            }
            None => {
                error!(target: "spotify", "Error while create playlist");
                Err(CatalogError::RequestFailed {
                    status: StatusCode::OK.as_u16(),
                    message: "playlist response without id".to_string(),
                })
            }
        }
    }

    async fn add_to_playlist(
        &mut self,
        playlist_id: &str,
        ids: &[String],
    ) -> Result<(), CatalogError> {
        if ids.len() > MAX_TRACKS_PER_ADD {
            warn!(
                target: "spotify",
                "Spotify allows only {} items per add, you passed: {} items",
                MAX_TRACKS_PER_ADD,
                ids.len()
            );
        }

        let token = self.session.access_token().await?;
        let response = self
            .http
            .post(format!("{}/v1/playlists/{}/tracks", self.api_base, playlist_id))
            .bearer_auth(token)
            .json(&json!({ "uris": ids }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::NoAuthenticatedSession.into());
        }
        if status != StatusCode::CREATED {
            let message = response.text().await.unwrap_or_default();
            return Err(CatalogError::RequestFailed {
                status: status.as_u16(),
                message,
            });
        }

        debug!(target: "spotify", playlist = %playlist_id, count = ids.len(), "Playlist updated");
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.session.is_authenticated() && self.user.is_some()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigCredentialStore, ConfigFile, SPOTIFY_SECTION};
    use crate::credential::{now_epoch_seconds, Credential};
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type TestCatalog = SpotifyCatalog<SpotifyTokenExchanger, ConfigCredentialStore>;

    fn settings(server: &MockServer) -> SpotifySettings {
        SpotifySettings {
            client_id: "client".into(),
            client_secret: "secret".into(),
            redirect_url: "http://localhost/callback".into(),
            api_base: Some(server.uri()),
            accounts_base: Some(server.uri()),
            ..Default::default()
        }
    }

    fn catalog(server: &MockServer, credential: Credential) -> TestCatalog {
        let settings = settings(server);
        let http = Client::new();
        let store = ConfigCredentialStore::new(
            ConfigFile::in_memory(serde_json::json!({})),
            SPOTIFY_SECTION,
        );
        let session = CredentialManager::new(
            SpotifyTokenExchanger::new(http.clone(), &settings),
            store,
            credential,
        );
        SpotifyCatalog::new(http, &settings, session)
    }

    fn valid_credential() -> Credential {
        Credential::new("tok", "refresh", now_epoch_seconds() + 3600)
    }

    fn api_track(name: &str, artists: &[&str], duration_ms: u64) -> serde_json::Value {
        serde_json::json!({
            "uri": format!("spotify:track:{}", name),
            "name": name,
            "duration_ms": duration_ms,
            "artists": artists.iter().map(|a| serde_json::json!({ "name": a })).collect::<Vec<_>>(),
        })
    }

    #[tokio::test]
    async fn test_exchange_invalid_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid authorization code",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let exchanger = SpotifyTokenExchanger::new(Client::new(), &settings(&server));
        let result = exchanger
            .exchange(TokenGrant::AuthorizationCode("old".into()))
            .await;
        assert_eq!(
            result,
            Err(ExchangeError::InvalidGrant("Invalid authorization code".into()))
        );
    }

    #[tokio::test]
    async fn test_exchange_refresh_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a2",
                "token_type": "Bearer",
                "expires_in": 1800,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let exchanger = SpotifyTokenExchanger::new(Client::new(), &settings(&server));
        let response = exchanger
            .exchange(TokenGrant::RefreshToken("r1".into()))
            .await
            .unwrap();
        assert_eq!(response.access_token, "a2");
        assert_eq!(response.refresh_token, None);
        assert_eq!(response.expires_in, 1800);
    }

    #[tokio::test]
    async fn test_exchange_server_error_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let exchanger = SpotifyTokenExchanger::new(Client::new(), &settings(&server));
        let result = exchanger
            .exchange(TokenGrant::RefreshToken("r1".into()))
            .await;
        assert!(matches!(result, Err(ExchangeError::Transport(_))));
    }

    #[tokio::test]
    async fn test_search_parses_and_limits_results() {
        let server = MockServer::start().await;
        let items: Vec<_> = (0..7)
            .map(|i| api_track(&format!("Song {}", i), &["A", "B"], 200_000 + i))
            .collect();
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("q", "A - Song"))
            .and(query_param("type", "track"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "tracks": { "items": items } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut catalog = catalog(&server, valid_credential());
        let tracks = catalog.search("A - Song").await.unwrap();
        assert_eq!(tracks.len(), SEARCH_LIMIT);
        assert_eq!(tracks[0].search_string, "A, B - Song 0");
        assert_eq!(tracks[0].artist, "A, B");
        assert_eq!(tracks[0].duration_ms, 200_000);
        assert_eq!(tracks[0].catalog_id(), Some("spotify:track:Song 0"));
    }

    #[tokio::test]
    async fn test_search_without_session_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut catalog = catalog(&server, Credential::default());
        let result = catalog.search("anything").await;
        assert!(matches!(
            result,
            Err(CatalogError::Auth(AuthError::NoAuthenticatedSession))
        ));
    }

    #[tokio::test]
    async fn test_search_refreshes_expired_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "tracks": { "items": [] } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut catalog = catalog(&server, Credential::new("stale", "refresh", 1));
        let tracks = catalog.search("q").await.unwrap();
        assert!(tracks.is_empty());

        let saved = catalog.session().store().config();
        assert_eq!(saved.get_str("spotify:access_token"), Some("fresh"));
        assert_eq!(saved.get_str("spotify:refresh_token"), Some("refresh"));
    }

    #[tokio::test]
    async fn test_create_playlist_loads_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "user1",
                "display_name": "User",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/users/user1/playlists"))
            .and(body_string_contains("\"name\":\"VK Import\""))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "pl1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut catalog = catalog(&server, valid_credential());
        let id = catalog.create_playlist("VK Import").await.unwrap();
        assert_eq!(id, "pl1");
        assert!(catalog.is_authenticated());
    }

    #[tokio::test]
    async fn test_add_to_playlist_requires_created_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/playlists/pl1/tracks"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "snapshot_id": "s1",
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/playlists/pl2/tracks"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let mut catalog = catalog(&server, valid_credential());
        let ids = vec!["spotify:track:1".to_string()];
        catalog.add_to_playlist("pl1", &ids).await.unwrap();

        let result = catalog.add_to_playlist("pl2", &ids).await;
        match result {
            Err(CatalogError::RequestFailed { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
