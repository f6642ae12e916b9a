//! One migration run: authorize, read the source library, fill a playlist.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use crate::catalog::spotify::{SpotifyCatalog, SpotifyTokenExchanger};
use crate::catalog::vk::VkCatalog;
use crate::catalog::{http_client, DestinationCatalog, SourceCatalog};
use crate::config::{
    ConfigCredentialStore, ConfigFile, SpotifySettings, VkSettings, SPOTIFY_SECTION, VK_SECTION,
};
use crate::credential::{now_epoch_seconds, AuthOutcome, CredentialManager};
use crate::error::AuthError;
use crate::progress::Progress;
use crate::sync::{sync_tracks, SyncOptions, SyncReport};

pub const DEFAULT_PLAYLIST_NAME: &str = "VK Import";

type Spotify = SpotifyCatalog<SpotifyTokenExchanger, ConfigCredentialStore>;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    /// Overrides `playlist_name` from the config
    pub playlist_name: Option<String>,
    /// Overrides `vk:owner_id`; defaults to the logged-in VK user
    pub owner_id: Option<i64>,
    pub sync: SyncOptions,
    pub log_only: bool,
}

/// Run a full migration. The config is saved at the end whatever happens,
/// so refreshed tokens and `last_run` are never lost.
pub async fn run(options: RunOptions) -> Result<SyncReport> {
    let mut config = ConfigFile::load(&options.config_path)
        .with_context(|| format!("Failed to load config {}", options.config_path.display()))?;
    config.set("last_run", now_epoch_seconds());

    let spotify_settings: SpotifySettings = config
        .section(SPOTIFY_SECTION)
        .context("Invalid spotify config section")?;
    let vk_settings: VkSettings = config
        .section(VK_SECTION)
        .context("Invalid vk config section")?;
    let playlist_name = options
        .playlist_name
        .clone()
        .or_else(|| config.get_str("playlist_name").map(str::to_string))
        .unwrap_or_else(|| DEFAULT_PLAYLIST_NAME.to_string());

    let http = http_client().context("Failed to build HTTP client")?;
    let session = CredentialManager::new(
        SpotifyTokenExchanger::new(http.clone(), &spotify_settings),
        ConfigCredentialStore::new(config, SPOTIFY_SECTION),
        spotify_settings.credential(),
    );
    let mut spotify = SpotifyCatalog::new(http.clone(), &spotify_settings, session);
    let mut vk = VkCatalog::new(http, &vk_settings);

    let result = migrate(
        &mut spotify,
        &mut vk,
        &spotify_settings,
        &vk_settings,
        &playlist_name,
        &options,
    )
    .await;

    let saved = spotify
        .into_session()
        .into_store()
        .into_config()
        .save()
        .context("Failed to save config");
    info!("--- END ---");

    let report = result?;
    saved?;
    Ok(report)
}

async fn authorize(spotify: &mut Spotify, settings: &SpotifySettings) -> Result<()> {
    match spotify.authorize(settings.auth_code()).await {
        Ok(AuthOutcome::Authorized) => {
            // The code is single-use
            spotify
                .session_mut()
                .store_mut()
                .clear_auth_code()
                .context("Failed to clear used authorization code")?;
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(AuthError::InvalidOrExpiredAuthorizationCode) => {
            spotify
                .session_mut()
                .store_mut()
                .clear_auth_code()
                .context("Failed to clear rejected authorization code")?;
            match &settings.url {
                Some(url) => warn!("Get a new authorization code here: {}", url),
                None => warn!("Set a new authorization code in spotify:code"),
            }
            bail!(AuthError::InvalidOrExpiredAuthorizationCode)
        }
        Err(e) => Err(e).context("Spotify authorization failed"),
    }
}

async fn migrate(
    spotify: &mut Spotify,
    vk: &mut VkCatalog,
    spotify_settings: &SpotifySettings,
    vk_settings: &VkSettings,
    playlist_name: &str,
    options: &RunOptions,
) -> Result<SyncReport> {
    let progress = Progress::new(options.log_only);

    authorize(spotify, spotify_settings).await?;
    vk.verify().await.context("VK login failed")?;
    spotify
        .fetch_profile()
        .await
        .context("Spotify login failed")?;

    if !(SourceCatalog::is_authenticated(vk) && DestinationCatalog::is_authenticated(spotify)) {
        bail!("Not logged in, see messages above");
    }

    let Some(owner_id) = options
        .owner_id
        .or(vk_settings.owner_id)
        .or_else(|| vk.user().and_then(|user| user.id))
    else {
        bail!("No VK owner id: pass --owner-id or set vk:owner_id");
    };

    let spinner = progress.spinner("Fetching VK tracks");
    let tracks = vk.fetch_tracks(owner_id).await;
    spinner.finish_and_clear();
    let tracks = tracks.context("Failed to fetch VK tracks")?;
    info!("Got {} tracks from VK", tracks.len());

    let playlist_id = if options.sync.dry_run {
        info!("Dry run, playlist \"{}\" not created", playlist_name);
        String::new()
    } else {
        let id = spotify
            .create_playlist(playlist_name)
            .await
            .context("Failed to create playlist")?;
        info!("Created playlist \"{}\" ({})", playlist_name, id);
        id
    };

    let report = match sync_tracks(spotify, &playlist_id, &tracks, &options.sync, &progress).await
    {
        Ok(report) => report,
        Err(aborted) => {
            error!(
                "Aborted: {} of {} tracks added before the error",
                aborted.partial.submitted(),
                tracks.len()
            );
            return Err(aborted.into());
        }
    };

    info!(
        "Total: {} tracks, {} found, {} not found, {} added, {} failed searches, {} failed chunks",
        report.source_tracks(),
        report.matched(),
        report.unmatched(),
        report.submitted(),
        report.failed_searches(),
        report.failed_chunks()
    );
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
