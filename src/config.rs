//! Persistent JSON configuration.
//!
//! The config document holds both user settings (client ids, playlist name)
//! and state written back by a run (tokens, expiry, `last_run`). Keys are
//! colon-separated paths into the document: `spotify:access_token`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::credential::{Credential, CredentialStore};
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const SPOTIFY_SECTION: &str = "spotify";
pub const VK_SECTION: &str = "vk";

// ============================================================================
// Config Document
// ============================================================================

/// A JSON config document with `get` / `set` / `save`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: Option<PathBuf>,
    root: Value,
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

impl ConfigFile {
    /// Load the document at `path`. A missing file is an empty document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let root = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Value::Object(Map::new()),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, starting empty");
                Value::Object(Map::new())
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        Ok(Self {
            path: Some(path),
            root,
        })
    }

    /// A document that is never written to disk.
    pub fn in_memory(root: Value) -> Self {
        Self { path: None, root }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split(':').try_fold(&self.root, |value, part| value.get(part))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Set `key`, creating intermediate objects as needed.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let parts: Vec<&str> = key.split(':').collect();
        let Some((last, parents)) = parts.split_last() else {
            return;
        };

        let mut current = &mut self.root;
        for part in parents {
            current = ensure_object(current)
                .entry((*part).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(current).insert((*last).to_string(), value.into());
    }

    /// Deserialize the object under `key`, defaulting when absent.
    pub fn section<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        match self.get(key) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(T::default()),
        }
    }

    /// Write the document back via a temp file and rename. No-op for
    /// in-memory documents.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let text = serde_json::to_string_pretty(&self.root)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(|source| ConfigError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), "Config saved");
        Ok(())
    }
}

// ============================================================================
// Typed Sections
// ============================================================================

/// Destination catalog settings (`spotify` section).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    /// One-time authorization code, cleared once rejected
    pub code: Option<String>,
    pub redirect_url: String,
    pub state: Option<String>,
    /// Authorization URL shown to the user when a new code is needed
    pub url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_time: i64,
    pub api_base: Option<String>,
    pub accounts_base: Option<String>,
    pub market: Option<String>,
}

impl SpotifySettings {
    pub fn credential(&self) -> Credential {
        Credential::new(
            self.access_token.clone().unwrap_or_default(),
            self.refresh_token.clone().unwrap_or_default(),
            self.expires_time,
        )
    }

    pub fn auth_code(&self) -> Option<&str> {
        self.code.as_deref().filter(|code| !code.is_empty())
    }
}

/// Source catalog settings (`vk` section).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VkSettings {
    pub token: String,
    /// Login URL shown to the user when the token has expired
    pub url: Option<String>,
    pub owner_id: Option<i64>,
    pub api_base: Option<String>,
}

// ============================================================================
// Credential Persistence
// ============================================================================

/// Persists a credential into one section of a [`ConfigFile`].
#[derive(Debug)]
pub struct ConfigCredentialStore {
    config: ConfigFile,
    section: String,
}

impl ConfigCredentialStore {
    pub fn new(config: ConfigFile, section: impl Into<String>) -> Self {
        Self {
            config,
            section: section.into(),
        }
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn into_config(self) -> ConfigFile {
        self.config
    }

    /// Forget the authorization code after the provider rejected it.
    pub fn clear_auth_code(&mut self) -> Result<(), ConfigError> {
        self.config.set(&format!("{}:code", self.section), "");
        self.config.save()
    }
}

impl CredentialStore for ConfigCredentialStore {
    fn save_credential(&mut self, credential: &Credential) -> Result<(), ConfigError> {
        let section = &self.section;
        self.config
            .set(&format!("{}:access_token", section), credential.access_token());
        self.config
            .set(&format!("{}:refresh_token", section), credential.refresh_token());
        self.config
            .set(&format!("{}:expires_time", section), credential.expires_at());
        self.config.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_set_nested() {
        let mut config = ConfigFile::in_memory(json!({}));
        config.set("spotify:access_token", "abc");
        config.set("last_run", 42);
        assert_eq!(config.get_str("spotify:access_token"), Some("abc"));
        assert_eq!(config.get("last_run"), Some(&json!(42)));
        assert_eq!(config.get("spotify:missing"), None);
        assert_eq!(config.get("nothing:here"), None);
    }

    #[test]
    fn test_set_replaces_scalar_parent() {
        let mut config = ConfigFile::in_memory(json!({ "vk": "oops" }));
        config.set("vk:token", "t");
        assert_eq!(config.get_str("vk:token"), Some("t"));
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigFile::load(dir.path().join("config.json")).unwrap();
        assert_eq!(config.get("spotify"), None);
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = ConfigFile::load(&path).unwrap();
        config.set("spotify:client_id", "id");
        config.set("spotify:expires_time", 1_700_000_000_i64);
        config.save().unwrap();

        let reloaded = ConfigFile::load(&path).unwrap();
        let settings: SpotifySettings = reloaded.section(SPOTIFY_SECTION).unwrap();
        assert_eq!(settings.client_id, "id");
        assert_eq!(settings.expires_time, 1_700_000_000);
        assert_eq!(settings.auth_code(), None);
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(ConfigFile::load(&path), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_credential_store_writes_section() {
        let mut store = ConfigCredentialStore::new(
            ConfigFile::in_memory(json!({ "spotify": { "code": "c" } })),
            SPOTIFY_SECTION,
        );
        store
            .save_credential(&Credential::new("a", "r", 100))
            .unwrap();
        store.clear_auth_code().unwrap();

        let settings: SpotifySettings = store.config().section(SPOTIFY_SECTION).unwrap();
        assert_eq!(settings.access_token.as_deref(), Some("a"));
        assert_eq!(settings.refresh_token.as_deref(), Some("r"));
        assert_eq!(settings.expires_time, 100);
        assert_eq!(settings.auth_code(), None);
    }
}
