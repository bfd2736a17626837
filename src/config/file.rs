//! TOML configuration file loading
//!
//! Supports `~/.config/nguru/config.toml` (or `$NGURU_CONFIG`) as a
//! persistent config source. All fields are optional; environment variables
//! take precedence over anything set here.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct NguruConfigFile {
    /// Gemini models, voice and credentials
    #[serde(default)]
    pub gemini: GeminiFileConfig,

    /// Cloud profile store
    #[serde(default)]
    pub firebase: FirebaseFileConfig,

    /// Local storage
    #[serde(default)]
    pub storage: StorageFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeminiFileConfig {
    pub api_key: Option<String>,

    /// Realtime voice model (e.g. "gemini-2.5-flash-native-audio-preview-09-2025")
    pub live_model: Option<String>,

    /// Prebuilt voice for spoken replies (e.g. "Kore")
    pub voice_name: Option<String>,

    /// Text chat model
    pub chat_model: Option<String>,

    /// Override for the Live websocket endpoint
    pub live_endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FirebaseFileConfig {
    pub api_key: Option<String>,
    pub project_id: Option<String>,
    pub id_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    /// Directory for the local database
    pub data_dir: Option<String>,
}

/// Load the TOML config file
///
/// An explicit `path` must exist and parse. The default location is
/// optional: a missing or broken file falls back to defaults with a warning.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<NguruConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(NguruConfigFile::default());
    };

    if !path.exists() {
        return Ok(NguruConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(NguruConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(NguruConfigFile::default())
        }
    }
}

/// Return the default config file path: `~/.config/nguru/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("nguru").join("config.toml"))
}
