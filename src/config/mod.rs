//! Configuration management for Nguru
//!
//! Built once in `main` from the environment, overlaid on the optional TOML
//! file, and handed to whatever needs it.

pub mod file;

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::chat::SOUL_PROMPT;
use crate::live::LiveSetup;
use crate::{Error, Result};

pub use file::{NguruConfigFile, config_file_path, load_config_file};

/// Default realtime voice model
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice
pub const DEFAULT_VOICE_NAME: &str = "Kore";

/// Default text chat model
pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";

/// Nguru configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key; required for voice and chat
    pub gemini_api_key: Option<SecretString>,

    pub live_model: String,

    pub voice_name: String,

    pub chat_model: String,

    /// Override for the Live websocket endpoint
    pub live_endpoint: Option<String>,

    /// Cloud store settings, when Firebase is configured
    pub firebase: Option<FirebaseConfig>,

    /// Path to data directory (local database)
    pub data_dir: PathBuf,
}

/// Firestore project access
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub api_key: SecretString,
    /// Signed-in user's ID token, required when security rules demand auth
    pub id_token: Option<SecretString>,
}

impl Config {
    /// Load configuration from the environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if `NGURU_CONFIG` names a file that cannot be loaded
    pub fn load() -> Result<Self> {
        let explicit = std::env::var("NGURU_CONFIG").ok().map(PathBuf::from);
        let file = load_config_file(explicit.as_deref())?;
        Ok(Self::from_sources(|key| std::env::var(key).ok(), file))
    }

    /// Merge environment lookups over a parsed config file
    #[must_use]
    pub fn from_sources<F>(env: F, file: NguruConfigFile) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let gemini_api_key = var("GEMINI_API_KEY")
            .or(file.gemini.api_key)
            .map(SecretString::from);

        let live_model = var("NGURU_LIVE_MODEL")
            .or(file.gemini.live_model)
            .unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string());
        let voice_name = var("NGURU_VOICE_NAME")
            .or(file.gemini.voice_name)
            .unwrap_or_else(|| DEFAULT_VOICE_NAME.to_string());
        let chat_model = var("NGURU_CHAT_MODEL")
            .or(file.gemini.chat_model)
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let live_endpoint = var("NGURU_LIVE_ENDPOINT").or(file.gemini.live_endpoint);

        let firebase_key = var("FIREBASE_API_KEY").or(file.firebase.api_key);
        let firebase_project = var("FIREBASE_PROJECT_ID").or(file.firebase.project_id);
        let firebase_token = var("FIREBASE_ID_TOKEN").or(file.firebase.id_token);

        let firebase = match (firebase_key, firebase_project) {
            (Some(api_key), Some(project_id)) => Some(FirebaseConfig {
                project_id,
                api_key: SecretString::from(api_key),
                id_token: firebase_token.map(SecretString::from),
            }),
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!(
                    "Firebase needs both FIREBASE_API_KEY and FIREBASE_PROJECT_ID, using local storage"
                );
                None
            }
            (None, None) => None,
        };

        // ~/.local/share/nguru on Linux
        let data_dir = var("NGURU_DATA_DIR")
            .or(file.storage.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        Self {
            gemini_api_key,
            live_model,
            voice_name,
            chat_model,
            live_endpoint,
            firebase,
            data_dir,
        }
    }

    /// The Gemini API key, or a configuration error naming what is missing
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `GEMINI_API_KEY` is not set
    pub fn require_gemini_key(&self) -> Result<&SecretString> {
        self.gemini_api_key
            .as_ref()
            .ok_or_else(|| Error::Config("GEMINI_API_KEY is not set".to_string()))
    }

    /// Session parameters for a realtime voice conversation
    #[must_use]
    pub fn live_setup(&self) -> LiveSetup {
        LiveSetup::new(&self.live_model, &self.voice_name, SOUL_PROMPT)
    }

    /// Location of the local database
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("nguru.db")
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("app", "nguru", "nguru")
        .map_or_else(|| PathBuf::from(".nguru"), |d| d.data_dir().to_path_buf())
}
