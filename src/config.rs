//! Engine configuration
//!
//! Defaults, overlaid by an optional partial TOML file at
//! `~/.config/voxlink/config.toml`, overlaid by `VOXLINK_*` environment
//! variables. The API key is the only required value.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;
use url::Url;

use crate::{Error, Result};

/// Default live-session WebSocket endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default conversational model
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice
const DEFAULT_VOICE: &str = "Kore";

const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a warm, emotionally intelligent voice \
     assistant. Be expressive, keep replies concise (one to three sentences), and use the \
     available tools for tasks, reminders, notes, mood logging, music, and the visual display.";

/// Voice session engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// API key for the remote service
    pub api_key: String,

    /// WebSocket endpoint of the live-session service
    pub endpoint: String,

    /// Model identifier sent in the session setup
    pub model: String,

    /// Prebuilt voice name for synthesized speech
    pub voice: String,

    /// System instruction (persona/context) sent at session open
    pub system_instruction: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the config file and environment
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no API key is configured, or a TOML/IO
    /// error if the config file exists but cannot be read.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = config_file_path() {
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                let file: ConfigFile = toml::from_str(&raw)?;
                tracing::debug!(path = %path.display(), "loaded config file");
                config.apply_file(file);
            }
        }

        config.apply_env();

        if config.api_key.is_empty() {
            return Err(Error::Config(
                "no API key configured (set VOXLINK_API_KEY or api_key in config.toml)"
                    .to_string(),
            ));
        }

        Ok(config)
    }

    /// The session URL with the API key attached as a query parameter
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the endpoint is not a valid URL.
    pub fn session_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint {}: {e}", self.endpoint)))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    /// Overlay non-empty file values
    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(api_key) = file.api_key {
            self.api_key = api_key;
        }
        if let Some(endpoint) = file.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(voice) = file.voice {
            self.voice = voice;
        }
        if let Some(system_instruction) = file.system_instruction {
            self.system_instruction = system_instruction;
        }
    }

    /// Overlay environment variables
    fn apply_env(&mut self) {
        if let Ok(api_key) = std::env::var("VOXLINK_API_KEY") {
            self.api_key = api_key;
        } else if let Ok(api_key) = std::env::var("GEMINI_API_KEY") {
            self.api_key = api_key;
        }
        if let Ok(endpoint) = std::env::var("VOXLINK_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("VOXLINK_MODEL") {
            self.model = model;
        }
        if let Ok(voice) = std::env::var("VOXLINK_VOICE") {
            self.voice = voice;
        }
        if let Ok(instruction) = std::env::var("VOXLINK_SYSTEM_INSTRUCTION") {
            self.system_instruction = instruction;
        }
    }
}

/// Path of the persistent config file, if a home directory exists
fn config_file_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "voxlink").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Partial TOML config file schema; every field is optional
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    api_key: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    system_instruction: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overlay_is_partial() {
        let mut config = EngineConfig::default();
        let file: ConfigFile = toml::from_str(
            r#"
            api_key = "k123"
            voice = "Puck"
            "#,
        )
        .unwrap();
        config.apply_file(file);

        assert_eq!(config.api_key, "k123");
        assert_eq!(config.voice, "Puck");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn session_url_carries_the_key() {
        let config = EngineConfig {
            api_key: "secret".to_string(),
            ..EngineConfig::default()
        };
        let url = config.session_url().unwrap();
        assert_eq!(url.scheme(), "wss");
        assert!(url.query().unwrap().contains("key=secret"));
    }

    #[test]
    fn invalid_endpoint_is_config_error() {
        let config = EngineConfig {
            endpoint: "not a url".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(config.session_url(), Err(Error::Config(_))));
    }
}
