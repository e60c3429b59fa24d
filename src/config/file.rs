//! TOML configuration file loading
//!
//! Supports `~/.config/aura/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AuraConfigFile {
    /// Gemini API key
    pub api_key: Option<String>,

    /// Live backend configuration
    #[serde(default)]
    pub live: LiveFileConfig,

    /// Companion identity and user details
    #[serde(default)]
    pub persona: PersonaFileConfig,

    /// Camera capture configuration
    #[serde(default)]
    pub camera: CameraFileConfig,
}

/// Live backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// Model identifier (e.g. "gemini-2.5-flash-native-audio-preview-09-2025")
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Zephyr")
    pub voice: Option<String>,

    /// WebSocket endpoint
    pub endpoint: Option<String>,

    /// Outbound queue capacity in messages
    pub outbound_capacity: Option<usize>,
}

/// Persona configuration
#[derive(Debug, Default, Deserialize)]
pub struct PersonaFileConfig {
    /// Companion display name
    pub name: Option<String>,

    /// Base personality instruction
    pub instruction: Option<String>,

    /// Extra instruction supplied by the user
    pub custom_instruction: Option<String>,

    /// How the companion addresses the user
    pub user_name: Option<String>,

    /// Pro tier enabled
    pub pro: Option<bool>,

    /// Path to the companion's profile image
    pub profile_image: Option<String>,
}

/// Camera capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CameraFileConfig {
    /// Capture command writing one encoded image to stdout
    pub command: Option<String>,

    /// Arguments for the capture command
    pub args: Option<Vec<String>>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AuraConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AuraConfigFile {
    config_file_path().map_or_else(AuraConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from `path`
///
/// Returns `AuraConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_from(path: &Path) -> AuraConfigFile {
    if !path.exists() {
        return AuraConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AuraConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AuraConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/aura/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("aura").join("config.toml"))
}
