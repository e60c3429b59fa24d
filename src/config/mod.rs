//! Configuration management for Aura Sync
//!
//! Values are layered: environment variables override the TOML file, which
//! overrides built-in defaults.

pub mod file;

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Persona, Result};

/// Default live model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Default live WebSocket endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

/// Default outbound queue capacity, in messages
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 32;

/// API key value shipped in templates, never a real key
const PLACEHOLDER_API_KEY: &str = "YOUR_GEMINI_API_KEY_HERE";

/// Aura Sync configuration
#[derive(Debug)]
pub struct Config {
    /// Gemini API key, if configured
    pub api_key: Option<SecretString>,

    /// Live backend configuration
    pub live: LiveConfig,

    /// Companion identity and user details
    pub persona: Persona,

    /// Camera capture configuration
    pub camera: CameraConfig,
}

/// Live backend configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Model identifier
    pub model: String,

    /// Prebuilt voice name
    pub voice: String,

    /// WebSocket endpoint, without credentials
    pub endpoint: String,

    /// Outbound queue capacity in messages
    pub outbound_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// Camera capture configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    /// Capture command writing one encoded image to stdout
    pub command: String,

    /// Arguments for the capture command
    pub args: Vec<String>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: "ffmpeg".to_string(),
            args: [
                "-loglevel",
                "error",
                "-f",
                "v4l2",
                "-i",
                "/dev/video0",
                "-frames:v",
                "1",
                "-f",
                "image2pipe",
                "-vcodec",
                "png",
                "-",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl CameraConfig {
    /// Parse a whitespace-separated command line
    ///
    /// Returns `None` for a blank line.
    #[must_use]
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(String::from);
        let command = parts.next()?;
        Some(Self {
            command,
            args: parts.collect(),
        })
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn from_sources(
        fc: file::AuraConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("API_KEY"))
            .or(fc.api_key)
            .map(SecretString::from);

        let defaults = LiveConfig::default();
        let live = LiveConfig {
            model: env("AURA_MODEL")
                .or(fc.live.model)
                .unwrap_or(defaults.model),
            voice: env("AURA_VOICE")
                .or(fc.live.voice)
                .unwrap_or(defaults.voice),
            endpoint: env("AURA_LIVE_URL")
                .or(fc.live.endpoint)
                .unwrap_or(defaults.endpoint),
            outbound_capacity: fc
                .live
                .outbound_capacity
                .unwrap_or(defaults.outbound_capacity),
        };

        if live.outbound_capacity == 0 {
            return Err(Error::Config(
                "live.outbound_capacity must be at least 1".to_string(),
            ));
        }

        let mut persona = Persona::default();
        if let Some(name) = fc.persona.name {
            persona.name = name;
        }
        if let Some(instruction) = fc.persona.instruction {
            persona.instruction = instruction;
        }
        persona.custom_instruction = fc.persona.custom_instruction.filter(|s| !s.is_empty());
        if let Some(user_name) = env("AURA_USER_NAME").or(fc.persona.user_name) {
            persona.user_name = user_name;
        }
        persona.pro = fc.persona.pro.unwrap_or(false);
        persona.profile_image = fc.persona.profile_image.map(Into::into);

        let camera = env("AURA_CAMERA_COMMAND")
            .and_then(|line| CameraConfig::from_command_line(&line))
            .or_else(|| {
                fc.camera.command.map(|command| CameraConfig {
                    command,
                    args: fc.camera.args.unwrap_or_default(),
                })
            })
            .unwrap_or_default();

        tracing::debug!(
            model = %live.model,
            voice = %live.voice,
            api_key_set = api_key.is_some(),
            "configuration loaded"
        );

        Ok(Self {
            api_key,
            live,
            persona,
            camera,
        })
    }

    /// The API key, if it is set to something usable
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the key is missing, empty or still
    /// the template placeholder
    pub fn credential(&self) -> Result<SecretString> {
        let key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().trim())
            .unwrap_or_default();

        if key.is_empty() || key == PLACEHOLDER_API_KEY {
            return Err(Error::Config("API key not configured".to_string()));
        }

        Ok(SecretString::from(key.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::file::AuraConfigFile;
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(AuraConfigFile::default(), env_from(&[])).unwrap();
        assert_eq!(config.live, LiveConfig::default());
        assert_eq!(config.camera, CameraConfig::default());
        assert!(config.api_key.is_none());
        assert!(config.credential().is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut fc = AuraConfigFile::default();
        fc.api_key = Some("file-key".to_string());
        fc.live.voice = Some("Puck".to_string());
        fc.live.model = Some("file-model".to_string());

        let config = Config::from_sources(
            fc,
            env_from(&[("AURA_VOICE", "Kore"), ("API_KEY", "env-key")]),
        )
        .unwrap();

        assert_eq!(config.live.voice, "Kore");
        assert_eq!(config.live.model, "file-model");
        assert_eq!(config.credential().unwrap().expose_secret(), "env-key");
    }

    #[test]
    fn test_gemini_key_preferred() {
        let config = Config::from_sources(
            AuraConfigFile::default(),
            env_from(&[("GEMINI_API_KEY", "primary"), ("API_KEY", "fallback")]),
        )
        .unwrap();
        assert_eq!(config.credential().unwrap().expose_secret(), "primary");
    }

    #[test]
    fn test_placeholder_key_rejected() {
        let config = Config::from_sources(
            AuraConfigFile::default(),
            env_from(&[("GEMINI_API_KEY", "YOUR_GEMINI_API_KEY_HERE")]),
        )
        .unwrap();
        assert!(matches!(config.credential(), Err(Error::Config(_))));

        let config =
            Config::from_sources(AuraConfigFile::default(), env_from(&[("API_KEY", "  ")]))
                .unwrap();
        assert!(config.credential().is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut fc = AuraConfigFile::default();
        fc.live.outbound_capacity = Some(0);
        assert!(Config::from_sources(fc, env_from(&[])).is_err());
    }

    #[test]
    fn test_camera_command_from_env() {
        let config = Config::from_sources(
            AuraConfigFile::default(),
            env_from(&[("AURA_CAMERA_COMMAND", "imagesnap -q -")]),
        )
        .unwrap();
        assert_eq!(config.camera.command, "imagesnap");
        assert_eq!(config.camera.args, vec!["-q", "-"]);
    }

    #[test]
    fn test_persona_overlay() {
        let mut fc = AuraConfigFile::default();
        fc.persona.user_name = Some("Sam".to_string());
        fc.persona.custom_instruction = Some(String::new());
        fc.persona.pro = Some(true);

        let config = Config::from_sources(fc, env_from(&[])).unwrap();
        assert_eq!(config.persona.user_name, "Sam");
        assert!(config.persona.custom_instruction.is_none());
        assert!(config.persona.pro);
    }
}
