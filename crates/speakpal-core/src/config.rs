use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SpeakPalError};

/// Greeting the assistant opens every session with.
pub const DEFAULT_GREETING: &str = "Hello! I'm your AI assistant. I can help answer your questions and provide information on various topics. I'll also read my responses aloud to help with pronunciation and comprehension. What would you like to know?";

/// Speech engines understood by `speech.engine`.
pub const SPEECH_ENGINES: &[&str] = &["auto", "say", "espeak", "none"];

/// Top-level configuration for SpeakPal.
///
/// Loaded from `~/.speakpal/config.toml` by default. Every section falls
/// back to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeakPalConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

impl SpeakPalConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SpeakPalConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    ///
    /// The failure is reported through `tracing`, so call this only once a
    /// subscriber is installed. Callers that need the config to configure
    /// logging should use [`load`](Self::load) and report the error later.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.speech.validate()
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Simulated thinking time before a reply is appended, in milliseconds.
    pub response_latency_ms: u64,
    /// Assistant message the log is seeded with.
    pub greeting: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            response_latency_ms: 1500,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

/// Speech synthesis settings.
///
/// `rate`, `pitch` and `volume` use the usual synthesizer scales:
/// 1.0 is the engine's normal rate and pitch, volume runs from 0.0 to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whether replies are read aloud.
    pub enabled: bool,
    /// Engine: "auto", "say", "espeak" or "none".
    pub engine: String,
    /// Speaking rate multiplier (0.1 to 10.0).
    pub rate: f32,
    /// Pitch multiplier (0.0 to 2.0).
    pub pitch: f32,
    /// Volume (0.0 to 1.0).
    pub volume: f32,
    /// Engine-specific voice name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: "auto".to_string(),
            rate: 0.9,
            pitch: 1.0,
            volume: 1.0,
            voice: None,
        }
    }
}

impl SpeechConfig {
    pub fn validate(&self) -> Result<()> {
        if !SPEECH_ENGINES.contains(&self.engine.as_str()) {
            return Err(SpeakPalError::Config(format!(
                "unknown speech engine '{}', expected one of {}",
                self.engine,
                SPEECH_ENGINES.join(", ")
            )));
        }
        if !(0.1..=10.0).contains(&self.rate) {
            return Err(SpeakPalError::Config(format!(
                "speech.rate must be between 0.1 and 10.0, got {}",
                self.rate
            )));
        }
        if !(0.0..=2.0).contains(&self.pitch) {
            return Err(SpeakPalError::Config(format!(
                "speech.pitch must be between 0.0 and 2.0, got {}",
                self.pitch
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(SpeakPalError::Config(format!(
                "speech.volume must be between 0.0 and 1.0, got {}",
                self.volume
            )));
        }
        Ok(())
    }
}
