//! CLI argument definitions for the SpeakPal binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use speakpal_core::config::SpeakPalConfig;
use speakpal_core::error::SpeakPalError;
use std::path::{Path, PathBuf};

/// SpeakPal - a terminal chat companion that reads its replies aloud.
#[derive(Parser, Debug)]
#[command(name = "speakpal", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Simulated thinking time before each reply, in milliseconds.
    #[arg(long = "latency-ms")]
    pub latency_ms: Option<u64>,

    /// Do not read replies aloud.
    #[arg(short = 'm', long = "mute")]
    pub mute: bool,

    /// Seed for reply selection, for reproducible conversations.
    #[arg(long = "seed")]
    pub seed: Option<u64>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SPEAKPAL_CONFIG env var > ~/.speakpal/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SPEAKPAL_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log filter.
    ///
    /// Priority: --log-level flag > config file value. `RUST_LOG` is applied
    /// on top of this when the subscriber is built.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Resolve the reply latency.
    ///
    /// Priority: --latency-ms flag > config file value.
    pub fn resolve_latency_ms(&self, config_latency_ms: u64) -> u64 {
        self.latency_ms.unwrap_or(config_latency_ms)
    }

    /// Whether speech output is on. `--mute` always wins.
    pub fn resolve_speech_enabled(&self, config_enabled: bool) -> bool {
        !self.mute && config_enabled
    }
}

/// Read the config file without logging.
///
/// Runs before the tracing subscriber exists (the config supplies its log
/// level), so unlike `SpeakPalConfig::load_or_default` the load error is
/// handed back for the caller to report. A missing file is not an error.
pub fn load_config(path: &Path) -> (SpeakPalConfig, Option<SpeakPalError>) {
    if !path.exists() {
        return (SpeakPalConfig::default(), None);
    }
    match SpeakPalConfig::load(path) {
        Ok(config) => (config, None),
        Err(e) => (SpeakPalConfig::default(), Some(e)),
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".speakpal").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".speakpal").join("config.toml");
    }
    PathBuf::from("config.toml")
}
