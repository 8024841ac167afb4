//! Configuration for the dashboard client
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/cerberus/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod client;
mod features;
mod logging;
mod serialization;


// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use client::{FileHttp, FileNotifications, HttpConfig, NotificationsConfig};
pub use features::{Features, FileFeatures};
pub use logging::{FileLogging, LogRotation, LoggingConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_LOG_DIR: &str = "./logs";

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the scan server
    pub api_url: String,

    /// Directory for the event journal
    pub log_dir: PathBuf,

    /// Demo mode: run against the built-in demo backend
    pub demo_mode: bool,

    /// Toast lifetime
    pub notifications: NotificationsConfig,

    /// HTTP client timeouts
    pub http: HttpConfig,

    /// Feature flags for optional modules
    pub features: Features,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            demo_mode: false,
            notifications: NotificationsConfig::default(),
            http: HttpConfig::default(),
            features: Features::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure (subset of Config that makes sense to persist)
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub api_url: Option<String>,
    pub log_dir: Option<String>,

    /// Optional [notifications] section
    pub notifications: Option<FileNotifications>,

    /// Optional [http] section
    pub http: Option<FileHttp>,

    /// Optional [features] section
    pub features: Option<FileFeatures>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/cerberus/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("cerberus").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    /// Called during startup to help users discover configuration options
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }

        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Parse a config file; a missing file means defaults, an unreadable or
    /// malformed one is an error
    pub(crate) fn read_file_config(path: &Path) -> Result<FileConfig> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => {
                Err(e).with_context(|| format!("Cannot read configuration file {}", path.display()))
            }
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn load() -> Result<Self> {
        let file = match Self::config_path() {
            Some(path) => Self::read_file_config(&path)?,
            None => FileConfig::default(),
        };
        Ok(Self::from_sources(file, |key| std::env::var(key).ok()))
    }

    /// Load configuration, exiting with an actionable message if the config
    /// file exists but is broken
    pub fn load_or_exit() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                eprintln!("║  CONFIG ERROR - Failed to load configuration file           ║");
                eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                eprintln!("  Error: {:#}\n", e);
                eprintln!("  Tip: Check for:\n");
                eprintln!("    - Missing quotes around string values");
                eprintln!("    - Invalid boolean values (use true/false)");
                eprintln!("    - Numbers given as strings in [http] or [notifications]");
                eprintln!("    - Typos in section names\n");
                eprintln!("  To reset, run `cerberus-console config --reset`.\n");
                std::process::exit(1);
            }
        }
    }

    /// Merge a parsed file with environment lookups
    pub(crate) fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        // API URL: env > file > default
        let api_url = env("CERBERUS_API_URL")
            .or(file.api_url)
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        // Journal directory: env > file > default
        let log_dir = env("CERBERUS_LOG_DIR")
            .or(file.log_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        // Demo mode: env only (runtime flag)
        let demo_mode = env("CERBERUS_DEMO").map(|v| is_truthy(&v)).unwrap_or(false);

        Self {
            api_url,
            log_dir,
            demo_mode,
            notifications: NotificationsConfig::from_file(file.notifications),
            http: HttpConfig::from_file(file.http),
            features: Features::from_file(file.features),
            logging: LoggingConfig::from_file(file.logging),
        }
    }
}
