//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSLOT_CONFIG` (environment variable)
//! 2. `~/.config/mailslot/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailslot\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Only the binary reads this; library components take their settings
//! through constructors.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Which domains this deployment serves.
    pub mailbox: MailboxConfig,
    /// Storage backend selection.
    pub storage: StorageConfig,
    /// Content bounds and rate limiting.
    pub limits: LimitsConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override data directory for storage and logs.
    pub data_dir: Option<PathBuf>,
}

/// Mailbox addressing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Domains that accept mail. Anything else is dropped at the gate.
    pub allowed_domains: Vec<String>,
}

/// Storage backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Objects live in a directory tree on local disk.
    Filesystem,
    /// Objects live in process memory and vanish on exit.
    Memory,
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind: "filesystem" or "memory".
    pub backend: BackendKind,
    /// Root directory for the filesystem backend (default: `<data_dir>/storage`).
    pub root: Option<PathBuf>,
}

/// Content bounds and rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum characters kept from a message body.
    pub max_content_chars: usize,
    /// Anonymous submissions allowed per client per window.
    pub rate_limit: u32,
    /// Rate limit window length in seconds.
    pub rate_limit_window_secs: u64,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            data_dir: None,
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            allowed_domains: [
                "biscoito.email",
                "bolacha.email",
                "tuamaeaquelaursa.email",
                "aquelaursa.email",
                "xablau.email",
                "porranenhuma.com",
            ]
            .iter()
            .map(|d| d.to_string())
            .collect(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Filesystem,
            root: None,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_content_chars: crate::parser::mime::MAX_CONTENT_CHARS,
            rate_limit: 10,
            rate_limit_window_secs: 60,
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSLOT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailslot").join("config.toml"))
}

/// Return the data directory for storage and logs.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailslot")
}

/// Return the root directory of the filesystem storage backend.
pub fn storage_root(config: &Config) -> PathBuf {
    config
        .storage
        .root
        .clone()
        .unwrap_or_else(|| data_dir(config).join("storage"))
}

/// Return where anonymous-send rate limit windows are kept between runs.
pub fn rate_limit_path(config: &Config) -> PathBuf {
    data_dir(config).join("ratelimit.json")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    data_dir(config).join("mailslot.log")
}
