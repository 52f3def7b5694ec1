//! TOML-based configuration persistence for KeyStudio.
//!
//! Reads and writes [`AppConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\KeyStudio\config.toml`
//! - Linux:    `~/.config/keystudio/config.toml`
//! - macOS:    `~/Library/Application Support/KeyStudio/config.toml`
//!
//! ```toml
//! [studio]
//! log_level = "debug"
//! catalog = "vial-v6"
//! os_profile = "mac"
//!
//! [polling]
//! enabled = true
//! interval_secs = 5
//!
//! [session]
//! auto_connect = true
//! preferred_device = "hid:4653:0001"
//! ```
//!
//! Every field has a `#[serde(default = "...")]` helper, so a missing file,
//! a missing section, or a file from an older release all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use keystudio_core::keycode::{CatalogId, OsProfile};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub studio: StudioConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// General studio settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudioConfig {
    /// Schema version string.
    #[serde(default = "default_version")]
    pub version: String,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Keycode catalog id or alias (`default`, `vial-v6`, `legacy`).
    #[serde(default = "default_catalog")]
    pub catalog: String,
    /// Label profile: `auto` detects from the build target.
    #[serde(default = "default_os_profile")]
    pub os_profile: String,
}

impl StudioConfig {
    /// Catalog to load; unknown ids fall back to the default catalog.
    pub fn catalog_id(&self) -> CatalogId {
        CatalogId::resolve(&self.catalog)
    }

    /// Label profile; `auto` and unrecognised values detect from the OS.
    pub fn os_profile(&self) -> OsProfile {
        if self.os_profile.eq_ignore_ascii_case("auto") {
            return OsProfile::detect();
        }
        OsProfile::parse(&self.os_profile).unwrap_or_else(OsProfile::detect)
    }
}

/// Background device polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between device list refreshes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl PollingConfig {
    /// Poll interval, never shorter than one second.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Startup session behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Connect to a device as soon as one is listed.
    #[serde(default)]
    pub auto_connect: bool,
    /// Device id tried first when connecting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_device: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_version() -> String {
    "1.0".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_catalog() -> String {
    CatalogId::Default.as_str().to_string()
}
fn default_os_profile() -> String {
    "auto".to_string()
}
fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    5
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            log_level: default_log_level(),
            catalog: default_catalog(),
            os_profile: default_os_profile(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_interval_secs(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from the platform config file, or defaults if it does
/// not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, or defaults if the file does not exist.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Same as [`save_config`].
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Platform config directory including the `KeyStudio` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KeyStudio"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keystudio"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("KeyStudio")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
