//! Configuration loading and folder resolution
//!
//! Folder resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is never fatal: a warning is logged and defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the music folder
pub const MUSIC_FOLDER_ENV: &str = "STTAG_MUSIC_FOLDER";

/// Environment variable overriding the cover folder
pub const COVER_FOLDER_ENV: &str = "STTAG_COVER_FOLDER";

/// Album artist marking files whose covers are looked up remotely
pub const DEFAULT_ALBUM_ARTIST: &str = "Anime";

/// Default Jikan (MyAnimeList) API root
pub const DEFAULT_JIKAN_BASE_URL: &str = "https://api.jikan.moe/v4";

/// Configuration loaded from TOML file
///
/// Every field is optional in the file; missing fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder scanned for audio files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_folder: Option<PathBuf>,

    /// Folder holding cached cover images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_folder: Option<PathBuf>,

    /// Album artist tag value selecting files for remote lookup
    #[serde(default = "default_album_artist")]
    pub album_artist: String,

    /// Base URL of the metadata lookup API
    #[serde(default = "default_jikan_base_url")]
    pub jikan_base_url: String,

    /// Timeout applied to every outgoing HTTP request
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// HTTP control API port (`serve` command)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            music_folder: None,
            cover_folder: None,
            album_artist: default_album_artist(),
            jikan_base_url: default_jikan_base_url(),
            http_timeout_secs: default_http_timeout_secs(),
            port: default_port(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_album_artist() -> String {
    DEFAULT_ALBUM_ARTIST.to_string()
}

fn default_jikan_base_url() -> String {
    DEFAULT_JIKAN_BASE_URL.to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_port() -> u16 {
    5750
}

fn default_log_level() -> String {
    "info".to_string()
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub music_folder: PathBuf,
    pub cover_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    /// Defaults for the running platform
    ///
    /// Music: the user's audio folder (`~/Music` when the platform has none registered).
    /// Covers: `Covers` inside the user's pictures folder.
    pub fn for_current_platform() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let music_folder = dirs::audio_dir().unwrap_or_else(|| home.join("Music"));
        let cover_folder = dirs::picture_dir()
            .unwrap_or_else(|| home.join("Pictures"))
            .join("Covers");

        Self {
            music_folder,
            cover_folder,
            log_level: default_log_level(),
        }
    }
}

/// Resolves the music and cover folders from all configuration tiers
#[derive(Debug, Clone)]
pub struct FolderResolver {
    config: TomlConfig,
    defaults: CompiledDefaults,
}

impl FolderResolver {
    pub fn new(config: TomlConfig) -> Self {
        Self {
            config,
            defaults: CompiledDefaults::for_current_platform(),
        }
    }

    /// Resolve the music folder
    pub fn music_folder(&self, cli_arg: Option<&Path>) -> PathBuf {
        resolve_folder(
            "music",
            cli_arg,
            MUSIC_FOLDER_ENV,
            self.config.music_folder.as_deref(),
            &self.defaults.music_folder,
        )
    }

    /// Resolve the cover folder
    pub fn cover_folder(&self, cli_arg: Option<&Path>) -> PathBuf {
        resolve_folder(
            "cover",
            cli_arg,
            COVER_FOLDER_ENV,
            self.config.cover_folder.as_deref(),
            &self.defaults.cover_folder,
        )
    }

    pub fn config(&self) -> &TomlConfig {
        &self.config
    }
}

fn resolve_folder(
    label: &str,
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
    default: &Path,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        info!("{} folder from command line: {}", label, path.display());
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            info!("{} folder from {}: {}", label, env_var_name, path);
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_value {
        info!("{} folder from TOML config: {}", label, path.display());
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent compiled default
    info!("{} folder from compiled default: {}", label, default.display());
    default.to_path_buf()
}

/// Default configuration file path (`<config dir>/sttag/config.toml`)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("sttag").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load TOML configuration, falling back to defaults when the file is missing
///
/// A file that exists but cannot be parsed is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write TOML configuration atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = TomlConfig::default();
        assert_eq!(config.album_artist, "Anime");
        assert_eq!(config.jikan_base_url, DEFAULT_JIKAN_BASE_URL);
        assert_eq!(config.logging.level, "info");
        assert!(config.music_folder.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(r#"music_folder = "/srv/music""#).unwrap();
        assert_eq!(config.music_folder, Some(PathBuf::from("/srv/music")));
        assert_eq!(config.album_artist, "Anime");
        assert_eq!(config.http_timeout_secs, 30);
    }

    #[test]
    fn test_cli_argument_wins() {
        let resolver = FolderResolver::new(TomlConfig {
            music_folder: Some(PathBuf::from("/from/toml")),
            ..TomlConfig::default()
        });
        let resolved = resolver.music_folder(Some(Path::new("/from/cli")));
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_default_cover_folder_ends_with_covers() {
        let defaults = CompiledDefaults::for_current_platform();
        assert_eq!(defaults.cover_folder.file_name().unwrap(), "Covers");
    }
}
