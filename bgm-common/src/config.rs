//! Configuration loading and config file resolution
//!
//! Config file resolution priority order:
//! 1. Explicit path (highest priority)
//! 2. `BGM_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/bgm/config.toml`)
//! 4. Built-in defaults (fallback)
//!
//! A missing config file is not an error: a warning is logged and the
//! built-in defaults are used. A file that exists but fails to parse is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BGM_CONFIG";

/// Complete TOML config file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Group engine behavior
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Group engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Emit `Join` when a dragged item lands on a group boundary
    ///
    /// Default: false. An incidental shift caused by another item's removal
    /// looks identical to a deliberate drag, so boundary joins are opt-in.
    #[serde(default)]
    pub auto_join_enabled: bool,

    /// Template for derived group names
    ///
    /// Placeholders: `{first}` and `{last}` (1-based positions of the first and
    /// last member), `{count}` (member count).
    #[serde(default = "default_group_name_template")]
    pub group_name_template: String,

    /// Colors assigned round-robin to newly created groups
    #[serde(default = "default_palette")]
    pub palette: Vec<String>,

    /// Prefix for identifiers handed out to items that lack one
    #[serde(default = "default_identifier_prefix")]
    pub identifier_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_join_enabled: false,
            group_name_template: default_group_name_template(),
            palette: default_palette(),
            identifier_prefix: default_identifier_prefix(),
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
    #[serde(default)]
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

fn default_group_name_template() -> String {
    "Group {first}".to_string()
}

fn default_palette() -> Vec<String> {
    ["#4f8fe6", "#e6a24f", "#58b368", "#c75b9b", "#8a6fd1", "#d9534f"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_identifier_prefix() -> String {
    "bd-".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path
    ///
    /// Missing file → warning + defaults. Unreadable or invalid file → error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file {} not found, using built-in defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolve the config path and load it
    pub fn resolve_and_load(explicit: Option<&Path>) -> Result<Self> {
        match ConfigResolver::new().with_explicit(explicit).resolve() {
            Some(path) => Self::load(&path),
            None => {
                warn!("No config file location available, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.engine.palette.is_empty() {
            return Err(Error::Config("engine.palette must name at least one color".to_string()));
        }
        if self.engine.identifier_prefix.is_empty() {
            return Err(Error::Config("engine.identifier_prefix must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Config file path resolution
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    explicit: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit path that overrides every other source
    pub fn with_explicit(mut self, path: Option<&Path>) -> Self {
        self.explicit = path.map(Path::to_path_buf);
        self
    }

    /// Resolve the config file path by priority
    ///
    /// Returns None only when no explicit path, no environment override and no
    /// platform config directory are available.
    pub fn resolve(&self) -> Option<PathBuf> {
        // Priority 1: explicit path
        if let Some(path) = &self.explicit {
            return Some(path.clone());
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: platform config directory
        default_config_path()
    }
}

/// Platform default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bgm").join("config.toml"))
}

/// Write config to `target` atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, target: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = target
        .file_name()
        .ok_or_else(|| Error::Config(format!("Config path has no file name: {}", target.display())))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = target.with_file_name(tmp_name);

    std::fs::write(&tmp_path, content)?;
    if let Err(e) = std::fs::rename(&tmp_path, target) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    debug!("Wrote config to {}", target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert!(!config.engine.auto_join_enabled);
        assert_eq!(config.engine.group_name_template, "Group {first}");
        assert_eq!(config.engine.identifier_prefix, "bd-");
        assert!(!config.engine.palette.is_empty());
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_partial_engine_table() {
        let config = TomlConfig::from_toml_str(
            r#"
            [engine]
            auto_join_enabled = true
            "#,
        )
        .unwrap();
        assert!(config.engine.auto_join_enabled);
        assert_eq!(config.engine.group_name_template, "Group {first}");
    }

    #[test]
    fn test_empty_palette_rejected() {
        let result = TomlConfig::from_toml_str(
            r#"
            [engine]
            palette = []
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = TomlConfig::from_toml_str("[engine\nauto_join_enabled = ");
        assert!(matches!(result, Err(Error::TomlParse(_))));
    }
}
