//! Minimal configuration loading for Corral.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by every Corral crate without causing circular
//! dependency issues.
//!
//! # Configuration Philosophy
//!
//! Configuration is split into two categories:
//!
//! - **Wire** (`WireConfig`): How Corral reaches remote apps - URL schemes
//!   and timeouts. These cannot change once the registry is built.
//!
//! - **Apps** (`apps`): The ordered list of app ids the registry bootstraps
//!   at startup. After startup, the registry is the source of truth for
//!   which apps are actually available.
//!
//! # Usage
//!
//! ```rust,no_run
//! use corralconf::CorralConfig;
//!
//! let config = CorralConfig::load().expect("Failed to load config");
//!
//! println!("fetch scheme: {}", config.wire.fetch_scheme);
//! for app in &config.apps {
//!     println!("app: {}", app);
//! }
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/corral/config.toml` (system)
//! 2. `~/.config/corral/config.toml` (user)
//! 3. `./corral.toml` (local override)
//! 4. Environment variables (`CORRAL_*`)
//!
//! # Example Config
//!
//! ```toml
//! apps = ["app-one.example.net", "app-two.example.net"]
//!
//! [wire]
//! fetch_scheme = "https"
//! duplex_scheme = "wss"
//! fetch_timeout_ms = 5000
//! call_timeout_ms = 120000
//! default_uid = "super-user"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;

pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// How Corral reaches remote apps on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// Scheme for manifest/schema/resource fetches ("https" in production,
    /// "http" against local mock servers).
    pub fetch_scheme: String,

    /// Scheme for the persistent execution channel ("wss" / "ws").
    pub duplex_scheme: String,

    /// Per-request timeout for manifest/schema/resource fetches.
    pub fetch_timeout_ms: u64,

    /// Deadline for awaiting an execution response on the duplex channel.
    pub call_timeout_ms: u64,

    /// User id attached to calls when the caller doesn't supply one.
    pub default_uid: String,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            fetch_scheme: "https".to_string(),
            duplex_scheme: "wss".to_string(),
            fetch_timeout_ms: 5_000,
            call_timeout_ms: 120_000,
            default_uid: "super-user".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log level / env-filter directive for tracing-subscriber.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Complete Corral configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CorralConfig {
    /// Wire settings - cannot change after the registry is built.
    pub wire: WireConfig,

    /// Logging settings.
    pub telemetry: TelemetryConfig,

    /// Ordered list of app ids to bootstrap at startup.
    pub apps: Vec<String>,
}

impl CorralConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/corral/config.toml`
    /// 3. `~/.config/corral/config.toml`
    /// 4. `./corral.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./corral.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = CorralConfig::default();

        // Load config files in order
        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        // Apply environment variable overrides
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();

        output.push_str("# Corral Configuration\n\n");

        // Top-level array must come before any table header
        output.push_str("apps = [\n");
        for app in &self.apps {
            output.push_str(&format!("    \"{}\",\n", app));
        }
        output.push_str("]\n");

        output.push_str("\n[wire]\n");
        output.push_str(&format!("fetch_scheme = \"{}\"\n", self.wire.fetch_scheme));
        output.push_str(&format!(
            "duplex_scheme = \"{}\"\n",
            self.wire.duplex_scheme
        ));
        output.push_str(&format!(
            "fetch_timeout_ms = {}\n",
            self.wire.fetch_timeout_ms
        ));
        output.push_str(&format!(
            "call_timeout_ms = {}\n",
            self.wire.call_timeout_ms
        ));
        output.push_str(&format!("default_uid = \"{}\"\n", self.wire.default_uid));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.telemetry.log_level
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CorralConfig::default();
        assert_eq!(config.wire.fetch_scheme, "https");
        assert_eq!(config.wire.duplex_scheme, "wss");
        assert_eq!(config.wire.fetch_timeout_ms, 5_000);
        assert_eq!(config.wire.default_uid, "super-user");
        assert!(config.apps.is_empty());
    }

    #[test]
    fn test_to_toml() {
        let mut config = CorralConfig::default();
        config.apps.push("app-one.example.net".to_string());
        let toml = config.to_toml();
        assert!(toml.contains("[wire]"));
        assert!(toml.contains("[telemetry]"));
        assert!(toml.contains("app-one.example.net"));
    }

    #[test]
    fn test_to_toml_reparses() {
        let mut config = CorralConfig::default();
        config.wire.fetch_scheme = "http".to_string();
        config.apps.push("127.0.0.1:8080".to_string());

        let reparsed: CorralConfig = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(reparsed, config);
    }
}
