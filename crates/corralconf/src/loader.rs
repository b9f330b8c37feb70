//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, CorralConfig, TelemetryConfig, WireConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/corral/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("corral/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    // Local override (current directory)
    let local = PathBuf::from("corral.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<CorralConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from TOML string.
fn parse_toml(contents: &str, path: &Path) -> Result<CorralConfig, ConfigError> {
    toml::from_str(contents).map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Merge two configs, with `overlay` taking precedence.
///
/// A field wins over the base only when it differs from the compiled default;
/// a file that omits a field leaves the earlier value in place.
pub fn merge_configs(base: CorralConfig, overlay: CorralConfig) -> CorralConfig {
    let wire_defaults = WireConfig::default();
    let telemetry_defaults = TelemetryConfig::default();

    CorralConfig {
        wire: WireConfig {
            fetch_scheme: if overlay.wire.fetch_scheme != wire_defaults.fetch_scheme {
                overlay.wire.fetch_scheme
            } else {
                base.wire.fetch_scheme
            },
            duplex_scheme: if overlay.wire.duplex_scheme != wire_defaults.duplex_scheme {
                overlay.wire.duplex_scheme
            } else {
                base.wire.duplex_scheme
            },
            fetch_timeout_ms: if overlay.wire.fetch_timeout_ms != wire_defaults.fetch_timeout_ms {
                overlay.wire.fetch_timeout_ms
            } else {
                base.wire.fetch_timeout_ms
            },
            call_timeout_ms: if overlay.wire.call_timeout_ms != wire_defaults.call_timeout_ms {
                overlay.wire.call_timeout_ms
            } else {
                base.wire.call_timeout_ms
            },
            default_uid: if overlay.wire.default_uid != wire_defaults.default_uid {
                overlay.wire.default_uid
            } else {
                base.wire.default_uid
            },
        },
        telemetry: TelemetryConfig {
            log_level: if overlay.telemetry.log_level != telemetry_defaults.log_level {
                overlay.telemetry.log_level
            } else {
                base.telemetry.log_level
            },
        },
        apps: if !overlay.apps.is_empty() {
            overlay.apps
        } else {
            base.apps
        },
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut CorralConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("CORRAL_FETCH_SCHEME") {
        config.wire.fetch_scheme = v;
        sources.env_overrides.push("CORRAL_FETCH_SCHEME".to_string());
    }
    if let Ok(v) = env::var("CORRAL_DUPLEX_SCHEME") {
        config.wire.duplex_scheme = v;
        sources.env_overrides.push("CORRAL_DUPLEX_SCHEME".to_string());
    }
    if let Ok(v) = env::var("CORRAL_FETCH_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.wire.fetch_timeout_ms = ms;
            sources
                .env_overrides
                .push("CORRAL_FETCH_TIMEOUT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("CORRAL_CALL_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.wire.call_timeout_ms = ms;
            sources
                .env_overrides
                .push("CORRAL_CALL_TIMEOUT_MS".to_string());
        }
    }
    if let Ok(v) = env::var("CORRAL_DEFAULT_UID") {
        config.wire.default_uid = v;
        sources.env_overrides.push("CORRAL_DEFAULT_UID".to_string());
    }

    // Telemetry
    if let Ok(v) = env::var("CORRAL_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("CORRAL_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    // App list (comma-separated)
    if let Ok(v) = env::var("CORRAL_APPS") {
        config.apps = v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        sources.env_overrides.push("CORRAL_APPS".to_string());
    }
}
