//! Configuration management for docdesk.
//!
//! Loads configuration from ${DOCDESK_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::ServiceRoutes;

/// Returns the default config template with comments.
///
/// Embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for docdesk configuration and session data.
    //!
    //! DOCDESK_HOME resolution order:
    //! 1. DOCDESK_HOME environment variable (if set)
    //! 2. ~/.config/docdesk (default)

    use std::path::PathBuf;

    /// Returns the docdesk home directory.
    ///
    /// Checks DOCDESK_HOME env var first, falls back to ~/.config/docdesk,
    /// then to a relative `.docdesk` when no home directory is known.
    pub fn docdesk_home() -> PathBuf {
        if let Ok(home) = std::env::var("DOCDESK_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".docdesk"),
            |h| h.join(".config").join("docdesk"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        docdesk_home().join("config.toml")
    }

    /// Returns the path to the session storage file.
    pub fn session_path() -> PathBuf {
        docdesk_home().join("session.json")
    }

    /// Returns the directory receiving log files.
    pub fn logs_dir() -> PathBuf {
        docdesk_home().join("logs")
    }
}

/// Base URLs of the two backend services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Authentication service (login).
    pub auth_base_url: Option<String>,
    /// Document / RAG service (everything else).
    pub data_base_url: Option<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend service locations.
    pub services: ServicesConfig,

    /// Token lifetime assumed when the login response does not carry one.
    pub token_ttl_secs: u64,
}

impl Config {
    pub const DEFAULT_AUTH_BASE_URL: &str = "http://localhost:8000";
    pub const DEFAULT_DATA_BASE_URL: &str = "http://localhost:3636";
    pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Resolves both service base URLs (env > config > default).
    pub fn routes(&self) -> Result<ServiceRoutes> {
        let auth = resolve_base_url(
            self.services.auth_base_url.as_deref(),
            "DOCDESK_AUTH_URL",
            Self::DEFAULT_AUTH_BASE_URL,
            "auth service",
        )?;
        let data = resolve_base_url(
            self.services.data_base_url.as_deref(),
            "DOCDESK_DATA_URL",
            Self::DEFAULT_DATA_BASE_URL,
            "data service",
        )?;
        ServiceRoutes::new(&auth, &data)
    }

    /// Token lifetime; zero falls back to the default.
    pub fn token_ttl(&self) -> Duration {
        let secs = if self.token_ttl_secs == 0 {
            Self::DEFAULT_TOKEN_TTL_SECS
        } else {
            self.token_ttl_secs
        };
        Duration::from_secs(secs)
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            services: ServicesConfig::default(),
            token_ttl_secs: Self::DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

/// Resolves a base URL with precedence: env > config > default.
///
/// Blank values are skipped. Returns an error if the chosen URL does not parse.
pub fn resolve_base_url(
    config_base_url: Option<&str>,
    env_var: &str,
    default_url: &str,
    service_name: &str,
) -> Result<String> {
    if let Ok(env_url) = std::env::var(env_var) {
        let trimmed = env_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, service_name)?;
            return Ok(trimmed.to_string());
        }
    }

    if let Some(config_url) = config_base_url {
        let trimmed = config_url.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, service_name)?;
            return Ok(trimmed.to_string());
        }
    }

    Ok(default_url.to_string())
}

fn validate_url(url: &str, service_name: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid {service_name} base URL: {url}"))?;
    Ok(())
}
