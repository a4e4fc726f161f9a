// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway configuration.
//!
//! Loaded from TOML with the wire key spellings (`Platforms`,
//! `MongoDBURI`, ...). Unknown keys are hard errors, which also rejects
//! legacy spellings such as `PullUpdateTime`.

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] Box<toml::de::Error>),
    #[error("invalid ImageExpirationTimeout {0:?}: expected DD:HH:MM:SS")]
    InvalidExpiration(String),
    #[error("no platforms configured")]
    NoPlatforms,
}

/// How artifacts reach a platform's image directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Remote,
    Local,
}

/// Where pulled images land for a platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    #[serde(rename = "imageDir")]
    pub image_dir: String,
}

/// One configured compute platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    /// Uids permitted to call the admin-gated operations.
    #[serde(default)]
    pub admins: Vec<u32>,
    pub accesstype: AccessType,
    #[serde(default)]
    pub ssh: Option<LocationConfig>,
    #[serde(default)]
    pub local: Option<LocationConfig>,
}

impl PlatformConfig {
    /// The image directory for this platform's access type.
    pub fn image_dir(&self) -> Option<&str> {
        let location = match self.accesstype {
            AccessType::Remote => self.ssh.as_ref(),
            AccessType::Local => self.local.as_ref(),
        };
        location.map(|l| l.image_dir.as_str())
    }
}

fn default_authentication() -> String {
    "munge".to_string()
}

/// Seconds before a READY or FAILURE record may be re-pulled.
fn default_pull_update_timeout() -> u64 {
    300
}

/// Gateway configuration, one instance per process.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(rename = "Platforms")]
    pub platforms: IndexMap<String, PlatformConfig>,
    /// Record store connection URI; the scheme selects the backend.
    #[serde(rename = "MongoDBURI")]
    pub store_uri: String,
    /// Database name; namespaces the store's on-disk state.
    #[serde(rename = "MongoDB")]
    pub store_db: String,
    #[serde(rename = "Authentication", default = "default_authentication")]
    pub authentication: String,
    /// Seconds; re-pull freshness window and FAILURE GC horizon.
    #[serde(rename = "PullUpdateTimeout", default = "default_pull_update_timeout")]
    pub pull_update_timeout: u64,
    /// `DD:HH:MM:SS`, added to now on every successful lookup.
    #[serde(rename = "ImageExpirationTimeout")]
    pub image_expiration_timeout: String,
    #[serde(rename = "DefaultImageFormat", default)]
    pub default_image_format: Option<String>,
    /// Enables the lookup metrics log.
    #[serde(rename = "Metrics", default)]
    pub metrics: bool,
    /// External command for real pulls; absent means only test-mode pulls
    /// can run.
    #[serde(rename = "PullCommand", default)]
    pub pull_command: Option<String>,
    #[serde(rename = "ExpireCommand", default)]
    pub expire_command: Option<String>,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration from a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.platforms.is_empty() {
            return Err(ConfigError::NoPlatforms);
        }
        self.expiration_timeout_ms()?;
        Ok(())
    }

    pub fn platform(&self, name: &str) -> Option<&PlatformConfig> {
        self.platforms.get(name)
    }

    pub fn is_platform(&self, name: &str) -> bool {
        self.platforms.contains_key(name)
    }

    /// Re-pull freshness window in milliseconds.
    pub fn pull_update_timeout_ms(&self) -> u64 {
        self.pull_update_timeout * 1000
    }

    /// Max age of a stuck non-READY record before autoexpire reclaims it.
    /// Defaults equal to the re-pull window.
    pub fn pull_timeout_ms(&self) -> u64 {
        self.pull_update_timeout_ms()
    }

    /// Parse `ImageExpirationTimeout` (`DD:HH:MM:SS`) into milliseconds.
    pub fn expiration_timeout_ms(&self) -> Result<u64, ConfigError> {
        let text = &self.image_expiration_timeout;
        let parts: Vec<&str> = text.split(':').collect();
        let [days, hours, minutes, seconds] = parts.as_slice() else {
            return Err(ConfigError::InvalidExpiration(text.clone()));
        };
        let field = |s: &str| {
            s.parse::<u64>()
                .map_err(|_| ConfigError::InvalidExpiration(text.clone()))
        };
        let secs =
            field(seconds)? + 60 * (field(minutes)? + 60 * (field(hours)? + 24 * field(days)?));
        Ok(secs * 1000)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Config {
    /// A minimal single-platform config for tests: ephemeral store, fake
    /// auth, metrics on.
    pub fn for_tests() -> Self {
        let mut platforms = IndexMap::new();
        platforms.insert(
            "systema".to_string(),
            PlatformConfig {
                admins: vec![0],
                accesstype: AccessType::Remote,
                ssh: Some(LocationConfig {
                    image_dir: "/images/systema".to_string(),
                }),
                local: None,
            },
        );
        Self {
            platforms,
            store_uri: "mem://".to_string(),
            store_db: "imagegw_test".to_string(),
            authentication: "fake".to_string(),
            pull_update_timeout: 300,
            image_expiration_timeout: "30:00:00:00".to_string(),
            default_image_format: Some("squashfs".to_string()),
            metrics: true,
            pull_command: None,
            expire_command: None,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
