//! Configuration-related functionality.

use std::{fs, path::Path, time::Duration};

use eyre::{Result, WrapErr};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::Error;

pub const DEFAULT_PORTAL_URL: &str = "https://www.arcgis.com";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 600;

/// Environment variables that, when set, take precedence over the
/// corresponding values from the configuration file.
pub const TOKEN_ENV_VAR: &str = "AGOL_TOKEN";
pub const USERNAME_ENV_VAR: &str = "AGOL_USERNAME";
pub const PASSWORD_ENV_VAR: &str = "AGOL_PASSWORD";

/// Blue/green deployment configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_portal_url")]
    pub portal_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Item ID of the user-facing view.
    pub view_item_id: String,
    pub blue_item_id: String,
    pub green_item_id: String,
    #[serde(default)]
    pub view_layer: u32,
    #[serde(default)]
    pub source_layer: u32,
    /// Whether to ask the platform to execute admin edits asynchronously.
    #[serde(default)]
    pub run_async: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_portal_url() -> String {
    DEFAULT_PORTAL_URL.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_poll_timeout_secs() -> u64 {
    DEFAULT_POLL_TIMEOUT_SECS
}

impl Config {
    /// Load the configuration from the given file. The format is determined
    /// from the file's extension (`.json`, `.yml` or `.yaml`).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Attempting to load config file: {}", path.display());
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| Error::CannotDetermineConfigFileType(path.to_path_buf()))?;
        let parse: fn(&str) -> Result<Self> = match ext {
            "json" => Self::from_json_str,
            "yml" | "yaml" => Self::from_yaml_str,
            _ => return Err(Error::CannotDetermineConfigFileType(path.to_path_buf()).into()),
        };
        let content = fs::read_to_string(path)
            .wrap_err_with(|| Error::FailedToLoadConfig(path.to_path_buf()))?;
        let config =
            parse(&content).wrap_err_with(|| Error::FailedToLoadConfig(path.to_path_buf()))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s).map_err(Error::from)?)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s).map_err(Error::from)?)
    }

    /// Apply credential overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply credential overrides using the given lookup function, which maps
    /// an environment variable name to its value (if any).
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(TOKEN_ENV_VAR) {
            debug!("Using token from {}", TOKEN_ENV_VAR);
            self.token = Some(token);
        }
        if let Some(username) = lookup(USERNAME_ENV_VAR) {
            self.username = Some(username);
        }
        if let Some(password) = lookup(PASSWORD_ENV_VAR) {
            self.password = Some(password);
        }
        self
    }

    /// Checks that the item IDs make sense together.
    pub fn validate(&self) -> Result<()> {
        let ids = [
            ("view_item_id", &self.view_item_id),
            ("blue_item_id", &self.blue_item_id),
            ("green_item_id", &self.green_item_id),
        ];
        for (name, id) in ids {
            if id.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("{} must not be empty", name)).into());
            }
        }
        if self.blue_item_id == self.green_item_id {
            return Err(Error::InvalidConfig(
                "blue_item_id and green_item_id must refer to different items".to_string(),
            )
            .into());
        }
        if self.view_item_id == self.blue_item_id || self.view_item_id == self.green_item_id {
            return Err(Error::InvalidConfig(
                "view_item_id must not be one of the backing service items".to_string(),
            )
            .into());
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}
