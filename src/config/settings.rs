use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::security::path_guard::expand_home;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_OUTPUT_BYTES: usize = 3500;
const DEFAULT_GIT_BINARY: &str = "git";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to parse JSON config file: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

/// Opaque requester identity
///
/// Chat platforms hand out numeric ids, so config files may list either
/// integers or strings; both compare as their decimal/string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! user_id_from_int {
    ($($int:ty),*) => {
        $(
            impl From<$int> for UserId {
                fn from(id: $int) -> Self {
                    Self(id.to_string())
                }
            }
        )*
    };
}

user_id_from_int!(i32, i64, u32, u64);

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Str(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(id) => UserId::from(id),
            RawId::Str(id) => UserId(id),
        })
    }
}

/// Process-wide policy snapshot
///
/// Never mutated after construction; reloads build a fresh value and swap it
/// in through [`super::ConfigStore`].
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub machine_name: String,
    pub allowed_paths: Vec<PathBuf>,
    pub allowed_user_ids: HashSet<UserId>,
    pub allowed_git_commands: HashSet<String>,
    #[serde(default = "default_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_git_binary")]
    pub git_binary: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

fn default_git_binary() -> PathBuf {
    PathBuf::from(DEFAULT_GIT_BINARY)
}

impl Config {
    /// Build a config with default limits
    pub fn new<P, U, C>(machine_name: &str, allowed_paths: P, allowed_user_ids: U, allowed_git_commands: C) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PathBuf>,
        U: IntoIterator,
        U::Item: Into<UserId>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Config {
            machine_name: machine_name.to_string(),
            allowed_paths: allowed_paths.into_iter().map(Into::into).collect(),
            allowed_user_ids: allowed_user_ids.into_iter().map(Into::into).collect(),
            allowed_git_commands: allowed_git_commands.into_iter().map(Into::into).collect(),
            command_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            git_binary: default_git_binary(),
            audit_log: None,
        }
    }

    /// Load configuration from a `.toml` or `.json` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "toml" => Self::from_toml_str(&contents),
            "json" => Self::from_json_str(&contents),
            other => Err(ConfigError::UnsupportedFormat(format!(
                "'{}' (expected .toml or .json)",
                other
            ))),
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.finish()
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(contents)?;
        config.finish()
    }

    fn finish(mut self) -> Result<Self, ConfigError> {
        self.allowed_paths = self
            .allowed_paths
            .iter()
            .map(|p| expand_home(&p.to_string_lossy()))
            .collect();

        self.validate()?;
        Ok(self)
    }

    /// Validate configuration values
    ///
    /// Empty allow-sets are not a load error: they deny every request, which
    /// is the safe reading of a half-written config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machine_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "machine_name must not be empty".to_string(),
            ));
        }

        if self.command_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "command_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.max_output_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "max_output_bytes must be greater than 0".to_string(),
            ));
        }

        if let Some(relative) = self.allowed_paths.iter().find(|p| !p.is_absolute()) {
            return Err(ConfigError::InvalidValue(format!(
                "allowed_paths entries must be absolute: {}",
                relative.display()
            )));
        }

        if self.allowed_paths.is_empty() {
            warn!("allowed_paths is empty; every request will be rejected");
        }
        if self.allowed_user_ids.is_empty() {
            warn!("allowed_user_ids is empty; every request will be rejected");
        }
        if self.allowed_git_commands.is_empty() {
            warn!("allowed_git_commands is empty; every request will be rejected");
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
