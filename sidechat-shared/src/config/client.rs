use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use url::Url;

const ENV_SERVER_URL: &str = "SIDECHAT_SERVER_URL";
const ENV_LOG_LEVEL: &str = "SIDECHAT_LOG_LEVEL";
const ENV_POLL_INTERVAL: &str = "SIDECHAT_POLL_INTERVAL_SECS";
const ENV_STORAGE_PATH: &str = "SIDECHAT_STORAGE_PATH";
const ENV_REQUEST_TIMEOUT: &str = "SIDECHAT_REQUEST_TIMEOUT_SECS";

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Errors raised while loading or validating a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported configuration format for {0}. Use 'yaml' or 'json'.")]
    UnsupportedFormat(PathBuf),

    #[error("Invalid {var} value {value:?}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Values supplied on the command line; they win over every other source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub log_level: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub storage_path: Option<PathBuf>,
}

/// The Sidechat client configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the Sidechat backend
    pub server_url: String,

    /// Logging level or `tracing` filter directive
    pub log_level: String,

    /// Seconds between two unread recomputation passes
    pub poll_interval_secs: u64,

    /// JSON document holding persisted client state (read watermarks)
    pub storage_path: PathBuf,

    /// Timeout applied to non-streaming requests
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Config {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            log_level: "info".to_string(),
            poll_interval_secs: 10,
            storage_path: Self::default_data_dir().join("state.json"),
            request_timeout_secs: 60,
        }
    }

    /// Per-user directory holding Sidechat files, `./.sidechat` when no home
    /// directory can be resolved.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        BaseDirs::new().map_or_else(
            || PathBuf::from(".sidechat"),
            |dirs| dirs.config_dir().join("sidechat"),
        )
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a `.yaml`, `.yml` or `.json` file.
    /// * `overrides` - Command-line values applied last.
    ///
    /// # Errors
    /// Fails when the file cannot be read or parsed, when an environment
    /// variable is malformed, or when the resolved values do not validate.
    pub fn load_config(
        config_path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::with_defaults(),
        };

        config.apply_env()?;

        if let Some(server_url) = &overrides.server_url {
            config.server_url.clone_from(server_url);
        }
        if let Some(log_level) = &overrides.log_level {
            config.log_level.clone_from(log_level);
        }
        if let Some(poll_interval_secs) = overrides.poll_interval_secs {
            config.poll_interval_secs = poll_interval_secs;
        }
        if let Some(storage_path) = &overrides.storage_path {
            config.storage_path.clone_from(storage_path);
        }

        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(serde_yml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    // Environment variables only fill values the file left at their default.
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        let defaults = Self::with_defaults();

        if self.server_url == defaults.server_url
            && let Ok(server_url) = env::var(ENV_SERVER_URL)
        {
            self.server_url = server_url;
        }
        if self.log_level == defaults.log_level
            && let Ok(log_level) = env::var(ENV_LOG_LEVEL)
        {
            self.log_level = log_level;
        }
        if self.poll_interval_secs == defaults.poll_interval_secs
            && let Ok(value) = env::var(ENV_POLL_INTERVAL)
        {
            self.poll_interval_secs = parse_seconds(ENV_POLL_INTERVAL, value)?;
        }
        if self.storage_path == defaults.storage_path
            && let Ok(storage_path) = env::var(ENV_STORAGE_PATH)
        {
            self.storage_path = PathBuf::from(storage_path);
        }
        if self.request_timeout_secs == defaults.request_timeout_secs
            && let Ok(value) = env::var(ENV_REQUEST_TIMEOUT)
        {
            self.request_timeout_secs = parse_seconds(ENV_REQUEST_TIMEOUT, value)?;
        }
        Ok(())
    }

    /// Validates the resolved configuration, collecting every problem.
    ///
    /// # Errors
    /// Returns one message per invalid field.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match Url::parse(&self.server_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "Unsupported server URL scheme '{}'. Use http or https.",
                url.scheme()
            )),
            Err(err) => errors.push(format!("Invalid server URL '{}': {err}", self.server_url)),
        }

        let level = self.log_level.trim();
        if level.is_empty() {
            errors.push("Log level must not be empty.".to_string());
        } else if !level.contains('=') && !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str())
        {
            errors.push(format!(
                "Unknown log level '{level}'. Use one of {} or a filter directive.",
                LOG_LEVELS.join(", ")
            ));
        }

        if self.poll_interval_secs == 0 {
            errors.push("Invalid poll interval. Must be greater than 0.".to_string());
        }
        if self.request_timeout_secs == 0 {
            errors.push("Invalid request timeout. Must be greater than 0.".to_string());
        }
        if self.storage_path.as_os_str().is_empty() {
            errors.push("Storage path must not be empty.".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The backend base URL with a trailing slash, ready for joining paths.
    ///
    /// # Errors
    /// Returns the parse error for a malformed URL.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        let mut raw = self.server_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Where the signed-in user's profile is kept, next to the state file.
    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.storage_path.with_file_name("session.json")
    }
}

fn parse_seconds(var: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidEnv {
            var,
            value,
            reason: format!("must be a whole number of seconds ({err})"),
        })
}
