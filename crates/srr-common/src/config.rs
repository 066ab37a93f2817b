//! ---
//! srr_section: "01-shared-runtime"
//! srr_subsection: "module"
//! srr_type: "source"
//! srr_scope: "code"
//! srr_description: "Shared configuration, logging, and crypto primitives."
//! srr_version: "v0.1.0"
//! srr_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::{debug, warn};

use crate::logging::LogFormat;

fn default_agent_name() -> String {
    "etn-srr".to_owned()
}

fn default_request_queue() -> String {
    "ETN.Q.SRR.REQUEST".to_owned()
}

fn default_reply_queue() -> String {
    "ETN.Q.SRR.REPLY".to_owned()
}

fn default_version() -> String {
    "2.0".to_owned()
}

fn default_supported_versions() -> Vec<String> {
    vec!["1.0".to_owned(), "2.0".to_owned()]
}

fn default_request_timeout() -> Duration {
    Duration::from_millis(60_000)
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the SRR coordinator.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SrrConfig {
    /// Identity and bus addressing of the coordinator itself.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Payload version stamped on outgoing queries and the list response.
    #[serde(default = "default_version")]
    pub version: String,
    /// Payload versions the restore engine accepts.
    #[serde(default = "default_supported_versions")]
    pub supported_versions: Vec<String>,
    /// Per-RPC timeout. Milliseconds at this boundary; the bus client
    /// truncates to whole seconds.
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub request_timeout: Duration,
    /// Grace period before the host restart hook fires.
    #[serde(default = "default_restart_delay")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub restart_delay: Duration,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity block: how the coordinator names itself on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Agent name placed in the `from` field of every request envelope.
    #[serde(default = "default_agent_name")]
    pub agent_name: String,
    /// Queue on which operator UI requests arrive.
    #[serde(default = "default_request_queue")]
    pub request_queue: String,
    /// Queue on which agent replies are awaited.
    #[serde(default = "default_reply_queue")]
    pub reply_queue: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            request_queue: default_request_queue(),
            reply_queue: default_reply_queue(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// Metadata describing where an [`SrrConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedSrrConfig {
    pub config: SrrConfig,
    pub source: Option<PathBuf>,
}

impl SrrConfig {
    pub const ENV_CONFIG_PATH: &'static str = "SRR_CONFIG";

    /// Load configuration from disk, respecting the `SRR_CONFIG` override and
    /// the per-knob environment variables. Falls back to built-in defaults
    /// when no candidate file exists.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedSrrConfig> {
        let mut loaded = Self::discover(candidates)?;
        loaded.config.apply_env_overrides();
        loaded.config.validate()?;
        Ok(loaded)
    }

    fn discover<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedSrrConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedSrrConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedSrrConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!("no configuration file found; using built-in defaults");
        Ok(LoadedSrrConfig {
            config: Self::default(),
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<SrrConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Apply the environment overrides named by the agent contract:
    /// `REQUEST_TIMEOUT` (ms), `AGENT_NAME`, `SRR_VERSION`, `RESTART_DELAY`
    /// (seconds).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("REQUEST_TIMEOUT") {
            match raw.parse::<u64>() {
                Ok(ms) => self.request_timeout = Duration::from_millis(ms),
                Err(_) => warn!(value = %raw, "ignoring non-numeric REQUEST_TIMEOUT"),
            }
        }
        if let Ok(name) = std::env::var("AGENT_NAME") {
            if !name.trim().is_empty() {
                self.coordinator.agent_name = name;
            }
        }
        if let Ok(version) = std::env::var("SRR_VERSION") {
            if !version.trim().is_empty() {
                self.version = version;
            }
        }
        if let Ok(raw) = std::env::var("RESTART_DELAY") {
            match raw.parse::<u64>() {
                Ok(secs) => self.restart_delay = Duration::from_secs(secs),
                Err(_) => warn!(value = %raw, "ignoring non-numeric RESTART_DELAY"),
            }
        }
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.supported_versions.is_empty() {
            return Err(anyhow!("supported_versions must not be empty"));
        }
        if !self.supported_versions.contains(&self.version) {
            return Err(anyhow!(
                "version '{}' is not in the supported set [{}]",
                self.version,
                self.supported_versions.join(", ")
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("request_timeout must be greater than zero"));
        }
        if self.coordinator.agent_name.trim().is_empty() {
            return Err(anyhow!("coordinator agent_name must not be empty"));
        }
        Ok(())
    }
}

impl Default for SrrConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            version: default_version(),
            supported_versions: default_supported_versions(),
            request_timeout: default_request_timeout(),
            restart_delay: default_restart_delay(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::str::FromStr for SrrConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: SrrConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SrrConfig::default();
        config.validate().unwrap();
        assert_eq!(config.version, "2.0");
        assert_eq!(config.request_timeout, Duration::from_millis(60_000));
        assert_eq!(config.restart_delay, Duration::from_secs(5));
    }

    #[test]
    fn parse_overrides_selected_fields() {
        let config: SrrConfig = r#"
            version = "1.0"
            request_timeout = 5000

            [coordinator]
            agent_name = "srr-test"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.request_timeout, Duration::from_millis(5000));
        assert_eq!(config.coordinator.agent_name, "srr-test");
        // untouched fields keep their defaults
        assert_eq!(config.coordinator.request_queue, "ETN.Q.SRR.REQUEST");
    }

    #[test]
    fn version_outside_supported_set_is_rejected() {
        let parsed = r#"
            version = "3.0"
        "#
        .parse::<SrrConfig>();
        assert!(parsed.is_err());
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        std::env::set_var("REQUEST_TIMEOUT", "2500");
        std::env::set_var("AGENT_NAME", "etn-srr-override");
        std::env::set_var("RESTART_DELAY", "9");

        let mut config = SrrConfig::default();
        config.apply_env_overrides();

        std::env::remove_var("REQUEST_TIMEOUT");
        std::env::remove_var("AGENT_NAME");
        std::env::remove_var("RESTART_DELAY");

        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.coordinator.agent_name, "etn-srr-override");
        assert_eq!(config.restart_delay, Duration::from_secs(9));
    }
}
