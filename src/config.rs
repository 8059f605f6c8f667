//! Configuration management for windowgate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, WindowgateError};
use crate::ratelimit::{
    PolicyRule, PolicyRules, DEFAULT_MAX_CALLS, DEFAULT_MAX_TRACKED_SUBJECTS, DEFAULT_WINDOW_MS,
};

/// Prefix for environment overrides, e.g. `WINDOWGATE__LIMITER__DEFAULT_MAX_CALLS=10`.
pub const ENV_PREFIX: &str = "WINDOWGATE";

/// Main configuration for windowgate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowgateConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named policies, one per throttled action
    #[serde(default)]
    pub policies: HashMap<String, PolicyRule>,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Calls allowed per window when no named policy applies
    #[serde(default = "default_max_calls")]
    pub default_max_calls: u32,

    /// Window length in milliseconds when no named policy applies
    #[serde(default = "default_window_ms")]
    pub default_window_ms: u64,

    /// Seconds between cleanup sweeps
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Maximum subjects tracked at once, 0 for unbounded
    #[serde(default = "default_max_tracked_subjects")]
    pub max_tracked_subjects: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            default_max_calls: default_max_calls(),
            default_window_ms: default_window_ms(),
            cleanup_interval_secs: default_cleanup_interval(),
            max_tracked_subjects: default_max_tracked_subjects(),
        }
    }
}

impl LimiterConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn default_max_calls() -> u32 {
    DEFAULT_MAX_CALLS
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_max_tracked_subjects() -> usize {
    DEFAULT_MAX_TRACKED_SUBJECTS
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Read the `policies` section of a config file with its keys untouched.
fn load_policies(path: &Path) -> Result<PolicyRules> {
    let contents = std::fs::read_to_string(path)?;
    let document: serde_yaml::Value =
        serde_yaml::from_str(&contents).map_err(|e| WindowgateError::Config(e.to_string()))?;
    match document.get("policies") {
        Some(section) => PolicyRules::from_value(section.clone()),
        None => Ok(PolicyRules::new()),
    }
}

impl WindowgateConfig {
    /// Load configuration from an optional YAML file, then apply environment
    /// overrides.
    ///
    /// Nested keys are separated by a double underscore:
    /// `WINDOWGATE__LIMITER__CLEANUP_INTERVAL_SECS=60`. Policy names are
    /// case-sensitive, so the `policies` section is read from the file as
    /// written and environment overrides do not apply to it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Yaml),
            );
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: WindowgateConfig = settings.try_deserialize()?;
        // The config crate lowercases keys; policy names must keep theirs.
        config.policies = match path {
            Some(path) => load_policies(path)?.policies,
            None => HashMap::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WindowgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| WindowgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.default_max_calls == 0 {
            return Err(WindowgateError::Config(
                "limiter.default_max_calls must be greater than zero".to_string(),
            ));
        }
        if self.limiter.default_window_ms == 0 {
            return Err(WindowgateError::Config(
                "limiter.default_window_ms must be greater than zero".to_string(),
            ));
        }
        if self.limiter.cleanup_interval_secs == 0 {
            return Err(WindowgateError::Config(
                "limiter.cleanup_interval_secs must be greater than zero".to_string(),
            ));
        }
        self.policy_rules().validate()
    }

    /// The named policies as a lookup table.
    pub fn policy_rules(&self) -> PolicyRules {
        PolicyRules {
            policies: self.policies.clone(),
        }
    }
}
