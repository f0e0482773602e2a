// Test kit configuration

use crate::allocator::{AddressAllocator, TcpBinder};
use crate::error::ConfigError;
use crate::policy::{RetryPolicy, WaitBound, WaitPolicy};
use crate::waiter::ConditionWaiter;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "UDT_TESTKIT";

/// Tunables for allocation and waiting.
///
/// Load order, later wins: defaults, TOML file, `.env`, environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestkitConfig {
    /// Probes per allocation
    pub allocation_attempts: u32,
    /// Pause between failed allocation probes
    pub allocation_backoff_ms: u64,
    /// Condition polling interval
    pub poll_interval_ms: u64,
    /// Condition wait bound; 0 polls without a bound
    pub wait_timeout_ms: u64,
    /// Host used by `local_socket_address`-style helpers
    pub default_host: String,
    /// Listen backlog for probe sockets
    pub listen_backlog: i32,
}

impl Default for TestkitConfig {
    fn default() -> Self {
        Self {
            allocation_attempts: crate::policy::DEFAULT_ALLOCATION_ATTEMPTS,
            allocation_backoff_ms: crate::policy::DEFAULT_ALLOCATION_BACKOFF.as_millis() as u64,
            poll_interval_ms: crate::policy::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            wait_timeout_ms: crate::policy::DEFAULT_WAIT_TIMEOUT.as_millis() as u64,
            default_host: "localhost".to_string(),
            listen_backlog: crate::allocator::DEFAULT_BACKLOG,
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl TestkitConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))
    }

    /// Read a TOML or JSON file, picked by extension.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e))),
            other => Err(ConfigError::LoadError(format!(
                "Unsupported format: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }

    /// Apply `UDT_TESTKIT_*` overrides from `(key, value)` pairs.
    ///
    /// Unrelated keys and unknown suffixes are skipped.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> ConfigResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            let Some(name) = key
                .strip_prefix(ENV_PREFIX)
                .and_then(|rest| rest.strip_prefix('_'))
            else {
                continue;
            };
            let value = value.as_ref();

            match name.to_lowercase().as_str() {
                "allocation_attempts" => self.allocation_attempts = parse(key, value)?,
                "allocation_backoff_ms" => self.allocation_backoff_ms = parse(key, value)?,
                "poll_interval_ms" => self.poll_interval_ms = parse(key, value)?,
                "wait_timeout_ms" => self.wait_timeout_ms = parse(key, value)?,
                "default_host" => self.default_host = value.trim().to_string(),
                "listen_backlog" => self.listen_backlog = parse(key, value)?,
                _ => continue,
            }
            debug!(key, value, "Applied environment override");
        }
        Ok(())
    }

    /// Load from an optional file, then `.env`, then the process environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        dotenvy::dotenv().ok(); // Ignore if .env doesn't exist
        config.apply_env(env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the helpers misbehave.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.allocation_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "allocation_attempts must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.default_host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_host cannot be empty".to_string(),
            ));
        }
        if self.listen_backlog < 1 {
            return Err(ConfigError::ValidationError(
                "listen_backlog must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.allocation_attempts,
            Duration::from_millis(self.allocation_backoff_ms),
        )
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        let policy = WaitPolicy::new(Duration::from_millis(self.poll_interval_ms));
        if self.wait_timeout_ms == 0 {
            policy.with_bound(WaitBound::Unbounded)
        } else {
            policy.with_timeout(Duration::from_millis(self.wait_timeout_ms))
        }
    }

    pub fn allocator(&self) -> AddressAllocator<TcpBinder> {
        AddressAllocator::with_binder(TcpBinder::new(self.listen_backlog), self.retry_policy())
    }

    pub fn waiter(&self) -> ConditionWaiter {
        ConditionWaiter::new(self.wait_policy())
    }
}
