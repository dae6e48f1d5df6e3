//! Configuration for the load tester.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `LT__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested configuration
//! structures. For example, `LT__TARGET=http://api:8080` sets the target and
//! `LT__LOGGING__LEVEL=debug` sets the log level.
//!
//! A YAML file with two profiles looks like this:
//!
//! ```yaml
//! target: http://localhost:8080
//! duration: 5m
//!
//! profiles:
//!   - name: pooled
//!     clients: 200
//!     spawn_rate: 20
//!   - name: debug
//!     clients: 2
//!     transport: simple
//!     wait_time:
//!       min: 1s
//!       max: 2s
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::error::ProfileError;
use crate::http::Transport;
use crate::profile::{OperationWeights, Profile};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "LT__";

/// Top-level load test configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the product API under test.
    ///
    /// # Default
    ///
    /// `http://localhost:8080`
    pub target: String,

    /// How long clients keep issuing requests.
    ///
    /// # Default
    ///
    /// `60s`
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Groups of simulated clients, all running concurrently.
    ///
    /// # Default
    ///
    /// A single profile named `products` with [`ProfileConfig`] defaults.
    pub profiles: Vec<ProfileConfig>,

    /// Logging configuration.
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: "http://localhost:8080".into(),
            duration: Duration::from_secs(60),
            profiles: vec![ProfileConfig::default()],
            logging: Logging::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Builds all configured profiles.
    pub fn build_profiles(&self) -> Result<Vec<Profile>, ProfileError> {
        self.profiles.iter().map(ProfileConfig::build).collect()
    }
}

/// A group of simulated clients sharing weights, wait policy, transport and identifier counter.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Name used in logs and the report.
    pub name: String,

    /// Number of concurrent simulated clients.
    pub clients: usize,

    /// Clients started per second. All clients start at once if unset.
    pub spawn_rate: Option<f64>,

    /// Seed for reproducible parameter draws. Random if unset.
    pub seed: Option<u64>,

    /// Range of the random pause between two operations of a client.
    pub wait_time: WaitTime,

    /// Relative weights of the operations.
    pub weights: OperationWeights,

    /// HTTP client flavor.
    pub transport: Transport,

    /// Timeout for a single request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Count error statuses of health probes and creates as failures.
    pub strict_status: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: "products".into(),
            clients: 10,
            spawn_rate: None,
            seed: None,
            wait_time: WaitTime::default(),
            weights: OperationWeights::default(),
            transport: Transport::default(),
            request_timeout: Duration::from_secs(60),
            strict_status: false,
        }
    }
}

impl ProfileConfig {
    /// Creates the profile described by this configuration.
    pub fn build(&self) -> Result<Profile, ProfileError> {
        let mut builder = Profile::builder(self.name.as_str())
            .clients(self.clients)
            .spawn_rate(self.spawn_rate)
            .wait_time(self.wait_time.min, self.wait_time.max)
            .operation_weights(self.weights)
            .transport(self.transport)
            .request_timeout(self.request_timeout)
            .strict_status(self.strict_status);
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }
}

/// Bounds of the uniformly distributed pause between operations.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WaitTime {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl Default for WaitTime {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(3),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty output for a terminal, simplified otherwise.
    #[default]
    Auto,
    /// Pretty printing with colors.
    Pretty,
    /// Simplified plain text output.
    Simplified,
    /// JSON lines.
    Json,
}

/// Logging configuration. Logs are always written to stderr.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level, unless overridden by `RUST_LOG`.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ProfileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} clients, {:?} transport, wait {:?}..={:?})",
            self.name, self.clients, self.transport, self.wait_time.min, self.wait_time.max
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.target, "http://localhost:8080");
            assert_eq!(config.duration, Duration::from_secs(60));
            assert_eq!(config.profiles.len(), 1);

            let profile = &config.profiles[0];
            assert_eq!(profile.weights, OperationWeights::default());
            assert_eq!(profile.wait_time.min, Duration::from_secs(1));
            assert_eq!(profile.wait_time.max, Duration::from_secs(3));
            assert_eq!(profile.transport, Transport::Pooled);
            assert!(!profile.strict_status);

            assert_eq!(config.build_profiles().unwrap().len(), 1);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LT__TARGET", "http://api:9000");
            jail.set_env("LT__DURATION", "5m");
            jail.set_env("LT__LOGGING__LEVEL", "debug");
            jail.set_env("LT__LOGGING__FORMAT", "json");

            let config = Config::load(None).unwrap();

            assert_eq!(config.target, "http://api:9000");
            assert_eq!(config.duration, Duration::from_secs(300));
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            target: http://localhost:8888
            duration: 30s
            profiles:
              - name: fast
                clients: 100
                spawn_rate: 10
                seed: 42
                weights:
                  read: 5
                  create: 0
              - name: debug
                transport: simple
                strict_status: true
                wait_time:
                  min: 1s
                  max: 2s
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.target, "http://localhost:8888");
            assert_eq!(config.duration, Duration::from_secs(30));

            let [fast, debug] = &dbg!(&config).profiles[..] else {
                panic!("expected two profiles");
            };
            assert_eq!(fast.name, "fast");
            assert_eq!(fast.clients, 100);
            assert_eq!(fast.spawn_rate, Some(10.0));
            assert_eq!(fast.seed, Some(42));
            assert_eq!(
                fast.weights,
                OperationWeights {
                    read: 5,
                    health: 1,
                    create: 0,
                    read_missing: 1,
                }
            );

            assert_eq!(debug.clients, 10);
            assert_eq!(debug.transport, Transport::Simple);
            assert!(debug.strict_status);
            assert_eq!(debug.wait_time.max, Duration::from_secs(2));

            let profiles = config.build_profiles().unwrap();
            assert_eq!(profiles[0].name(), "fast");
            assert_eq!(profiles[1].clients(), 10);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            target: http://localhost:8888
            duration: 30s
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("LT__DURATION", "10s");

            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.target, "http://localhost:8888");
            assert_eq!(config.duration, Duration::from_secs(10));

            Ok(())
        });
    }

    #[test]
    fn invalid_profile_is_rejected() {
        let config = ProfileConfig {
            wait_time: WaitTime {
                min: Duration::from_secs(5),
                max: Duration::from_secs(1),
            },
            ..Default::default()
        };

        assert!(matches!(config.build(), Err(ProfileError::WaitTime { .. })));
    }
}
