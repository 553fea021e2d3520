//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::limiter::{AttemptPolicy, LockoutMode};

/// Prefix for environment overrides, e.g. `TURNSTILE__SERVER__GRPC_ADDR`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Background eviction configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Protected operations, keyed by guard name
    #[serde(default = "default_guards")]
    pub guards: BTreeMap<String, GuardConfig>,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            sweeper: SweeperConfig::default(),
            guards: default_guards(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8081))
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `turnstile=debug`.
    /// `RUST_LOG` and `--log-level` take precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Background eviction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between sweeps; zero disables the sweeper
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

impl SweeperConfig {
    /// The sweep interval, or `None` when sweeping is disabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

fn default_sweep_interval() -> u64 {
    60
}

/// Limits for one protected operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Attempts allowed per window
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Lockout length in seconds
    #[serde(default = "default_block_secs")]
    pub block_secs: u64,

    /// Behavior of attempts made during a lockout
    #[serde(default)]
    pub lockout: LockoutMode,

    /// Trim and lowercase identifiers before they reach the limiter
    #[serde(default = "default_normalize")]
    pub normalize_identifiers: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
            block_secs: default_block_secs(),
            lockout: LockoutMode::default(),
            normalize_identifiers: default_normalize(),
        }
    }
}

impl GuardConfig {
    /// Build the limiter policy described by this guard.
    pub fn to_policy(&self) -> Result<AttemptPolicy> {
        Ok(AttemptPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.window_secs),
            Duration::from_secs(self.block_secs),
        )?
        .with_lockout(self.lockout))
    }
}

fn default_max_attempts() -> u32 {
    crate::limiter::DEFAULT_MAX_ATTEMPTS
}

fn default_window_secs() -> u64 {
    crate::limiter::DEFAULT_WINDOW.as_secs()
}

fn default_block_secs() -> u64 {
    crate::limiter::DEFAULT_BLOCK.as_secs()
}

fn default_normalize() -> bool {
    true
}

fn default_guards() -> BTreeMap<String, GuardConfig> {
    ["login", "register", "create_poll"]
        .into_iter()
        .map(|name| (name.to_string(), GuardConfig::default()))
        .collect()
}

/// The default guard set as a YAML document, used as the lowest config layer.
fn default_guards_yaml() -> Result<String> {
    #[derive(Serialize)]
    struct Defaults {
        guards: BTreeMap<String, GuardConfig>,
    }

    serde_yaml::to_string(&Defaults {
        guards: default_guards(),
    })
    .map_err(|e| TurnstileError::Config(format!("Failed to render default guards: {}", e)))
}

impl TurnstileConfig {
    /// Load configuration from an optional file layered under
    /// `TURNSTILE__*` environment overrides.
    ///
    /// A file that declares `guards` replaces the default guard set.
    /// Otherwise the defaults are kept and environment overrides are merged
    /// into them guard by guard.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading overrides from `env` instead of
    /// the process environment when it is given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let file_declares_guards = match path {
            Some(path) => config::Config::builder()
                .add_source(config::File::from(path))
                .build()?
                .get_table("guards")
                .is_ok(),
            None => false,
        };

        let mut builder = config::Config::builder();

        if !file_declares_guards {
            builder = builder.add_source(config::File::from_str(
                &default_guards_yaml()?,
                config::FileFormat::Yaml,
            ));
        }

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path));
        }

        let config: TurnstileConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that at least one guard exists and every guard has a usable policy.
    pub fn validate(&self) -> Result<()> {
        if self.guards.is_empty() {
            return Err(TurnstileError::Config(
                "at least one guard must be configured".to_string(),
            ));
        }

        for (name, guard) in &self.guards {
            if name.trim().is_empty() {
                return Err(TurnstileError::Config("guard names must be non-empty".to_string()));
            }
            guard.to_policy().map_err(|e| match e {
                TurnstileError::InvalidPolicy(msg) => {
                    TurnstileError::InvalidPolicy(format!("guard '{}': {}", name, msg))
                }
                other => other,
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TurnstileConfig::default();
        assert_eq!(config.server.grpc_addr.to_string(), "127.0.0.1:8081");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.sweeper.interval(), Some(Duration::from_secs(60)));
        assert_eq!(
            config.guards.keys().collect::<Vec<_>>(),
            vec!["create_poll", "login", "register"]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  grpc_addr: 0.0.0.0:9000
logging:
  level: turnstile=debug
  json: true
sweeper:
  interval_secs: 0
guards:
  login:
    max_attempts: 3
    window_secs: 300
    lockout: extend
  password_reset:
    block_secs: 3600
    normalize_identifiers: false
"#;
        let config = TurnstileConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.grpc_addr.port(), 9000);
        assert!(config.logging.json);
        assert_eq!(config.sweeper.interval(), None);
        assert_eq!(config.guards.len(), 2);

        let login = config.guards["login"].to_policy().unwrap();
        assert_eq!(login.max_attempts(), 3);
        assert_eq!(login.window(), Duration::from_secs(300));
        assert_eq!(login.block(), Duration::from_secs(900));
        assert_eq!(login.lockout(), LockoutMode::Extend);

        let reset = &config.guards["password_reset"];
        assert_eq!(reset.max_attempts, 5);
        assert_eq!(reset.block_secs, 3600);
        assert!(!reset.normalize_identifiers);
    }

    #[test]
    fn test_missing_guards_use_defaults() {
        let config = TurnstileConfig::from_yaml("server:\n  grpc_addr: 127.0.0.1:7000\n").unwrap();
        assert!(config.guards.contains_key("login"));
    }

    #[test]
    fn test_empty_guards_rejected() {
        let result = TurnstileConfig::from_yaml("guards: {}\n");
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_invalid_guard_policy_rejected() {
        let yaml = r#"
guards:
  login:
    max_attempts: 0
"#;
        match TurnstileConfig::from_yaml(yaml) {
            Err(TurnstileError::InvalidPolicy(msg)) => assert!(msg.contains("login")),
            other => panic!("expected invalid policy, got {:?}", other),
        }
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = TurnstileConfig::load(None).unwrap();
        assert!(config.guards.contains_key("create_poll"));
    }

    fn env(vars: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_env_override_keeps_other_guards() {
        let config = TurnstileConfig::load_with_env(
            None,
            env(&[("TURNSTILE__GUARDS__LOGIN__MAX_ATTEMPTS", "3")]),
        )
        .unwrap();

        assert_eq!(
            config.guards.keys().collect::<Vec<_>>(),
            vec!["create_poll", "login", "register"]
        );
        assert_eq!(config.guards["login"].max_attempts, 3);
        assert_eq!(config.guards["login"].window_secs, 900);
        assert_eq!(config.guards["register"], GuardConfig::default());
    }

    #[test]
    fn test_env_override_adds_guard() {
        let config = TurnstileConfig::load_with_env(
            None,
            env(&[("TURNSTILE__GUARDS__VOTE__BLOCK_SECS", "60")]),
        )
        .unwrap();

        assert_eq!(config.guards.len(), 4);
        assert_eq!(config.guards["vote"].block_secs, 60);
        assert_eq!(config.guards["vote"].max_attempts, 5);
    }

    #[test]
    fn test_env_override_server_addr() {
        let config = TurnstileConfig::load_with_env(
            None,
            env(&[("TURNSTILE__SERVER__GRPC_ADDR", "0.0.0.0:9100")]),
        )
        .unwrap();

        assert_eq!(config.server.grpc_addr.port(), 9100);
        assert_eq!(config.guards.len(), 3);
    }

    #[test]
    fn test_env_override_layers_on_file_guards() {
        let path = std::env::temp_dir().join(format!(
            "turnstile-config-env-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "guards:\n  login:\n    max_attempts: 2\n").unwrap();

        let config = TurnstileConfig::load_with_env(
            Some(&path),
            env(&[("TURNSTILE__GUARDS__LOGIN__WINDOW_SECS", "120")]),
        );
        std::fs::remove_file(&path).unwrap();

        let config = config.unwrap();
        assert_eq!(config.guards.len(), 1);
        assert_eq!(config.guards["login"].max_attempts, 2);
        assert_eq!(config.guards["login"].window_secs, 120);
    }

    #[test]
    fn test_file_without_guards_keeps_defaults() {
        let path = std::env::temp_dir().join(format!(
            "turnstile-config-noguards-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "sweeper:\n  interval_secs: 5\n").unwrap();

        let config = TurnstileConfig::load_with_env(
            Some(&path),
            env(&[("TURNSTILE__GUARDS__LOGIN__MAX_ATTEMPTS", "4")]),
        );
        std::fs::remove_file(&path).unwrap();

        let config = config.unwrap();
        assert_eq!(config.sweeper.interval_secs, 5);
        assert_eq!(config.guards.len(), 3);
        assert_eq!(config.guards["login"].max_attempts, 4);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("turnstile-config-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "guards:\n  login:\n    max_attempts: 2\n    window_secs: 60\n",
        )
        .unwrap();

        let config = TurnstileConfig::load(Some(&path));
        std::fs::remove_file(&path).unwrap();

        let config = config.unwrap();
        assert_eq!(config.guards.len(), 1);
        assert_eq!(config.guards["login"].max_attempts, 2);
        assert_eq!(config.guards["login"].window_secs, 60);
    }
}
