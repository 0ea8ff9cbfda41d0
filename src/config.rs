//! Configuration module for vcalc-server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the calculation server
#[derive(Parser, Debug)]
#[command(name = "vcalc-server")]
#[command(author = "vcalc-server authors")]
#[command(version = "0.1.0")]
#[command(
    about = "Vector calculation server with salted SHA-1 authentication",
    long_about = None
)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:33333)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// User database file with one login:secret entry per line
    #[arg(short = 'u', long)]
    pub users: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Shut down after this many seconds without a connection
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Per-connection read/write timeout in seconds
    #[arg(long)]
    pub io_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Idle shutdown threshold in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    /// Per-connection read/write timeout in seconds
    #[serde(default = "default_io_timeout")]
    pub io_timeout: u64,
    /// Upper bound on one readiness wait in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            idle_timeout: default_idle_timeout(),
            io_timeout: default_io_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Authentication-related configuration
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    /// User database file
    #[serde(default = "default_users")]
    pub users: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:33333".to_string()
}

fn default_idle_timeout() -> u64 {
    300 // 5 minutes
}

fn default_io_timeout() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_users() -> PathBuf {
    PathBuf::from("/etc/vcalc.conf")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub users: PathBuf,
    pub idle_timeout: Duration,
    pub io_timeout: Duration,
    pub poll_interval: Duration,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve configuration from already-parsed CLI arguments.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = cli.listen.unwrap_or(toml_config.server.listen);
        let listen: SocketAddr = listen
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid listen address '{listen}'")))?;

        let config = Config {
            listen,
            users: cli.users.unwrap_or(toml_config.auth.users),
            idle_timeout: Duration::from_secs(
                cli.idle_timeout.unwrap_or(toml_config.server.idle_timeout),
            ),
            io_timeout: Duration::from_secs(
                cli.io_timeout.unwrap_or(toml_config.server.io_timeout),
            ),
            poll_interval: Duration::from_millis(toml_config.server.poll_interval_ms),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
            log_file: cli.log_file.or(toml_config.logging.file),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.users.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "user database path cannot be empty".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "idle timeout must be positive".to_string(),
            ));
        }
        if self.io_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "i/o timeout must be positive".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll interval must be positive".to_string(),
            ));
        }
        if matches!(&self.log_file, Some(path) if path.as_os_str().is_empty()) {
            return Err(ConfigError::Invalid(
                "log file path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to open log file '{}': {}", .0.display(), .1)]
    LogFile(PathBuf, #[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["vcalc-server"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:33333");
        assert_eq!(config.server.idle_timeout, 300);
        assert_eq!(config.server.io_timeout, 10);
        assert_eq!(config.server.poll_interval_ms, 1000);
        assert_eq!(config.auth.users, PathBuf::from("/etc/vcalc.conf"));
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:4000"
            idle_timeout = 60
            io_timeout = 3
            poll_interval_ms = 250

            [auth]
            users = "users.db"

            [logging]
            level = "debug"
            file = "server.log"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:4000");
        assert_eq!(config.server.idle_timeout, 60);
        assert_eq!(config.server.io_timeout, 3);
        assert_eq!(config.server.poll_interval_ms, 250);
        assert_eq!(config.auth.users, PathBuf::from("users.db"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("server.log")));
    }

    #[test]
    fn test_defaults_without_file() {
        let config = Config::from_args(cli(&[])).unwrap();
        assert_eq!(config.listen, "0.0.0.0:33333".parse().unwrap());
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.io_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[server]\nlisten = \"127.0.0.1:4000\"\nidle_timeout = 60\n\n[logging]\nlevel = \"warn\"\n"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = Config::from_args(cli(&[
            "--config",
            &path,
            "-l",
            "127.0.0.1:5000",
            "-u",
            "users.db",
            "--log-level",
            "debug",
        ]))
        .unwrap();

        assert_eq!(config.listen, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.users, PathBuf::from("users.db"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_values_rejected() {
        for args in [
            vec!["--listen", "not-an-address"],
            vec!["--idle-timeout", "0"],
            vec!["--io-timeout", "0"],
        ] {
            assert!(
                matches!(Config::from_args(cli(&args)), Err(ConfigError::Invalid(_))),
                "accepted {args:?}"
            );
        }
    }

    #[test]
    fn test_empty_paths_rejected() {
        let mut toml_config = TomlConfig::default();
        toml_config.auth.users = PathBuf::new();
        assert!(matches!(
            Config::merge(cli(&[]), toml_config),
            Err(ConfigError::Invalid(_))
        ));

        let mut toml_config = TomlConfig::default();
        toml_config.logging.file = Some(PathBuf::new());
        assert!(matches!(
            Config::merge(cli(&[]), toml_config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let result = Config::from_args(cli(&["--config", path.to_str().unwrap()]));
        assert!(matches!(result, Err(ConfigError::FileRead(_, _))));
    }

    #[test]
    fn test_malformed_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server\nlisten = 1").unwrap();
        let result = Config::from_args(cli(&["-c", file.path().to_str().unwrap()]));
        assert!(matches!(result, Err(ConfigError::TomlParse(_, _))));
    }
}
