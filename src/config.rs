//! Configuration module for line-server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::error::{ConfigError, StartupError};
use clap::Parser;
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "line-server")]
#[command(author = "line-server authors")]
#[command(version = "0.1.0")]
#[command(about = "A line-oriented TCP command server", long_about = None)]
#[command(disable_help_flag = true)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// IP host address to bind to
    #[arg(short = 'h', long)]
    pub host: Option<String>,

    /// TCP port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    pub help: Option<bool>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Host name or address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Readiness poll timeout in microseconds
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,
    /// Interval between re-checks while waiting on a socket handoff
    #[serde(default = "default_handoff_wait_ms")]
    pub handoff_wait_ms: u64,
    /// Stop the whole service when any single connection fails
    #[serde(default)]
    pub halt_on_connection_error: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            poll_interval_us: default_poll_interval_us(),
            handoff_wait_ms: default_handoff_wait_ms(),
            halt_on_connection_error: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8023
}

fn default_backlog() -> i32 {
    5
}

fn default_poll_interval_us() -> u64 {
    100
}

fn default_handoff_wait_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Tuning knobs handed to the acceptor and every connection handler.
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    pub backlog: i32,
    pub poll_interval: Duration,
    pub handoff_wait: Duration,
    pub halt_on_connection_error: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            backlog: server.backlog,
            poll_interval: Duration::from_micros(server.poll_interval_us),
            handoff_wait: Duration::from_millis(server.handoff_wait_ms),
            halt_on_connection_error: server.halt_on_connection_error,
        }
    }
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub options: ServerOptions,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at, if any.
    /// CLI arguments take precedence over TOML file values.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let server = toml_config.server;
        Ok(Config {
            host: cli.host.unwrap_or(server.host),
            port: cli.port.unwrap_or(server.port),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
            options: ServerOptions {
                backlog: server.backlog,
                poll_interval: Duration::from_micros(server.poll_interval_us),
                handoff_wait: Duration::from_millis(server.handoff_wait_ms),
                halt_on_connection_error: server.halt_on_connection_error,
            },
        })
    }

    /// Resolve `host:port` into the address the listener binds to.
    ///
    /// IPv4 results are preferred; an IPv6 result is used only when the name
    /// has no IPv4 address.
    pub fn bind_addr(&self) -> Result<SocketAddr, StartupError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|source| StartupError::Resolve {
                host: self.host.clone(),
                source,
            })?
            .collect();

        addrs
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| StartupError::NoAddress {
                host: self.host.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["line-server"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::from_cli(cli(&[])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8023);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.options.backlog, 5);
        assert_eq!(config.options.poll_interval, Duration::from_micros(100));
        assert!(!config.options.halt_on_connection_error);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "127.0.0.1"
            port = 9000
            poll_interval_us = 500
            halt_on_connection_error = true

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.poll_interval_us, 500);
        assert_eq!(config.server.handoff_wait_ms, 100);
        assert!(config.server.halt_on_connection_error);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nhost = \"127.0.0.1\"\nport = 9000\n[logging]\nlevel = \"warn\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config = Config::from_cli(cli(&["-c", path, "-p", "9100"])).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9100);
        assert_eq!(config.log_level, "warn");

        let config = Config::from_cli(cli(&["-c", path, "--log-level", "trace"])).unwrap();
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_short_host_flag() {
        let args = cli(&["-h", "localhost", "-p", "1234"]);
        assert_eq!(args.host.as_deref(), Some("localhost"));
        assert_eq!(args.port, Some(1234));
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(CliArgs::try_parse_from(["line-server", "-p", "70000"]).is_err());
        assert!(CliArgs::try_parse_from(["line-server", "-p", "abc"]).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_cli(cli(&["-c", "/nonexistent/line-server.toml"])).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(..)));
    }

    #[test]
    fn test_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a number\"").unwrap();
        let path = file.path().to_str().unwrap();

        let err = Config::from_cli(cli(&["-c", path])).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(..)));
    }

    #[test]
    fn test_bind_addr_resolution() {
        let config = Config::from_cli(cli(&["-h", "127.0.0.1", "-p", "8023"])).unwrap();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr, "127.0.0.1:8023".parse::<SocketAddr>().unwrap());

        let config = Config::from_cli(cli(&[])).unwrap();
        let addr = config.bind_addr().unwrap();
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 8023);
    }

    #[test]
    fn test_bind_addr_unresolvable() {
        let config = Config::from_cli(cli(&["-h", "no such host.invalid"])).unwrap();
        assert!(config.bind_addr().is_err());
    }
}
