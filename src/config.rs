//! Configuration loaded from TOML and overridden from the command line

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// Environment variable pointing at a config file
pub const CONFIG_ENV_VAR: &str = "QUERYLOG_CONFIG";

/// Default number of queries retained per prefix
pub const DEFAULT_K_MAX: usize = 50;

/// Timestamp layout of the search logs, as a `chrono` format string
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the file named by
    /// `QUERYLOG_CONFIG` is used if it exists, and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match env::var_os(CONFIG_ENV_VAR) {
                Some(path) if Path::new(&path).exists() => PathBuf::from(path),
                _ => return Ok(Config::default()),
            },
        };

        let raw = fs::read_to_string(&path).map_err(|e| {
            Error::Configuration(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Reject values the index or server cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.index.k_max == 0 {
            return Err(Error::Configuration(
                "index.k_max must be at least 1".to_string(),
            ));
        }
        if self.server.host.trim().is_empty() {
            return Err(Error::Configuration("server.host is empty".to_string()));
        }
        if self.ingest.validate_timestamps && self.ingest.timestamp_format.is_empty() {
            return Err(Error::Configuration(
                "ingest.timestamp_format is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Queries retained per prefix; fixed for the lifetime of an index
    #[serde(default = "default_k_max")]
    pub k_max: usize,
    /// Build on the rayon thread pool
    #[serde(default)]
    pub parallel_build: bool,
    /// Tab-separated search log to build from
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Snapshot to load instead of replaying the log
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            k_max: default_k_max(),
            parallel_build: false,
            log_file: None,
            snapshot: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    /// Skip lines whose timestamp does not match `timestamp_format`
    #[serde(default = "default_true")]
    pub validate_timestamps: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timestamp_format: default_timestamp_format(),
            validate_timestamps: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Listen address; `host` may be an IPv4 or IPv6 literal or a host name
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host = self.host.trim();
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        (host, self.port)
            .to_socket_addrs()
            .map_err(|e| Error::Configuration(format!("invalid listen address {}: {}", host, e)))?
            .next()
            .ok_or_else(|| Error::Configuration(format!("{} resolves to no address", host)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
    /// Write daily-rotated log files here instead of stdout
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
            directory: None,
        }
    }
}

fn default_k_max() -> usize {
    DEFAULT_K_MAX
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.index.k_max, 50);
        assert_eq!(config.ingest.timestamp_format, "%Y-%m-%d %H:%M:%S");
        assert!(config.ingest.validate_timestamps);
        assert_eq!(config.server.port, 8080);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [index]
            k_max = 10
            log_file = "hn_logs.tsv"

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.index.k_max, 10);
        assert_eq!(config.index.log_file, Some(PathBuf::from("hn_logs.tsv")));
        assert!(!config.index.parallel_build);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = Config::default();
        config.index.k_max = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = Config::default();
        config.server.host = " ".to_string();
        assert!(config.validate().is_err());

        assert!(matches!(
            Config::from_toml_str("[index]\nk_max = \"many\""),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("querylog.toml");
        fs::write(&path, "[ingest]\nvalidate_timestamps = false\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(!config.ingest.validate_timestamps);

        let missing = dir.path().join("missing.toml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_socket_addr() {
        let server = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8081,
        };
        assert_eq!(server.socket_addr().unwrap().port(), 8081);

        let ipv6 = ServerConfig {
            host: "::1".to_string(),
            port: 8082,
        };
        assert_eq!(
            ipv6.socket_addr().unwrap(),
            SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::LOCALHOST), 8082)
        );

        let named = ServerConfig {
            host: "localhost".to_string(),
            port: 8083,
        };
        let addr = named.socket_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 8083);

        let bad = ServerConfig {
            host: "not a host".to_string(),
            port: 1,
        };
        assert!(bad.socket_addr().is_err());
    }
}
