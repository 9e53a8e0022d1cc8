//! Configuration loading for jumpgate.
//!
//! Configuration is loaded from a TOML file (default: `jumpgate.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::transport::{DockerOptions, SshOptions};

/// Config file used when none is given explicitly.
pub const DEFAULT_CONFIG_PATH: &str = "jumpgate.toml";

/// Root configuration for jumpgate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Candidate hosts.
    #[serde(default)]
    pub hosts: HostsConfig,
    /// How to reach hosts over SSH.
    #[serde(default)]
    pub ssh: SshOptions,
    /// How to reach Docker daemons on hosts.
    #[serde(default)]
    pub docker: DockerOptions,
}

/// Candidate hosts configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostsConfig {
    /// Host identifiers, in priority order for index overrides.
    #[serde(default)]
    pub candidates: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load `path`, or [`DEFAULT_CONFIG_PATH`] when `path` is `None`.
    ///
    /// A missing file at the default path yields [`Config::default`]; an
    /// explicitly given path must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    debug!("no {} found, using defaults", DEFAULT_CONFIG_PATH);
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.hosts.candidates.is_empty());
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.ssh.connect_timeout_secs, 30);
        assert_eq!(config.docker.port, 2375);
        assert_eq!(config.docker.timeout_secs, 120);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[hosts]
candidates = ["build-1.example.com", "build-2.example.com"]

[ssh]
user = "ci"
port = 2222
identity_file = "~/.ssh/ci"
strict_host_key_checking = true

[docker]
port = 2376
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.hosts.candidates,
            vec!["build-1.example.com", "build-2.example.com"]
        );
        assert_eq!(config.ssh.user.as_deref(), Some("ci"));
        assert_eq!(config.ssh.port, 2222);
        assert_eq!(config.ssh.identity_file, Some(PathBuf::from("~/.ssh/ci")));
        assert!(config.ssh.strict_host_key_checking);
        assert_eq!(config.ssh.connect_timeout_secs, 30);
        assert_eq!(config.docker.port, 2376);
        assert_eq!(config.docker.timeout_secs, 120);
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.hosts.candidates.is_empty());
        assert_eq!(config.ssh, SshOptions::default());
        assert_eq!(config.docker, DockerOptions::default());
    }

    #[test]
    fn from_file_reads_and_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jumpgate.toml");
        std::fs::write(&path, "[hosts]\ncandidates = [\"localhost\"]\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.hosts.candidates, vec!["localhost"]);

        let loaded = Config::load_or_default(Some(&path)).unwrap();
        assert_eq!(loaded.hosts.candidates, vec!["localhost"]);
    }

    #[test]
    fn from_file_missing_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = Config::load_or_default(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn from_file_invalid_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[ssh]\nport = \"twenty-two\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
