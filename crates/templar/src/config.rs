//! Configuration parsing and validation.
//!
//! Templar is configured with a TOML file (default `./config/templar.toml`):
//!
//! ```toml
//! [db]
//! path = "./data/templar.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! allow_origins = ["http://localhost:3000"]
//!
//! [segmenter]
//! marker = "---"
//!
//! [log]
//! filter = "templar=debug,tower_http=info"
//! ```
//!
//! Only `[db]` is required. [`load_config`] rejects values that would
//! otherwise fail later at startup.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use templar_core::Segmenter;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Origins allowed by CORS. `"*"` allows any origin.
    #[serde(default = "default_allow_origins")]
    pub allow_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allow_origins: default_allow_origins(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_allow_origins() -> Vec<String> {
    vec!["*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmenterConfig {
    #[serde(default = "default_marker")]
    pub marker: String,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
        }
    }
}

fn default_marker() -> String {
    templar_core::segment::DEFAULT_MARKER.to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directives. `RUST_LOG` takes precedence.
    #[serde(default)]
    pub filter: Option<String>,
}

impl Config {
    /// Defaults for commands run without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/templar.sqlite"),
            },
            server: ServerConfig::default(),
            segmenter: SegmenterConfig::default(),
            log: LogConfig::default(),
        }
    }

    /// Segmenter for the configured marker.
    pub fn segmenter(&self) -> Result<Segmenter> {
        Segmenter::new(&self.segmenter.marker).context("invalid [segmenter] marker")
    }

    /// True when CORS should allow any origin.
    pub fn allows_any_origin(&self) -> bool {
        self.server.allow_origins.iter().any(|o| o.trim() == "*")
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.path.as_os_str().is_empty() {
        bail!("db.path must not be empty");
    }

    if config.server.bind.parse::<SocketAddr>().is_err() {
        bail!(
            "server.bind must be a socket address like 127.0.0.1:8000, got '{}'",
            config.server.bind
        );
    }

    if config.server.allow_origins.is_empty() {
        bail!("server.allow_origins must list at least one origin (use \"*\" for any)");
    }
    for origin in &config.server.allow_origins {
        if origin.trim().is_empty() {
            bail!("server.allow_origins must not contain empty entries");
        }
    }

    config.segmenter()?;

    if let Some(ref filter) = config.log.filter {
        tracing_subscriber::EnvFilter::try_new(filter)
            .with_context(|| format!("invalid log.filter '{}'", filter))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = parse("[db]\npath = \"./data/t.sqlite\"\n").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert!(config.allows_any_origin());
        assert_eq!(config.segmenter.marker, "---");
        assert!(config.log.filter.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
            [db]
            path = "/tmp/templar.sqlite"

            [server]
            bind = "0.0.0.0:9000"
            allow_origins = ["http://localhost:3000"]

            [segmenter]
            marker = "***"

            [log]
            filter = "templar=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(!config.allows_any_origin());
        assert_eq!(config.segmenter().unwrap().marker(), "***");
        assert_eq!(config.log.filter.as_deref(), Some("templar=debug"));
    }

    #[test]
    fn test_missing_db_section_rejected() {
        assert!(parse("[server]\nbind = \"127.0.0.1:8000\"\n").is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = parse("[db]\npath = \"x\"\n[server]\nbind = \"localhost\"\n").unwrap_err();
        assert!(err.to_string().contains("server.bind"));

        let err = parse("[db]\npath = \"x\"\n[server]\nallow_origins = []\n").unwrap_err();
        assert!(err.to_string().contains("allow_origins"));

        let err = parse("[db]\npath = \"x\"\n[segmenter]\nmarker = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("marker"));
    }

    #[test]
    fn test_load_config_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("templar.toml");
        fs::write(&path, "[db]\npath = \"./data/templar.sqlite\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.db.path, PathBuf::from("./data/templar.sqlite"));

        let err = load_config(&tmp.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_minimal_is_valid() {
        validate(&Config::minimal()).unwrap();
    }
}
