//! Demo config loader (strict parsing).

use std::fs;

use serde::Deserialize;
use wirecall_fabric::config::{ClientConfig, ServerConfig};

use crate::error::{DemoError, Result};

/// One document configures both demo binaries
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

impl DemoConfig {
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.client.validate()?;
        Ok(())
    }
}

/// Load from `path`, or defaults when no path was given
pub fn load(path: Option<&str>) -> Result<DemoConfig> {
    match path {
        Some(path) => load_from_file(path),
        None => Ok(DemoConfig::default()),
    }
}

pub fn load_from_file(path: &str) -> Result<DemoConfig> {
    let s = fs::read_to_string(path).map_err(|source| DemoError::ReadConfig {
        path: path.to_string(),
        source,
    })?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<DemoConfig> {
    let cfg: DemoConfig = if s.trim().is_empty() {
        DemoConfig::default()
    } else {
        serde_yaml::from_str(s)?
    };
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_optional() {
        let cfg = load_from_str("server:\n  worker_threads: 4\n").unwrap();
        assert_eq!(cfg.server.worker_threads, 4);
        assert_eq!(cfg.server.port, 20000);
        assert_eq!(cfg.client, ClientConfig::default());

        assert_eq!(load_from_str("").unwrap(), DemoConfig::default());
        assert_eq!(load(None).unwrap(), DemoConfig::default());
    }

    #[test]
    fn client_section_parses() {
        let cfg = load_from_str(
            "client:\n  address: 10.0.0.2\n  port: 4000\n  call_timeout_ms: 250\n",
        )
        .unwrap();
        assert_eq!(cfg.client.resolve().unwrap().to_string(), "10.0.0.2:4000");
        assert_eq!(cfg.client.call_timeout_ms, Some(250));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = load_from_str("server:\n  workers: 4\n").unwrap_err();
        assert!(matches!(err, DemoError::Yaml(_)), "{err}");
        let err = load_from_str("tracing: {}\n").unwrap_err();
        assert!(matches!(err, DemoError::Yaml(_)), "{err}");
    }

    #[test]
    fn values_are_validated() {
        let err = load_from_str("server:\n  worker_threads: 0\n").unwrap_err();
        assert!(matches!(err, DemoError::InvalidConfig(_)), "{err}");
        let err = load_from_str("client:\n  address: not-an-ip\n").unwrap_err();
        assert!(matches!(err, DemoError::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load(Some("/nonexistent/wirecall.yaml")).unwrap_err();
        assert!(matches!(err, DemoError::ReadConfig { .. }));
    }
}
