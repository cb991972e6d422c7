//! Runtime configuration with the fielded deployment's defaults.
//!
//! Defaults match the fielded deployment and are what both binaries use
//! when nothing overrides them. A YAML file can override any subset of
//! fields; its path comes from the `BASESTATION_CONFIG` environment
//! variable.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{MonitorError, Result};

/// Environment variable naming an optional YAML override file.
pub const CONFIG_ENV: &str = "BASESTATION_CONFIG";

/// Shared settings for the monitoring server and the device simulator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the server binds and devices connect to.
    pub host: String,
    /// TCP port of the monitoring endpoint.
    pub port: u16,
    /// Listen backlog for the accept queue.
    pub backlog: u32,
    /// Maximum number of concurrently connected devices; also the upper
    /// bound of the valid device-id range.
    pub max_devices: usize,
    /// Idle window after which a quiet server terminates. Elapse is fatal
    /// by design; see the server docs before changing this.
    pub idle_timeout_ms: u64,
    /// Delay between consecutive frames on the device side.
    pub send_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8100,
            backlog: 32,
            max_devices: 5,
            idle_timeout_ms: 3 * 60 * 1000,
            send_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Load from the file named by [`CONFIG_ENV`], or fall back to the
    /// deployment defaults when the variable is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_yaml_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Load and parse a YAML override file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| MonitorError::config_error(path.to_path_buf(), e))?;
        serde_yaml_ng::from_str(&text)
            .map_err(|e| MonitorError::config_error(path.to_path_buf(), e))
    }

    /// The monitoring endpoint as a socket address.
    pub fn server_addr(&self) -> Result<SocketAddr> {
        let host: IpAddr = self
            .host
            .parse()
            .map_err(|e| MonitorError::BadAddress { addr: self.host.clone(), source: e })?;
        Ok(SocketAddr::new(host, self.port))
    }

    /// Idle window the server tolerates before terminating.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Cadence of the device send loop.
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_fielded_deployment() {
        let config = Config::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8100);
        assert_eq!(config.backlog, 32);
        assert_eq!(config.max_devices, 5);
        assert_eq!(config.idle_timeout(), Duration::from_secs(180));
        assert_eq!(config.send_interval(), Duration::from_secs(1));
    }

    #[test]
    fn server_addr_combines_host_and_port() {
        let addr = Config::default().server_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:8100");
    }

    #[test]
    fn unparseable_host_is_a_bad_address() {
        let config = Config { host: "not-an-ip".to_string(), ..Config::default() };
        assert!(matches!(config.server_addr(), Err(MonitorError::BadAddress { .. })));
    }

    #[test]
    fn partial_yaml_overrides_keep_remaining_defaults() {
        let config: Config = serde_yaml_ng::from_str("port: 9200\nmax_devices: 2\n").unwrap();
        assert_eq!(config.port, 9200);
        assert_eq!(config.max_devices, 2);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.backlog, 32);
    }

    #[test]
    fn unknown_yaml_fields_are_rejected() {
        let parsed = serde_yaml_ng::from_str::<Config>("prot: 9200\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_override_file_reports_its_path() {
        let err = Config::from_yaml_file(Path::new("/nonexistent/basestation.yaml")).unwrap_err();
        assert!(matches!(err, MonitorError::Config { .. }));
        assert!(err.to_string().contains("basestation.yaml"));
    }
}
