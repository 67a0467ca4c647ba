//! Transport configuration.
//!
//! Both configs deserialize from any serde format with every field optional,
//! and offer chained setters for programmatic construction.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

use crate::codec::frame::DEFAULT_MAX_FRAME_LEN;
use crate::error::{Error, Result};

pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 20000;

fn resolve(address: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = address
        .parse()
        .map_err(|_| Error::InvalidAddress(address.to_string()))?;
    Ok(SocketAddr::new(ip, port))
}

/// Client side of a connection
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// IP literal of the server
    pub address: String,
    pub port: u16,
    pub nodelay: bool,
    /// Resolve calls that get no response within this many milliseconds
    pub call_timeout_ms: Option<u64>,
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            nodelay: true,
            call_timeout_ms: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Point the client at an already resolved socket address
    pub fn socket_addr(mut self, addr: SocketAddr) -> Self {
        self.address = addr.ip().to_string();
        self.port = addr.port();
        self
    }

    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn call_timeout_duration(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }

    pub fn resolve(&self) -> Result<SocketAddr> {
        resolve(&self.address, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        self.resolve()?;
        if self.max_frame_len == 0 {
            return Err(Error::InvalidConfig("max_frame_len must be > 0".into()));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig("call_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

/// Listening side
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// IP literal to bind
    pub address: String,
    pub port: u16,
    /// Accept backlog handed to `listen(2)`
    pub backlog: i32,
    pub worker_threads: usize,
    /// Upper bound on one readiness wait of the I/O thread
    pub poll_interval_ms: u64,
    /// A connection whose pending output makes no progress for this long is closed
    pub write_timeout_ms: u64,
    pub max_frame_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            backlog: 5,
            worker_threads: 1,
            poll_interval_ms: 1000,
            write_timeout_ms: 5000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn write_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn resolve(&self) -> Result<SocketAddr> {
        resolve(&self.address, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        self.resolve()?;
        if self.worker_threads == 0 {
            return Err(Error::InvalidConfig("worker_threads must be >= 1".into()));
        }
        if self.backlog <= 0 {
            return Err(Error::InvalidConfig("backlog must be > 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be > 0".into()));
        }
        if self.write_timeout_ms == 0 {
            return Err(Error::InvalidConfig("write_timeout_ms must be > 0".into()));
        }
        if self.max_frame_len == 0 {
            return Err(Error::InvalidConfig("max_frame_len must be > 0".into()));
        }
        Ok(())
    }
}
