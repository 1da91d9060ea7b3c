//! Scheduler configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The coordination address is not of the form `host:port`.
    #[error("invalid coordination address {addr:?}: {reason}")]
    InvalidCoordinationAddr {
        /// The offending value.
        addr: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Everything the scheduler needs to start, passed explicitly from the
/// command line. There is no global configuration state.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Path of the Unix socket to listen on.
    pub socket_path: PathBuf,
    /// `host:port` of the coordination service.
    pub coordination_addr: String,
    /// Path of the object store's notification socket.
    pub object_store_path: PathBuf,
}

impl SchedulerConfig {
    /// Build a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the coordination address is not
    /// `host:port` with a numeric port.
    pub fn new(
        socket_path: impl Into<PathBuf>,
        coordination_addr: impl Into<String>,
        object_store_path: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let coordination_addr = coordination_addr.into();
        validate_host_port(&coordination_addr)?;
        Ok(Self {
            socket_path: socket_path.into(),
            coordination_addr,
            object_store_path: object_store_path.into(),
        })
    }
}

fn validate_host_port(addr: &str) -> Result<(), ConfigError> {
    let reject = |reason| ConfigError::InvalidCoordinationAddr {
        addr: addr.to_string(),
        reason,
    };
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| reject("missing ':' separator"))?;
    if host.is_empty() {
        return Err(reject("empty host"));
    }
    if port.parse::<u16>().is_err() {
        return Err(reject("port is not a number in 0..=65535"));
    }
    Ok(())
}
