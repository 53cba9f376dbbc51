//! Server configuration loaded from the environment.
//!
//! ```bash
//! # Outgoing event buffer per WebSocket connection. A client that falls this far
//! # behind is dropped from the hub.
//! BASKET_WS_BUFFER=32
//!
//! # Longest accepted group name, in characters
//! BASKET_MAX_GROUP_NAME=100
//! ```

use std::env;
use thiserror::Error;

pub const DEFAULT_WS_BUFFER: usize = 32;
pub const DEFAULT_MAX_GROUP_NAME: usize = 100;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ws_buffer: usize,
    pub max_group_name: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_buffer: DEFAULT_WS_BUFFER,
            max_group_name: DEFAULT_MAX_GROUP_NAME,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} is not a number")]
    NotANumber { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            ws_buffer: positive(&lookup, "BASKET_WS_BUFFER", DEFAULT_WS_BUFFER)?,
            max_group_name: positive(&lookup, "BASKET_MAX_GROUP_NAME", DEFAULT_MAX_GROUP_NAME)?,
        })
    }
}

fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    let value: usize = raw.trim().parse().map_err(|_| ConfigError::NotANumber {
        var,
        value: raw.clone(),
    })?;
    if value == 0 {
        return Err(ConfigError::Zero(var));
    }
    Ok(value)
}
