use std::time::Duration;

use clap::{Args, Parser, ValueEnum};

use crate::error::{Result, RelayError};
use crate::proxy::handler::RelayHandlerConfig;

/// Application configuration, read from command-line flags with environment fallbacks
#[derive(Debug, Clone, Parser)]
#[command(name = "relay", version, about = "Minimal forward HTTP/HTTPS proxy")]
pub struct Config {
    /// The port of the proxy server
    #[arg(long, env = "RELAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Host to bind to
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Upstream connect timeout in seconds
    #[arg(long, env = "RELAY_CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Total upstream request deadline in seconds (unset: no deadline)
    #[arg(long, env = "RELAY_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// Redirects to follow upstream before relaying (0: relay 3xx to the client)
    #[arg(long, env = "RELAY_MAX_REDIRECTS", default_value_t = 0)]
    pub max_redirects: usize,

    #[command(flatten)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Args)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", env = "LOG_LEVEL", default_value = "info")]
    pub level: String,

    /// Output format
    #[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Reject settings that parse but cannot be served
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(RelayError::InvalidConfig("host must not be empty".into()));
        }
        if self.connect_timeout == 0 {
            return Err(RelayError::InvalidConfig(
                "connect timeout must be at least one second".into(),
            ));
        }
        if self.request_timeout == Some(0) {
            return Err(RelayError::InvalidConfig(
                "request timeout must be at least one second".into(),
            ));
        }
        Ok(())
    }

    /// Get the proxy server address
    pub fn proxy_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Upstream settings for the relay handler
    pub fn handler_config(&self) -> RelayHandlerConfig {
        RelayHandlerConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            request_timeout: self.request_timeout.map(Duration::from_secs),
            max_redirects: self.max_redirects,
        }
    }
}
