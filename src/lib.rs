//! Relay - Minimal Forward Proxy
//!
//! A stateless forward HTTP/HTTPS proxy written in Rust.
//!
//! ## Features
//!
//! - Absolute-form `http://` and `https://` request forwarding
//! - Hop-by-hop header removal on requests and responses
//! - `X-Forwarded-For` accumulation
//! - Streamed request and response bodies
//! - Upstream failures isolated to the request that caused them

pub mod config;
pub mod error;
pub mod proxy;

pub use config::Config;
pub use error::{RelayError, Result};
