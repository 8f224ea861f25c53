//! Forward proxy implementation
//!
//! This module provides the proxy server functionality including:
//! - Absolute-form HTTP/HTTPS request relaying
//! - Hop-by-hop header stripping in both directions
//! - X-Forwarded-For chain maintenance

pub mod handler;
pub mod headers;
pub mod server;
pub mod transport;

pub use handler::{RelayBody, RelayHandler, RelayHandlerConfig};
pub use server::ProxyServer;
pub use transport::UpstreamTransport;
