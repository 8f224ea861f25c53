//! Relay request handler
//!
//! Validates an absolute-form proxy request, sanitizes it, forwards it to the
//! origin server and streams the response back.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use tracing::{debug, error, info, instrument};

use crate::error::{RelayError, Result};
use crate::proxy::headers::{
    append_forwarded_for, client_ip, copy_headers, forwarded_for, remove_hop_by_hop_headers,
};
use crate::proxy::transport::UpstreamTransport;

/// Response body produced by the relay: either a streamed upstream body or a local error body
pub type RelayBody = UnsyncBoxBody<Bytes, RelayError>;

/// Configuration for the relay handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayHandlerConfig {
    /// Timeout for establishing upstream connections
    pub connect_timeout: Duration,
    /// Total deadline for an upstream request, body included
    pub request_timeout: Option<Duration>,
    /// Redirects followed upstream; zero relays 3xx responses untouched
    pub max_redirects: usize,
}

impl Default for RelayHandlerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            max_redirects: 0,
        }
    }
}

/// Relay request handler
///
/// Stateless across requests; the transport is a shareable client handle.
#[derive(Clone)]
pub struct RelayHandler {
    transport: UpstreamTransport,
}

impl RelayHandler {
    pub fn new(config: RelayHandlerConfig) -> Result<Self> {
        Ok(Self {
            transport: UpstreamTransport::new(&config)?,
        })
    }

    /// Handle one inbound proxy request
    ///
    /// Always produces a response: the relayed upstream response, a 400 for
    /// an unusable target, or a 500 when the upstream cannot be reached.
    #[instrument(skip_all, fields(method = %req.method(), uri = %req.uri()))]
    pub async fn handle<B>(
        &self,
        req: Request<B>,
        client_addr: Option<SocketAddr>,
    ) -> Response<RelayBody>
    where
        B: Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>> + Send,
    {
        let remote = client_addr.map_or_else(|| "-".to_string(), |addr| addr.to_string());
        info!("{} {} {}", remote, req.method(), req.uri());

        let url = match UpstreamTransport::parse_target(req.uri()) {
            Ok(url) => url,
            Err(e) => {
                error!("{}", e);
                return error_response(e.status_code(), e.to_string());
            }
        };

        let (mut parts, body) = req.into_parts();
        remove_hop_by_hop_headers(&mut parts.headers);

        match client_ip(client_addr) {
            Ok(ip) => append_forwarded_for(&mut parts.headers, ip),
            Err(e) => error!(error = %e, "Skipping X-Forwarded-For"),
        }
        debug!(x_forwarded_for = ?forwarded_for(&parts.headers), "Forwarding chain");

        let mut upstream = match self
            .transport
            .send(parts.method, url, parts.headers, body)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Upstream request failed");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server Error");
            }
        };

        let status = upstream.status();
        let mut upstream_headers = std::mem::take(upstream.headers_mut());
        remove_hop_by_hop_headers(&mut upstream_headers);

        let stream = upstream
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(RelayError::from);

        let mut response = Response::new(StreamBody::new(stream).boxed_unsync());
        *response.status_mut() = status;
        copy_headers(response.headers_mut(), &upstream_headers);
        response
    }
}

/// Create a terminal plain-text response
fn error_response(status: StatusCode, message: impl Into<String>) -> Response<RelayBody> {
    let body = Full::new(Bytes::from(message.into()))
        .map_err(|never| match never {})
        .boxed_unsync();

    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
