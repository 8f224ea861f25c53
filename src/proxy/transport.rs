//! Upstream transport
//!
//! Target validation and request dispatch towards origin servers.

use std::error::Error as StdError;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::HeaderMap;
use hyper::{Method, Uri};
use reqwest::redirect::Policy;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{RelayError, Result};
use crate::proxy::handler::RelayHandlerConfig;

/// Inbound body chunks buffered between the client connection and the upstream request
const BODY_CHANNEL_CAPACITY: usize = 8;

/// Upstream transport
///
/// Holds the single HTTP client used for every forwarded request.
#[derive(Clone)]
pub struct UpstreamTransport {
    client: reqwest::Client,
}

impl UpstreamTransport {
    /// Build the upstream client from handler settings
    pub fn new(config: &RelayHandlerConfig) -> Result<Self> {
        let redirect = if config.max_redirects == 0 {
            Policy::none()
        } else {
            Policy::limited(config.max_redirects)
        };

        let mut builder = reqwest::Client::builder()
            .no_proxy()
            .redirect(redirect)
            .connect_timeout(config.connect_timeout);

        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| RelayError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Validate an absolute-form target and turn it into the upstream URL
    ///
    /// Only `http` and `https` are accepted; origin-form targets carry no scheme
    /// and are rejected with an empty one.
    pub fn parse_target(uri: &Uri) -> Result<Url> {
        let scheme = uri.scheme_str().unwrap_or_default().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(RelayError::UnsupportedScheme(scheme));
        }

        if uri.host().map_or(true, str::is_empty) {
            return Err(RelayError::InvalidTarget("Missing host in URI".to_string()));
        }

        Ok(Url::parse(&uri.to_string())?)
    }

    /// Send a sanitized request upstream and return the response once its head arrives
    #[instrument(skip_all, fields(method = %method, url = %url))]
    pub async fn send<B>(
        &self,
        method: Method,
        url: Url,
        headers: HeaderMap,
        body: B,
    ) -> Result<reqwest::Response>
    where
        B: Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>> + Send,
    {
        let mut request = self.client.request(method, url).headers(headers);

        if !body.is_end_stream() {
            request = request.body(Self::stream_body(body));
        }

        let response = request.send().await?;
        debug!(status = %response.status(), "Upstream response received");
        Ok(response)
    }

    /// Pump the inbound body into a channel-backed upstream body
    ///
    /// Trailers are dropped. A read error on the inbound side aborts the upstream body.
    fn stream_body<B>(mut body: B) -> reqwest::Body
    where
        B: Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>> + Send,
    {
        let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(BODY_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(frame) = body.frame().await {
                let chunk = match frame {
                    Ok(frame) => match frame.into_data() {
                        Ok(data) => Ok(data),
                        Err(_) => continue,
                    },
                    Err(e) => Err(std::io::Error::other(e)),
                };

                let failed = chunk.is_err();
                if tx.send(chunk).await.is_err() || failed {
                    break;
                }
            }
        });

        reqwest::Body::wrap_stream(ReceiverStream::new(rx))
    }
}
