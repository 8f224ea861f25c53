//! Proxy server implementation using hyper
//!
//! Accepts plain HTTP connections and hands every request to the relay handler.

use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::error::{RelayError, Result};
use crate::proxy::handler::{RelayHandler, RelayHandlerConfig};

/// Proxy server
pub struct ProxyServer {
    addr: String,
    handler: RelayHandler,
}

impl ProxyServer {
    /// Create a new proxy server
    pub fn new(addr: impl Into<String>, handler_config: RelayHandlerConfig) -> Result<Self> {
        Ok(Self {
            addr: addr.into(),
            handler: RelayHandler::new(handler_config)?,
        })
    }

    /// Bind the listening socket and run until shutdown
    #[instrument(skip(self, shutdown), fields(addr = %self.addr))]
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        info!("Proxy server listening on {}", listener.local_addr()?);

        self.serve(listener, shutdown).await
    }

    /// Accept connections on an already bound listener until shutdown
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, client_addr)) => {
                            let handler = self.handler.clone();

                            tokio::spawn(async move {
                                if let Err(e) =
                                    Self::handle_connection(stream, client_addr, handler).await
                                {
                                    debug!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Proxy server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle a single connection
    async fn handle_connection(
        stream: TcpStream,
        client_addr: SocketAddr,
        handler: RelayHandler,
    ) -> Result<()> {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req: Request<Incoming>| {
            let handler = handler.clone();

            async move { Ok::<_, Infallible>(handler.handle(req, Some(client_addr)).await) }
        });

        http1::Builder::new()
            .title_case_headers(true)
            .serve_connection(io, service)
            .await
            .map_err(RelayError::from)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use http_body_util::{BodyExt, Empty, Full};
    use hyper::header::HeaderMap;
    use hyper::{Method, Response, StatusCode};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Send one absolute-form request to the proxy over a fresh connection
    async fn send_via_proxy(
        proxy: SocketAddr,
        method: Method,
        uri: &str,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let stream = TcpStream::connect(proxy).await.unwrap();
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Empty::<Bytes>::new())
            .unwrap();

        let response = timeout(Duration::from_secs(5), sender.send_request(req))
            .await
            .unwrap()
            .unwrap();
        let (parts, body) = response.into_parts();
        let body = body.collect().await.unwrap().to_bytes();
        (parts.status, parts.headers, body)
    }

    async fn start_proxy() -> (SocketAddr, watch::Sender<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = ProxyServer::new(addr.to_string(), RelayHandlerConfig::default()).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            server.serve(listener, shutdown_rx).await.unwrap();
        });

        (addr, shutdown_tx)
    }

    async fn start_origin() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let service = service_fn(|req: Request<Incoming>| async move {
                        let chain = req
                            .headers()
                            .get_all("x-forwarded-for")
                            .iter()
                            .filter_map(|v| v.to_str().ok())
                            .collect::<Vec<_>>()
                            .join("|");
                        Ok::<_, Infallible>(
                            Response::builder()
                                .header("Content-Type", "text/plain")
                                .header("Connection", "close")
                                .header("X-Seen-Forwarded-For", chain)
                                .body(Full::new(Bytes::from("hello")))
                                .unwrap(),
                        )
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn relays_absolute_form_request() {
        let origin = start_origin().await;
        let (proxy, _shutdown) = start_proxy().await;

        let (status, headers, body) =
            send_via_proxy(proxy, Method::GET, &format!("http://{}/foo", origin)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from("hello"));
        assert_eq!(headers.get("content-type").unwrap(), "text/plain");
        assert_eq!(headers.get("x-seen-forwarded-for").unwrap(), "127.0.0.1");
        assert!(headers.get("connection").is_none());
    }

    #[tokio::test]
    async fn rejects_unsupported_scheme() {
        let (proxy, _shutdown) = start_proxy().await;

        let (status, _, body) = send_via_proxy(proxy, Method::GET, "ftp://host/x").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, Bytes::from("unsupport protocol scheme: ftp"));
    }

    #[tokio::test]
    async fn keeps_serving_after_upstream_failure() {
        let dead = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let origin = start_origin().await;
        let (proxy, _shutdown) = start_proxy().await;

        let (status, _, body) =
            send_via_proxy(proxy, Method::GET, &format!("http://{}/", dead)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, Bytes::from("Server Error"));

        let (status, _, body) =
            send_via_proxy(proxy, Method::GET, &format!("http://{}/", origin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from("hello"));
    }

    #[tokio::test]
    async fn stops_accepting_after_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = ProxyServer::new(addr.to_string(), RelayHandlerConfig::default()).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

        shutdown_tx.send(true).unwrap();
        let result = timeout(Duration::from_secs(1), task)
            .await
            .expect("serve did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
