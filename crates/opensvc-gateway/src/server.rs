//! Gateway listener and serving loop

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::rewrite::PrefixStripper;
use crate::upstream::Upstream;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to bind to {address}:{port}: {reason}\n\nTroubleshooting:\n  • Check if another process is using this port: lsof -i :{port}\n  • Try a different --port, or 0 to pick a random one")]
    BindError {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("Failed to accept connection: {0}")]
    AcceptError(std::io::Error),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Failed to read request body: {0}")]
    RequestBody(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Failed to read upstream response: {0}")]
    ResponseBody(String),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Local address to listen on
    pub address: String,
    /// Local port; 0 picks an ephemeral port
    pub port: u16,
    /// Base URI every request is forwarded to
    pub target: Uri,
    /// Literal string removed from responses. Defaults to the target path.
    pub strip_prefix: Option<String>,
}

impl GatewayConfig {
    pub fn new(target: Uri) -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8001,
            target,
            strip_prefix: None,
        }
    }

    pub fn with_bind(mut self, address: impl Into<String>, port: u16) -> Self {
        self.address = address.into();
        self.port = port;
        self
    }

    pub fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    fn effective_prefix(&self) -> String {
        match &self.strip_prefix {
            Some(prefix) => prefix.clone(),
            None => {
                let path = self.target.path();
                if path == "/" {
                    String::new()
                } else {
                    path.to_string()
                }
            }
        }
    }
}

/// A configured gateway that has not bound its socket yet
pub struct Gateway {
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Bind the local listener
    pub async fn listen(self) -> Result<ListeningGateway, GatewayError> {
        let address = self.config.address.clone();
        let port = self.config.port;

        let listener = TcpListener::bind((address.as_str(), port))
            .await
            .map_err(|e| GatewayError::BindError {
                address: address.clone(),
                port,
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        let prefix = self.config.effective_prefix();
        info!(
            "Gateway listening on {} -> {} (stripping {:?})",
            local_addr, self.config.target, prefix
        );

        Ok(ListeningGateway {
            listener,
            local_addr,
            upstream: Arc::new(Upstream::new(
                self.config.target,
                PrefixStripper::new(prefix),
            )),
        })
    }
}

/// A gateway with a bound listener, ready to serve
pub struct ListeningGateway {
    listener: TcpListener,
    local_addr: SocketAddr,
    upstream: Arc<Upstream>,
}

impl ListeningGateway {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// In-flight requests are not drained. A non-transient accept failure
    /// ends the loop with an error.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        debug!(
            "Gateway serving on {} for {}",
            self.local_addr,
            self.upstream.target()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Gateway on {} shutting down", self.local_addr);
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            let upstream = self.upstream.clone();
                            tokio::spawn(Self::handle_connection(stream, peer_addr, upstream));
                        }
                        Err(e) if is_transient(&e) => {
                            warn!("Transient accept error on {}: {}", self.local_addr, e);
                        }
                        Err(e) => {
                            error!("Gateway accept loop failed: {}", e);
                            return Err(GatewayError::AcceptError(e));
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, upstream: Arc<Upstream>) {
        debug!("New gateway connection from {}", peer_addr);

        let service = service_fn(move |request: Request<Incoming>| {
            let upstream = upstream.clone();
            async move { Ok::<_, Infallible>(handle_request(&upstream, request).await) }
        });

        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await
        {
            debug!("Gateway connection error from {}: {}", peer_addr, e);
        }
    }
}

async fn handle_request(upstream: &Upstream, request: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match upstream.forward(request).await {
        Ok(response) => {
            debug!("{} {} -> {}", method, uri, response.status());
            response
        }
        Err(e) => {
            warn!("Proxy error for {} {}: {}", method, uri, e);
            bad_gateway(&e)
        }
    }
}

fn bad_gateway(err: &GatewayError) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(err.to_string())));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset | ErrorKind::Interrupted
    )
}
