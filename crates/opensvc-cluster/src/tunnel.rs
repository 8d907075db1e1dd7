//! Authenticated tunnel to the API server
//!
//! Binds a local plain-HTTP listener and replays every request against the API
//! server through the cluster client, which adds the kubeconfig credentials.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{HeaderValue, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use kube::Client;
use opensvc_gateway::strip_hop_by_hop;
use std::convert::Infallible;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::ClusterConnection;

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to bind tunnel to {address}:{port}: {reason}")]
    BindError {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("Tunnel accept loop failed: {0}")]
    AcceptError(std::io::Error),

    #[error("Invalid request URI: {0}")]
    InvalidUri(String),

    #[error("Failed to read request body: {0}")]
    RequestBody(String),

    #[error("API server request failed: {0}")]
    Api(String),

    #[error("Failed to read API server response: {0}")]
    ResponseBody(String),
}

/// Tunnel that has not bound its listener yet
pub struct ApiTunnel {
    client: Client,
}

impl ApiTunnel {
    pub fn new(connection: &ClusterConnection) -> Self {
        Self {
            client: connection.client().clone(),
        }
    }

    /// Bind the tunnel listener; port 0 picks an ephemeral port
    pub async fn listen(self, address: &str, port: u16) -> Result<ListeningTunnel, TunnelError> {
        let listener = TcpListener::bind((address, port))
            .await
            .map_err(|e| TunnelError::BindError {
                address: address.to_string(),
                port,
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        info!("Starting to serve API tunnel on {}", local_addr);

        Ok(ListeningTunnel {
            listener,
            local_addr,
            client: self.client,
        })
    }
}

pub struct ListeningTunnel {
    listener: TcpListener,
    local_addr: SocketAddr,
    client: Client,
}

impl ListeningTunnel {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` is cancelled or accepting fails
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), TunnelError> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("API tunnel on {} shutting down", self.local_addr);
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = accepted.map_err(|e| {
                        error!("API tunnel accept failed: {}", e);
                        TunnelError::AcceptError(e)
                    })?;
                    let client = self.client.clone();

                    tokio::spawn(async move {
                        let service = service_fn(move |request: Request<Incoming>| {
                            let client = client.clone();
                            async move { Ok::<_, Infallible>(handle_request(&client, request).await) }
                        });

                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            debug!("API tunnel connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
            }
        }
    }
}

async fn handle_request(client: &Client, request: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match forward(client, request).await {
        Ok(response) => {
            debug!("API {} {} -> {}", method, uri, response.status());
            response
        }
        Err(e) => {
            warn!("API tunnel error for {} {}: {}", method, uri, e);
            let mut response = Response::new(Full::new(Bytes::from(e.to_string())));
            *response.status_mut() = StatusCode::BAD_GATEWAY;
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            response
        }
    }
}

async fn forward(
    client: &Client,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, TunnelError> {
    let (mut parts, body) = request.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| TunnelError::RequestBody(e.to_string()))?
        .to_bytes();

    // The client's base URI layer supplies scheme and authority
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    parts.uri = Uri::try_from(path_and_query).map_err(|e| TunnelError::InvalidUri(e.to_string()))?;
    parts.headers.remove(HOST);
    strip_hop_by_hop(&mut parts.headers);

    let response = client
        .send(Request::from_parts(parts, kube::client::Body::from(body.to_vec())))
        .await
        .map_err(|e| TunnelError::Api(e.to_string()))?;

    let (mut parts, body) = response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| TunnelError::ResponseBody(e.to_string()))?
        .to_bytes();

    strip_hop_by_hop(&mut parts.headers);
    parts.headers.remove(CONTENT_LENGTH);
    Ok(Response::from_parts(parts, Full::new(body)))
}
