//! Upstream forwarding
//!
//! Uses hyper-util's pooled client to reach the target. Requests are passed
//! through as-is apart from hop-by-hop headers and `Host`; responses are fully
//! buffered so the prefix rewrite can fix up `Content-Length`.

use bytes::Bytes;
use http::header::{
    HeaderName, ACCEPT_ENCODING, CONNECTION, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE,
    TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use http::uri::PathAndQuery;
use http::{HeaderMap, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use crate::rewrite::PrefixStripper;
use crate::server::GatewayError;

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Forwards requests to a fixed target and rewrites the responses
pub(crate) struct Upstream {
    client: HttpClient,
    target: Uri,
    stripper: PrefixStripper,
}

impl Upstream {
    pub(crate) fn new(target: Uri, stripper: PrefixStripper) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            target,
            stripper,
        }
    }

    pub(crate) fn target(&self) -> &Uri {
        &self.target
    }

    /// Forward a request and return the rewritten response
    pub(crate) async fn forward(
        &self,
        request: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, GatewayError> {
        let (mut parts, body) = request.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| GatewayError::RequestBody(e.to_string()))?
            .to_bytes();

        parts.uri = join_target(&self.target, &parts.uri)?;
        parts.headers.remove(HOST);
        strip_hop_by_hop(&mut parts.headers);
        if !self.stripper.prefix().is_empty() {
            // Compressed bodies cannot be rewritten
            parts.headers.remove(ACCEPT_ENCODING);
        }

        debug!("Forwarding {} {}", parts.method, parts.uri);

        let response = self
            .client
            .request(Request::from_parts(parts, Full::new(body)))
            .await
            .map_err(|e| GatewayError::Upstream(error_chain(&e)))?;

        let (mut parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| GatewayError::ResponseBody(e.to_string()))?
            .to_bytes();

        strip_hop_by_hop(&mut parts.headers);
        Ok(self.stripper.rewrite_response(parts, body))
    }
}

/// Join the inbound request path and query onto the target URI.
///
/// Exactly one `/` separates the target path from the inbound path; queries
/// from both sides are kept, target first.
pub fn join_target(target: &Uri, inbound: &Uri) -> Result<Uri, GatewayError> {
    let path = single_joining_slash(target.path(), inbound.path());
    let query = match (
        target.query().filter(|q| !q.is_empty()),
        inbound.query().filter(|q| !q.is_empty()),
    ) {
        (Some(a), Some(b)) => Some(format!("{}&{}", a, b)),
        (Some(q), None) | (None, Some(q)) => Some(q.to_string()),
        (None, None) => None,
    };

    let path_and_query = match query {
        Some(q) => format!("{}?{}", path, q),
        None => path,
    };
    let path_and_query = PathAndQuery::try_from(path_and_query)
        .map_err(|e| GatewayError::InvalidTarget(e.to_string()))?;

    let scheme = target
        .scheme_str()
        .ok_or_else(|| GatewayError::InvalidTarget(format!("{} has no scheme", target)))?;
    let authority = target
        .authority()
        .ok_or_else(|| GatewayError::InvalidTarget(format!("{} has no authority", target)))?;

    Uri::builder()
        .scheme(scheme)
        .authority(authority.as_str())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| GatewayError::InvalidTarget(e.to_string()))
}

fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{}/{}", a, b),
        _ => format!("{}{}", a, b),
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }

    for name in [
        CONNECTION,
        PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION,
        TE,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
    ] {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");
}

/// Render an error with its sources on one line
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(next) = source {
        message.push_str(": ");
        message.push_str(&next.to_string());
        source = next.source();
    }
    message
}
