//! Rewriting reverse proxy in front of the API server's service proxy
//!
//! The API server serves a proxied service under a long path prefix
//! (`/api/v1/namespaces/{ns}/services/{svc}/proxy`). The gateway exposes the
//! service at the root of a local address instead and strips that prefix from
//! every response so absolute links and redirects keep working.
//!
//! Lifecycle: [`Gateway`] (idle) → [`Gateway::listen`] → [`ListeningGateway`]
//! → [`ListeningGateway::serve`] until the shutdown token is cancelled.

pub mod rewrite;
mod server;
pub mod upstream;

pub use rewrite::PrefixStripper;
pub use server::{Gateway, GatewayConfig, GatewayError, ListeningGateway};
pub use upstream::{join_target, strip_hop_by_hop};
