//! Cluster-side collaborators
//!
//! - [`ClusterConnection`]: an authenticated client built from kubeconfig
//! - [`ClusterConnection::fetch_service`]: `Service` lookup as a [`ServiceRecord`]
//! - [`ApiTunnel`]: a local listener forwarding to the API server with the
//!   client's credentials
//!
//! [`ServiceRecord`]: opensvc_resolver::ServiceRecord

mod client;
mod service;
mod tunnel;

pub use client::{ClusterConnection, ClusterError, ClusterOptions};
pub use service::service_record;
pub use tunnel::{ApiTunnel, ListeningTunnel, TunnelError};
