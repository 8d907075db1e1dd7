//! Endpoint resolution for Kubernetes services
//!
//! Turns a fetched `Service` snapshot plus the user's port/scheme selection into
//! the address the browser should ultimately reach: either the load-balancer
//! ingress URLs, or a path under the API server's service proxy subresource.
//!
//! Nothing in this crate performs I/O.

pub mod options;
pub mod resolve;
pub mod service;

pub use options::{InvalidScheme, Scheme, SelectionOptions};
pub use resolve::{
    join_scheme_name_port, resolve, DefaultedPort, Resolution, ResolveError, ResolvedTarget,
};
pub use service::{LoadBalancerIngress, PortSpec, ServiceRecord};
