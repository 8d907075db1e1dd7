//! Service endpoint resolution

use crate::options::{Scheme, SelectionOptions};
use crate::service::{PortSpec, ServiceRecord};
use thiserror::Error;

/// Resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Looks like service/{service} is a headless service")]
    HeadlessService { service: String },

    #[error("port {name} not found in service/{service}")]
    PortNotFound { name: String, service: String },
}

/// Where the browser should be pointed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// One `http://{host}:{port}` URL per port of a load-balanced service
    Direct(Vec<String>),
    /// Service proxy path relative to the API server root
    ProxyPath(String),
}

/// Reported when several ports exist and none was requested by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultedPort {
    pub service: String,
    pub port_count: usize,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub target: ResolvedTarget,
    /// Set when the first port was picked among several
    pub defaulted_port: Option<DefaultedPort>,
}

/// Resolve the address for `service`.
///
/// Load-balancer ingress always wins over the proxy subresource; the scheme
/// override only applies to the proxy path.
pub fn resolve(
    service: &ServiceRecord,
    options: &SelectionOptions,
) -> Result<Resolution, ResolveError> {
    if service.ports.is_empty() {
        return Err(ResolveError::HeadlessService {
            service: service.name.clone(),
        });
    }

    if let Some(ingress) = &service.ingress {
        let host = ingress.host();
        let urls = service
            .ports
            .iter()
            .map(|port| format!("http://{}:{}", host, port.number))
            .collect();

        return Ok(Resolution {
            target: ResolvedTarget::Direct(urls),
            defaulted_port: None,
        });
    }

    let (port, defaulted_port) = select_port(service, &options.port_name)?;
    let scheme = options.scheme.or_else(|| infer_scheme(port));
    let token = join_scheme_name_port(
        scheme.map(|s| s.as_str()).unwrap_or(""),
        &service.name,
        &port.name,
    );

    Ok(Resolution {
        target: ResolvedTarget::ProxyPath(format!(
            "/api/v1/namespaces/{}/services/{}/proxy",
            service.namespace, token
        )),
        defaulted_port,
    })
}

fn select_port<'a>(
    service: &'a ServiceRecord,
    port_name: &str,
) -> Result<(&'a PortSpec, Option<DefaultedPort>), ResolveError> {
    if port_name.is_empty() {
        // Callers reject empty port lists before getting here
        let port = &service.ports[0];
        let defaulted = (service.ports.len() > 1).then(|| DefaultedPort {
            service: service.name.clone(),
            port_count: service.ports.len(),
            port: port.number,
        });
        return Ok((port, defaulted));
    }

    service
        .ports
        .iter()
        .find(|p| p.name == port_name)
        .map(|p| (p, None))
        .ok_or_else(|| ResolveError::PortNotFound {
            name: port_name.to_string(),
            service: service.name.clone(),
        })
}

/// `https` for a port named `https` or numbered 443, no scheme otherwise.
fn infer_scheme(port: &PortSpec) -> Option<Scheme> {
    (port.name == "https" || port.number == 443).then_some(Scheme::Https)
}

/// Build the `<scheme>:<name>:<port>` token understood by the service proxy.
///
/// A scheme forces all three segments; without one the port name is appended
/// only when present.
pub fn join_scheme_name_port(scheme: &str, name: &str, port: &str) -> String {
    if !scheme.is_empty() {
        return format!("{}:{}:{}", scheme, name, port);
    }
    if !port.is_empty() {
        return format!("{}:{}", name, port);
    }
    name.to_string()
}
