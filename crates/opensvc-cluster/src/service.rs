//! `Service` retrieval and conversion

use k8s_openapi::api::core::v1::Service;
use kube::Api;
use opensvc_resolver::{LoadBalancerIngress, PortSpec, ServiceRecord};
use tracing::debug;

use crate::client::{ClusterConnection, ClusterError};

impl ClusterConnection {
    /// Fetch `service/{name}` from the connection's namespace
    pub async fn fetch_service(&self, name: &str) -> Result<ServiceRecord, ClusterError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), self.namespace());
        let service = api
            .get(name)
            .await
            .map_err(|source| ClusterError::ServiceFetch {
                name: name.to_string(),
                namespace: self.namespace().to_string(),
                source,
            })?;

        let record = service_record(&service, self.namespace())?;
        debug!(
            "Fetched service/{} with {} port(s), ingress: {}",
            record.name,
            record.ports.len(),
            record.ingress.is_some()
        );
        Ok(record)
    }
}

/// Convert a `Service` into the resolver's snapshot.
///
/// Only the first load-balancer ingress entry is used, and only when it
/// carries an IP or a hostname.
pub fn service_record(
    service: &Service,
    default_namespace: &str,
) -> Result<ServiceRecord, ClusterError> {
    let name = service.metadata.name.clone().unwrap_or_default();
    let namespace = service
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| default_namespace.to_string());

    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .map(|port| -> Result<PortSpec, ClusterError> {
                    let number = u16::try_from(port.port)
                        .ok()
                        .filter(|n| *n != 0)
                        .ok_or_else(|| ClusterError::InvalidPort {
                            service: name.clone(),
                            port: port.port,
                        })?;
                    Ok(PortSpec::new(port.name.clone().unwrap_or_default(), number))
                })
                .collect::<Result<Vec<_>, ClusterError>>()
        })
        .transpose()?
        .unwrap_or_default();

    let ingress = service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|ingress| ingress.first())
        .map(|ingress| LoadBalancerIngress {
            ip: ingress.ip.clone().unwrap_or_default(),
            hostname: ingress.hostname.clone().unwrap_or_default(),
        })
        .filter(|ingress| !ingress.host().is_empty());

    Ok(ServiceRecord {
        name,
        namespace,
        ports,
        ingress,
    })
}
