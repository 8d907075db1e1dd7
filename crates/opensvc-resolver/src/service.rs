//! Service snapshot consumed by the resolver

/// A single declared service port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Port name; empty when the port is unnamed
    pub name: String,
    pub number: u16,
}

impl PortSpec {
    pub fn new(name: impl Into<String>, number: u16) -> Self {
        Self {
            name: name.into(),
            number,
        }
    }

    /// Unnamed port
    pub fn unnamed(number: u16) -> Self {
        Self::new(String::new(), number)
    }
}

/// Externally reachable address assigned by a load balancer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBalancerIngress {
    pub ip: String,
    pub hostname: String,
}

impl LoadBalancerIngress {
    /// The IP when set, the hostname otherwise
    pub fn host(&self) -> &str {
        if self.ip.is_empty() {
            &self.hostname
        } else {
            &self.ip
        }
    }
}

/// Immutable snapshot of a `Service`, fetched once per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub namespace: String,
    /// Declared ports, in declaration order
    pub ports: Vec<PortSpec>,
    pub ingress: Option<LoadBalancerIngress>,
}

impl ServiceRecord {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ports: Vec::new(),
            ingress: None,
        }
    }

    pub fn with_port(mut self, port: PortSpec) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_ingress(mut self, ingress: LoadBalancerIngress) -> Self {
        self.ingress = Some(ingress);
        self
    }
}
