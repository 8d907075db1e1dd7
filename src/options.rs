//! Validated session configuration

use opensvc_cluster::ClusterOptions;
use opensvc_resolver::SelectionOptions;

/// Everything one invocation needs, fixed before any I/O
#[derive(Debug, Clone)]
pub struct OpenServiceOptions {
    pub service: String,
    /// Gateway bind address
    pub address: String,
    /// Gateway bind port, 0 for an ephemeral one
    pub port: u16,
    pub selection: SelectionOptions,
    pub cluster: ClusterOptions,
    /// Print the URL(s) and exit instead of serving
    pub print_url: bool,
}
