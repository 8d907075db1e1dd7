//! Command-line surface

use crate::options::OpenServiceOptions;
use clap::Parser;
use opensvc_cluster::ClusterOptions;
use opensvc_resolver::{InvalidScheme, SelectionOptions};
use std::path::PathBuf;
use std::time::Duration;

const EXAMPLES: &str = "\
Examples:
  # Open service/kubernetes-dashboard in namespace/kube-system
  kubectl open-svc kubernetes-dashboard -n kube-system

  # Use port \"http-monitoring\" of service/rook-ceph-mgr-dashboard in namespace/rook-ceph
  kubectl open-svc rook-ceph-mgr-dashboard -n rook-ceph --svc-port http-monitoring

  # Only print the URL instead of serving it
  kubectl open-svc grafana -n monitoring --url";

/// Open the Kubernetes URL(s) for the specified service in your browser
#[derive(Parser, Debug)]
#[command(name = "kubectl open-svc")]
#[command(
    about = "Open the Kubernetes URL(s) for the specified service in your browser",
    long_about = "Open the Kubernetes URL(s) for the specified service in your browser \
through a local proxy server. Services with a load-balancer ingress are opened \
directly; all others are reached through the API server's service proxy."
)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
#[command(after_help = EXAMPLES)]
pub struct Cli {
    /// Service name
    pub service: String,

    /// Port on which to run the proxy (0 picks a random port)
    #[arg(short, long, env = "OPEN_SVC_PORT", default_value_t = 8001)]
    pub port: u16,

    /// Address on which to run the proxy
    #[arg(long, env = "OPEN_SVC_ADDRESS", default_value = "127.0.0.1")]
    pub address: String,

    /// Service port name (defaults to the first port)
    #[arg(long, default_value = "")]
    pub svc_port: String,

    /// Scheme used to reach the service, "http" or "https"
    #[arg(long, default_value = "")]
    pub scheme: String,

    /// TCP keep-alive for API server connections, e.g. "30s" (0 disables)
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    pub keepalive: Duration,

    /// Print the URL instead of opening it in the browser
    #[arg(long)]
    pub url: bool,

    /// Namespace (defaults to the kubeconfig context's namespace)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Validate flags into an immutable session configuration.
    ///
    /// No network I/O happens here, so an invalid scheme is rejected before
    /// the cluster is contacted.
    pub fn into_options(self) -> Result<OpenServiceOptions, InvalidScheme> {
        let selection = SelectionOptions::new(self.svc_port, &self.scheme)?;

        Ok(OpenServiceOptions {
            service: self.service,
            address: self.address,
            port: self.port,
            selection,
            cluster: ClusterOptions {
                kubeconfig: self.kubeconfig,
                context: self.context,
                namespace: self.namespace,
                keepalive: self.keepalive,
            },
            print_url: self.url,
        })
    }
}
