//! Cluster connection from kubeconfig

use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::rt::TokioExecutor;
use kube::client::ConfigExt;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tower::{BoxError, ServiceBuilder};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("Failed to load kubeconfig: {0}")]
    Config(String),

    #[error("Failed to build cluster client: {0}")]
    Client(#[source] kube::Error),

    #[error("Failed to get service/{name} in namespace/{namespace}: {source}")]
    ServiceFetch {
        name: String,
        namespace: String,
        #[source]
        source: kube::Error,
    },

    #[error("service/{service} declares invalid port number {port}")]
    InvalidPort { service: String, port: i32 },
}

/// How to reach the cluster
#[derive(Debug, Clone, Default)]
pub struct ClusterOptions {
    /// Explicit kubeconfig file; `KUBECONFIG` and the default path otherwise
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use instead of the current one
    pub context: Option<String>,
    /// Namespace overriding the context's default
    pub namespace: Option<String>,
    /// TCP keep-alive for API server connections; zero disables it
    pub keepalive: Duration,
}

/// An authenticated API server client bound to a namespace
#[derive(Clone)]
pub struct ClusterConnection {
    pub(crate) client: Client,
    namespace: String,
    cluster_url: http::Uri,
}

impl ClusterConnection {
    /// Load kubeconfig according to `options` and build the client
    pub async fn connect(options: &ClusterOptions) -> Result<Self, ClusterError> {
        let config = load_config(options).await?;
        Self::from_config(config, options.namespace.clone(), options.keepalive)
    }

    pub fn from_config(
        config: Config,
        namespace: Option<String>,
        keepalive: Duration,
    ) -> Result<Self, ClusterError> {
        let namespace = namespace.unwrap_or_else(|| config.default_namespace.clone());

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(config.connect_timeout);
        http.set_keepalive((!keepalive.is_zero()).then_some(keepalive));

        let client = if config.cluster_url.scheme_str() == Some("http") {
            debug!("Using plaintext connection to {}", config.cluster_url);
            build_client(&config, http, &namespace)?
        } else {
            let https = config
                .rustls_https_connector_with_connector(http)
                .map_err(ClusterError::Client)?;
            build_client(&config, https, &namespace)?
        };

        info!(
            "Connected to cluster {} (namespace {})",
            config.cluster_url, namespace
        );

        Ok(Self {
            client,
            namespace,
            cluster_url: config.cluster_url,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn cluster_url(&self) -> &http::Uri {
        &self.cluster_url
    }

    /// Absolute API server URL for a path relative to the API root
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.cluster_url.to_string().trim_end_matches('/'),
            path
        )
    }
}

async fn load_config(options: &ClusterOptions) -> Result<Config, ClusterError> {
    let kube_options = KubeConfigOptions {
        context: options.context.clone(),
        cluster: None,
        user: None,
    };

    if let Some(path) = &options.kubeconfig {
        debug!("Loading kubeconfig from {}", path.display());
        let kubeconfig =
            Kubeconfig::read_from(path).map_err(|e| ClusterError::Config(e.to_string()))?;
        return Config::from_custom_kubeconfig(kubeconfig, &kube_options)
            .await
            .map_err(|e| ClusterError::Config(e.to_string()));
    }

    if options.context.is_some() {
        return Config::from_kubeconfig(&kube_options)
            .await
            .map_err(|e| ClusterError::Config(e.to_string()));
    }

    Config::infer()
        .await
        .map_err(|e| ClusterError::Config(e.to_string()))
}

fn build_client<C>(config: &Config, connector: C, namespace: &str) -> Result<Client, ClusterError>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    let auth = config.auth_layer().map_err(ClusterError::Client)?;
    let service = ServiceBuilder::new()
        .layer(config.base_uri_layer())
        .option_layer(auth)
        .map_err(BoxError::from)
        .service(
            hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(connector),
        );
    Ok(Client::new(service, namespace))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> Config {
        Config::new(url.parse().unwrap())
    }

    #[tokio::test]
    async fn test_namespace_defaults_to_kubeconfig() {
        let connection =
            ClusterConnection::from_config(config("http://127.0.0.1:6443"), None, Duration::ZERO)
                .unwrap();
        assert_eq!(connection.namespace(), "default");
    }

    #[tokio::test]
    async fn test_namespace_override() {
        let connection = ClusterConnection::from_config(
            config("http://127.0.0.1:6443"),
            Some("kube-system".to_string()),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(connection.namespace(), "kube-system");
    }

    #[tokio::test]
    async fn test_api_url() {
        let connection =
            ClusterConnection::from_config(config("http://10.0.0.1:6443"), None, Duration::ZERO)
                .unwrap();
        assert_eq!(
            connection.api_url("/api/v1/namespaces/default/services/nginx/proxy"),
            "http://10.0.0.1:6443/api/v1/namespaces/default/services/nginx/proxy"
        );
    }

    #[tokio::test]
    async fn test_api_url_keeps_cluster_path() {
        let connection = ClusterConnection::from_config(
            config("http://rancher.local/k8s/clusters/c-1"),
            None,
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(
            connection.api_url("/api/v1/namespaces"),
            "http://rancher.local/k8s/clusters/c-1/api/v1/namespaces"
        );
    }
}
