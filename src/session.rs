//! One invocation: resolve the service, then print, open or serve it

use anyhow::{anyhow, Context, Result};
use http::Uri;
use opensvc_cluster::{ApiTunnel, ClusterConnection};
use opensvc_gateway::{Gateway, GatewayConfig};
use opensvc_resolver::{resolve, ResolvedTarget, ServiceRecord};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser;
use crate::options::OpenServiceOptions;

/// Run the session until it completes or `shutdown` is cancelled
pub async fn run(options: OpenServiceOptions, shutdown: CancellationToken) -> Result<()> {
    let (connection, service) = tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            info!("Interrupted before service/{} was fetched", options.service);
            return Ok(());
        }
        fetched = fetch(&options) => fetched?,
    };

    let resolution = resolve(&service, &options.selection)?;
    if let Some(defaulted) = &resolution.defaulted_port {
        warn!(
            "service/{} has {} ports, defaulting port {}",
            defaulted.service, defaulted.port_count, defaulted.port
        );
    }

    if options.print_url {
        for url in target_urls(&connection, &resolution.target) {
            println!("{}", url);
        }
        return Ok(());
    }

    match resolution.target {
        ResolvedTarget::Direct(urls) => open_direct(&service.name, &urls),
        ResolvedTarget::ProxyPath(path) => {
            serve_proxy(&options, &connection, &service.name, &path, shutdown).await
        }
    }
}

async fn fetch(options: &OpenServiceOptions) -> Result<(ClusterConnection, ServiceRecord)> {
    let connection = ClusterConnection::connect(&options.cluster).await?;
    let service = connection.fetch_service(&options.service).await?;
    Ok((connection, service))
}

/// Absolute URLs for print mode
pub fn target_urls(connection: &ClusterConnection, target: &ResolvedTarget) -> Vec<String> {
    match target {
        ResolvedTarget::Direct(urls) => urls.clone(),
        ResolvedTarget::ProxyPath(path) => vec![connection.api_url(path)],
    }
}

/// Ingress URLs need no local hop; hand them straight to the browser.
fn open_direct(name: &str, urls: &[String]) -> Result<()> {
    println!("Opening service/{} in the default browser...", name);

    let mut failed = 0;
    for url in urls {
        if let Err(e) = browser::open(url) {
            warn!("{}", e);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(anyhow!(
            "Failed to open {} of {} URL(s) for service/{}",
            failed,
            urls.len(),
            name
        ));
    }
    Ok(())
}

async fn serve_proxy(
    options: &OpenServiceOptions,
    connection: &ClusterConnection,
    name: &str,
    proxy_path: &str,
    shutdown: CancellationToken,
) -> Result<()> {
    let tunnel = ApiTunnel::new(connection)
        .listen("127.0.0.1", 0)
        .await
        .context("Failed to start API tunnel")?;

    let target: Uri = format!("http://{}{}", tunnel.local_addr(), proxy_path)
        .parse()
        .with_context(|| format!("Invalid proxy target for service/{}", name))?;
    debug!("Gateway target: {}", target);

    let config = GatewayConfig::new(target)
        .with_bind(options.address.clone(), options.port)
        .with_strip_prefix(proxy_path);
    let gateway = Gateway::new(config).listen().await?;
    let addr = gateway.local_addr();

    println!("Starting to serve on {}", addr);

    let mut tunnel_task = tokio::spawn(tunnel.serve(shutdown.clone()));
    let mut gateway_task = tokio::spawn(gateway.serve(shutdown.clone()));

    println!("Opening service/{} in the default browser...", name);
    if let Err(e) = browser::open(&format!("http://{}", addr)) {
        // The gateway stays up; the user can browse to it manually
        warn!("{}", e);
    }

    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            info!("Shutting down");
            Ok(())
        }
        result = &mut tunnel_task => exited("API tunnel", result),
        result = &mut gateway_task => exited("gateway", result),
    }
}

fn exited<E>(component: &str, result: Result<Result<(), E>, JoinError>) -> Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::Error::new(e).context(format!("{} stopped", component))),
        Err(e) => Err(anyhow!("{} task failed: {}", component, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opensvc_cluster::ClusterOptions;
    use opensvc_resolver::SelectionOptions;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn session_options(kubeconfig: PathBuf) -> OpenServiceOptions {
        OpenServiceOptions {
            service: "nginx".to_string(),
            address: "127.0.0.1".to_string(),
            port: 0,
            selection: SelectionOptions::default(),
            cluster: ClusterOptions {
                kubeconfig: Some(kubeconfig),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            print_url: true,
        }
    }

    /// Kubeconfig pointing at a server that accepts connections but never answers
    async fn silent_api_server() -> (TcpListener, PathBuf) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let kubeconfig = format!(
            "apiVersion: v1
kind: Config
clusters:
- name: silent
  cluster:
    server: http://127.0.0.1:{port}
contexts:
- name: silent
  context:
    cluster: silent
    user: silent
    namespace: default
current-context: silent
users:
- name: silent
  user: {{}}
"
        );
        let path = std::env::temp_dir().join(format!("open-svc-silent-{}.yaml", port));
        std::fs::write(&path, kubeconfig).unwrap();
        (listener, path)
    }

    #[tokio::test]
    async fn test_interrupt_during_service_fetch() {
        let (_listener, kubeconfig) = silent_api_server().await;
        let shutdown = CancellationToken::new();

        let session = tokio::spawn(run(session_options(kubeconfig.clone()), shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .expect("session ignored the interrupt")
            .unwrap();
        assert!(result.is_ok());

        let _ = std::fs::remove_file(kubeconfig);
    }

    #[tokio::test]
    async fn test_already_interrupted_session_does_nothing() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let options = session_options(PathBuf::from("/nonexistent/kubeconfig"));
        assert!(run(options, shutdown).await.is_ok());
    }

    fn connection() -> ClusterConnection {
        let config = kube::Config::new("http://127.0.0.1:6443/".parse().unwrap());
        ClusterConnection::from_config(config, Some("default".to_string()), Duration::ZERO)
            .unwrap()
    }

    #[tokio::test]
    async fn test_print_urls_for_proxy_path() {
        let target = ResolvedTarget::ProxyPath(
            "/api/v1/namespaces/default/services/nginx/proxy".to_string(),
        );

        assert_eq!(
            target_urls(&connection(), &target),
            vec!["http://127.0.0.1:6443/api/v1/namespaces/default/services/nginx/proxy"]
        );
    }

    #[tokio::test]
    async fn test_print_urls_for_direct_target() {
        let target = ResolvedTarget::Direct(vec![
            "http://203.0.113.7:80".to_string(),
            "http://203.0.113.7:443".to_string(),
        ]);

        assert_eq!(
            target_urls(&connection(), &target),
            vec!["http://203.0.113.7:80", "http://203.0.113.7:443"]
        );
    }

    #[derive(Debug, thiserror::Error)]
    #[error("listener closed")]
    struct Closed;

    #[test]
    fn test_exited_clean() {
        assert!(exited::<Closed>("gateway", Ok(Ok(()))).is_ok());
    }

    #[test]
    fn test_exited_with_error() {
        let err = exited("API tunnel", Ok(Err(Closed))).unwrap_err();
        assert_eq!(format!("{:#}", err), "API tunnel stopped: listener closed");
    }
}
