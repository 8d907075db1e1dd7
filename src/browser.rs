//! System browser side effect

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("Failed to open {url} in the default browser: {reason}")]
pub struct BrowserLaunchError {
    pub url: String,
    pub reason: std::io::Error,
}

/// Open `url` without waiting for the browser to exit
pub fn open(url: &str) -> Result<(), BrowserLaunchError> {
    debug!("Launching browser for {}", url);
    open::that_detached(url).map_err(|reason| BrowserLaunchError {
        url: url.to_string(),
        reason,
    })
}
