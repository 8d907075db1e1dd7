//! Two-stage interrupt handling

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code used when a second interrupt forces termination
pub const FORCED_EXIT_CODE: i32 = 2;

/// Cancel `shutdown` on the first Ctrl-C; exit immediately on the second.
///
/// The OS listener is registered before this returns, so interrupts that
/// arrive back to back are queued rather than lost.
pub fn install(shutdown: CancellationToken) -> std::io::Result<()> {
    let interrupts = listen()?;
    tokio::spawn(async move {
        if escalate(interrupts, shutdown).await {
            warn!("Second interrupt received, exiting");
            std::process::exit(FORCED_EXIT_CODE);
        }
    });
    Ok(())
}

#[cfg(unix)]
fn listen() -> std::io::Result<mpsc::UnboundedReceiver<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while interrupt.recv().await.is_some() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

#[cfg(not(unix))]
fn listen() -> std::io::Result<mpsc::UnboundedReceiver<()>> {
    let mut interrupt = tokio::signal::windows::ctrl_c()?;
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while interrupt.recv().await.is_some() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    Ok(rx)
}

/// Returns `true` when a second interrupt asks for a forced exit.
async fn escalate(
    mut interrupts: mpsc::UnboundedReceiver<()>,
    shutdown: CancellationToken,
) -> bool {
    if interrupts.recv().await.is_none() {
        return false;
    }
    info!("Interrupt received, shutting down (press Ctrl+C again to force exit)");
    shutdown.cancel();

    interrupts.recv().await.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_interrupt_cancels() {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        tx.send(()).unwrap();
        drop(tx);

        assert!(!escalate(rx, shutdown.clone()).await);
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_back_to_back_interrupts_force_exit() {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        // Both arrive before the handler gets to run
        tx.send(()).unwrap();
        tx.send(()).unwrap();

        assert!(escalate(rx, shutdown.clone()).await);
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_no_interrupt_leaves_session_running() {
        let (tx, rx) = mpsc::unbounded_channel::<()>();
        let shutdown = CancellationToken::new();
        drop(tx);

        assert!(!escalate(rx, shutdown.clone()).await);
        assert!(!shutdown.is_cancelled());
    }
}
