use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::lifecycle::ControlEvent;

/// Install handlers for SIGTERM, SIGINT and SIGUSR1.
///
/// SIGTERM and SIGINT become [`ControlEvent::Shutdown`]; SIGUSR1 becomes
/// [`ControlEvent::Diagnostics`]. The listener keeps running until the
/// returned receiver is dropped.
pub fn install_signal_handler() -> Result<mpsc::Receiver<ControlEvent>> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigusr1 = signal(SignalKind::user_defined1())?;
    let (tx, rx) = mpsc::channel(8);

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    ControlEvent::Shutdown
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    ControlEvent::Shutdown
                }
                _ = sigusr1.recv() => {
                    tracing::info!("Received SIGUSR1, dumping diagnostics");
                    ControlEvent::Diagnostics
                }
            };

            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}
