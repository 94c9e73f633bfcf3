use super::{BlinkTrackerOrchestrator, ShutdownReason};
use crate::error::{BlinkTrackerError, Result};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

impl BlinkTrackerOrchestrator {
    /// Run until a signal or a shutdown request arrives, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Blinktracker is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| BlinkTrackerError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| BlinkTrackerError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Blinktracker shutdown complete");
        Ok(exit_code)
    }

    /// Ask the run loop to shut down
    pub async fn request_shutdown(&self, reason: ShutdownReason) {
        if let Some(sender) = self.shutdown_sender.lock().await.take() {
            let _ = sender.send(reason);
        }
    }

    fn setup_signal_handlers(&self) {
        let token = self.cancellation_token.clone();

        #[cfg(unix)]
        {
            let shutdown_sender = Arc::clone(&self.shutdown_sender);
            let token = token.clone();
            tokio::spawn(async move {
                let mut sigterm =
                    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(signal) => signal,
                        Err(e) => {
                            warn!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };

                tokio::select! {
                    _ = token.cancelled() => {}
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        send_reason(&shutdown_sender, ShutdownReason::Signal("SIGTERM".to_string())).await;
                    }
                }
            });
        }

        let shutdown_sender = Arc::clone(&self.shutdown_sender);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        info!("Received SIGINT signal (Ctrl+C)");
                        send_reason(&shutdown_sender, ShutdownReason::Signal("SIGINT".to_string())).await;
                    }
                    Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                }
            }
        });
    }
}

async fn send_reason(
    shutdown_sender: &Mutex<Option<oneshot::Sender<ShutdownReason>>>,
    reason: ShutdownReason,
) {
    if let Some(sender) = shutdown_sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
