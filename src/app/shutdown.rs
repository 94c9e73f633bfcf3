use super::{BlinkTrackerOrchestrator, ComponentState};
use crate::error::{BlinkTrackerError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

impl BlinkTrackerOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let mut exit_code = 0;

        // Producers first, so the tracker's last signals reach the router
        let mut producers = vec!["camera", "tracker"];
        if self.keyboard_enabled {
            producers.insert(0, "keyboard");
        }
        for component in producers {
            if let Err(e) = self.stop_component(component).await {
                error!("Error stopping {}: {}", component, e);
                exit_code = 1;
            }
        }

        // The router drains what is queued before it exits
        self.router_token.cancel();
        if let Some(router) = self.router_task.take() {
            if let Err(e) = router.await {
                error!("Event router task failed: {}", e);
                exit_code = 1;
            }
        }

        for component in ["preferences", "statistics"] {
            if let Err(e) = self.stop_component(component).await {
                error!("Error stopping {}: {}", component, e);
                exit_code = 1;
            }
        }

        // Anything still holding a child token
        self.cancellation_token.cancel();

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Stop a specific component
    async fn stop_component(&self, component: &str) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let limit = Duration::from_secs(self.config.system.shutdown_timeout_seconds);
        let result = match component {
            "keyboard" => stop_within(limit, component, self.keyboard.stop()).await,
            "camera" => stop_within(limit, component, self.camera.stop()).await,
            "tracker" => stop_within(limit, component, self.tracker.stop()).await,
            "preferences" => stop_within(limit, component, self.preferences.stop()).await,
            "statistics" => stop_within(limit, component, self.statistics.stop()).await,
            _ => Ok(()),
        };

        match result {
            Ok(()) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Err(e) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(e)
            }
        }
    }
}

async fn stop_within<F>(limit: Duration, component: &str, stop: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match timeout(limit, stop).await {
        Ok(result) => result,
        Err(_) => Err(BlinkTrackerError::component(
            component,
            format!("stop timed out after {:?}", limit),
        )),
    }
}
