use super::router::EventRouter;
use super::{BlinkTrackerOrchestrator, ComponentState};
use crate::error::Result;
use crate::events::EventReceiver;
use std::sync::Arc;
use tracing::{debug, error, info};

impl BlinkTrackerOrchestrator {
    /// Initialize all system components
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing blinktracker components");

        let mut states = self.component_states.lock().await;
        states.insert("statistics".to_string(), ComponentState::Stopped);
        states.insert("preferences".to_string(), ComponentState::Stopped);
        states.insert("tracker".to_string(), ComponentState::Stopped);
        states.insert("camera".to_string(), ComponentState::Stopped);

        // Only register keyboard component if enabled
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }

        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start all system components
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting blinktracker");

        // Subscribe before anything can publish
        let router = EventRouter {
            receiver: EventReceiver::new(self.event_bus.subscribe(), "router".to_string()),
            tracker: Arc::clone(&self.tracker),
            statistics: Arc::clone(&self.statistics),
            notifications: Arc::clone(&self.notifications),
            error_handler: Arc::clone(&self.error_handler),
            shutdown_sender: Arc::clone(&self.shutdown_sender),
            cancellation_token: self.router_token.clone(),
        };
        self.router_task = Some(tokio::spawn(router.run()));
        debug!(
            "Event router subscribed ({} bus subscribers)",
            self.event_bus.subscriber_count()
        );

        self.start_component("statistics").await?;
        self.start_component("preferences").await?;
        self.start_component("tracker").await?;
        self.start_component("camera").await?;

        if self.keyboard_enabled {
            self.start_component("keyboard").await?;
            info!("Keyboard control active: s = start, p = stop, q = quit");
        }

        if self.config.system.auto_start {
            info!("Auto-starting tracking");
            self.tracker.on_tracking_started().await?;
        }

        info!("Blinktracker started successfully");
        Ok(())
    }

    async fn start_component(&self, component: &str) -> Result<()> {
        self.set_component_state(component, ComponentState::Starting)
            .await;

        let result = match component {
            "statistics" => self.statistics.start().await,
            "preferences" => self.preferences.start().await,
            "tracker" => self.tracker.start().await,
            "camera" => self.camera.start().await,
            "keyboard" => self.keyboard.start().await,
            _ => Ok(()),
        };

        match result {
            Ok(()) => {
                self.set_component_state(component, ComponentState::Running)
                    .await;
                info!("{} component started", component);
                Ok(())
            }
            Err(e) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Failed to start {} component: {}", component, e);
                Err(e)
            }
        }
    }
}
