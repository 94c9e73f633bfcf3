use super::types::ShutdownReason;
use crate::error::EventBusError;
use crate::events::{BlinkEvent, EventReceiver};
use crate::notifications::{ErrorHandler, NotificationsManager};
use crate::statistics::BlinkStatistic;
use crate::tracker::BlinkTracker;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Forwards signals on the event bus to the component or collaborator that owns them
pub(super) struct EventRouter {
    pub(super) receiver: EventReceiver,
    pub(super) tracker: Arc<BlinkTracker>,
    pub(super) statistics: Arc<BlinkStatistic>,
    pub(super) notifications: Arc<dyn NotificationsManager>,
    pub(super) error_handler: Arc<dyn ErrorHandler>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) cancellation_token: CancellationToken,
}

impl EventRouter {
    pub(super) async fn run(mut self) {
        info!("Event router started");

        loop {
            let event = tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    self.drain().await;
                    break;
                }
                event = self.receiver.recv() => event,
            };

            match event {
                Ok(event) => self.route(event).await,
                Err(EventBusError::Lagged { count }) => {
                    error!("Event router lost {} events", count);
                }
                Err(_) => {
                    debug!("Event bus closed, router exiting");
                    break;
                }
            }
        }

        info!("Event router stopped");
    }

    /// Route whatever was published before cancellation
    async fn drain(&mut self) {
        let mut drained = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(Some(event)) => {
                    self.route(event).await;
                    drained += 1;
                }
                Ok(None) | Err(EventBusError::ChannelClosed) => break,
                Err(EventBusError::Lagged { count }) => {
                    error!("Event router lost {} events", count);
                }
                Err(e) => {
                    warn!("Stopped draining events: {}", e);
                    break;
                }
            }
        }
        debug!("Event router drained {} events", drained);
    }

    async fn route(&self, event: BlinkEvent) {
        match event {
            BlinkEvent::ErrorCaught { component, error } => {
                self.error_handler.consume(&component, &error);
            }
            BlinkEvent::SoundNotificationTriggered { .. } => {
                self.notifications.notify_with_sound();
            }
            BlinkEvent::VibrationNotificationTriggered { .. } => {
                self.notifications.notify_with_vibration();
            }
            BlinkEvent::BlinkedPerMinute { value, .. } => {
                self.statistics.on_new_blinks_value(value).await;
            }
            BlinkEvent::TrackingRequested { active, .. } => {
                let result = if active {
                    self.tracker.on_tracking_started().await
                } else {
                    self.tracker.on_tracking_stopped().await
                };
                match result {
                    Ok(()) => info!("Tracking {}", if active { "started" } else { "stopped" }),
                    Err(e) => warn!("Tracking request not delivered: {}", e),
                }
            }
            BlinkEvent::ShutdownRequested { reason, .. } => {
                if let Some(sender) = self.shutdown_sender.lock().await.take() {
                    let _ = sender.send(ShutdownReason::UserRequest(reason));
                }
            }
        }
    }
}
