use crate::error::EventBusError;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Signals exchanged between blinktracker components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlinkEvent {
    /// Start or stop of tracking was requested
    TrackingRequested { active: bool, timestamp: SystemTime },
    /// Blink rate dropped below threshold, sound notification wanted
    SoundNotificationTriggered { timestamp: SystemTime },
    /// Blink rate dropped below threshold, vibration notification wanted
    VibrationNotificationTriggered { timestamp: SystemTime },
    /// A measuring period completed with the given blink count
    BlinkedPerMinute { value: u32, timestamp: SystemTime },
    /// A component caught an error it could not handle itself
    ErrorCaught { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl BlinkEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            BlinkEvent::TrackingRequested { active, .. } => {
                format!(
                    "Tracking {} requested",
                    if *active { "start" } else { "stop" }
                )
            }
            BlinkEvent::SoundNotificationTriggered { .. } => {
                "Sound notification triggered".to_string()
            }
            BlinkEvent::VibrationNotificationTriggered { .. } => {
                "Vibration notification triggered".to_string()
            }
            BlinkEvent::BlinkedPerMinute { value, .. } => {
                format!("Blinked {} times in the last period", value)
            }
            BlinkEvent::ErrorCaught { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            BlinkEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            BlinkEvent::TrackingRequested { .. } => "tracking_requested",
            BlinkEvent::SoundNotificationTriggered { .. } => "sound_notification_triggered",
            BlinkEvent::VibrationNotificationTriggered { .. } => {
                "vibration_notification_triggered"
            }
            BlinkEvent::BlinkedPerMinute { .. } => "blinked_per_minute",
            BlinkEvent::ErrorCaught { .. } => "error_caught",
            BlinkEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Async event bus for component coordination using broadcast channels
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BlinkEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<BlinkEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: BlinkEvent) -> Result<usize, EventBusError> {
        match &event {
            BlinkEvent::ErrorCaught { component, error } => {
                warn!("Error caught in {}: {}", component, error);
            }
            BlinkEvent::BlinkedPerMinute { value, .. } => {
                info!("Blinked {} times in the last period", value);
            }
            BlinkEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Publish and log failures; used by components whose outputs are fire-and-forget
pub(crate) fn publish_or_log(event_bus: &EventBus, event: BlinkEvent) {
    let event_type = event.event_type();
    if let Err(e) = event_bus.publish(event) {
        error!("Failed to publish {} event: {}", event_type, e);
    }
}

/// Named receiver that reports lag and closure as [`EventBusError`]s
pub struct EventReceiver {
    receiver: broadcast::Receiver<BlinkEvent>,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<BlinkEvent>, name: String) -> Self {
        Self { receiver, name }
    }

    /// Receive the next event
    pub async fn recv(&mut self) -> Result<BlinkEvent, EventBusError> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                Err(EventBusError::Lagged { count: n })
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Event bus closed for receiver '{}'", self.name);
                Err(EventBusError::ChannelClosed)
            }
        }
    }

    /// Take an already queued event without waiting
    pub fn try_recv(&mut self) -> Result<Option<BlinkEvent>, EventBusError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                Err(EventBusError::Lagged { count: n })
            }
            Err(broadcast::error::TryRecvError::Closed) => {
                debug!("Event bus closed for receiver '{}'", self.name);
                Err(EventBusError::ChannelClosed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(BlinkEvent::BlinkedPerMinute {
                value: 12,
                timestamp: SystemTime::now(),
            })
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            BlinkEvent::BlinkedPerMinute { value, .. } => assert_eq!(value, 12),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(10);
        assert_eq!(event_bus.subscriber_count(), 0);
        let result = event_bus.publish(BlinkEvent::SoundNotificationTriggered {
            timestamp: SystemTime::now(),
        });
        assert!(matches!(result, Err(EventBusError::PublishFailed { .. })));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus
            .publish(BlinkEvent::TrackingRequested {
                active: true,
                timestamp: SystemTime::now(),
            })
            .unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_receiver_drains_queued_events() {
        let event_bus = EventBus::new(10);
        let mut receiver = EventReceiver::new(event_bus.subscribe(), "test".to_string());
        assert!(receiver.try_recv().unwrap().is_none());

        event_bus
            .publish(BlinkEvent::TrackingRequested {
                active: false,
                timestamp: SystemTime::now(),
            })
            .unwrap();
        event_bus
            .publish(BlinkEvent::SoundNotificationTriggered {
                timestamp: SystemTime::now(),
            })
            .unwrap();

        let first = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.event_type(), "tracking_requested");
        let second = receiver.try_recv().unwrap().unwrap();
        assert_eq!(second.event_type(), "sound_notification_triggered");
        assert!(receiver.try_recv().unwrap().is_none());

        drop(event_bus);
        assert!(matches!(
            receiver.try_recv(),
            Err(EventBusError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_lagged_receiver_reports_count() {
        let event_bus = EventBus::new(2);
        let mut receiver =
            EventReceiver::new(event_bus.subscribe(), "slow".to_string());

        for value in 0..5 {
            event_bus
                .publish(BlinkEvent::BlinkedPerMinute {
                    value,
                    timestamp: SystemTime::now(),
                })
                .unwrap();
        }

        assert!(matches!(
            receiver.recv().await,
            Err(EventBusError::Lagged { count: 3 })
        ));
        // The receiver keeps working after a lag
        assert!(receiver.recv().await.is_ok());
    }

    #[test]
    fn test_event_properties() {
        let event = BlinkEvent::BlinkedPerMinute {
            value: 40,
            timestamp: SystemTime::now(),
        };
        assert_eq!(event.event_type(), "blinked_per_minute");
        assert!(event.description().contains("40 times"));

        let stop = BlinkEvent::TrackingRequested {
            active: false,
            timestamp: SystemTime::now(),
        };
        assert_eq!(stop.description(), "Tracking stop requested");
    }
}
