use super::keyboard::KeyboardControl;
use super::types::{ComponentState, ShutdownReason};
use crate::config::BlinkTrackerConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::notifications::{ErrorHandler, LoggingErrorHandler, NotificationsManager, SystemNotifications};
use crate::preferences::BlinkPreferences;
use crate::settings::{Settings, SettingsStore};
use crate::statistics::{BlinkStatistic, StatisticsRepository, StatisticsStore};
use crate::tracker::BlinkTracker;
use crate::vision::{source_from_config, BlinkCamera, VisionSource};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// External collaborators the application is wired to
pub struct Collaborators {
    pub settings: Arc<dyn Settings>,
    pub statistics: Arc<dyn StatisticsRepository>,
    pub vision_source: Box<dyn VisionSource>,
    pub notifications: Arc<dyn NotificationsManager>,
    pub error_handler: Arc<dyn ErrorHandler>,
}

impl Collaborators {
    /// File-backed stores, the configured vision source and system notifications
    pub async fn from_config(config: &BlinkTrackerConfig) -> Result<Self> {
        let settings = SettingsStore::open(&config.settings.path).await?;
        let statistics = StatisticsStore::open(&config.statistics.path).await?;
        let vision_source = source_from_config(&config.vision)?;

        Ok(Self {
            settings: Arc::new(settings),
            statistics: Arc::new(statistics),
            vision_source,
            notifications: Arc::new(SystemNotifications::new(&config.notifications)),
            error_handler: Arc::new(LoggingErrorHandler),
        })
    }
}

/// Root of the application: owns every component and routes signals between them
pub struct BlinkTrackerOrchestrator {
    pub(super) config: BlinkTrackerConfig,
    pub(super) event_bus: Arc<EventBus>,

    // Components
    pub(super) tracker: Arc<BlinkTracker>,
    pub(super) preferences: Arc<BlinkPreferences>,
    pub(super) statistics: Arc<BlinkStatistic>,
    pub(super) camera: BlinkCamera,
    pub(super) keyboard: KeyboardControl,
    pub(super) keyboard_enabled: bool,

    // Collaborators
    pub(super) notifications: Arc<dyn NotificationsManager>,
    pub(super) error_handler: Arc<dyn ErrorHandler>,

    // Lifecycle management
    pub(super) router_task: Option<JoinHandle<()>>,
    pub(super) router_token: CancellationToken,
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl BlinkTrackerOrchestrator {
    /// Create the orchestrator and all components from the given collaborators
    pub fn new(config: BlinkTrackerConfig, collaborators: Collaborators) -> Self {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let cancellation_token = CancellationToken::new();
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let Collaborators {
            settings,
            statistics,
            vision_source,
            notifications,
            error_handler,
        } = collaborators;

        let tracker = Arc::new(BlinkTracker::new(
            &config.tracker,
            Arc::clone(&settings),
            Arc::clone(&event_bus),
            cancellation_token.child_token(),
        ));

        let preferences = Arc::new(BlinkPreferences::new(
            settings,
            Arc::clone(&event_bus),
            cancellation_token.child_token(),
        ));

        let statistics = Arc::new(BlinkStatistic::new(
            statistics,
            Arc::clone(&event_bus),
            cancellation_token.child_token(),
        ));

        // Frames go straight to the tracker and never touch the event bus
        let camera = BlinkCamera::new(
            vision_source,
            tracker.frame_sender(),
            Arc::clone(&event_bus),
            cancellation_token.child_token(),
        );

        let keyboard = KeyboardControl::new(
            Arc::clone(&event_bus),
            cancellation_token.child_token(),
        );

        info!("Blinktracker components created");

        Self {
            config,
            event_bus,
            tracker,
            preferences,
            statistics,
            camera,
            keyboard,
            keyboard_enabled: false,
            notifications,
            error_handler,
            router_task: None,
            router_token: cancellation_token.child_token(),
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token,
        }
    }

    /// Enable or disable keyboard control
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn tracker(&self) -> Arc<BlinkTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn preferences(&self) -> Arc<BlinkPreferences> {
        Arc::clone(&self.preferences)
    }

    pub fn statistics(&self) -> Arc<BlinkStatistic> {
        Arc::clone(&self.statistics)
    }
}
