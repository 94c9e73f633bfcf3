pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod notifications;
pub mod preferences;
pub mod settings;
pub mod statistics;
pub mod tracker;
pub mod vision;

pub use app::{BlinkTrackerOrchestrator, Collaborators, ComponentState, ShutdownReason};
pub use config::BlinkTrackerConfig;
pub use error::{BlinkTrackerError, Result};
pub use events::{BlinkEvent, EventBus, EventReceiver};
pub use notifications::{ErrorHandler, LoggingErrorHandler, NotificationsManager, SystemNotifications};
pub use preferences::{BlinkPreferences, PermissionState, PreferencesModel};
pub use settings::{SettingKey, SettingValue, Settings, SettingsSnapshot, SettingsStore};
pub use statistics::{BlinkStatistic, StatRecord, StatisticsModel, StatisticsRepository, StatisticsStore};
pub use tracker::{BlinkTracker, TrackerState};
pub use vision::{BlinkCamera, JsonLinesVisionSource, SimulatedVisionSource, VisionFaceData, VisionSource};
