use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound for the blink cooldown (one minute)
pub const MAX_BLINK_COOLDOWN_MS: u64 = 60_000;

/// Upper bound for the simulated source's blink interval (one hour)
pub const MAX_SIMULATED_BLINK_INTERVAL_MS: u64 = 3_600_000;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlinkTrackerConfig {
    pub tracker: TrackerConfig,
    pub vision: VisionConfig,
    pub settings: SettingsConfig,
    pub statistics: StatisticsConfig,
    pub notifications: NotificationsConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackerConfig {
    /// Interval between tracker ticks in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Number of ticks in one measuring period
    #[serde(default = "default_measure_period_ticks")]
    pub measure_period_ticks: u64,

    /// Eye openness below which an eye counts as closed
    #[serde(default = "default_blink_openness_threshold")]
    pub blink_openness_threshold: f32,

    /// Minimum time between two registered blinks in milliseconds
    #[serde(default = "default_blink_cooldown_ms")]
    pub blink_cooldown_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VisionConfig {
    /// Frame source: "simulated" or "stdin"
    #[serde(default = "default_vision_source")]
    pub source: String,

    /// Frames per second produced by the simulated source
    #[serde(default = "default_simulated_fps")]
    pub simulated_fps: u32,

    /// Time between simulated blinks in milliseconds
    #[serde(default = "default_simulated_blink_interval_ms")]
    pub simulated_blink_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SettingsConfig {
    /// Path of the persisted preferences file
    #[serde(default = "default_settings_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StatisticsConfig {
    /// Path of the append-only statistics file
    #[serde(default = "default_statistics_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationsConfig {
    /// Ring the terminal bell for sound notifications
    #[serde(default = "default_terminal_bell")]
    pub terminal_bell: bool,

    /// Command executed for sound notifications
    pub sound_command: Option<String>,

    /// Command executed for vibration notifications
    pub vibration_command: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Start tracking as soon as the system is up
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,

    /// Per-component stop timeout in seconds
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
}

impl TrackerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn blink_cooldown(&self) -> Duration {
        Duration::from_millis(self.blink_cooldown_ms)
    }
}

impl BlinkTrackerConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("blinktracker.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("tracker.tick_interval_ms", default_tick_interval_ms())?
            .set_default("tracker.measure_period_ticks", default_measure_period_ticks())?
            .set_default(
                "tracker.blink_openness_threshold",
                default_blink_openness_threshold() as f64,
            )?
            .set_default("tracker.blink_cooldown_ms", default_blink_cooldown_ms())?
            .set_default("vision.source", default_vision_source())?
            .set_default("vision.simulated_fps", default_simulated_fps())?
            .set_default(
                "vision.simulated_blink_interval_ms",
                default_simulated_blink_interval_ms(),
            )?
            .set_default("settings.path", default_settings_path())?
            .set_default("statistics.path", default_statistics_path())?
            .set_default("notifications.terminal_bell", default_terminal_bell())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.auto_start", default_auto_start())?
            .set_default(
                "system.shutdown_timeout_seconds",
                default_shutdown_timeout_seconds(),
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // BLINKTRACKER_TRACKER__TICK_INTERVAL_MS=500 style overrides
            .add_source(
                Environment::with_prefix("BLINKTRACKER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: BlinkTrackerConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracker.tick_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Tracker tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.tracker.measure_period_ticks == 0 {
            return Err(ConfigError::Message(
                "Tracker measure_period_ticks must be greater than 0".to_string(),
            ));
        }

        if self.tracker.blink_cooldown_ms > MAX_BLINK_COOLDOWN_MS {
            return Err(ConfigError::Message(format!(
                "Tracker blink_cooldown_ms must be at most {}, got {}",
                MAX_BLINK_COOLDOWN_MS, self.tracker.blink_cooldown_ms
            )));
        }

        let threshold = self.tracker.blink_openness_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(ConfigError::Message(format!(
                "Tracker blink_openness_threshold must be between 0 and 1, got {}",
                threshold
            )));
        }

        match self.vision.source.as_str() {
            "simulated" | "stdin" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "Unknown vision source '{}', expected 'simulated' or 'stdin'",
                    other
                )));
            }
        }

        if self.vision.simulated_fps == 0 {
            return Err(ConfigError::Message(
                "Vision simulated_fps must be greater than 0".to_string(),
            ));
        }

        if self.vision.simulated_blink_interval_ms > MAX_SIMULATED_BLINK_INTERVAL_MS {
            return Err(ConfigError::Message(format!(
                "Vision simulated_blink_interval_ms must be at most {}, got {}",
                MAX_SIMULATED_BLINK_INTERVAL_MS, self.vision.simulated_blink_interval_ms
            )));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for BlinkTrackerConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            vision: VisionConfig {
                source: default_vision_source(),
                simulated_fps: default_simulated_fps(),
                simulated_blink_interval_ms: default_simulated_blink_interval_ms(),
            },
            settings: SettingsConfig {
                path: default_settings_path(),
            },
            statistics: StatisticsConfig {
                path: default_statistics_path(),
            },
            notifications: NotificationsConfig {
                terminal_bell: default_terminal_bell(),
                sound_command: None,
                vibration_command: None,
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                auto_start: default_auto_start(),
                shutdown_timeout_seconds: default_shutdown_timeout_seconds(),
            },
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            measure_period_ticks: default_measure_period_ticks(),
            blink_openness_threshold: default_blink_openness_threshold(),
            blink_cooldown_ms: default_blink_cooldown_ms(),
        }
    }
}

// Default value functions
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_measure_period_ticks() -> u64 {
    60
}
fn default_blink_openness_threshold() -> f32 {
    0.25
}
fn default_blink_cooldown_ms() -> u64 {
    500
}

fn default_vision_source() -> String {
    "simulated".to_string()
}
fn default_simulated_fps() -> u32 {
    15
}
fn default_simulated_blink_interval_ms() -> u64 {
    4000
}

fn default_settings_path() -> String {
    "./blinktracker-settings.toml".to_string()
}
fn default_statistics_path() -> String {
    "./blinktracker-stats.jsonl".to_string()
}

fn default_terminal_bell() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    256
}
fn default_auto_start() -> bool {
    false
}
fn default_shutdown_timeout_seconds() -> u64 {
    5
}
