use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlinkTrackerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Statistics error: {0}")]
    Statistics(#[from] StatisticsError),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl BlinkTrackerError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("Setting '{key}' expects a {expected} value")]
    TypeMismatch { key: &'static str, expected: &'static str },

    #[error("Invalid value for '{key}': {details}")]
    InvalidValue { key: &'static str, details: String },

    #[error("Observation of '{key}' ended unexpectedly")]
    ObservationClosed { key: &'static str },

    #[error("Failed to persist settings: {details}")]
    Persist { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatisticsError {
    #[error("Failed to open statistics store: {details}")]
    Open { details: String },

    #[error("Failed to append record: {details}")]
    Append { details: String },

    #[error("Corrupt record on line {line}: {details}")]
    CorruptRecord { line: usize, details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VisionError {
    #[error("Unknown vision source '{name}'")]
    UnknownSource { name: String },

    #[error("Failed to read frame: {details}")]
    Read { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {count} events")]
    Lagged { count: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, BlinkTrackerError>;
