use crate::error::{BlinkTrackerError, Result, SettingsError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Preference keys understood by the settings store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    PerMinuteThreshold,
    NotifySound,
    NotifyVibration,
    LaunchMinimized,
    ReplacePip,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        SettingKey::PerMinuteThreshold,
        SettingKey::NotifySound,
        SettingKey::NotifyVibration,
        SettingKey::LaunchMinimized,
        SettingKey::ReplacePip,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SettingKey::PerMinuteThreshold => "per_minute_threshold",
            SettingKey::NotifySound => "notify_sound",
            SettingKey::NotifyVibration => "notify_vibration",
            SettingKey::LaunchMinimized => "launch_minimized",
            SettingKey::ReplacePip => "replace_pip",
        }
    }
}

/// A stored preference value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingValue {
    Count(u32),
    Flag(bool),
}

impl SettingValue {
    pub fn as_count(&self, key: SettingKey) -> std::result::Result<u32, SettingsError> {
        match self {
            SettingValue::Count(value) => Ok(*value),
            SettingValue::Flag(_) => Err(SettingsError::TypeMismatch {
                key: key.name(),
                expected: "count",
            }),
        }
    }

    pub fn as_flag(&self, key: SettingKey) -> std::result::Result<bool, SettingsError> {
        match self {
            SettingValue::Flag(value) => Ok(*value),
            SettingValue::Count(_) => Err(SettingsError::TypeMismatch {
                key: key.name(),
                expected: "flag",
            }),
        }
    }
}

/// Observable key-value preference storage
#[async_trait]
pub trait Settings: Send + Sync {
    /// Watch a preference. The receiver starts with the current value.
    fn observe(&self, key: SettingKey) -> watch::Receiver<SettingValue>;

    /// Store a preference and notify observers
    async fn set(&self, key: SettingKey, value: SettingValue) -> Result<()>;
}

/// All preferences, as persisted on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    #[serde(default = "default_per_minute_threshold")]
    pub per_minute_threshold: u32,
    #[serde(default = "default_true")]
    pub notify_sound: bool,
    #[serde(default = "default_true")]
    pub notify_vibration: bool,
    #[serde(default)]
    pub launch_minimized: bool,
    #[serde(default)]
    pub replace_pip: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            per_minute_threshold: default_per_minute_threshold(),
            notify_sound: true,
            notify_vibration: true,
            launch_minimized: false,
            replace_pip: false,
        }
    }
}

impl SettingsSnapshot {
    pub fn get(&self, key: SettingKey) -> SettingValue {
        match key {
            SettingKey::PerMinuteThreshold => SettingValue::Count(self.per_minute_threshold),
            SettingKey::NotifySound => SettingValue::Flag(self.notify_sound),
            SettingKey::NotifyVibration => SettingValue::Flag(self.notify_vibration),
            SettingKey::LaunchMinimized => SettingValue::Flag(self.launch_minimized),
            SettingKey::ReplacePip => SettingValue::Flag(self.replace_pip),
        }
    }

    pub(crate) fn apply(
        &mut self,
        key: SettingKey,
        value: SettingValue,
    ) -> std::result::Result<(), SettingsError> {
        match key {
            SettingKey::PerMinuteThreshold => self.per_minute_threshold = value.as_count(key)?,
            SettingKey::NotifySound => self.notify_sound = value.as_flag(key)?,
            SettingKey::NotifyVibration => self.notify_vibration = value.as_flag(key)?,
            SettingKey::LaunchMinimized => self.launch_minimized = value.as_flag(key)?,
            SettingKey::ReplacePip => self.replace_pip = value.as_flag(key)?,
        }
        Ok(())
    }
}

fn default_per_minute_threshold() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

/// Settings kept in memory and optionally mirrored to a TOML file
pub struct SettingsStore {
    path: Option<PathBuf>,
    channels: HashMap<SettingKey, watch::Sender<SettingValue>>,
    snapshot: Mutex<SettingsSnapshot>,
}

impl SettingsStore {
    /// Volatile store seeded with defaults
    pub fn in_memory() -> Self {
        Self::from_snapshot(SettingsSnapshot::default(), None)
    }

    /// Open a file-backed store, creating it with defaults on first write
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let snapshot = if fs::try_exists(&path).await? {
            let contents = fs::read_to_string(&path).await?;
            let snapshot: SettingsSnapshot = toml::from_str(&contents)?;
            info!("Loaded settings from {}", path.display());
            snapshot
        } else {
            info!(
                "No settings file at {}, starting from defaults",
                path.display()
            );
            SettingsSnapshot::default()
        };

        debug!("Settings: {:?}", snapshot);
        Ok(Self::from_snapshot(snapshot, Some(path)))
    }

    fn from_snapshot(snapshot: SettingsSnapshot, path: Option<PathBuf>) -> Self {
        let channels = SettingKey::ALL
            .iter()
            .map(|key| {
                let (sender, _) = watch::channel(snapshot.get(*key));
                (*key, sender)
            })
            .collect();

        Self {
            path,
            channels,
            snapshot: Mutex::new(snapshot),
        }
    }

    pub async fn snapshot(&self) -> SettingsSnapshot {
        self.snapshot.lock().await.clone()
    }

    async fn persist(&self, snapshot: &SettingsSnapshot) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let contents = toml::to_string_pretty(snapshot)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        // Readers never see a half-written file
        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, contents).await.map_err(|e| {
            BlinkTrackerError::from(SettingsError::Persist {
                details: format!("{}: {}", tmp_path.display(), e),
            })
        })?;
        fs::rename(&tmp_path, path).await.map_err(|e| {
            BlinkTrackerError::from(SettingsError::Persist {
                details: format!("{}: {}", path.display(), e),
            })
        })?;

        Ok(())
    }
}

#[async_trait]
impl Settings for SettingsStore {
    fn observe(&self, key: SettingKey) -> watch::Receiver<SettingValue> {
        self.channels[&key].subscribe()
    }

    async fn set(&self, key: SettingKey, value: SettingValue) -> Result<()> {
        let mut snapshot = self.snapshot.lock().await;

        let mut updated = snapshot.clone();
        updated.apply(key, value)?;
        if updated == *snapshot {
            return Ok(());
        }

        if let Err(e) = self.persist(&updated).await {
            warn!("Failed to persist setting '{}': {}", key.name(), e);
            return Err(e);
        }

        *snapshot = updated;
        drop(snapshot);

        debug!("Setting '{}' changed to {:?}", key.name(), value);
        self.channels[&key].send_replace(value);
        Ok(())
    }
}

/// One settings subscription; closed for good after its first failure
pub(crate) struct SettingObservation {
    pub(crate) key: SettingKey,
    receiver: Option<watch::Receiver<SettingValue>>,
}

impl SettingObservation {
    pub(crate) fn new(settings: &dyn Settings, key: SettingKey) -> Self {
        Self {
            key,
            receiver: Some(settings.observe(key)),
        }
    }

    pub(crate) fn current(&mut self) -> Option<SettingValue> {
        self.receiver
            .as_mut()
            .map(|receiver| *receiver.borrow_and_update())
    }

    /// Wait for the next value. Pends forever once closed.
    pub(crate) async fn changed(&mut self) -> std::result::Result<SettingValue, SettingsError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return std::future::pending().await;
        };

        match receiver.changed().await {
            Ok(()) => Ok(*receiver.borrow_and_update()),
            Err(_) => Err(SettingsError::ObservationClosed {
                key: self.key.name(),
            }),
        }
    }

    pub(crate) fn close(&mut self) {
        self.receiver = None;
    }
}
