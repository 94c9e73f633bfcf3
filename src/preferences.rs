use crate::error::{BlinkTrackerError, Result, SettingsError};
use crate::events::{publish_or_log, BlinkEvent, EventBus};
use crate::settings::{SettingKey, SettingObservation, SettingValue, Settings, SettingsSnapshot};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of the camera permission flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PermissionFlow {
    state: PermissionState,
    show_rationale: bool,
}

impl Default for PermissionFlow {
    fn default() -> Self {
        Self {
            state: PermissionState::Undetermined,
            show_rationale: false,
        }
    }
}

/// What the preferences screen shows
#[derive(Debug, Clone, PartialEq)]
pub struct PreferencesModel {
    pub selected_threshold: f32,
    pub notify_sound_checked: bool,
    pub notify_vibration_checked: bool,
    pub launch_minimized: bool,
    pub replace_pip: bool,
    pub permission_state: PermissionState,
    pub show_rationale: bool,
}

impl PreferencesModel {
    fn derive(settings: &SettingsSnapshot, permission: PermissionFlow) -> Self {
        Self {
            selected_threshold: settings.per_minute_threshold as f32,
            notify_sound_checked: settings.notify_sound,
            notify_vibration_checked: settings.notify_vibration,
            launch_minimized: settings.launch_minimized,
            replace_pip: settings.replace_pip,
            permission_state: permission.state,
            show_rationale: permission.show_rationale,
        }
    }
}

/// Convert a slider position into a stored threshold
fn threshold_from_slider(value: f32) -> std::result::Result<u32, SettingsError> {
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f32 {
        return Err(SettingsError::InvalidValue {
            key: SettingKey::PerMinuteThreshold.name(),
            details: format!("{} is not a valid blink count", value),
        });
    }
    Ok(value.round() as u32)
}

/// Preferences component: writes user edits to settings and derives the display model
pub struct BlinkPreferences {
    settings: Arc<dyn Settings>,
    event_bus: Arc<EventBus>,
    permission: Arc<watch::Sender<PermissionFlow>>,
    models: Arc<watch::Sender<PreferencesModel>>,
    initial: PreferencesModel,
    cancellation_token: CancellationToken,
    observer_task: Mutex<Option<JoinHandle<()>>>,
}

impl BlinkPreferences {
    pub fn new(
        settings: Arc<dyn Settings>,
        event_bus: Arc<EventBus>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let mut snapshot = SettingsSnapshot::default();
        for key in SettingKey::ALL {
            let value = *settings.observe(key).borrow();
            if let Err(e) = snapshot.apply(key, value) {
                warn!("Ignoring initial value of '{}': {}", key.name(), e);
            }
        }

        let initial = PreferencesModel::derive(&snapshot, PermissionFlow::default());
        let (models, _) = watch::channel(initial.clone());
        let (permission, _) = watch::channel(PermissionFlow::default());

        Self {
            settings,
            event_bus,
            permission: Arc::new(permission),
            models: Arc::new(models),
            initial,
            cancellation_token,
            observer_task: Mutex::new(None),
        }
    }

    /// Start deriving models from the settings streams
    pub async fn start(&self) -> Result<()> {
        let settings = Arc::clone(&self.settings);
        let event_bus = Arc::clone(&self.event_bus);
        let models = Arc::clone(&self.models);
        let mut permission = self.permission.subscribe();
        let token = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            let mut threshold = SettingObservation::new(&*settings, SettingKey::PerMinuteThreshold);
            let mut sound = SettingObservation::new(&*settings, SettingKey::NotifySound);
            let mut vibration = SettingObservation::new(&*settings, SettingKey::NotifyVibration);
            let mut minimized = SettingObservation::new(&*settings, SettingKey::LaunchMinimized);
            let mut pip = SettingObservation::new(&*settings, SettingKey::ReplacePip);

            let mut snapshot = SettingsSnapshot::default();
            for observation in [
                &mut threshold,
                &mut sound,
                &mut vibration,
                &mut minimized,
                &mut pip,
            ] {
                if let Some(value) = observation.current() {
                    apply_observed(&mut snapshot, observation, Ok(value), &event_bus);
                }
            }
            let mut flow = *permission.borrow_and_update();
            models.send_replace(PreferencesModel::derive(&snapshot, flow));

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    value = threshold.changed() => {
                        apply_observed(&mut snapshot, &mut threshold, value, &event_bus);
                    }
                    value = sound.changed() => {
                        apply_observed(&mut snapshot, &mut sound, value, &event_bus);
                    }
                    value = vibration.changed() => {
                        apply_observed(&mut snapshot, &mut vibration, value, &event_bus);
                    }
                    value = minimized.changed() => {
                        apply_observed(&mut snapshot, &mut minimized, value, &event_bus);
                    }
                    value = pip.changed() => {
                        apply_observed(&mut snapshot, &mut pip, value, &event_bus);
                    }
                    changed = permission.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        flow = *permission.borrow_and_update();
                    }
                }

                let model = PreferencesModel::derive(&snapshot, flow);
                models.send_if_modified(|current| {
                    if *current != model {
                        *current = model;
                        true
                    } else {
                        false
                    }
                });
            }

            debug!("Preferences observer stopped");
        });

        *self.observer_task.lock().await = Some(handle);
        info!("Preferences component started");
        Ok(())
    }

    pub fn initial(&self) -> &PreferencesModel {
        &self.initial
    }

    pub fn models(&self) -> watch::Receiver<PreferencesModel> {
        self.models.subscribe()
    }

    pub fn model(&self) -> PreferencesModel {
        self.models.borrow().clone()
    }

    pub async fn on_minimal_threshold_changed(&self, value: f32) {
        match threshold_from_slider(value) {
            Ok(threshold) => {
                self.write(SettingKey::PerMinuteThreshold, SettingValue::Count(threshold))
                    .await
            }
            Err(e) => self.report(e.into()),
        }
    }

    pub async fn on_notify_sound_changed(&self, value: bool) {
        self.write(SettingKey::NotifySound, SettingValue::Flag(value))
            .await
    }

    pub async fn on_notify_vibration_changed(&self, value: bool) {
        self.write(SettingKey::NotifyVibration, SettingValue::Flag(value))
            .await
    }

    pub async fn on_launch_minimized_changed(&self, value: bool) {
        self.write(SettingKey::LaunchMinimized, SettingValue::Flag(value))
            .await
    }

    pub async fn on_replace_pip_changed(&self, value: bool) {
        self.write(SettingKey::ReplacePip, SettingValue::Flag(value))
            .await
    }

    pub fn on_permission_granted(&self) {
        self.permission.send_replace(PermissionFlow {
            state: PermissionState::Granted,
            show_rationale: false,
        });
    }

    pub fn on_permission_denied(&self) {
        self.permission.send_replace(PermissionFlow {
            state: PermissionState::Denied,
            show_rationale: true,
        });
    }

    pub async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();
        if let Some(handle) = self.observer_task.lock().await.take() {
            handle.await.map_err(|e| {
                BlinkTrackerError::component(
                    "preferences",
                    format!("observer task failed: {}", e),
                )
            })?;
        }
        Ok(())
    }

    async fn write(&self, key: SettingKey, value: SettingValue) {
        debug!("Preference '{}' set to {:?}", key.name(), value);
        if let Err(e) = self.settings.set(key, value).await {
            self.report(e);
        }
    }

    fn report(&self, error: BlinkTrackerError) {
        warn!("Preferences error: {}", error);
        publish_or_log(
            &self.event_bus,
            BlinkEvent::ErrorCaught {
                component: "preferences".to_string(),
                error: error.to_string(),
            },
        );
    }
}

fn apply_observed(
    snapshot: &mut SettingsSnapshot,
    observation: &mut SettingObservation,
    value: std::result::Result<SettingValue, SettingsError>,
    event_bus: &EventBus,
) {
    let key = observation.key;
    if let Err(e) = value.and_then(|value| snapshot.apply(key, value)) {
        warn!("Stopped observing '{}': {}", key.name(), e);
        observation.close();
        publish_or_log(
            event_bus,
            BlinkEvent::ErrorCaught {
                component: "preferences".to_string(),
                error: e.to_string(),
            },
        );
    }
}
