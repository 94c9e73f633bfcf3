use super::{Intent, Label, TrackerMachine, TrackerState};
use crate::config::TrackerConfig;
use crate::error::{BlinkTrackerError, Result, SettingsError};
use crate::events::{publish_or_log, BlinkEvent, EventBus};
use crate::settings::{SettingKey, SettingObservation, SettingValue, Settings};
use crate::vision::VisionFaceData;
use chrono::Utc;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const FRAME_CHANNEL_CAPACITY: usize = 64;

enum TrackerCommand {
    Intent(Intent),
    State { reply: oneshot::Sender<TrackerState> },
}

/// Tracker component handle.
///
/// The state machine runs in its own task; this handle only sends it
/// commands, so the state is never shared.
pub struct BlinkTracker {
    commands: mpsc::Sender<TrackerCommand>,
    frames: mpsc::Sender<VisionFaceData>,
    states: watch::Receiver<TrackerState>,
    actor: Mutex<Option<TrackerActor>>,
    actor_task: Mutex<Option<JoinHandle<()>>>,
    cancellation_token: CancellationToken,
}

impl BlinkTracker {
    pub fn new(
        config: &TrackerConfig,
        settings: Arc<dyn Settings>,
        event_bus: Arc<EventBus>,
        cancellation_token: CancellationToken,
    ) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (frames, frame_receiver) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let machine = TrackerMachine::new(config);
        let (state_sender, states) = watch::channel(machine.state().clone());

        let actor = TrackerActor {
            machine,
            receiver,
            frame_receiver,
            state_sender,
            settings,
            event_bus,
            tick_period: config.tick_interval(),
            cancellation_token: cancellation_token.clone(),
        };

        Self {
            commands,
            frames,
            states,
            actor: Mutex::new(Some(actor)),
            actor_task: Mutex::new(None),
            cancellation_token,
        }
    }

    /// Spawn the tracker task: ticking loop plus settings observation
    pub async fn start(&self) -> Result<()> {
        let actor = self
            .actor
            .lock()
            .await
            .take()
            .ok_or_else(|| BlinkTrackerError::component("tracker", "already started"))?;

        let handle = tokio::spawn(actor.run());
        *self.actor_task.lock().await = Some(handle);
        Ok(())
    }

    pub async fn on_tracking_started(&self) -> Result<()> {
        self.send(TrackerCommand::Intent(Intent::TrackingStarted))
            .await
    }

    pub async fn on_tracking_stopped(&self) -> Result<()> {
        self.send(TrackerCommand::Intent(Intent::TrackingStopped))
            .await
    }

    pub async fn on_face_data_changed(&self, data: VisionFaceData) -> Result<()> {
        self.frames
            .send(data)
            .await
            .map_err(|_| BlinkTrackerError::component("tracker", "tracker is not running"))
    }

    /// Dedicated frame input for the camera. Sends wait while the tracker is
    /// behind, so no frame is dropped.
    pub fn frame_sender(&self) -> mpsc::Sender<VisionFaceData> {
        self.frames.clone()
    }

    /// Current state as seen by the tracker task
    pub async fn state(&self) -> Result<TrackerState> {
        let (reply, response) = oneshot::channel();
        self.send(TrackerCommand::State { reply }).await?;
        response
            .await
            .map_err(|_| BlinkTrackerError::component("tracker", "state request dropped"))
    }

    /// Watch state changes
    pub fn states(&self) -> watch::Receiver<TrackerState> {
        self.states.clone()
    }

    pub async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();
        if let Some(handle) = self.actor_task.lock().await.take() {
            handle.await.map_err(|e| {
                BlinkTrackerError::component("tracker", format!("tracker task failed: {}", e))
            })?;
        }
        Ok(())
    }

    async fn send(&self, command: TrackerCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BlinkTrackerError::component("tracker", "tracker is not running"))
    }
}

struct TrackerActor {
    machine: TrackerMachine,
    receiver: mpsc::Receiver<TrackerCommand>,
    frame_receiver: mpsc::Receiver<VisionFaceData>,
    state_sender: watch::Sender<TrackerState>,
    settings: Arc<dyn Settings>,
    event_bus: Arc<EventBus>,
    tick_period: std::time::Duration,
    cancellation_token: CancellationToken,
}

impl TrackerActor {
    async fn run(mut self) {
        info!("Tracker task started (tick every {:?})", self.tick_period);

        let mut threshold = SettingObservation::new(&*self.settings, SettingKey::PerMinuteThreshold);
        let mut sound = SettingObservation::new(&*self.settings, SettingKey::NotifySound);
        let mut vibration = SettingObservation::new(&*self.settings, SettingKey::NotifyVibration);

        for observation in [&mut threshold, &mut sound, &mut vibration] {
            if let Some(value) = observation.current() {
                self.apply_setting(observation, Ok(value));
            }
        }
        self.publish_state();

        let mut ticker = interval_at(Instant::now() + self.tick_period, self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let labels = tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    debug!("Tracker task cancelled");
                    break;
                }
                command = self.receiver.recv() => match command {
                    Some(TrackerCommand::Intent(intent)) => self.machine.accept(intent, Utc::now()),
                    Some(TrackerCommand::State { reply }) => {
                        let _ = reply.send(self.machine.state().clone());
                        Vec::new()
                    }
                    None => {
                        debug!("All tracker handles dropped");
                        break;
                    }
                },
                frame = self.frame_receiver.recv() => match frame {
                    Some(data) => self.machine.accept(Intent::FaceDataChanged(data), Utc::now()),
                    None => {
                        debug!("All frame senders dropped");
                        break;
                    }
                },
                _ = ticker.tick() => self.machine.on_tick(),
                value = threshold.changed() => {
                    self.apply_setting(&mut threshold, value);
                    Vec::new()
                }
                value = sound.changed() => {
                    self.apply_setting(&mut sound, value);
                    Vec::new()
                }
                value = vibration.changed() => {
                    self.apply_setting(&mut vibration, value);
                    Vec::new()
                }
            };

            for label in labels {
                self.publish_label(label);
            }
            self.publish_state();
        }

        info!(
            "Tracker task stopped ({} blinks total)",
            self.machine.state().blinks_total
        );
    }

    fn apply_setting(
        &mut self,
        observation: &mut SettingObservation,
        value: std::result::Result<SettingValue, SettingsError>,
    ) {
        let key = observation.key;
        let applied = value.and_then(|value| match key {
            SettingKey::PerMinuteThreshold => {
                value.as_count(key).map(|v| self.machine.observe_threshold(v))
            }
            SettingKey::NotifySound => value.as_flag(key).map(|v| self.machine.observe_sound(v)),
            SettingKey::NotifyVibration => {
                value.as_flag(key).map(|v| self.machine.observe_vibration(v))
            }
            SettingKey::LaunchMinimized | SettingKey::ReplacePip => Ok(()),
        });

        if let Err(e) = applied {
            warn!("Stopped observing '{}': {}", key.name(), e);
            observation.close();
            self.publish_label(Label::ErrorCaught(e.to_string()));
        }
    }

    fn publish_label(&self, label: Label) {
        let timestamp = SystemTime::now();
        let event = match label {
            Label::SoundNotificationTriggered => {
                BlinkEvent::SoundNotificationTriggered { timestamp }
            }
            Label::VibrationNotificationTriggered => {
                BlinkEvent::VibrationNotificationTriggered { timestamp }
            }
            Label::BlinkedPerMinute(value) => BlinkEvent::BlinkedPerMinute { value, timestamp },
            Label::ErrorCaught(error) => BlinkEvent::ErrorCaught {
                component: "tracker".to_string(),
                error,
            },
        };
        publish_or_log(&self.event_bus, event);
    }

    fn publish_state(&self) {
        let state = self.machine.state();
        self.state_sender.send_if_modified(|current| {
            if current != state {
                *current = state.clone();
                true
            } else {
                false
            }
        });
    }
}
