use super::state::{reduce, Intent, Label, Msg, TrackerState};
use crate::config::TrackerConfig;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// Blink tracking state machine.
///
/// Turns intents, ticks and observed preferences into reducer messages and
/// output [`Label`]s. Pure apart from logging; time is passed in by the caller.
pub struct TrackerMachine {
    state: TrackerState,
    measure_period: u64,
    openness_threshold: f32,
    blink_cooldown: Duration,
}

impl TrackerMachine {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            state: TrackerState::default(),
            measure_period: config.measure_period_ticks.max(1),
            openness_threshold: config.blink_openness_threshold,
            blink_cooldown: Duration::from_std(config.blink_cooldown())
                .unwrap_or_else(|_| Duration::max_value()),
        }
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    fn dispatch(&mut self, msg: Msg) {
        self.state = reduce(&self.state, msg);
    }

    /// Handle an external intent received at `now`
    pub fn accept(&mut self, intent: Intent, now: DateTime<Utc>) -> Vec<Label> {
        match intent {
            Intent::TrackingStarted => {
                if !self.state.active {
                    info!("Blink tracking started");
                }
                self.dispatch(Msg::TrackerStateChanged(true));
                Vec::new()
            }
            Intent::TrackingStopped => {
                if self.state.active {
                    info!("Blink tracking stopped after {} s", self.state.timer);
                }
                self.dispatch(Msg::TrackerStateChanged(false));
                Vec::new()
            }
            Intent::FaceDataChanged(data) => {
                self.dispatch(Msg::FaceDataAvailable(data.face_available));

                if data.eyes_closed(self.openness_threshold) && self.blink_period_ended(now) {
                    self.dispatch(Msg::Blink(now));
                    debug!(
                        "Blink registered ({} this period, {} total)",
                        self.state.blink_last_minute, self.state.blinks_total
                    );
                }
                Vec::new()
            }
        }
    }

    /// Advance one tick. Inactive trackers ignore ticks.
    pub fn on_tick(&mut self) -> Vec<Label> {
        if !self.state.active {
            return Vec::new();
        }

        let timer = self.state.timer + 1;
        self.dispatch(Msg::Tick(timer));

        if timer % self.measure_period != 0 {
            return Vec::new();
        }

        let blinks = self.state.blink_last_minute;
        let mut labels = Vec::new();

        if blinks < self.state.threshold {
            info!(
                "Blink rate too low: {} blinks, threshold {}",
                blinks, self.state.threshold
            );
            if self.state.notify_with_sound {
                labels.push(Label::SoundNotificationTriggered);
            }
            if self.state.notify_with_vibration {
                labels.push(Label::VibrationNotificationTriggered);
            }
        }

        labels.push(Label::BlinkedPerMinute(blinks));
        self.dispatch(Msg::ResetMinute);
        labels
    }

    pub fn observe_threshold(&mut self, threshold: u32) {
        self.dispatch(Msg::ObservedThresholdChanged(threshold));
    }

    pub fn observe_sound(&mut self, enabled: bool) {
        self.dispatch(Msg::ObservedSoundChanged(enabled));
    }

    pub fn observe_vibration(&mut self, enabled: bool) {
        self.dispatch(Msg::ObservedVibrationChanged(enabled));
    }

    fn blink_period_ended(&self, now: DateTime<Utc>) -> bool {
        match self.state.last_blink {
            None => true,
            Some(last) => now - last >= self.blink_cooldown,
        }
    }
}
