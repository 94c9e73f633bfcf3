use crate::vision::VisionFaceData;
use chrono::{DateTime, Utc};

/// Tracker state, owned by the tracker and changed only through [`reduce`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerState {
    pub active: bool,
    /// Active seconds elapsed, never reset while the process lives
    pub timer: u64,
    /// Minimum acceptable blinks per measuring period
    pub threshold: u32,
    pub notify_with_sound: bool,
    pub notify_with_vibration: bool,
    pub face_detected: bool,
    pub blink_last_minute: u32,
    pub blinks_total: u64,
    pub last_blink: Option<DateTime<Utc>>,
}

impl Default for TrackerState {
    fn default() -> Self {
        Self {
            active: false,
            timer: 0,
            threshold: 10,
            notify_with_sound: true,
            notify_with_vibration: true,
            face_detected: false,
            blink_last_minute: 0,
            blinks_total: 0,
            last_blink: None,
        }
    }
}

/// Requests accepted from outside the tracker
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    TrackingStarted,
    TrackingStopped,
    FaceDataChanged(VisionFaceData),
}

/// Signals emitted by the tracker
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    SoundNotificationTriggered,
    VibrationNotificationTriggered,
    BlinkedPerMinute(u32),
    ErrorCaught(String),
}

/// State changes understood by the reducer
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Msg {
    ObservedThresholdChanged(u32),
    ObservedSoundChanged(bool),
    ObservedVibrationChanged(bool),
    FaceDataAvailable(bool),
    TrackerStateChanged(bool),
    Tick(u64),
    Blink(DateTime<Utc>),
    ResetMinute,
}

pub(crate) fn reduce(state: &TrackerState, msg: Msg) -> TrackerState {
    match msg {
        Msg::ObservedThresholdChanged(threshold) => TrackerState {
            threshold,
            ..state.clone()
        },
        Msg::ObservedSoundChanged(notify_with_sound) => TrackerState {
            notify_with_sound,
            ..state.clone()
        },
        Msg::ObservedVibrationChanged(notify_with_vibration) => TrackerState {
            notify_with_vibration,
            ..state.clone()
        },
        Msg::FaceDataAvailable(face_detected) => TrackerState {
            face_detected,
            ..state.clone()
        },
        Msg::TrackerStateChanged(active) => TrackerState {
            active,
            ..state.clone()
        },
        Msg::Tick(timer) => TrackerState {
            timer,
            ..state.clone()
        },
        Msg::Blink(at) => TrackerState {
            blink_last_minute: state.blink_last_minute.saturating_add(1),
            blinks_total: state.blinks_total.saturating_add(1),
            last_blink: Some(at),
            ..state.clone()
        },
        Msg::ResetMinute => TrackerState {
            blink_last_minute: 0,
            ..state.clone()
        },
    }
}
