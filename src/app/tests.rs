use super::*;
use crate::config::BlinkTrackerConfig;
use crate::error::Result;
use crate::events::BlinkEvent;
use crate::notifications::{ErrorHandler, NotificationsManager};
use crate::settings::SettingsStore;
use crate::statistics::{StatisticsRepository, StatisticsStore};
use crate::vision::{VisionFaceData, VisionSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct ChannelVisionSource {
    frames: mpsc::Receiver<VisionFaceData>,
}

#[async_trait]
impl VisionSource for ChannelVisionSource {
    async fn next_frame(&mut self) -> Result<Option<VisionFaceData>> {
        Ok(self.frames.recv().await)
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Produces open-eye frames as fast as the tracker takes them
struct FloodVisionSource;

#[async_trait]
impl VisionSource for FloodVisionSource {
    async fn next_frame(&mut self) -> Result<Option<VisionFaceData>> {
        tokio::task::yield_now().await;
        Ok(Some(VisionFaceData::open_eyes()))
    }

    fn name(&self) -> &str {
        "flood"
    }
}

#[derive(Default)]
struct RecordingNotifications {
    calls: StdMutex<Vec<&'static str>>,
}

impl NotificationsManager for RecordingNotifications {
    fn notify_with_sound(&self) {
        self.calls.lock().unwrap().push("sound");
    }

    fn notify_with_vibration(&self) {
        self.calls.lock().unwrap().push("vibration");
    }
}

#[derive(Default)]
struct RecordingErrorHandler {
    errors: StdMutex<Vec<(String, String)>>,
}

impl ErrorHandler for RecordingErrorHandler {
    fn consume(&self, component: &str, error: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((component.to_string(), error.to_string()));
    }
}

struct Harness {
    orchestrator: BlinkTrackerOrchestrator,
    frames: mpsc::Sender<VisionFaceData>,
    statistics: Arc<StatisticsStore>,
    notifications: Arc<RecordingNotifications>,
    errors: Arc<RecordingErrorHandler>,
}

fn create_test_config() -> BlinkTrackerConfig {
    let mut config = BlinkTrackerConfig::default();
    config.tracker.tick_interval_ms = 10;
    config.tracker.measure_period_ticks = 3;
    config.system.shutdown_timeout_seconds = 2;
    config
}

fn create_harness(config: BlinkTrackerConfig) -> Harness {
    let (frames, receiver) = mpsc::channel(16);
    create_harness_with_source(config, Box::new(ChannelVisionSource { frames: receiver }), frames)
}

fn create_harness_with_source(
    config: BlinkTrackerConfig,
    vision_source: Box<dyn VisionSource>,
    frames: mpsc::Sender<VisionFaceData>,
) -> Harness {
    let statistics = Arc::new(StatisticsStore::in_memory());
    let notifications = Arc::new(RecordingNotifications::default());
    let errors = Arc::new(RecordingErrorHandler::default());

    let orchestrator = BlinkTrackerOrchestrator::new(
        config,
        Collaborators {
            settings: Arc::new(SettingsStore::in_memory()),
            statistics: Arc::clone(&statistics) as Arc<dyn StatisticsRepository>,
            vision_source,
            notifications: Arc::clone(&notifications) as Arc<dyn NotificationsManager>,
            error_handler: Arc::clone(&errors) as Arc<dyn ErrorHandler>,
        },
    );

    Harness {
        orchestrator,
        frames,
        statistics,
        notifications,
        errors,
    }
}

fn create_flood_harness() -> Harness {
    let mut config = create_test_config();
    config.system.auto_start = true;
    // Nothing reads this channel; the flood source feeds the camera
    let (frames, _) = mpsc::channel(1);
    create_harness_with_source(config, Box::new(FloodVisionSource), frames)
}

async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_component_lifecycle_states() {
    let mut harness = create_harness(create_test_config());
    let orchestrator = &mut harness.orchestrator;

    orchestrator.initialize().await.unwrap();
    let states = orchestrator.get_all_component_states().await;
    assert_eq!(states.len(), 4);
    assert!(states.values().all(|s| *s == ComponentState::Stopped));

    orchestrator.start().await.unwrap();
    assert_eq!(
        orchestrator.get_component_state("tracker").await,
        Some(ComponentState::Running)
    );
    assert_eq!(
        orchestrator.get_component_state("camera").await,
        Some(ComponentState::Running)
    );
    assert_eq!(orchestrator.get_component_state("keyboard").await, None);

    let exit_code = orchestrator.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);
    let states = orchestrator.get_all_component_states().await;
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
}

#[tokio::test]
async fn test_face_data_reaches_tracker() {
    let mut harness = create_harness(create_test_config());
    harness.orchestrator.initialize().await.unwrap();
    harness.orchestrator.start().await.unwrap();

    let tracker = harness.orchestrator.tracker();
    let mut states = tracker.states();

    harness.frames.send(VisionFaceData::closed_eyes()).await.unwrap();

    timeout(Duration::from_secs(1), states.wait_for(|s| s.blinks_total == 1))
        .await
        .unwrap()
        .unwrap();

    let state = tracker.state().await.unwrap();
    assert!(state.face_detected);
    assert!(!state.active);

    harness.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_period_rollover_notifies_and_records_statistics() {
    let mut harness = create_harness(create_test_config());
    harness.orchestrator.initialize().await.unwrap();
    harness.orchestrator.start().await.unwrap();

    harness
        .orchestrator
        .event_bus()
        .publish(BlinkEvent::TrackingRequested {
            active: true,
            timestamp: SystemTime::now(),
        })
        .unwrap();

    let statistics = harness.orchestrator.statistics();
    let mut models = statistics.models();
    let model = timeout(Duration::from_secs(2), models.wait_for(|m| m.minutes_tracked >= 1))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(model.records[0].blinks, 0);

    // Zero blinks is below the default threshold of 10
    let notifications = Arc::clone(&harness.notifications);
    eventually(move || {
        let calls = notifications.calls.lock().unwrap();
        calls.contains(&"sound") && calls.contains(&"vibration")
    })
    .await;

    harness.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_auto_start_begins_tracking() {
    let mut config = create_test_config();
    config.system.auto_start = true;
    let mut harness = create_harness(config);
    harness.orchestrator.initialize().await.unwrap();
    harness.orchestrator.start().await.unwrap();

    let mut states = harness.orchestrator.tracker().states();
    timeout(Duration::from_secs(1), states.wait_for(|s| s.active && s.timer > 0))
        .await
        .unwrap()
        .unwrap();

    harness.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_errors_are_routed_to_handler() {
    let mut harness = create_harness(create_test_config());
    harness.orchestrator.initialize().await.unwrap();
    harness.orchestrator.start().await.unwrap();

    // An invalid slider value is reported by the preferences component
    harness
        .orchestrator
        .preferences()
        .on_minimal_threshold_changed(-1.0)
        .await;

    let errors = Arc::clone(&harness.errors);
    eventually(move || !errors.errors.lock().unwrap().is_empty()).await;

    let errors = harness.errors.errors.lock().unwrap().clone();
    assert_eq!(errors[0].0, "preferences");

    harness.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_request_ends_run() {
    let mut harness = create_harness(create_test_config());
    harness.orchestrator.initialize().await.unwrap();
    harness.orchestrator.start().await.unwrap();

    harness
        .orchestrator
        .event_bus()
        .publish(BlinkEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: "test".to_string(),
        })
        .unwrap();

    let exit_code = timeout(Duration::from_secs(3), harness.orchestrator.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(
        harness.orchestrator.get_component_state("statistics").await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_request_shutdown_only_once() {
    let harness = create_harness(create_test_config());
    harness
        .orchestrator
        .request_shutdown(ShutdownReason::Error("first".to_string()))
        .await;
    // The second request finds the sender already used
    harness
        .orchestrator
        .request_shutdown(ShutdownReason::Error("second".to_string()))
        .await;
    assert!(harness.orchestrator.shutdown_sender.lock().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_every_rollover_is_recorded_under_frame_flood() {
    let mut harness = create_flood_harness();
    harness.orchestrator.initialize().await.unwrap();
    harness.orchestrator.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let tracker = harness.orchestrator.tracker();
    tracker.on_tracking_stopped().await.unwrap();
    let state = tracker.state().await.unwrap();
    assert!(!state.active);
    let rollovers = state.timer / 3;
    assert!(rollovers > 0);

    let statistics = Arc::clone(&harness.statistics);
    eventually(move || statistics.len() as u64 == rollovers).await;

    // Nothing arrives late either
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.statistics.len() as u64, rollovers);
    assert!(harness.errors.errors.lock().unwrap().is_empty());

    harness.orchestrator.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_records_rollovers_up_to_the_last_tick() {
    let mut harness = create_flood_harness();
    harness.orchestrator.initialize().await.unwrap();
    harness.orchestrator.start().await.unwrap();

    let tracker = harness.orchestrator.tracker();
    let mut states = tracker.states();
    timeout(Duration::from_secs(2), states.wait_for(|s| s.timer >= 7))
        .await
        .unwrap()
        .unwrap();

    // Tracking is still active, so a rollover can land right before teardown
    let exit_code = harness.orchestrator.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);

    let final_timer = tracker.states().borrow().timer;
    assert_eq!(harness.statistics.len() as u64, final_timer / 3);
}
