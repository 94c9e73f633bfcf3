use super::{VisionFaceData, VisionSource};
use crate::error::{BlinkTrackerError, Result};
use crate::events::{publish_or_log, BlinkEvent, EventBus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Camera component: pulls frames from a vision source and forwards them
/// to the tracker's frame input
pub struct BlinkCamera {
    source: Mutex<Option<Box<dyn VisionSource>>>,
    frames: mpsc::Sender<VisionFaceData>,
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
    frames_forwarded: Arc<AtomicU64>,
    capture_task: Mutex<Option<JoinHandle<()>>>,
}

impl BlinkCamera {
    pub fn new(
        source: Box<dyn VisionSource>,
        frames: mpsc::Sender<VisionFaceData>,
        event_bus: Arc<EventBus>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            source: Mutex::new(Some(source)),
            frames,
            event_bus,
            cancellation_token,
            frames_forwarded: Arc::new(AtomicU64::new(0)),
            capture_task: Mutex::new(None),
        }
    }

    /// Start forwarding frames. A camera can only be started once.
    pub async fn start(&self) -> Result<()> {
        let mut source = self.source.lock().await.take().ok_or_else(|| {
            BlinkTrackerError::component("camera", "vision source already consumed")
        })?;

        info!("Starting camera with '{}' vision source", source.name());

        let frames = self.frames.clone();
        let event_bus = Arc::clone(&self.event_bus);
        let token = self.cancellation_token.clone();
        let frames_forwarded = Arc::clone(&self.frames_forwarded);

        let handle = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Camera capture loop cancelled");
                        break;
                    }
                    frame = source.next_frame() => frame,
                };

                match frame {
                    Ok(Some(data)) => {
                        let sent = tokio::select! {
                            _ = token.cancelled() => {
                                debug!("Camera capture loop cancelled");
                                break;
                            }
                            sent = frames.send(data) => sent,
                        };
                        if sent.is_err() {
                            warn!("Tracker stopped accepting frames");
                            break;
                        }
                        frames_forwarded.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(None) => {
                        warn!("Vision source '{}' ended", source.name());
                        break;
                    }
                    Err(e) => {
                        error!("Vision source '{}' failed: {}", source.name(), e);
                        publish_or_log(
                            &event_bus,
                            BlinkEvent::ErrorCaught {
                                component: "camera".to_string(),
                                error: e.to_string(),
                            },
                        );
                        break;
                    }
                }
            }

            info!(
                "Camera stopped after {} frames",
                frames_forwarded.load(Ordering::Relaxed)
            );
        });

        *self.capture_task.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the capture loop and wait for it to exit
    pub async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();
        if let Some(handle) = self.capture_task.lock().await.take() {
            handle.await.map_err(|e| {
                BlinkTrackerError::component("camera", format!("capture task failed: {}", e))
            })?;
        }
        Ok(())
    }

    pub fn frames_forwarded(&self) -> u64 {
        self.frames_forwarded.load(Ordering::Relaxed)
    }
}
