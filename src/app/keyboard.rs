use crate::error::{BlinkTrackerError, Result};
use crate::events::{publish_or_log, BlinkEvent, EventBus};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    StartTracking,
    StopTracking,
    Quit,
}

impl KeyAction {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::Char('s') | KeyCode::Char('S') => Some(KeyAction::StartTracking),
            KeyCode::Char('p') | KeyCode::Char('P') => Some(KeyAction::StopTracking),
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(KeyAction::Quit),
            _ => None,
        }
    }

    fn into_event(self) -> BlinkEvent {
        let timestamp = SystemTime::now();
        match self {
            KeyAction::StartTracking => BlinkEvent::TrackingRequested {
                active: true,
                timestamp,
            },
            KeyAction::StopTracking => BlinkEvent::TrackingRequested {
                active: false,
                timestamp,
            },
            KeyAction::Quit => BlinkEvent::ShutdownRequested {
                timestamp,
                reason: "User requested via keyboard".to_string(),
            },
        }
    }
}

/// Terminal keyboard control for starting and stopping tracking
pub struct KeyboardControl {
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
    input_task: Mutex<Option<JoinHandle<()>>>,
}

impl KeyboardControl {
    pub fn new(event_bus: Arc<EventBus>, cancellation_token: CancellationToken) -> Self {
        Self {
            event_bus,
            cancellation_token,
            input_task: Mutex::new(None),
        }
    }

    /// Start listening for key presses
    pub async fn start(&self) -> Result<()> {
        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();

        let handle = task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard control active");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        // Only handle key press events (not release)
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }
                        match KeyAction::from_key(key_event.code) {
                            Some(action) => {
                                info!("Key action: {:?}", action);
                                publish_or_log(&event_bus, action.into_event());
                                if action == KeyAction::Quit {
                                    break;
                                }
                            }
                            None => debug!("Key pressed: {:?}", key_event.code),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }
        });

        *self.input_task.lock().await = Some(handle);
        Ok(())
    }

    /// Stop listening and restore the terminal
    pub async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();

        if let Some(handle) = self.input_task.lock().await.take() {
            handle.await.map_err(|e| {
                BlinkTrackerError::component("keyboard", format!("input task failed: {}", e))
            })?;
        }

        // Make sure the terminal is usable even if the task bailed out early
        let _ = disable_raw_mode();
        Ok(())
    }
}
