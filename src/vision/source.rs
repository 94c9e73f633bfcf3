use super::VisionFaceData;
use crate::config::VisionConfig;
use crate::error::{Result, VisionError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Number of consecutive closed-eye frames in one simulated blink
const SIMULATED_CLOSED_FRAMES: u64 = 2;

/// Producer of per-frame face measurements
#[async_trait]
pub trait VisionSource: Send {
    /// Wait for the next frame. `Ok(None)` means the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<VisionFaceData>>;

    /// Short name for logging
    fn name(&self) -> &str;
}

/// Build the vision source selected in the configuration
pub fn source_from_config(config: &VisionConfig) -> Result<Box<dyn VisionSource>> {
    match config.source.as_str() {
        "simulated" => Ok(Box::new(SimulatedVisionSource::new(
            config.simulated_fps,
            Duration::from_millis(config.simulated_blink_interval_ms),
        ))),
        "stdin" => Ok(Box::new(JsonLinesVisionSource::new(BufReader::new(
            tokio::io::stdin(),
        )))),
        other => Err(VisionError::UnknownSource {
            name: other.to_string(),
        }
        .into()),
    }
}

/// Synthetic face feed that blinks at a fixed interval
pub struct SimulatedVisionSource {
    frame_interval: Duration,
    frames_per_cycle: u64,
    frame_index: u64,
    ticker: Option<Interval>,
}

impl SimulatedVisionSource {
    pub fn new(fps: u32, blink_interval: Duration) -> Self {
        let fps = fps.max(1) as u64;
        let frame_interval = Duration::from_micros(1_000_000 / fps);
        let frames = blink_interval.as_millis().saturating_mul(u128::from(fps)) / 1000;
        let frames_per_cycle =
            u64::try_from(frames).unwrap_or(u64::MAX).max(SIMULATED_CLOSED_FRAMES + 1);

        info!(
            "Simulated vision source: {} fps, one blink every {} frames",
            fps, frames_per_cycle
        );

        Self {
            frame_interval,
            frames_per_cycle,
            frame_index: 0,
            ticker: None,
        }
    }

    /// Frame produced at position `index` of the simulated feed
    pub fn frame_at(&self, index: u64) -> VisionFaceData {
        let position = index % self.frames_per_cycle;
        if position >= self.frames_per_cycle - SIMULATED_CLOSED_FRAMES {
            VisionFaceData::closed_eyes()
        } else {
            VisionFaceData::open_eyes()
        }
    }

    pub fn frames_per_cycle(&self) -> u64 {
        self.frames_per_cycle
    }
}

#[async_trait]
impl VisionSource for SimulatedVisionSource {
    async fn next_frame(&mut self) -> Result<Option<VisionFaceData>> {
        let period = self.frame_interval.max(Duration::from_millis(1));
        let ticker = self.ticker.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        ticker.tick().await;

        let frame = self.frame_at(self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

/// Reads one JSON-encoded [`VisionFaceData`] per line, e.g.
/// `{"left_eye_openness":0.1,"right_eye_openness":0.2,"face_available":true}`
pub struct JsonLinesVisionSource<R> {
    lines: Lines<R>,
    line_number: usize,
    skipped_lines: usize,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesVisionSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            skipped_lines: 0,
        }
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> VisionSource for JsonLinesVisionSource<R> {
    async fn next_frame(&mut self) -> Result<Option<VisionFaceData>> {
        loop {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|e| VisionError::Read {
                    details: e.to_string(),
                })?;

            let Some(line) = line else {
                debug!("Vision input ended after {} lines", self.line_number);
                return Ok(None);
            };
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<VisionFaceData>(trimmed) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => {
                    self.skipped_lines += 1;
                    warn!("Skipping malformed frame on line {}: {}", self.line_number, e);
                }
            }
        }
    }

    fn name(&self) -> &str {
        "json-lines"
    }
}
