mod camera;
mod frame;
mod source;

pub use camera::BlinkCamera;
pub use frame::VisionFaceData;
pub use source::{source_from_config, JsonLinesVisionSource, SimulatedVisionSource, VisionSource};
