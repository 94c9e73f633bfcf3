mod component;
mod machine;
mod state;

pub use component::BlinkTracker;
pub use machine::TrackerMachine;
pub use state::{Intent, Label, TrackerState};
