pub mod keyboard;

mod orchestrator;
mod router;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::{BlinkTrackerOrchestrator, Collaborators};
pub use types::{ComponentState, ShutdownReason};
