pub mod controller;
pub mod state;

pub use controller::SessionTracker;
pub use state::{TrackerPhase, TrackerSnapshot};
