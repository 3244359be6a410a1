pub mod db;
pub mod tracker;

pub use db::models::{SleepSession, UNRATED_QUALITY};
pub use db::Database;
pub use tracker::{SessionTracker, TrackerPhase, TrackerSnapshot};
