use serde::{Deserialize, Serialize};

use crate::db::models::SleepSession;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TrackerPhase {
    Idle,
    Tracking,
}

impl Default for TrackerPhase {
    fn default() -> Self {
        TrackerPhase::Idle
    }
}

/// UI-facing view of the tracker: the published observables plus the button
/// state derived from them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub current_session: Option<SleepSession>,
    pub sessions: Vec<SleepSession>,
    pub completion_notice: bool,
    pub rating_request: Option<SleepSession>,
}

impl TrackerSnapshot {
    pub fn phase(&self) -> TrackerPhase {
        if self.current_session.is_some() {
            TrackerPhase::Tracking
        } else {
            TrackerPhase::Idle
        }
    }

    pub fn start_button_visible(&self) -> bool {
        self.current_session.is_none()
    }

    pub fn stop_button_visible(&self) -> bool {
        self.current_session.is_some()
    }

    pub fn clear_button_visible(&self) -> bool {
        !self.sessions.is_empty()
    }
}
