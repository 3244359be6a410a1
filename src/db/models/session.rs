use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel quality for a session that has not been rated yet.
pub const UNRATED_QUALITY: i32 = -1;

/// One recorded sleep interval. An in-progress session is represented by
/// `ended_at == started_at`; stopping the session moves `ended_at` forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSession {
    /// Storage-assigned row id; 0 until the session has been inserted.
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub quality: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SleepSession {
    /// A fresh, unrated session starting now.
    pub fn begin(now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            started_at: now,
            ended_at: now,
            quality: UNRATED_QUALITY,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.ended_at == self.started_at
    }

    pub fn is_rated(&self) -> bool {
        self.quality != UNRATED_QUALITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn fresh_session_is_open_and_unrated() {
        let session = SleepSession::begin(Utc::now());
        assert!(session.is_in_progress());
        assert!(!session.is_rated());
        assert_eq!(session.quality, UNRATED_QUALITY);
    }

    #[test]
    fn finished_session_is_not_in_progress() {
        let now = Utc::now();
        let mut session = SleepSession::begin(now);
        session.ended_at = now + Duration::hours(8);
        assert!(!session.is_in_progress());
    }
}
