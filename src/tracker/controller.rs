use std::future::Future;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::db::{models::SleepSession, Database};

use super::{TrackerPhase, TrackerSnapshot};

/// Presentation-layer state machine over the sleep database. One instance
/// per active screen; every observable is published through a watch channel
/// so subscribers never touch storage directly.
pub struct SessionTracker {
    db: Database,
    current: watch::Sender<Option<SleepSession>>,
    sessions: watch::Sender<Vec<SleepSession>>,
    completion_notice: watch::Sender<bool>,
    rating_request: watch::Sender<Option<SleepSession>>,
    cancel: CancellationToken,
}

impl SessionTracker {
    /// Builds a tracker over `db` and loads its initial state, restoring an
    /// open session left behind by a previous run.
    pub async fn new(db: Database) -> Result<Self> {
        let (current, _) = watch::channel(None);
        let (sessions, _) = watch::channel(Vec::new());
        let (completion_notice, _) = watch::channel(false);
        let (rating_request, _) = watch::channel(None);

        let tracker = Self {
            db,
            current,
            sessions,
            completion_notice,
            rating_request,
            cancel: CancellationToken::new(),
        };

        let current = tracker.resolve_open_session().await?;
        let sessions = tracker.guarded(tracker.db.list_sessions()).await?;
        if let Some(session) = &current {
            info!("Restored open sleep session {}", session.id);
        }
        tracker.current.send_replace(current);
        tracker.sessions.send_replace(sessions);

        Ok(tracker)
    }

    /// Begins a new sleep session. Fails if one is already being tracked.
    pub async fn start(&self) -> Result<Option<SleepSession>> {
        self.ensure_open()?;

        if self.current.borrow().is_some() {
            bail!("a sleep session is already being tracked");
        }

        let now = Utc::now();
        let id = self
            .guarded(self.db.insert_session(&SleepSession::begin(now)))
            .await
            .context("failed to start sleep session")?;
        info!("Started sleep session {id}");

        let current = self.resolve_open_session().await?;
        if current.is_none() {
            warn!("Session {id} was not open on re-read; leaving tracker idle");
        }
        let sessions = self.guarded(self.db.list_sessions()).await?;

        self.current.send_replace(current.clone());
        self.sessions.send_replace(sessions);

        Ok(current)
    }

    /// Ends the tracked session and requests a quality rating for it.
    /// A no-op returning `Ok(None)` when nothing is being tracked.
    pub async fn stop(&self) -> Result<Option<SleepSession>> {
        self.ensure_open()?;

        let Some(mut session) = self.current.borrow().clone() else {
            return Ok(None);
        };

        let ended_at = Utc::now();
        session.ended_at = ended_at;
        session.updated_at = ended_at;

        self.guarded(self.db.finish_session(session.id, ended_at, ended_at))
            .await
            .context("failed to stop sleep session")?;
        info!("Stopped sleep session {}", session.id);

        // Leave Tracking as soon as the update commits; a later reload only
        // confirms the transition.
        self.current.send_replace(None);
        self.rating_request.send_replace(Some(session.clone()));

        let sessions = self.guarded(self.db.list_sessions()).await?;
        self.sessions.send_replace(sessions);

        Ok(Some(session))
    }

    /// Deletes every recorded session and raises the completion notice.
    pub async fn clear(&self) -> Result<()> {
        self.ensure_open()?;

        self.guarded(self.db.clear_sessions())
            .await
            .context("failed to clear sleep history")?;
        info!("Cleared all sleep sessions");

        self.current.send_replace(None);
        self.sessions.send_replace(Vec::new());
        self.completion_notice.send_replace(true);

        Ok(())
    }

    /// Stores the quality chosen on the rating screen.
    pub async fn rate(&self, session_id: i64, quality: i32) -> Result<()> {
        self.ensure_open()?;

        self.guarded(self.db.set_session_quality(session_id, quality, Utc::now()))
            .await
            .with_context(|| format!("failed to rate session {session_id}"))?;

        let sessions = self.guarded(self.db.list_sessions()).await?;
        self.sessions.send_replace(sessions);

        Ok(())
    }

    pub fn acknowledge_notice(&self) {
        self.completion_notice.send_replace(false);
    }

    pub fn acknowledge_rating(&self) {
        self.rating_request.send_replace(None);
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            current_session: self.current.borrow().clone(),
            sessions: self.sessions.borrow().clone(),
            completion_notice: *self.completion_notice.borrow(),
            rating_request: self.rating_request.borrow().clone(),
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        if self.current.borrow().is_some() {
            TrackerPhase::Tracking
        } else {
            TrackerPhase::Idle
        }
    }

    pub fn subscribe_current(&self) -> watch::Receiver<Option<SleepSession>> {
        self.current.subscribe()
    }

    pub fn subscribe_sessions(&self) -> watch::Receiver<Vec<SleepSession>> {
        self.sessions.subscribe()
    }

    pub fn subscribe_notice(&self) -> watch::Receiver<bool> {
        self.completion_notice.subscribe()
    }

    pub fn subscribe_rating(&self) -> watch::Receiver<Option<SleepSession>> {
        self.rating_request.subscribe()
    }

    /// Tears the tracker down: in-flight storage operations are abandoned
    /// and every later command fails.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            bail!("session tracker is closed");
        }
        Ok(())
    }

    /// The newest row only counts as the current session while its interval
    /// is still open; a finished row on the read path means there is nothing
    /// to track.
    async fn resolve_open_session(&self) -> Result<Option<SleepSession>> {
        let most_recent = self.guarded(self.db.get_most_recent_session()).await?;
        Ok(most_recent.filter(SleepSession::is_in_progress))
    }

    async fn guarded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            () = self.cancel.cancelled() => bail!("session tracker is closed"),
            result = op => result,
        }
    }
}
