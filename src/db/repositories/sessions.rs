use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, validate_quality},
    models::SleepSession,
};

fn row_to_session(row: &Row) -> Result<SleepSession> {
    let started_at: String = row.get("started_at")?;
    let ended_at: String = row.get("ended_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(SleepSession {
        id: row.get("id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_datetime(&ended_at, "ended_at")?,
        quality: row.get("quality")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Inserts a new session and returns the storage-assigned id.
    pub async fn insert_session(&self, session: &SleepSession) -> Result<i64> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sleep_sessions (started_at, ended_at, quality, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.started_at.to_rfc3339(),
                    record.ended_at.to_rfc3339(),
                    record.quality,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn finish_session(
        &self,
        session_id: i64,
        ended_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sleep_sessions
                 SET ended_at = ?1,
                     updated_at = ?2
                 WHERE id = ?3",
                params![ended_at.to_rfc3339(), updated_at.to_rfc3339(), session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("session {session_id} not found"));
            }

            Ok(())
        })
        .await
    }

    pub async fn set_session_quality(
        &self,
        session_id: i64,
        quality: i32,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        validate_quality(quality)?;
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sleep_sessions
                 SET quality = ?1,
                     updated_at = ?2
                 WHERE id = ?3",
                params![quality, updated_at.to_rfc3339(), session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("session {session_id} not found"));
            }

            Ok(())
        })
        .await
    }

    /// Newest session by creation order, open or finished.
    pub async fn get_most_recent_session(&self) -> Result<Option<SleepSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, started_at, ended_at, quality, created_at, updated_at
                 FROM sleep_sessions
                 ORDER BY id DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query([])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    /// All sessions, most recent first.
    pub async fn list_sessions(&self) -> Result<Vec<SleepSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, started_at, ended_at, quality, created_at, updated_at
                 FROM sleep_sessions
                 ORDER BY started_at DESC, id DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }

    pub async fn clear_sessions(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute("DELETE FROM sleep_sessions", [])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("nightlog.sqlite3")).unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn insert_assigns_ids_in_creation_order() {
        let (db, _temp) = open_db();

        let first = db
            .insert_session(&SleepSession::begin(Utc::now()))
            .await
            .unwrap();
        let second = db
            .insert_session(&SleepSession::begin(Utc::now()))
            .await
            .unwrap();

        assert!(second > first);

        let most_recent = db.get_most_recent_session().await.unwrap().unwrap();
        assert_eq!(most_recent.id, second);
    }

    #[tokio::test]
    async fn finish_session_persists_end_time() {
        let (db, _temp) = open_db();

        let started = Utc::now();
        let id = db.insert_session(&SleepSession::begin(started)).await.unwrap();

        let ended = started + Duration::hours(7);
        db.finish_session(id, ended, ended).await.unwrap();

        let session = db.get_most_recent_session().await.unwrap().unwrap();
        assert_eq!(session.ended_at, ended);
        assert!(!session.is_in_progress());
    }

    #[tokio::test]
    async fn finish_session_errors_on_missing_row() {
        let (db, _temp) = open_db();
        let err = db.finish_session(42, Utc::now(), Utc::now()).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn quality_updates_are_validated_and_persisted() {
        let (db, _temp) = open_db();

        let id = db
            .insert_session(&SleepSession::begin(Utc::now()))
            .await
            .unwrap();

        assert!(db.set_session_quality(id, 9, Utc::now()).await.is_err());

        db.set_session_quality(id, 4, Utc::now()).await.unwrap();
        let session = db.get_most_recent_session().await.unwrap().unwrap();
        assert_eq!(session.quality, 4);
        assert!(session.is_rated());
    }

    #[tokio::test]
    async fn list_orders_by_start_time_descending() {
        let (db, _temp) = open_db();

        let base = Utc::now();
        for offset in [2, 0, 1] {
            let session = SleepSession::begin(base - Duration::days(offset));
            db.insert_session(&session).await.unwrap();
        }

        let sessions = db.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 3);
        assert!(sessions
            .windows(2)
            .all(|pair| pair[0].started_at >= pair[1].started_at));
    }

    #[tokio::test]
    async fn clear_removes_every_session() {
        let (db, _temp) = open_db();

        for _ in 0..3 {
            db.insert_session(&SleepSession::begin(Utc::now()))
                .await
                .unwrap();
        }

        db.clear_sessions().await.unwrap();
        assert!(db.list_sessions().await.unwrap().is_empty());
        assert!(db.get_most_recent_session().await.unwrap().is_none());
    }
}
