//! Listen rows: one per (user, track, backend, timestamp).

use chrono::{DateTime, Utc};

use super::{Session, Unique, to_i64};
use crate::error::{Error, Result};
use crate::model::{
    BackendKind, ListenEntry, ListenId, Subject, SyncState, TimedListen, TrackId, UserId,
    date_time_from_timestamp, normalize_date_time,
};

#[derive(Debug, sqlx::FromRow)]
struct ListenRow {
    id: i64,
    user_id: i64,
    track_id: i64,
    backend: String,
    sync_state: String,
    date_time: i64,
}

impl TryFrom<ListenRow> for ListenEntry {
    type Error = Error;

    fn try_from(row: ListenRow) -> Result<Self> {
        Ok(ListenEntry {
            id: ListenId(row.id),
            user_id: UserId(row.user_id),
            track_id: TrackId(row.track_id),
            backend: row.backend.parse()?,
            sync_state: row.sync_state.parse()?,
            listened_at: date_time_from_timestamp(row.date_time)?,
        })
    }
}

const LISTEN_COLUMNS: &str =
    "SELECT id, user_id, track_id, backend, sync_state, date_time FROM listens";

/// Join clause and predicate restricting listens to a subject.
fn subject_filter(subject: Subject) -> &'static str {
    match subject {
        Subject::Track(_) => "WHERE l.track_id = ?",
        Subject::Release(_) => "JOIN tracks t ON t.id = l.track_id WHERE t.release_id = ?",
        Subject::Artist(_) => {
            "WHERE l.track_id IN (SELECT track_id FROM track_artist_links WHERE artist_id = ?)"
        }
    }
}

impl<M> Session<M> {
    /// Look up by natural key.
    pub async fn find_listen(
        &mut self,
        user: UserId,
        track: TrackId,
        backend: BackendKind,
        listened_at: DateTime<Utc>,
    ) -> Result<Option<ListenEntry>> {
        let row = sqlx::query_as::<_, ListenRow>(&format!(
            "{LISTEN_COLUMNS} WHERE user_id = ? AND track_id = ? AND backend = ? AND date_time = ?"
        ))
        .bind(user)
        .bind(track)
        .bind(backend.as_str())
        .bind(normalize_date_time(listened_at).timestamp())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(ListenEntry::try_from).transpose()
    }

    pub async fn find_listen_by_id(&mut self, id: ListenId) -> Result<Option<ListenEntry>> {
        let row = sqlx::query_as::<_, ListenRow>(&format!("{LISTEN_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(ListenEntry::try_from).transpose()
    }

    /// Listens of a user not yet submitted, oldest first.
    pub async fn pending_listens(
        &mut self,
        user: UserId,
        backend: BackendKind,
        limit: usize,
    ) -> Result<Vec<ListenEntry>> {
        let rows = sqlx::query_as::<_, ListenRow>(&format!(
            "{LISTEN_COLUMNS} WHERE user_id = ? AND backend = ? AND sync_state = ? \
             ORDER BY date_time, id LIMIT ?"
        ))
        .bind(user)
        .bind(backend.as_str())
        .bind(SyncState::PendingAdd.as_str())
        .bind(to_i64(limit))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(ListenEntry::try_from).collect()
    }

    pub async fn has_pending_listens(&mut self, user: UserId, backend: BackendKind) -> Result<bool> {
        let pending: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM listens WHERE user_id = ? AND backend = ? AND sync_state = ?)",
        )
        .bind(user)
        .bind(backend.as_str())
        .bind(SyncState::PendingAdd.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(pending)
    }

    /// Number of listens of a subject by a user.
    pub async fn listen_count(
        &mut self,
        user: UserId,
        backend: BackendKind,
        subject: Subject,
    ) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM listens l {} AND l.user_id = ? AND l.backend = ?",
            subject_filter(subject)
        ))
        .bind(subject.raw_id())
        .bind(user)
        .bind(backend.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Time of the most recent listen of a subject by a user.
    pub async fn last_listen_date_time(
        &mut self,
        user: UserId,
        backend: BackendKind,
        subject: Subject,
    ) -> Result<Option<DateTime<Utc>>> {
        let last: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT MAX(l.date_time) FROM listens l {} AND l.user_id = ? AND l.backend = ?",
            subject_filter(subject)
        ))
        .bind(subject.raw_id())
        .bind(user)
        .bind(backend.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        last.map(date_time_from_timestamp).transpose()
    }
}

impl Session<Unique> {
    pub async fn create_listen(
        &mut self,
        listen: &TimedListen,
        backend: BackendKind,
        sync_state: SyncState,
    ) -> Result<ListenEntry> {
        let listened_at = normalize_date_time(listen.listened_at);
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO listens (user_id, track_id, backend, sync_state, date_time)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(listen.user_id)
        .bind(listen.track_id)
        .bind(backend.as_str())
        .bind(sync_state.as_str())
        .bind(listened_at.timestamp())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(ListenEntry {
            id: ListenId(id),
            user_id: listen.user_id,
            track_id: listen.track_id,
            backend,
            sync_state,
            listened_at,
        })
    }

    /// Move a listen to `next`, rejecting illegal transitions.
    ///
    /// Returns `false` when the row no longer exists.
    pub async fn set_listen_state(&mut self, id: ListenId, next: SyncState) -> Result<bool> {
        let current: Option<String> = sqlx::query_scalar("SELECT sync_state FROM listens WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some(current) = current else {
            return Ok(false);
        };

        let next = current.parse::<SyncState>()?.transition(next)?;
        sqlx::query("UPDATE listens SET sync_state = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReleaseId;
    use crate::test_utils::{TrackFixture, insert_track, insert_user, temp_db};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find_listen() {
        let (db, _dir) = temp_db().await;
        let user = insert_user(&db, "alice").await;
        let track = insert_track(&db, TrackFixture::new("Song", "Album", "Artist")).await;

        let listen = TimedListen {
            user_id: user,
            track_id: track,
            listened_at: DateTime::from_timestamp(1_650_541_124, 500_000_000).unwrap(),
        };

        let mut session = db.write().await.unwrap();
        let entry = session
            .create_listen(&listen, BackendKind::Internal, SyncState::Synchronized)
            .await
            .unwrap();
        assert_eq!(entry.listened_at, at(1_650_541_124));

        let found = session
            .find_listen(user, track, BackendKind::Internal, listen.listened_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, entry);

        // Same second is the same listen
        assert!(session
            .create_listen(&listen, BackendKind::Internal, SyncState::Synchronized)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_count_and_last_listen_by_subject() {
        let (db, _dir) = temp_db().await;
        let user = insert_user(&db, "alice").await;
        let first = insert_track(&db, TrackFixture::new("One", "Album", "Artist")).await;
        let second = insert_track(&db, TrackFixture::new("Two", "Album", "Artist")).await;

        let mut session = db.write().await.unwrap();
        for (track, secs) in [(first, 100), (first, 200), (second, 300)] {
            let listen = TimedListen {
                user_id: user,
                track_id: track,
                listened_at: at(secs),
            };
            session
                .create_listen(&listen, BackendKind::Internal, SyncState::Synchronized)
                .await
                .unwrap();
        }

        let backend = BackendKind::Internal;
        assert_eq!(session.listen_count(user, backend, first.into()).await.unwrap(), 2);

        let release = session.find_track(first).await.unwrap().unwrap().release.unwrap().id;
        assert_eq!(session.listen_count(user, backend, release.into()).await.unwrap(), 3);
        assert_eq!(
            session.last_listen_date_time(user, backend, release.into()).await.unwrap(),
            Some(at(300))
        );
        assert_eq!(
            session
                .last_listen_date_time(user, BackendKind::ListenBrainz, first.into())
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            session.listen_count(user, backend, ReleaseId(9999).into()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_pending_listens_and_transitions() {
        let (db, _dir) = temp_db().await;
        let user = insert_user(&db, "alice").await;
        let track = insert_track(&db, TrackFixture::new("Song", "Album", "Artist")).await;

        let mut session = db.write().await.unwrap();
        let backend = BackendKind::ListenBrainz;
        let entry = session
            .create_listen(
                &TimedListen {
                    user_id: user,
                    track_id: track,
                    listened_at: at(1000),
                },
                backend,
                SyncState::PendingAdd,
            )
            .await
            .unwrap();

        assert!(session.has_pending_listens(user, backend).await.unwrap());
        assert_eq!(session.pending_listens(user, backend, 10).await.unwrap().len(), 1);

        assert!(session.set_listen_state(entry.id, SyncState::Synchronized).await.unwrap());
        assert!(!session.has_pending_listens(user, backend).await.unwrap());
        assert!(session.set_listen_state(entry.id, SyncState::PendingAdd).await.is_err());
    }
}
