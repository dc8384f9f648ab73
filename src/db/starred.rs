//! Feedback rows: one per (subject, user, backend).

use chrono::{DateTime, Utc};

use super::{Session, Unique, to_i64};
use crate::error::{Error, Result};
use crate::model::{
    BackendKind, Starred, StarredId, Subject, SyncState, UserId, date_time_from_timestamp,
    normalize_date_time,
};

#[derive(Debug, sqlx::FromRow)]
struct StarredRow {
    id: i64,
    subject_kind: String,
    subject_id: i64,
    user_id: i64,
    backend: String,
    sync_state: String,
    date_time: i64,
}

impl TryFrom<StarredRow> for Starred {
    type Error = Error;

    fn try_from(row: StarredRow) -> Result<Self> {
        Ok(Starred {
            id: StarredId(row.id),
            subject: Subject::from_parts(&row.subject_kind, row.subject_id)?,
            user_id: UserId(row.user_id),
            backend: row.backend.parse()?,
            sync_state: row.sync_state.parse()?,
            date_time: date_time_from_timestamp(row.date_time)?,
        })
    }
}

const STARRED_COLUMNS: &str =
    "SELECT id, subject_kind, subject_id, user_id, backend, sync_state, date_time FROM starred";

impl<M> Session<M> {
    /// Look up by natural key, whatever the sync state.
    pub async fn find_starred(
        &mut self,
        subject: Subject,
        user: UserId,
        backend: BackendKind,
    ) -> Result<Option<Starred>> {
        let row = sqlx::query_as::<_, StarredRow>(&format!(
            "{STARRED_COLUMNS} WHERE subject_kind = ? AND subject_id = ? AND user_id = ? AND backend = ?"
        ))
        .bind(subject.kind().as_str())
        .bind(subject.raw_id())
        .bind(user)
        .bind(backend.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Starred::try_from).transpose()
    }

    pub async fn find_starred_by_id(&mut self, id: StarredId) -> Result<Option<Starred>> {
        let row = sqlx::query_as::<_, StarredRow>(&format!("{STARRED_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Starred::try_from).transpose()
    }

    /// PendingAdd and PendingRemove rows of a user, oldest first.
    pub async fn pending_starred(
        &mut self,
        user: UserId,
        backend: BackendKind,
        limit: usize,
    ) -> Result<Vec<Starred>> {
        let rows = sqlx::query_as::<_, StarredRow>(&format!(
            "{STARRED_COLUMNS} WHERE user_id = ? AND backend = ? AND sync_state IN (?, ?) \
             ORDER BY date_time, id LIMIT ?"
        ))
        .bind(user)
        .bind(backend.as_str())
        .bind(SyncState::PendingAdd.as_str())
        .bind(SyncState::PendingRemove.as_str())
        .bind(to_i64(limit))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Starred::try_from).collect()
    }

    pub async fn has_pending_starred(&mut self, user: UserId, backend: BackendKind) -> Result<bool> {
        let pending: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM starred WHERE user_id = ? AND backend = ? AND sync_state IN (?, ?))",
        )
        .bind(user)
        .bind(backend.as_str())
        .bind(SyncState::PendingAdd.as_str())
        .bind(SyncState::PendingRemove.as_str())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(pending)
    }
}

impl Session<Unique> {
    pub async fn create_starred(
        &mut self,
        subject: Subject,
        user: UserId,
        backend: BackendKind,
        sync_state: SyncState,
        date_time: DateTime<Utc>,
    ) -> Result<Starred> {
        let date_time = normalize_date_time(date_time);
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO starred (subject_kind, subject_id, user_id, backend, sync_state, date_time)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(subject.kind().as_str())
        .bind(subject.raw_id())
        .bind(user)
        .bind(backend.as_str())
        .bind(sync_state.as_str())
        .bind(date_time.timestamp())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(Starred {
            id: StarredId(id),
            subject,
            user_id: user,
            backend,
            sync_state,
            date_time,
        })
    }

    /// Move a row to `next`, rejecting illegal transitions.
    ///
    /// Returns `false` when the row no longer exists.
    pub async fn set_starred_state(&mut self, id: StarredId, next: SyncState) -> Result<bool> {
        let current: Option<String> = sqlx::query_scalar("SELECT sync_state FROM starred WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some(current) = current else {
            return Ok(false);
        };

        let next = current.parse::<SyncState>()?.transition(next)?;
        sqlx::query("UPDATE starred SET sync_state = ? WHERE id = ?")
            .bind(next.as_str())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(true)
    }

    pub async fn set_starred_date_time(&mut self, id: StarredId, date_time: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE starred SET date_time = ? WHERE id = ?")
            .bind(normalize_date_time(date_time).timestamp())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn remove_starred(&mut self, id: StarredId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM starred WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove the row only if it is still in `state`.
    pub async fn remove_starred_in_state(&mut self, id: StarredId, state: SyncState) -> Result<bool> {
        let result = sqlx::query("DELETE FROM starred WHERE id = ? AND sync_state = ?")
            .bind(id)
            .bind(state.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
