//! Local-only backend.
//!
//! There is no remote to reconcile with, so every mutation is terminal:
//! listens and stars are stored `Synchronized` and unstars delete the row.

use async_trait::async_trait;

use super::Backend;
use crate::db::Db;
use crate::error::Result;
use crate::model::{BackendKind, Listen, StarredId, SyncState, TimedListen};

const BACKEND: BackendKind = BackendKind::Internal;

#[derive(Debug, Clone)]
pub struct InternalBackend {
    db: Db,
}

impl InternalBackend {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Backend for InternalBackend {
    fn kind(&self) -> BackendKind {
        BACKEND
    }

    async fn listen_started(&self, _listen: Listen) -> Result<()> {
        Ok(())
    }

    async fn add_timed_listen(&self, listen: TimedListen) -> Result<()> {
        let mut session = self.db.write().await?;
        if session.find_user(listen.user_id).await?.is_none()
            || !session.subject_exists(listen.track_id.into()).await?
        {
            tracing::debug!(target: "backend::internal", user = %listen.user_id, track = %listen.track_id, "Listen target is gone");
            return Ok(());
        }
        if session
            .find_listen(listen.user_id, listen.track_id, BACKEND, listen.listened_at)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let entry = session
            .create_listen(&listen, BACKEND, SyncState::Synchronized)
            .await?;
        session.commit().await?;
        tracing::debug!(target: "backend::internal", user = %entry.user_id, track = %entry.track_id, "Listen recorded");
        Ok(())
    }

    fn initial_star_state(&self) -> SyncState {
        SyncState::Synchronized
    }

    /// Stars are created `Synchronized`. A `PendingAdd` row left by an older
    /// write is settled here.
    async fn on_starred(&self, id: StarredId) -> Result<()> {
        let mut session = self.db.write().await?;
        let Some(starred) = session.find_starred_by_id(id).await? else {
            return Ok(());
        };
        if starred.sync_state == SyncState::PendingAdd {
            session
                .set_starred_state(id, SyncState::Synchronized)
                .await?;
            session.commit().await?;
        }
        Ok(())
    }

    async fn on_unstarred(&self, id: StarredId) -> Result<()> {
        let mut session = self.db.write().await?;
        if session.remove_starred(id).await? {
            session.commit().await?;
            tracing::debug!(target: "backend::internal", id = %id, "Feedback removed");
        }
        Ok(())
    }
}
