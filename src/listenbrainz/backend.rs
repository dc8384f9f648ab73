//! ListenBrainz backend: local writes first, remote later.
//!
//! Every mutation is stored as a pending row before anything is sent, then
//! the worker is asked to push it. If the worker is busy, stopped or the
//! push fails, the row stays pending and the next cycle retries it.

use async_trait::async_trait;

use super::worker::SyncHandle;
use crate::backend::Backend;
use crate::db::Db;
use crate::error::Result;
use crate::model::{BackendKind, Listen, StarredId, SyncState, TimedListen};

const BACKEND: BackendKind = BackendKind::ListenBrainz;

#[derive(Debug, Clone)]
pub struct ListenBrainzBackend {
    db: Db,
    handle: SyncHandle,
}

impl ListenBrainzBackend {
    pub fn new(db: Db, handle: SyncHandle) -> Self {
        Self { db, handle }
    }
}

#[async_trait]
impl Backend for ListenBrainzBackend {
    fn kind(&self) -> BackendKind {
        BACKEND
    }

    async fn listen_started(&self, listen: Listen) -> Result<()> {
        self.handle.playing_now(listen);
        Ok(())
    }

    async fn add_timed_listen(&self, listen: TimedListen) -> Result<()> {
        let mut session = self.db.write().await?;
        if session.find_user(listen.user_id).await?.is_none()
            || !session.subject_exists(listen.track_id.into()).await?
            || session
                .find_listen(listen.user_id, listen.track_id, BACKEND, listen.listened_at)
                .await?
                .is_some()
        {
            return Ok(());
        }

        let entry = session
            .create_listen(&listen, BACKEND, SyncState::PendingAdd)
            .await?;
        session.commit().await?;

        tracing::debug!(target: "listenbrainz", user = %entry.user_id, id = %entry.id, "Listen queued");
        self.handle.submit_listen(entry.id);
        Ok(())
    }

    fn initial_star_state(&self) -> SyncState {
        SyncState::PendingAdd
    }

    async fn on_starred(&self, id: StarredId) -> Result<()> {
        self.handle.push_feedback(id);
        Ok(())
    }

    async fn on_unstarred(&self, id: StarredId) -> Result<()> {
        let mut session = self.db.write().await?;
        let Some(starred) = session.find_starred_by_id(id).await? else {
            return Ok(());
        };

        match starred.sync_state {
            // Never reported: nothing to undo remotely
            SyncState::PendingAdd => {
                session.remove_starred(id).await?;
                session.commit().await?;
            }
            SyncState::Synchronized => {
                session.set_starred_state(id, SyncState::PendingRemove).await?;
                session.commit().await?;
                self.handle.push_feedback(id);
            }
            SyncState::PendingRemove => {}
        }
        Ok(())
    }
}
