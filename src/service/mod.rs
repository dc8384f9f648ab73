//! Service façade.
//!
//! Entry point for the rest of the server. Each call resolves the user's
//! backend for the concern at hand (scrobbling or feedback, chosen
//! independently) and routes to it. A user with no backend, or with a
//! backend that is disabled in the configuration, gets silent no-ops and
//! empty results, never errors.

mod feedback;
mod scrobbling;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::{Backend, InternalBackend};
use crate::config::Config;
use crate::db::{Db, Session};
use crate::error::Result;
use crate::listenbrainz::{ListenBrainzBackend, SyncHandle};
use crate::model::{BackendKind, UserId};

pub use feedback::FeedbackService;
pub use scrobbling::ScrobblingService;

/// What a backend is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concern {
    Scrobbling,
    Feedback,
}

/// One backend instance per enabled kind.
#[derive(Clone, Default)]
pub struct Backends {
    by_kind: HashMap<BackendKind, Arc<dyn Backend>>,
}

impl Backends {
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.by_kind.insert(backend.kind(), backend);
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Arc<dyn Backend>> {
        self.by_kind.get(&kind)
    }

    /// Kind `user` selected for `concern`, if it is available.
    async fn active_kind<M>(
        &self,
        session: &mut Session<M>,
        user: UserId,
        concern: Concern,
    ) -> Result<Option<BackendKind>> {
        let Some(user) = session.find_user(user).await? else {
            return Ok(None);
        };
        let selected = match concern {
            Concern::Scrobbling => user.scrobbling_backend,
            Concern::Feedback => user.feedback_backend,
        };
        Ok(selected.filter(|kind| self.by_kind.contains_key(kind)))
    }

    /// Backend `user` selected for `concern`, if it is available.
    ///
    /// The read session is closed before returning, so the caller may hand
    /// the backend a write.
    async fn resolve(
        &self,
        db: &Db,
        user: UserId,
        concern: Concern,
    ) -> Result<Option<Arc<dyn Backend>>> {
        let kind = {
            let mut session = db.read().await?;
            self.active_kind(&mut session, user, concern).await?
        };
        Ok(kind.and_then(|kind| self.get(kind).cloned()))
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.by_kind.keys()).finish()
    }
}

/// The façade: scrobbling and feedback services over shared backends.
#[derive(Debug, Clone)]
pub struct Service {
    pub scrobbling: ScrobblingService,
    pub feedback: FeedbackService,
    sync: Option<SyncHandle>,
}

impl Service {
    /// Build the façade with every backend the configuration enables.
    ///
    /// ListenBrainz needs a running worker: without `sync` its users are
    /// treated as having no backend.
    pub fn new(db: Db, config: &Config, sync: Option<SyncHandle>) -> Self {
        let mut backends = Backends::default();
        if config.backends.is_enabled(BackendKind::Internal) {
            backends.register(Arc::new(InternalBackend::new(db.clone())));
        }
        if config.backends.is_enabled(BackendKind::ListenBrainz)
            && let Some(handle) = &sync
        {
            backends.register(Arc::new(ListenBrainzBackend::new(db.clone(), handle.clone())));
        }
        tracing::info!(target: "service", backends = ?backends, "Services ready");

        Self::with_backends(db, backends, config, sync)
    }

    pub fn with_backends(db: Db, backends: Backends, config: &Config, sync: Option<SyncHandle>) -> Self {
        Self {
            scrobbling: ScrobblingService::new(
                db.clone(),
                backends.clone(),
                config.scrobbling.min_listen_duration(),
            ),
            feedback: FeedbackService::new(db, backends),
            sync,
        }
    }

    /// Handle of the ListenBrainz worker, when running.
    pub fn sync_handle(&self) -> Option<&SyncHandle> {
        self.sync.as_ref()
    }
}
