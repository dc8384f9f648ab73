//! ListenBrainz backend.
//!
//! Keeps the listens and loved recordings of users who selected ListenBrainz
//! consistent with their remote account:
//!
//! 1. Local mutations are stored first, as pending rows
//!    ([`ListenBrainzBackend`]), then handed to the worker.
//! 2. The [`worker`] owns both synchronizers on a single task. It pushes
//!    pending rows, and periodically runs a full cycle per user: token
//!    validation, count request, paged fetch, match & import, push.
//! 3. Everything remote goes through the [`ListenBrainzApi`] trait, so the
//!    synchronizers run unchanged against the mock in tests.
//!
//! A failure only ever ends the cycle of the user it happened to; the
//! rows it concerned stay pending and are retried by the next pass.

pub mod adapter;
pub mod api;
mod backend;
pub mod client;
pub mod context;
pub mod domain;
pub mod dto;
pub mod feedbacks;
pub mod listens;
pub mod worker;

use std::sync::Arc;

use crate::config::ListenBrainzConfig;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{BackendKind, User, UserId};

pub use api::ListenBrainzApi;
pub use backend::ListenBrainzBackend;
pub use client::ListenBrainzClient;
pub use context::{SyncConcern, SyncCounters, SyncPhase, UserSyncStatus};
pub use domain::ListenBrainzError;
pub use worker::{SyncCommand, SyncHandle, SyncWorker};

/// What both synchronizers need to reach the database and the remote.
#[derive(Clone)]
pub struct SyncEnv {
    pub db: Db,
    pub api: Arc<dyn ListenBrainzApi>,
    pub config: ListenBrainzConfig,
}

impl SyncEnv {
    pub fn new(db: Db, api: Arc<dyn ListenBrainzApi>, config: ListenBrainzConfig) -> Self {
        Self { db, api, config }
    }
}

impl std::fmt::Debug for SyncEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEnv")
            .field("db", &self.db)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Whether `user` reconciles `concern` against ListenBrainz.
fn uses_listenbrainz(user: &User, concern: SyncConcern) -> bool {
    let backend = match concern {
        SyncConcern::Feedbacks => user.feedback_backend,
        SyncConcern::Listens => user.scrobbling_backend,
    };
    backend == Some(BackendKind::ListenBrainz)
}

/// Token of a user to sync.
///
/// `Ok(None)` means the user is gone or no longer uses ListenBrainz for
/// `concern`; a missing token is a configuration error.
async fn sync_token(env: &SyncEnv, user: UserId, concern: SyncConcern) -> Result<Option<String>> {
    let mut session = env.db.read().await?;
    let Some(user) = session.find_user(user).await? else {
        return Ok(None);
    };
    if !uses_listenbrainz(&user, concern) {
        return Ok(None);
    }
    user.listenbrainz_token
        .filter(|token| !token.is_empty())
        .map(Some)
        .ok_or_else(|| Error::config(format!("user '{}' has no ListenBrainz token", user.login_name)))
}

/// Remote user name behind `token`, validating it unless already known.
async fn resolve_user_name(
    env: &SyncEnv,
    context: &mut context::UserSyncContext,
    token: &str,
) -> Result<String> {
    if let Some(name) = context.cached_user_name(token) {
        return Ok(name.to_string());
    }

    let name = env.api.validate_token(token).await.map_err(|e| {
        if matches!(e, ListenBrainzError::InvalidToken) {
            context.forget_user_name();
        }
        e
    })?;
    tracing::debug!(
        target: "listenbrainz",
        user = %context.user_id,
        remote_user = %name,
        "Token validated"
    );
    context.cache_user_name(token, name.clone());
    Ok(name)
}

/// Whether an error means the token can no longer be used.
fn is_invalid_token(error: &Error) -> bool {
    matches!(error, Error::ListenBrainz(ListenBrainzError::InvalidToken))
}
