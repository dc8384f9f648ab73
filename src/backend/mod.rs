//! Backend abstraction.
//!
//! A backend is where a user's listens or feedback are kept. The service
//! resolves the user's backend for each call and forwards to it:
//!
//! - [`InternalBackend`]: local only, every mutation is final at once
//! - [`ListenBrainzBackend`](crate::listenbrainz::ListenBrainzBackend):
//!   mutations are stored as pending and handed to the sync worker
//!
//! Feedback rows are created and looked up by the service, in the state
//! given by [`Backend::initial_star_state`]. Backends are told about them
//! afterwards through [`Backend::on_starred`] and [`Backend::on_unstarred`].

mod internal;

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::Result;
use crate::model::{BackendKind, Listen, StarredId, SyncState, TimedListen};

pub use internal::InternalBackend;

/// Capabilities every backend implements.
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Playback of a track started.
    async fn listen_started(&self, listen: Listen) -> Result<()>;

    /// Playback of a track ended after `duration`, if known.
    ///
    /// Too short listens are filtered out before reaching the backend.
    async fn listen_finished(&self, listen: Listen, duration: Option<Duration>) -> Result<()> {
        self.add_timed_listen(TimedListen::new(listen, started_at(duration)))
            .await
    }

    /// Record a listen at a known time. Recording it twice is a no-op.
    async fn add_timed_listen(&self, listen: TimedListen) -> Result<()>;

    /// State a new feedback row is created in.
    fn initial_star_state(&self) -> SyncState;

    /// A feedback row was just created in [`Self::initial_star_state`].
    async fn on_starred(&self, id: StarredId) -> Result<()>;

    /// The user removed an existing feedback row.
    async fn on_unstarred(&self, id: StarredId) -> Result<()>;
}

/// Start of a listen that just ended after `duration`.
pub fn started_at(duration: Option<Duration>) -> chrono::DateTime<Utc> {
    let now = Utc::now();
    duration
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_at() {
        let before = Utc::now();
        let start = started_at(Some(Duration::from_secs(60)));
        let elapsed = before - start;
        assert!(elapsed >= chrono::Duration::seconds(59));
        assert!(elapsed <= chrono::Duration::seconds(61));

        assert!(started_at(None) >= before);
    }
}
