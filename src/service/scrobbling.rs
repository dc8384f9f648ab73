//! Listens: recording, statistics and "playing now".

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{Backends, Concern};
use crate::db::{Db, Session, Shared};
use crate::error::Result;
use crate::model::{
    ArtistId, BackendKind, FindParameters, Listen, RangeResults, ReleaseId, Subject, TimedListen,
    TrackId, UserId,
};

#[derive(Debug, Clone)]
pub struct ScrobblingService {
    db: Db,
    pub(super) backends: Backends,
    min_listen_duration: Duration,
}

/// Whether a listen of `duration` is long enough to be recorded.
///
/// An unknown duration always is.
pub fn is_long_enough(duration: Option<Duration>, min_listen_duration: Duration) -> bool {
    duration.is_none_or(|d| d >= min_listen_duration)
}

impl ScrobblingService {
    pub fn new(db: Db, backends: Backends, min_listen_duration: Duration) -> Self {
        Self {
            db,
            backends,
            min_listen_duration,
        }
    }

    pub async fn listen_started(&self, listen: Listen) -> Result<()> {
        match self.backends.resolve(&self.db, listen.user_id, Concern::Scrobbling).await? {
            Some(backend) => backend.listen_started(listen).await,
            None => Ok(()),
        }
    }

    /// Playback ended after `duration`. Too short listens are dropped.
    pub async fn listen_finished(&self, listen: Listen, duration: Option<Duration>) -> Result<()> {
        if !is_long_enough(duration, self.min_listen_duration) {
            tracing::debug!(
                target: "service",
                user = %listen.user_id,
                track = %listen.track_id,
                ?duration,
                "Listen too short, skipped"
            );
            return Ok(());
        }
        match self.backends.resolve(&self.db, listen.user_id, Concern::Scrobbling).await? {
            Some(backend) => backend.listen_finished(listen, duration).await,
            None => Ok(()),
        }
    }

    pub async fn add_timed_listen(&self, listen: TimedListen) -> Result<()> {
        match self.backends.resolve(&self.db, listen.user_id, Concern::Scrobbling).await? {
            Some(backend) => backend.add_timed_listen(listen).await,
            None => Ok(()),
        }
    }

    /// Read session plus the user's scrobbling backend kind, if any.
    async fn stats_session(&self, user: UserId) -> Result<Option<(Session<Shared>, BackendKind)>> {
        let mut session = self.db.read().await?;
        let kind = self
            .backends
            .active_kind(&mut session, user, Concern::Scrobbling)
            .await?;
        Ok(kind.map(|kind| (session, kind)))
    }

    pub async fn get_recent_artists(&self, params: &FindParameters) -> Result<RangeResults<ArtistId>> {
        match self.stats_session(params.user).await? {
            Some((mut session, kind)) => session.recent_artists(kind, params).await,
            None => Ok(RangeResults::default()),
        }
    }

    pub async fn get_recent_releases(&self, params: &FindParameters) -> Result<RangeResults<ReleaseId>> {
        match self.stats_session(params.user).await? {
            Some((mut session, kind)) => session.recent_releases(kind, params).await,
            None => Ok(RangeResults::default()),
        }
    }

    pub async fn get_recent_tracks(&self, params: &FindParameters) -> Result<RangeResults<TrackId>> {
        match self.stats_session(params.user).await? {
            Some((mut session, kind)) => session.recent_tracks(kind, params).await,
            None => Ok(RangeResults::default()),
        }
    }

    pub async fn get_top_artists(&self, params: &FindParameters) -> Result<RangeResults<ArtistId>> {
        match self.stats_session(params.user).await? {
            Some((mut session, kind)) => session.top_artists(kind, params).await,
            None => Ok(RangeResults::default()),
        }
    }

    pub async fn get_top_releases(&self, params: &FindParameters) -> Result<RangeResults<ReleaseId>> {
        match self.stats_session(params.user).await? {
            Some((mut session, kind)) => session.top_releases(kind, params).await,
            None => Ok(RangeResults::default()),
        }
    }

    pub async fn get_top_tracks(&self, params: &FindParameters) -> Result<RangeResults<TrackId>> {
        match self.stats_session(params.user).await? {
            Some((mut session, kind)) => session.top_tracks(kind, params).await,
            None => Ok(RangeResults::default()),
        }
    }

    /// Number of listens of a track, release or artist by `user`.
    pub async fn get_count(&self, user: UserId, subject: Subject) -> Result<usize> {
        match self.stats_session(user).await? {
            Some((mut session, kind)) => session.listen_count(user, kind, subject).await,
            None => Ok(0),
        }
    }

    /// Most recent listen of a track, release or artist by `user`.
    pub async fn get_last_listen_date_time(
        &self,
        user: UserId,
        subject: Subject,
    ) -> Result<Option<DateTime<Utc>>> {
        match self.stats_session(user).await? {
            Some((mut session, kind)) => session.last_listen_date_time(user, kind, subject).await,
            None => Ok(None),
        }
    }
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;
    use crate::backend::InternalBackend;
    use crate::test_utils::{TrackFixture, insert_track, insert_user_with_backends, temp_db};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Listens below the floor never create a row; others always do.
        #[test]
        fn duration_floor(millis in 0u64..15_000, known in any::<bool>()) {
            let duration = known.then(|| Duration::from_millis(millis));
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let count = runtime.block_on(async {
                let (db, _dir) = temp_db().await;
                let user = insert_user_with_backends(&db, "alice", Some(BackendKind::Internal), None, None).await;
                let track = insert_track(&db, TrackFixture::new("Song", "Album", "Artist")).await;

                let mut backends = Backends::default();
                backends.register(std::sync::Arc::new(InternalBackend::new(db.clone())));
                let service = ScrobblingService::new(db.clone(), backends, Duration::from_secs(5));

                service
                    .listen_finished(Listen { user_id: user, track_id: track }, duration)
                    .await
                    .unwrap();
                service.get_count(user, track.into()).await.unwrap()
            });

            let expected = usize::from(duration.is_none_or(|d| d >= Duration::from_secs(5)));
            prop_assert_eq!(count, expected);
        }
    }
}
