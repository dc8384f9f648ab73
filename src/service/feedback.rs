//! Feedback (stars) on artists, releases and tracks.

use chrono::{DateTime, Utc};

use super::{Backends, Concern};
use crate::db::Db;
use crate::error::Result;
use crate::model::{
    ArtistId, FindParameters, RangeResults, ReleaseId, StarredId, Subject, SyncState, TrackId, UserId,
};

#[derive(Debug, Clone)]
pub struct FeedbackService {
    db: Db,
    pub(super) backends: Backends,
}

impl FeedbackService {
    pub fn new(db: Db, backends: Backends) -> Self {
        Self { db, backends }
    }

    /// Star `subject` for `user` on their feedback backend.
    ///
    /// Starring something already starred changes nothing. A row waiting for
    /// its remote removal is replaced by a fresh one.
    pub async fn star(&self, user: UserId, subject: Subject) -> Result<()> {
        let Some(backend) = self.backends.resolve(&self.db, user, Concern::Feedback).await? else {
            return Ok(());
        };
        let kind = backend.kind();

        let id: StarredId = {
            let mut session = self.db.write().await?;
            if !session.subject_exists(subject).await? {
                tracing::debug!(target: "service", user = %user, %subject, "Star of a missing subject");
                return Ok(());
            }
            match session.find_starred(subject, user, kind).await? {
                Some(existing) if existing.sync_state != SyncState::PendingRemove => return Ok(()),
                Some(existing) => {
                    session.remove_starred(existing.id).await?;
                }
                None => {}
            }
            let starred = session
                .create_starred(subject, user, kind, backend.initial_star_state(), Utc::now())
                .await?;
            session.commit().await?;
            starred.id
        };

        tracing::debug!(target: "service", user = %user, %subject, backend = %kind, "Starred");
        backend.on_starred(id).await
    }

    /// Remove the star of `user` on `subject`, if any.
    pub async fn unstar(&self, user: UserId, subject: Subject) -> Result<()> {
        let Some(backend) = self.backends.resolve(&self.db, user, Concern::Feedback).await? else {
            return Ok(());
        };

        let id = {
            let mut session = self.db.read().await?;
            match session.find_starred(subject, user, backend.kind()).await? {
                Some(starred) if starred.sync_state != SyncState::PendingRemove => starred.id,
                _ => return Ok(()),
            }
        };

        tracing::debug!(target: "service", user = %user, %subject, backend = %backend.kind(), "Unstarred");
        backend.on_unstarred(id).await
    }

    pub async fn is_starred(&self, user: UserId, subject: Subject) -> Result<bool> {
        Ok(self.get_starred_date_time(user, subject).await?.is_some())
    }

    /// When `user` starred `subject`, if they currently do.
    pub async fn get_starred_date_time(
        &self,
        user: UserId,
        subject: Subject,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut session = self.db.read().await?;
        let Some(kind) = self
            .backends
            .active_kind(&mut session, user, Concern::Feedback)
            .await?
        else {
            return Ok(None);
        };
        Ok(session
            .find_starred(subject, user, kind)
            .await?
            .filter(|s| s.sync_state != SyncState::PendingRemove)
            .map(|s| s.date_time))
    }

    pub async fn find_starred_artists(&self, params: &FindParameters) -> Result<RangeResults<ArtistId>> {
        let mut session = self.db.read().await?;
        match self
            .backends
            .active_kind(&mut session, params.user, Concern::Feedback)
            .await?
        {
            Some(kind) => session.find_starred_artists(kind, params).await,
            None => Ok(RangeResults::default()),
        }
    }

    pub async fn find_starred_releases(&self, params: &FindParameters) -> Result<RangeResults<ReleaseId>> {
        let mut session = self.db.read().await?;
        match self
            .backends
            .active_kind(&mut session, params.user, Concern::Feedback)
            .await?
        {
            Some(kind) => session.find_starred_releases(kind, params).await,
            None => Ok(RangeResults::default()),
        }
    }

    pub async fn find_starred_tracks(&self, params: &FindParameters) -> Result<RangeResults<TrackId>> {
        let mut session = self.db.read().await?;
        match self
            .backends
            .active_kind(&mut session, params.user, Concern::Feedback)
            .await?
        {
            Some(kind) => session.find_starred_tracks(kind, params).await,
            None => Ok(RangeResults::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::config::{Config, ListenBrainzConfig};
    use crate::listenbrainz::api::mocks::{Call, MockListenBrainz};
    use crate::listenbrainz::domain::FeedbackScore;
    use crate::listenbrainz::{SyncEnv, SyncWorker};
    use crate::model::{BackendKind, Starred};
    use crate::service::Service;
    use crate::test_utils::{TrackFixture, insert_track, insert_user_with_backends, temp_db};

    const TOKEN: &str = "2b1a1e5e-0000-4000-8000-000000000004";
    const RECORDING: &str = "00000000-0000-4000-8000-000000000777";

    struct Fixture {
        db: Db,
        _dir: TempDir,
        mock: Arc<MockListenBrainz>,
        worker: SyncWorker,
        service: Service,
        track: TrackId,
    }

    /// A service with both backends; the worker is driven by hand.
    async fn fixture() -> Fixture {
        let (db, dir) = temp_db().await;
        let mock = Arc::new(MockListenBrainz::new().with_token(TOKEN, "lb-user"));
        let env = SyncEnv::new(db.clone(), mock.clone(), ListenBrainzConfig::default());
        let worker = SyncWorker::new(env);
        let service = Service::new(db.clone(), &Config::default(), Some(worker.handle()));
        let track = insert_track(
            &db,
            TrackFixture {
                recording_mbid: Some(RECORDING),
                ..TrackFixture::new("Song", "Album", "Artist")
            },
        )
        .await;
        Fixture {
            db,
            _dir: dir,
            mock,
            worker,
            service,
            track,
        }
    }

    async fn user_with(f: &Fixture, login: &str, feedback: Option<BackendKind>) -> UserId {
        insert_user_with_backends(&f.db, login, None, feedback, Some(TOKEN)).await
    }

    async fn row(f: &Fixture, user: UserId, kind: BackendKind) -> Option<Starred> {
        let mut session = f.db.read().await.unwrap();
        session
            .find_starred(Subject::Track(f.track), user, kind)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_internal_star_is_synchronized_at_once() {
        let f = fixture().await;
        let user = user_with(&f, "alice", Some(BackendKind::Internal)).await;
        let feedback = &f.service.feedback;

        feedback.star(user, f.track.into()).await.unwrap();

        let starred = row(&f, user, BackendKind::Internal).await.unwrap();
        assert_eq!(starred.sync_state, SyncState::Synchronized);
        assert!(feedback.is_starred(user, f.track.into()).await.unwrap());
        assert!(f.mock.calls().is_empty());

        feedback.unstar(user, f.track.into()).await.unwrap();
        assert!(row(&f, user, BackendKind::Internal).await.is_none());
        assert!(!feedback.is_starred(user, f.track.into()).await.unwrap());
        assert!(f.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_internal_star_never_leaves_pending_row() {
        let f = fixture().await;
        let user = user_with(&f, "alice", Some(BackendKind::Internal)).await;
        let other = insert_track(&f.db, TrackFixture::new("Other", "Album", "Artist")).await;

        f.service.feedback.star(user, f.track.into()).await.unwrap();
        f.service.feedback.star(user, other.into()).await.unwrap();
        // Starring again is a no-op on a settled row
        f.service.feedback.star(user, f.track.into()).await.unwrap();

        let mut session = f.db.read().await.unwrap();
        assert!(!session.has_pending_starred(user, BackendKind::Internal).await.unwrap());
    }

    #[tokio::test]
    async fn test_no_backend_is_a_no_op() {
        let f = fixture().await;
        let user = user_with(&f, "alice", None).await;
        let feedback = &f.service.feedback;

        feedback.star(user, f.track.into()).await.unwrap();
        assert!(row(&f, user, BackendKind::Internal).await.is_none());
        assert!(row(&f, user, BackendKind::ListenBrainz).await.is_none());

        assert!(!feedback.is_starred(user, f.track.into()).await.unwrap());
        assert!(feedback.get_starred_date_time(user, f.track.into()).await.unwrap().is_none());
        assert!(
            feedback
                .find_starred_tracks(&FindParameters::new(user))
                .await
                .unwrap()
                .is_empty()
        );
        feedback.unstar(user, f.track.into()).await.unwrap();
    }

    #[tokio::test]
    async fn test_listenbrainz_star_is_pushed_by_next_cycle() {
        let mut f = fixture().await;
        let user = user_with(&f, "bob", Some(BackendKind::ListenBrainz)).await;

        f.service.feedback.star(user, f.track.into()).await.unwrap();
        assert_eq!(
            row(&f, user, BackendKind::ListenBrainz).await.unwrap().sync_state,
            SyncState::PendingAdd
        );
        // Visible while pending
        assert!(f.service.feedback.is_starred(user, f.track.into()).await.unwrap());

        f.worker.sync_user_now(user).await;
        assert_eq!(
            f.mock.count_calls(|c| *c
                == Call::SendFeedback {
                    recording_mbid: RECORDING.to_string(),
                    score: FeedbackScore::Love
                }),
            1
        );
        assert_eq!(
            row(&f, user, BackendKind::ListenBrainz).await.unwrap().sync_state,
            SyncState::Synchronized
        );
    }

    #[tokio::test]
    async fn test_listenbrainz_unstar_hides_then_removes() {
        let mut f = fixture().await;
        let user = user_with(&f, "bob", Some(BackendKind::ListenBrainz)).await;
        let subject = Subject::Track(f.track);

        f.service.feedback.star(user, subject).await.unwrap();
        f.worker.sync_user_now(user).await;
        f.service.feedback.unstar(user, subject).await.unwrap();

        assert_eq!(
            row(&f, user, BackendKind::ListenBrainz).await.unwrap().sync_state,
            SyncState::PendingRemove
        );
        assert!(!f.service.feedback.is_starred(user, subject).await.unwrap());
        assert!(
            f.service
                .feedback
                .find_starred_tracks(&FindParameters::new(user))
                .await
                .unwrap()
                .is_empty()
        );

        f.worker.sync_user_now(user).await;
        assert!(row(&f, user, BackendKind::ListenBrainz).await.is_none());
        assert!(f.mock.remote_feedbacks().is_empty());
    }

    #[tokio::test]
    async fn test_restar_while_removal_pending_starts_over() {
        let mut f = fixture().await;
        let user = user_with(&f, "bob", Some(BackendKind::ListenBrainz)).await;
        let subject = Subject::Track(f.track);

        f.service.feedback.star(user, subject).await.unwrap();
        f.worker.sync_user_now(user).await;
        f.service.feedback.unstar(user, subject).await.unwrap();
        let removed = row(&f, user, BackendKind::ListenBrainz).await.unwrap();

        f.service.feedback.star(user, subject).await.unwrap();
        let fresh = row(&f, user, BackendKind::ListenBrainz).await.unwrap();
        assert_ne!(fresh.id, removed.id);
        assert_eq!(fresh.sync_state, SyncState::PendingAdd);

        f.worker.sync_user_now(user).await;
        assert_eq!(
            row(&f, user, BackendKind::ListenBrainz).await.unwrap().sync_state,
            SyncState::Synchronized
        );
        assert_eq!(f.mock.remote_feedbacks().len(), 1);
    }

    #[tokio::test]
    async fn test_star_twice_keeps_first_date() {
        let f = fixture().await;
        let user = user_with(&f, "alice", Some(BackendKind::Internal)).await;
        let feedback = &f.service.feedback;

        feedback.star(user, f.track.into()).await.unwrap();
        let first = feedback.get_starred_date_time(user, f.track.into()).await.unwrap();
        feedback.star(user, f.track.into()).await.unwrap();
        assert_eq!(feedback.get_starred_date_time(user, f.track.into()).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_switching_backend_does_not_migrate() {
        let f = fixture().await;
        let user = user_with(&f, "alice", Some(BackendKind::Internal)).await;
        let feedback = &f.service.feedback;
        feedback.star(user, f.track.into()).await.unwrap();

        {
            let mut session = f.db.write().await.unwrap();
            session
                .set_feedback_backend(user, Some(BackendKind::ListenBrainz))
                .await
                .unwrap();
            session.commit().await.unwrap();
        }

        assert!(!feedback.is_starred(user, f.track.into()).await.unwrap());
        assert!(row(&f, user, BackendKind::Internal).await.is_some());
    }

    #[tokio::test]
    async fn test_star_release_and_artist() {
        let f = fixture().await;
        let user = user_with(&f, "alice", Some(BackendKind::Internal)).await;
        let feedback = &f.service.feedback;
        let (release, artist) = {
            let mut session = f.db.read().await.unwrap();
            let track = session.find_track(f.track).await.unwrap().unwrap();
            (track.release.unwrap().id, track.artists[0].id)
        };

        feedback.star(user, release.into()).await.unwrap();
        feedback.star(user, artist.into()).await.unwrap();

        let params = FindParameters::new(user);
        assert_eq!(feedback.find_starred_releases(&params).await.unwrap().results, vec![release]);
        assert_eq!(feedback.find_starred_artists(&params).await.unwrap().results, vec![artist]);
        assert!(feedback.find_starred_tracks(&params).await.unwrap().is_empty());
    }
}
