//! Test utilities and fixtures for playsync tests.
//!
//! This module provides common test helpers, fixture inserters, and
//! database utilities to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use playsync::test_utils::{temp_db, insert_user};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (db, _dir) = temp_db().await;
//!     let user = insert_user(&db, "alice").await;
//!     // ... test logic
//! }
//! ```

use std::time::Duration;

use tempfile::TempDir;

use crate::db::{Db, NewTrack, Session, Unique};
use crate::model::{ArtistId, ArtistRole, BackendKind, ReleaseId, TrackId, UserId};

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (Db, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");

    let db = Db::open(&crate::db::db_url(Some(&db_path)))
        .await
        .expect("Failed to initialize test database");

    (db, dir)
}

/// Inserts a user with no backend selected and returns its ID.
pub async fn insert_user(db: &Db, login_name: &str) -> UserId {
    let mut session = db.write().await.expect("Failed to begin write");
    let user = session
        .create_user(login_name)
        .await
        .expect("Failed to create user");
    session.commit().await.expect("Failed to commit");
    user.id
}

/// Inserts a user with the given backends and token.
pub async fn insert_user_with_backends(
    db: &Db,
    login_name: &str,
    scrobbling: Option<BackendKind>,
    feedback: Option<BackendKind>,
    token: Option<&str>,
) -> UserId {
    let mut session = db.write().await.expect("Failed to begin write");
    let user = session
        .create_user(login_name)
        .await
        .expect("Failed to create user");
    session
        .set_scrobbling_backend(user.id, scrobbling)
        .await
        .expect("Failed to set scrobbling backend");
    session
        .set_feedback_backend(user.id, feedback)
        .await
        .expect("Failed to set feedback backend");
    session
        .set_listenbrainz_token(user.id, token)
        .await
        .expect("Failed to set token");
    session.commit().await.expect("Failed to commit");
    user.id
}

/// A track to insert, with its release and main artist.
///
/// Customize with struct update syntax:
///
/// ```ignore
/// let fixture = TrackFixture {
///     recording_mbid: Some("..."),
///     ..TrackFixture::new("Title", "Release", "Artist")
/// };
/// ```
#[derive(Debug, Clone)]
pub struct TrackFixture<'a> {
    pub name: &'a str,
    pub release: &'a str,
    pub artist: &'a str,
    pub track_number: Option<u32>,
    pub duration: Option<Duration>,
    pub recording_mbid: Option<&'a str>,
    pub release_mbid: Option<&'a str>,
    pub artist_mbid: Option<&'a str>,
}

impl<'a> TrackFixture<'a> {
    pub fn new(name: &'a str, release: &'a str, artist: &'a str) -> Self {
        Self {
            name,
            release,
            artist,
            track_number: Some(1),
            duration: Some(Duration::from_secs(180)),
            recording_mbid: None,
            release_mbid: None,
            artist_mbid: None,
        }
    }
}

async fn artist_by_name(session: &mut Session<Unique>, name: &str, mbid: Option<&str>) -> ArtistId {
    if let Some(id) = session.find_artist_by_name(name).await.expect("Failed to query artist") {
        return id;
    }
    session
        .create_artist(name, mbid)
        .await
        .expect("Failed to create artist")
}

async fn release_by_name(session: &mut Session<Unique>, name: &str, mbid: Option<&str>) -> ReleaseId {
    if let Some(id) = session.find_release_by_name(name).await.expect("Failed to query release") {
        return id;
    }
    session
        .create_release(name, mbid)
        .await
        .expect("Failed to create release")
}

/// Inserts a track and returns its ID.
///
/// Artist and release records are reused by name.
pub async fn insert_track(db: &Db, fixture: TrackFixture<'_>) -> TrackId {
    let mut session = db.write().await.expect("Failed to begin write");

    let artist = artist_by_name(&mut session, fixture.artist, fixture.artist_mbid).await;
    let release = release_by_name(&mut session, fixture.release, fixture.release_mbid).await;

    let track = session
        .create_track(&NewTrack {
            name: fixture.name.to_string(),
            release: Some(release),
            track_number: fixture.track_number,
            duration: fixture.duration,
            recording_mbid: fixture.recording_mbid.map(str::to_string),
            track_mbid: None,
        })
        .await
        .expect("Failed to insert track");
    session
        .link_track_artist(track, artist, ArtistRole::Artist)
        .await
        .expect("Failed to link artist");

    session.commit().await.expect("Failed to commit");
    track
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (db, _dir) = temp_db().await;

        let mut session = db.read().await.unwrap();
        assert!(session.users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_track_reuses_artist_and_release() {
        let (db, _dir) = temp_db().await;

        let first = insert_track(&db, TrackFixture::new("One", "Album", "Artist")).await;
        let second = insert_track(&db, TrackFixture::new("Two", "Album", "Artist")).await;
        assert_ne!(first, second);

        let mut session = db.read().await.unwrap();
        let first = session.find_track(first).await.unwrap().unwrap();
        let second = session.find_track(second).await.unwrap().unwrap();
        assert_eq!(first.release, second.release);
        assert_eq!(first.artists[0].id, second.artists[0].id);
    }

    #[tokio::test]
    async fn test_insert_user_with_backends() {
        let (db, _dir) = temp_db().await;

        let user = insert_user_with_backends(
            &db,
            "alice",
            Some(BackendKind::Internal),
            None,
            None,
        )
        .await;

        let mut session = db.read().await.unwrap();
        let user = session.find_user(user).await.unwrap().unwrap();
        assert_eq!(user.scrobbling_backend, Some(BackendKind::Internal));
        assert_eq!(user.feedback_backend, None);
    }
}
