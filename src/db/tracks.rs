//! Library lookups needed by matching and submission.
//!
//! The library itself is maintained by the scanner; the insert operations
//! here exist for it and for fixtures.

use std::time::Duration;

use super::{Session, Unique};
use crate::error::Result;
use crate::model::{
    ArtistId, ArtistRole, ClusterId, ReleaseId, Subject, Track, TrackArtist, TrackId,
    TrackRelease,
};

/// Fields of a track to insert.
#[derive(Debug, Clone, Default)]
pub struct NewTrack {
    pub name: String,
    pub release: Option<ReleaseId>,
    pub track_number: Option<u32>,
    pub duration: Option<Duration>,
    pub recording_mbid: Option<String>,
    pub track_mbid: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct TrackRow {
    id: i64,
    name: String,
    track_number: Option<i64>,
    duration_ms: Option<i64>,
    recording_mbid: Option<String>,
    track_mbid: Option<String>,
    release_id: Option<i64>,
    release_name: Option<String>,
    release_mbid: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct TrackArtistRow {
    id: i64,
    name: String,
    mbid: Option<String>,
    role: String,
}

impl<M> Session<M> {
    /// Track with its release and artist credits.
    pub async fn find_track(&mut self, id: TrackId) -> Result<Option<Track>> {
        let row = sqlx::query_as::<_, TrackRow>(
            r#"
            SELECT
                t.id, t.name, t.track_number, t.duration_ms, t.recording_mbid, t.track_mbid,
                r.id AS release_id, r.name AS release_name, r.mbid AS release_mbid
            FROM tracks t
            LEFT JOIN releases r ON r.id = t.release_id
            WHERE t.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let artist_rows = sqlx::query_as::<_, TrackArtistRow>(
            r#"
            SELECT a.id, a.name, a.mbid, tal.role
            FROM track_artist_links tal
            JOIN artists a ON a.id = tal.artist_id
            WHERE tal.track_id = ?
            ORDER BY tal.rowid
            "#,
        )
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await?;

        let artists = artist_rows
            .into_iter()
            .map(|a| {
                Ok(TrackArtist {
                    id: ArtistId(a.id),
                    name: a.name,
                    mbid: a.mbid,
                    role: a.role.parse::<ArtistRole>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let release = match (row.release_id, row.release_name) {
            (Some(id), Some(name)) => Some(TrackRelease {
                id: ReleaseId(id),
                name,
                mbid: row.release_mbid,
            }),
            _ => None,
        };

        Ok(Some(Track {
            id: TrackId(row.id),
            name: row.name,
            release,
            track_number: row.track_number.and_then(|n| u32::try_from(n).ok()),
            duration: row
                .duration_ms
                .and_then(|ms| u64::try_from(ms).ok())
                .map(Duration::from_millis),
            recording_mbid: row.recording_mbid,
            track_mbid: row.track_mbid,
            artists,
        }))
    }

    /// Tracks carrying the given MusicBrainz recording ID.
    pub async fn find_tracks_by_recording_mbid(&mut self, mbid: &str) -> Result<Vec<TrackId>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM tracks WHERE recording_mbid = ? ORDER BY id")
                .bind(mbid)
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(ids.into_iter().map(TrackId).collect())
    }

    /// Tracks named `name` on a release named `release_name`.
    pub async fn find_tracks_by_name_and_release(
        &mut self,
        name: &str,
        release_name: &str,
    ) -> Result<Vec<Track>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT t.id FROM tracks t
            JOIN releases r ON r.id = t.release_id
            WHERE t.name = ? AND r.name = ?
            ORDER BY t.id
            "#,
        )
        .bind(name)
        .bind(release_name)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(track) = self.find_track(TrackId(id)).await? {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    pub async fn find_artist_by_name(&mut self, name: &str) -> Result<Option<ArtistId>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM artists WHERE name = ? ORDER BY id")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id.map(ArtistId))
    }

    pub async fn find_release_by_name(&mut self, name: &str) -> Result<Option<ReleaseId>> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM releases WHERE name = ? ORDER BY id")
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id.map(ReleaseId))
    }

    /// Whether the subject row still exists.
    pub async fn subject_exists(&mut self, subject: Subject) -> Result<bool> {
        let sql = match subject {
            Subject::Artist(_) => "SELECT EXISTS(SELECT 1 FROM artists WHERE id = ?)",
            Subject::Release(_) => "SELECT EXISTS(SELECT 1 FROM releases WHERE id = ?)",
            Subject::Track(_) => "SELECT EXISTS(SELECT 1 FROM tracks WHERE id = ?)",
        };
        let exists: bool = sqlx::query_scalar(sql)
            .bind(subject.raw_id())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }
}

impl Session<Unique> {
    pub async fn create_artist(&mut self, name: &str, mbid: Option<&str>) -> Result<ArtistId> {
        let id: i64 = sqlx::query_scalar("INSERT INTO artists (name, mbid) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(mbid)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(ArtistId(id))
    }

    pub async fn create_release(&mut self, name: &str, mbid: Option<&str>) -> Result<ReleaseId> {
        let id: i64 =
            sqlx::query_scalar("INSERT INTO releases (name, mbid) VALUES (?, ?) RETURNING id")
                .bind(name)
                .bind(mbid)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(ReleaseId(id))
    }

    pub async fn create_track(&mut self, track: &NewTrack) -> Result<TrackId> {
        let duration_ms = track
            .duration
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO tracks (name, release_id, track_number, duration_ms, recording_mbid, track_mbid)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&track.name)
        .bind(track.release)
        .bind(track.track_number.map(i64::from))
        .bind(duration_ms)
        .bind(&track.recording_mbid)
        .bind(&track.track_mbid)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(TrackId(id))
    }

    pub async fn link_track_artist(
        &mut self,
        track: TrackId,
        artist: ArtistId,
        role: ArtistRole,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO track_artist_links (track_id, artist_id, role) VALUES (?, ?, ?)",
        )
        .bind(track)
        .bind(artist)
        .bind(role.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn create_cluster(&mut self, name: &str) -> Result<ClusterId> {
        let id: i64 = sqlx::query_scalar("INSERT INTO clusters (name) VALUES (?) RETURNING id")
            .bind(name)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(ClusterId(id))
    }

    pub async fn add_track_to_cluster(&mut self, track: TrackId, cluster: ClusterId) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO track_clusters (track_id, cluster_id) VALUES (?, ?)")
            .bind(track)
            .bind(cluster)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Remove a track; its listens and feedback go with it.
    pub async fn remove_track(&mut self, id: TrackId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tracks WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TrackFixture, insert_track, temp_db};

    #[tokio::test]
    async fn test_find_track_with_credits() {
        let (db, _dir) = temp_db().await;
        let track_id = insert_track(
            &db,
            TrackFixture {
                recording_mbid: Some("0b7c0ddd-5a95-4d6e-a3a2-d8d6e7f7c5d1"),
                release_mbid: Some("ad7e3e1f-3e8b-4c4e-9e0f-0a3d1c2b4e5f"),
                ..TrackFixture::new("Juparo", "Petal", "Broke For Free")
            },
        )
        .await;

        let mut session = db.read().await.unwrap();
        let track = session.find_track(track_id).await.unwrap().unwrap();
        assert_eq!(track.name, "Juparo");
        assert_eq!(track.release.as_ref().unwrap().name, "Petal");
        assert_eq!(track.artists.len(), 1);
        assert_eq!(track.artists[0].role, ArtistRole::Artist);
        assert_eq!(
            track.recording_mbid.as_deref(),
            Some("0b7c0ddd-5a95-4d6e-a3a2-d8d6e7f7c5d1")
        );
    }

    #[tokio::test]
    async fn test_find_by_recording_mbid() {
        let (db, _dir) = temp_db().await;
        let mbid = "0b7c0ddd-5a95-4d6e-a3a2-d8d6e7f7c5d1";
        let track_id = insert_track(
            &db,
            TrackFixture {
                recording_mbid: Some(mbid),
                ..TrackFixture::new("Juparo", "Petal", "Broke For Free")
            },
        )
        .await;
        insert_track(&db, TrackFixture::new("Other", "Petal", "Broke For Free")).await;

        let mut session = db.read().await.unwrap();
        assert_eq!(
            session.find_tracks_by_recording_mbid(mbid).await.unwrap(),
            vec![track_id]
        );
        assert!(session
            .find_tracks_by_recording_mbid("00000000-0000-0000-0000-000000000000")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_find_by_name_and_release() {
        let (db, _dir) = temp_db().await;
        insert_track(&db, TrackFixture::new("Juparo", "Petal", "Broke For Free")).await;
        insert_track(&db, TrackFixture::new("Juparo", "Other Release", "Broke For Free")).await;

        let mut session = db.read().await.unwrap();
        let tracks = session
            .find_tracks_by_name_and_release("Juparo", "Petal")
            .await
            .unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].release.as_ref().unwrap().name, "Petal");
    }

    #[tokio::test]
    async fn test_subject_exists_after_removal() {
        let (db, _dir) = temp_db().await;
        let track_id = insert_track(&db, TrackFixture::new("Gone", "Petal", "Someone")).await;

        let mut session = db.write().await.unwrap();
        assert!(session.subject_exists(Subject::Track(track_id)).await.unwrap());
        assert!(session.remove_track(track_id).await.unwrap());
        assert!(!session.subject_exists(Subject::Track(track_id)).await.unwrap());
    }
}
