//! Core data models.
//!
//! Defines identifiers, library entities ([`Track`], [`User`]), the records
//! this crate owns ([`ListenEntry`], [`Starred`]) and the small value types
//! shared by the persistence layer and the services.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `users` - Users and their selected backends
//! - `artists`, `releases`, `tracks`, `track_artist_links`, `clusters`,
//!   `track_clusters` - Library, read-only from this crate's point of view
//! - `listens` - One row per (user, track, backend, timestamp)
//! - `starred` - One row per (subject, user, backend)

mod sync_state;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

pub use sync_state::SyncState;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
        #[sqlx(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Database ID of a user
    UserId
);
id_type!(
    /// Database ID of an artist
    ArtistId
);
id_type!(
    /// Database ID of a release
    ReleaseId
);
id_type!(
    /// Database ID of a track
    TrackId
);
id_type!(
    /// Database ID of a cluster (genre, mood, ... grouping)
    ClusterId
);
id_type!(
    /// Database ID of a listen row
    ListenId
);
id_type!(
    /// Database ID of a feedback row
    StarredId
);

/// Destination and source of truth for scrobbles or feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Local only, every mutation is immediately terminal
    Internal,
    /// Remote ListenBrainz service
    ListenBrainz,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Internal, BackendKind::ListenBrainz];

    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Internal => "internal",
            BackendKind::ListenBrainz => "listenbrainz",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(BackendKind::Internal),
            "listenbrainz" => Ok(BackendKind::ListenBrainz),
            other => Err(Error::invalid_data(format!("unknown backend '{other}'"))),
        }
    }
}

/// How an artist is linked to a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtistRole {
    Artist,
    ReleaseArtist,
    Arranger,
    Composer,
    Conductor,
    Lyricist,
    Mixer,
    Performer,
    Producer,
    Remixer,
    Writer,
}

impl ArtistRole {
    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtistRole::Artist => "artist",
            ArtistRole::ReleaseArtist => "release_artist",
            ArtistRole::Arranger => "arranger",
            ArtistRole::Composer => "composer",
            ArtistRole::Conductor => "conductor",
            ArtistRole::Lyricist => "lyricist",
            ArtistRole::Mixer => "mixer",
            ArtistRole::Performer => "performer",
            ArtistRole::Producer => "producer",
            ArtistRole::Remixer => "remixer",
            ArtistRole::Writer => "writer",
        }
    }
}

impl std::str::FromStr for ArtistRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "artist" => ArtistRole::Artist,
            "release_artist" => ArtistRole::ReleaseArtist,
            "arranger" => ArtistRole::Arranger,
            "composer" => ArtistRole::Composer,
            "conductor" => ArtistRole::Conductor,
            "lyricist" => ArtistRole::Lyricist,
            "mixer" => ArtistRole::Mixer,
            "performer" => ArtistRole::Performer,
            "producer" => ArtistRole::Producer,
            "remixer" => ArtistRole::Remixer,
            "writer" => ArtistRole::Writer,
            other => return Err(Error::invalid_data(format!("unknown artist role '{other}'"))),
        })
    }
}

/// A user and its backend selection.
///
/// Scrobbling and feedback backends are chosen independently and may change
/// at any time; history is never migrated between backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub login_name: String,
    pub scrobbling_backend: Option<BackendKind>,
    pub feedback_backend: Option<BackendKind>,
    /// ListenBrainz user token (a UUID)
    pub listenbrainz_token: Option<String>,
}

/// Artist credited on a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackArtist {
    pub id: ArtistId,
    pub name: String,
    pub mbid: Option<String>,
    pub role: ArtistRole,
}

/// Release a track belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRelease {
    pub id: ReleaseId,
    pub name: String,
    pub mbid: Option<String>,
}

/// A track of the library, with what matching and submission need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub release: Option<TrackRelease>,
    pub track_number: Option<u32>,
    pub duration: Option<Duration>,
    /// MusicBrainz recording ID
    pub recording_mbid: Option<String>,
    /// MusicBrainz track ID
    pub track_mbid: Option<String>,
    pub artists: Vec<TrackArtist>,
}

impl Track {
    /// Artists with the given role, in link order.
    pub fn artists_with_role(&self, role: ArtistRole) -> impl Iterator<Item = &TrackArtist> {
        self.artists.iter().filter(move |a| a.role == role)
    }

    /// Main artists, falling back on release artists.
    pub fn display_artists(&self) -> Vec<&TrackArtist> {
        let artists: Vec<_> = self.artists_with_role(ArtistRole::Artist).collect();
        if artists.is_empty() {
            self.artists_with_role(ArtistRole::ReleaseArtist).collect()
        } else {
            artists
        }
    }
}

/// What a feedback entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Artist(ArtistId),
    Release(ReleaseId),
    Track(TrackId),
}

/// Discriminant of [`Subject`], stored in `starred.subject_kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    Artist,
    Release,
    Track,
}

impl SubjectKind {
    /// Convert to string representation for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Artist => "artist",
            SubjectKind::Release => "release",
            SubjectKind::Track => "track",
        }
    }
}

impl Subject {
    pub fn kind(&self) -> SubjectKind {
        match self {
            Subject::Artist(_) => SubjectKind::Artist,
            Subject::Release(_) => SubjectKind::Release,
            Subject::Track(_) => SubjectKind::Track,
        }
    }

    /// Raw database ID of the subject row.
    pub fn raw_id(&self) -> i64 {
        match self {
            Subject::Artist(id) => id.0,
            Subject::Release(id) => id.0,
            Subject::Track(id) => id.0,
        }
    }

    /// Rebuild from the stored (kind, id) pair.
    pub fn from_parts(kind: &str, id: i64) -> Result<Self> {
        Ok(match kind {
            "artist" => Subject::Artist(ArtistId(id)),
            "release" => Subject::Release(ReleaseId(id)),
            "track" => Subject::Track(TrackId(id)),
            other => return Err(Error::invalid_data(format!("unknown subject kind '{other}'"))),
        })
    }
}

impl From<ArtistId> for Subject {
    fn from(id: ArtistId) -> Self {
        Subject::Artist(id)
    }
}

impl From<ReleaseId> for Subject {
    fn from(id: ReleaseId) -> Self {
        Subject::Release(id)
    }
}

impl From<TrackId> for Subject {
    fn from(id: TrackId) -> Self {
        Subject::Track(id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind().as_str(), self.raw_id())
    }
}

/// A feedback entry: "user starred subject, as known by backend".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Starred {
    pub id: StarredId,
    pub subject: Subject,
    pub user_id: UserId,
    pub backend: BackendKind,
    pub sync_state: SyncState,
    pub date_time: DateTime<Utc>,
}

/// A persisted listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenEntry {
    pub id: ListenId,
    pub user_id: UserId,
    pub track_id: TrackId,
    pub backend: BackendKind,
    pub sync_state: SyncState,
    pub listened_at: DateTime<Utc>,
}

/// "User is playing track", as reported by the playback layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Listen {
    pub user_id: UserId,
    pub track_id: TrackId,
}

/// A listen at a known point in time (historical import, late report).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedListen {
    pub user_id: UserId,
    pub track_id: TrackId,
    pub listened_at: DateTime<Utc>,
}

impl TimedListen {
    pub fn new(listen: Listen, listened_at: DateTime<Utc>) -> Self {
        Self {
            user_id: listen.user_id,
            track_id: listen.track_id,
            listened_at: normalize_date_time(listened_at),
        }
    }
}

/// A window over a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub offset: usize,
    pub size: usize,
}

impl Range {
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }
}

/// Results of a ranged query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResults<T> {
    pub results: Vec<T>,
    pub range: Option<Range>,
    /// Whether more results exist past the requested range
    pub more_results: bool,
}

impl<T> Default for RangeResults<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            range: None,
            more_results: false,
        }
    }
}

impl<T> RangeResults<T> {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

/// Filters shared by feedback queries and listen statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindParameters {
    pub user: UserId,
    /// Tracks must belong to every one of these clusters
    pub clusters: Vec<ClusterId>,
    /// Artist link role, artist queries only
    pub link_role: Option<ArtistRole>,
    /// Only tracks credited to this artist
    pub artist: Option<ArtistId>,
    pub range: Option<Range>,
}

impl FindParameters {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            clusters: Vec::new(),
            link_role: None,
            artist: None,
            range: None,
        }
    }

    pub fn with_clusters(mut self, clusters: impl IntoIterator<Item = ClusterId>) -> Self {
        self.clusters = clusters.into_iter().collect();
        self
    }

    pub fn with_link_role(mut self, role: ArtistRole) -> Self {
        self.link_role = Some(role);
        self
    }

    pub fn with_artist(mut self, artist: ArtistId) -> Self {
        self.artist = Some(artist);
        self
    }

    pub fn with_range(mut self, range: Range) -> Self {
        self.range = Some(range);
        self
    }
}

/// Storage precision is one second; all timestamps go through here.
pub fn normalize_date_time(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.timestamp(), 0).unwrap_or(dt)
}

/// Convert a stored UNIX timestamp.
pub fn date_time_from_timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::invalid_data(format!("timestamp out of range: {secs}")))
}
