//! Internal models for ListenBrainz exchanges.
//!
//! These types are OUR types: they don't change when the remote API changes.
//! Responses are converted into them in [`adapter`](super::adapter), requests
//! are built from them there too.

use chrono::{DateTime, Utc};

/// Feedback score sent for a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackScore {
    /// Remove any feedback
    Erase,
    /// "Love" the recording
    Love,
}

impl FeedbackScore {
    pub fn value(self) -> i32 {
        match self {
            FeedbackScore::Erase => 0,
            FeedbackScore::Love => 1,
        }
    }
}

/// Submission kind of a listen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenType {
    /// A finished listen, with its timestamp
    Single,
    /// What the user is listening to right now, never stored remotely
    PlayingNow,
}

impl ListenType {
    pub fn as_str(self) -> &'static str {
        match self {
            ListenType::Single => "single",
            ListenType::PlayingNow => "playing_now",
        }
    }
}

/// A loved recording, as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFeedback {
    pub recording_mbid: String,
    pub created: DateTime<Utc>,
}

/// One page of remote feedback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackPage {
    /// Raw number of entries in the page, usable or not
    pub fetched: usize,
    /// Entries carrying what matching needs
    pub entries: Vec<RemoteFeedback>,
}

/// A remote listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteListen {
    pub listened_at: DateTime<Utc>,
    pub track_name: String,
    pub artist_name: Option<String>,
    pub release_name: Option<String>,
    pub recording_mbid: Option<String>,
    pub release_mbid: Option<String>,
    pub track_number: Option<u32>,
}

/// One page of remote listens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenPage {
    /// Raw number of entries in the page, usable or not
    pub fetched: usize,
    pub entries: Vec<RemoteListen>,
    /// Oldest timestamp seen in the page, cursor of the next request
    pub oldest: Option<DateTime<Utc>>,
}

/// Metadata of a listen to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSubmission {
    pub listen_type: ListenType,
    /// Absent for `PlayingNow`
    pub listened_at: Option<DateTime<Utc>>,
    pub track_name: String,
    pub artist_name: String,
    pub release_name: Option<String>,
    pub release_mbid: Option<String>,
    pub artist_mbids: Vec<String>,
    pub track_mbid: Option<String>,
    pub recording_mbid: Option<String>,
    pub track_number: Option<u32>,
}

/// Errors that can occur talking to ListenBrainz
#[derive(Debug, Clone, thiserror::Error)]
pub enum ListenBrainzError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited - try again later")]
    RateLimited,

    #[error("Invalid or revoked token")]
    InvalidToken,

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl ListenBrainzError {
    /// Whether the same request may succeed later unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            ListenBrainzError::Network(_) | ListenBrainzError::RateLimited => true,
            ListenBrainzError::Api { status, .. } => *status >= 500,
            ListenBrainzError::InvalidToken | ListenBrainzError::Parse(_) => false,
        }
    }
}
