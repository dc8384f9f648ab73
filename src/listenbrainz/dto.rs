//! ListenBrainz API Data Transfer Objects
//!
//! These types match what the ListenBrainz API sends and accepts.
//! DO NOT use these types outside the listenbrainz module - convert to domain types.
//!
//! API Reference: https://listenbrainz.readthedocs.io/en/latest/users/api/
//!
//! Every field the server may omit is optional: entries lacking what matching
//! needs are dropped by the adapter, not rejected here.

use serde::{Deserialize, Serialize};

/// `GET /1/validate-token`
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateTokenResponse {
    pub code: Option<u16>,
    pub message: Option<String>,
    #[serde(default)]
    pub valid: bool,
    pub user_name: Option<String>,
}

/// `GET /1/feedback/user/{user}/get-feedback`
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackResponse {
    pub count: Option<usize>,
    pub offset: Option<usize>,
    pub total_count: Option<usize>,
    #[serde(default)]
    pub feedback: Vec<FeedbackEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackEntry {
    /// UNIX timestamp
    pub created: Option<i64>,
    pub recording_mbid: Option<String>,
    pub recording_msid: Option<String>,
    pub score: Option<i32>,
    pub user_id: Option<String>,
}

/// `POST /1/feedback/recording-feedback`
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackRequest {
    pub recording_mbid: String,
    pub score: i32,
}

/// `GET /1/user/{user}/listen-count`
#[derive(Debug, Clone, Deserialize)]
pub struct ListenCountResponse {
    pub payload: ListenCountPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenCountPayload {
    pub count: usize,
}

/// `GET /1/user/{user}/listens`
#[derive(Debug, Clone, Deserialize)]
pub struct ListensResponse {
    pub payload: ListensPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListensPayload {
    pub count: Option<usize>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub listens: Vec<Listen>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Listen {
    /// UNIX timestamp
    pub listened_at: Option<i64>,
    pub track_metadata: Option<TrackMetadata>,
}

/// Track metadata, shared by fetched and submitted listens.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TrackMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<AdditionalInfo>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdditionalInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listening_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_mbid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_mbid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_mbid: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artist_mbids: Vec<String>,
    /// Sent as a number, but other clients submit strings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracknumber: Option<serde_json::Value>,
}

/// `POST /1/submit-listens`
#[derive(Debug, Clone, Serialize)]
pub struct SubmitListensRequest {
    pub listen_type: String,
    pub payload: Vec<SubmitListen>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitListen {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listened_at: Option<i64>,
    pub track_metadata: TrackMetadata,
}

/// Error body returned along non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub code: Option<u16>,
    pub error: Option<String>,
}
