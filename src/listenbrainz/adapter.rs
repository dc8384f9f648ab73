//! Adapter layer: Convert ListenBrainz DTOs to domain models and back
//!
//! This is the ONLY place where DTO types are converted to domain types.
//! If ListenBrainz changes its formats, only this file and dto.rs need to
//! change.

use chrono::{DateTime, Utc};

use super::domain::{
    FeedbackPage, ListenBrainzError, ListenPage, ListenSubmission, ListenType, RemoteFeedback,
    RemoteListen,
};
use super::dto;
use crate::model::Track;

/// Value of `additional_info.listening_from` in submissions
pub const LISTENING_FROM: &str = env!("CARGO_PKG_NAME");

/// Normalize a MusicBrainz ID, rejecting anything that is not a UUID.
pub fn parse_mbid(raw: &str) -> Option<String> {
    uuid::Uuid::parse_str(raw.trim())
        .ok()
        .map(|id| id.hyphenated().to_string())
}

fn parse_timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn parse_track_number(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Extract the user name behind a token.
pub fn to_user_name(response: dto::ValidateTokenResponse) -> Result<String, ListenBrainzError> {
    match response.user_name {
        Some(name) if response.valid && !name.is_empty() => Ok(name),
        _ => Err(ListenBrainzError::InvalidToken),
    }
}

/// Total number of loved recordings.
pub fn to_feedback_count(response: &dto::FeedbackResponse) -> Result<usize, ListenBrainzError> {
    response
        .total_count
        .ok_or_else(|| ListenBrainzError::Parse("missing total_count".to_string()))
}

/// Keep the "love" entries that reference a valid recording.
pub fn to_feedback_page(response: dto::FeedbackResponse) -> FeedbackPage {
    let fetched = response.feedback.len();
    let entries = response
        .feedback
        .into_iter()
        .filter(|entry| entry.score == Some(1))
        .filter_map(|entry| {
            Some(RemoteFeedback {
                recording_mbid: parse_mbid(entry.recording_mbid.as_deref()?)?,
                created: parse_timestamp(entry.created?)?,
            })
        })
        .collect();

    FeedbackPage { fetched, entries }
}

pub fn to_listen_count(response: dto::ListenCountResponse) -> usize {
    response.payload.count
}

fn to_remote_listen(listen: dto::Listen) -> Option<RemoteListen> {
    let listened_at = parse_timestamp(listen.listened_at?)?;
    let metadata = listen.track_metadata?;
    let track_name = metadata.track_name.filter(|name| !name.is_empty())?;
    let info = metadata.additional_info.unwrap_or_default();

    Some(RemoteListen {
        listened_at,
        track_name,
        artist_name: metadata.artist_name.filter(|name| !name.is_empty()),
        release_name: metadata.release_name.filter(|name| !name.is_empty()),
        recording_mbid: info.recording_mbid.as_deref().and_then(parse_mbid),
        release_mbid: info.release_mbid.as_deref().and_then(parse_mbid),
        track_number: info.tracknumber.as_ref().and_then(parse_track_number),
    })
}

/// Convert a page of listens; the cursor covers unusable entries too.
pub fn to_listen_page(response: dto::ListensResponse) -> ListenPage {
    let listens = response.payload.listens;
    let fetched = listens.len();
    let oldest = listens
        .iter()
        .filter_map(|listen| listen.listened_at.and_then(parse_timestamp))
        .min();
    let entries = listens.into_iter().filter_map(to_remote_listen).collect();

    ListenPage {
        fetched,
        entries,
        oldest,
    }
}

/// Describe a local track for submission.
///
/// Returns `None` when the track has no artist to credit.
pub fn to_submission(
    track: &Track,
    listen_type: ListenType,
    listened_at: Option<DateTime<Utc>>,
) -> Option<ListenSubmission> {
    let artists = track.display_artists();
    let artist_name = artists.first()?.name.clone();

    Some(ListenSubmission {
        listen_type,
        listened_at: match listen_type {
            ListenType::Single => listened_at,
            ListenType::PlayingNow => None,
        },
        track_name: track.name.clone(),
        artist_name,
        release_name: track.release.as_ref().map(|r| r.name.clone()),
        release_mbid: track.release.as_ref().and_then(|r| r.mbid.clone()),
        artist_mbids: artists.iter().filter_map(|a| a.mbid.clone()).collect(),
        track_mbid: track.track_mbid.clone(),
        recording_mbid: track.recording_mbid.clone(),
        track_number: track.track_number,
    })
}

pub fn to_submit_request(submission: &ListenSubmission) -> dto::SubmitListensRequest {
    let additional_info = dto::AdditionalInfo {
        listening_from: Some(LISTENING_FROM.to_string()),
        recording_mbid: submission.recording_mbid.clone(),
        release_mbid: submission.release_mbid.clone(),
        track_mbid: submission.track_mbid.clone(),
        artist_mbids: submission.artist_mbids.clone(),
        tracknumber: submission.track_number.map(serde_json::Value::from),
    };

    dto::SubmitListensRequest {
        listen_type: submission.listen_type.as_str().to_string(),
        payload: vec![dto::SubmitListen {
            listened_at: submission.listened_at.map(|dt| dt.timestamp()),
            track_metadata: dto::TrackMetadata {
                artist_name: Some(submission.artist_name.clone()),
                track_name: Some(submission.track_name.clone()),
                release_name: submission.release_name.clone(),
                additional_info: Some(additional_info),
            },
        }],
    }
}
