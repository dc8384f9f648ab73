//! Trait definition for the ListenBrainz API client.
//!
//! The synchronizers only talk to the remote service through this trait.
//! Production code uses [`ListenBrainzClient`], tests substitute the mock
//! from [`mocks`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::client::ListenBrainzClient;
use super::domain::{FeedbackPage, FeedbackScore, ListenBrainzError, ListenPage, ListenSubmission};

/// Remote operations used by the synchronizers.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait ListenBrainzApi: Send + Sync {
    /// Resolve the user name behind a token.
    async fn validate_token(&self, token: &str) -> Result<String, ListenBrainzError>;

    /// Total number of loved recordings.
    async fn feedback_count(&self, user_name: &str) -> Result<usize, ListenBrainzError>;

    /// One page of loved recordings.
    async fn feedbacks(
        &self,
        user_name: &str,
        offset: usize,
        count: usize,
    ) -> Result<FeedbackPage, ListenBrainzError>;

    /// Love or erase feedback on a recording.
    async fn send_feedback(
        &self,
        token: &str,
        recording_mbid: &str,
        score: FeedbackScore,
    ) -> Result<(), ListenBrainzError>;

    /// Total number of listens.
    async fn listen_count(&self, user_name: &str) -> Result<usize, ListenBrainzError>;

    /// One page of listens older than `max_ts`.
    async fn listens(
        &self,
        user_name: &str,
        max_ts: Option<DateTime<Utc>>,
        count: usize,
    ) -> Result<ListenPage, ListenBrainzError>;

    /// Submit a listen or a "playing now" notification.
    async fn submit_listen(
        &self,
        token: &str,
        submission: &ListenSubmission,
    ) -> Result<(), ListenBrainzError>;
}

#[async_trait]
impl ListenBrainzApi for ListenBrainzClient {
    async fn validate_token(&self, token: &str) -> Result<String, ListenBrainzError> {
        self.validate_token(token).await
    }

    async fn feedback_count(&self, user_name: &str) -> Result<usize, ListenBrainzError> {
        self.feedback_count(user_name).await
    }

    async fn feedbacks(
        &self,
        user_name: &str,
        offset: usize,
        count: usize,
    ) -> Result<FeedbackPage, ListenBrainzError> {
        self.feedbacks(user_name, offset, count).await
    }

    async fn send_feedback(
        &self,
        token: &str,
        recording_mbid: &str,
        score: FeedbackScore,
    ) -> Result<(), ListenBrainzError> {
        self.send_feedback(token, recording_mbid, score).await
    }

    async fn listen_count(&self, user_name: &str) -> Result<usize, ListenBrainzError> {
        self.listen_count(user_name).await
    }

    async fn listens(
        &self,
        user_name: &str,
        max_ts: Option<DateTime<Utc>>,
        count: usize,
    ) -> Result<ListenPage, ListenBrainzError> {
        self.listens(user_name, max_ts, count).await
    }

    async fn submit_listen(
        &self,
        token: &str,
        submission: &ListenSubmission,
    ) -> Result<(), ListenBrainzError> {
        self.submit_listen(token, submission).await
    }
}

/// Mock ListenBrainz server for testing.
///
/// Keeps a remote state (tokens, loved recordings, listens), serves it like
/// the real API would and records every call.
#[cfg(test)]
pub mod mocks {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::listenbrainz::domain::{ListenType, RemoteFeedback, RemoteListen};

    /// A call received by the mock.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        ValidateToken,
        FeedbackCount,
        Feedbacks { offset: usize, count: usize },
        SendFeedback { recording_mbid: String, score: FeedbackScore },
        ListenCount,
        Listens { max_ts: Option<DateTime<Utc>>, count: usize },
        SubmitListen { listen_type: ListenType },
    }

    #[derive(Debug, Default)]
    struct State {
        tokens: HashMap<String, String>,
        /// Most recent first
        feedbacks: Vec<RemoteFeedback>,
        /// Most recent first
        listens: Vec<RemoteListen>,
        /// Entries counted by the server but unusable by the client
        unusable_feedbacks: usize,
        fail_writes: bool,
        fail_reads: bool,
        fail_pages: bool,
        calls: Vec<Call>,
    }

    /// Mock ListenBrainz service.
    #[derive(Debug, Default)]
    pub struct MockListenBrainz {
        state: Mutex<State>,
    }

    impl MockListenBrainz {
        pub fn new() -> Self {
            Self::default()
        }

        /// Accept `token` as belonging to `user_name`.
        pub fn with_token(self, token: &str, user_name: &str) -> Self {
            self.state
                .lock()
                .tokens
                .insert(token.to_string(), user_name.to_string());
            self
        }

        /// Remote loved recordings, most recent first.
        pub fn with_feedbacks(self, feedbacks: Vec<RemoteFeedback>) -> Self {
            self.state.lock().feedbacks = feedbacks;
            self
        }

        /// Remote entries the client cannot use (no recording MBID).
        pub fn with_unusable_feedbacks(self, count: usize) -> Self {
            self.state.lock().unusable_feedbacks = count;
            self
        }

        /// Remote listens, most recent first.
        pub fn with_listens(self, listens: Vec<RemoteListen>) -> Self {
            self.state.lock().listens = listens;
            self
        }

        /// Make every write fail with a network error.
        pub fn set_fail_writes(&self, fail: bool) {
            self.state.lock().fail_writes = fail;
        }

        /// Make every read fail with a network error.
        pub fn set_fail_reads(&self, fail: bool) {
            self.state.lock().fail_reads = fail;
        }

        /// Make only page requests fail with a timeout. Counts still answer.
        pub fn set_fail_pages(&self, fail: bool) {
            self.state.lock().fail_pages = fail;
        }

        /// Remote loved recordings as the server currently sees them.
        pub fn remote_feedbacks(&self) -> Vec<RemoteFeedback> {
            self.state.lock().feedbacks.clone()
        }

        pub fn calls(&self) -> Vec<Call> {
            self.state.lock().calls.clone()
        }

        pub fn count_calls(&self, predicate: impl Fn(&Call) -> bool) -> usize {
            self.state.lock().calls.iter().filter(|c| predicate(c)).count()
        }

        pub fn clear_calls(&self) {
            self.state.lock().calls.clear();
        }

        fn record(&self, call: Call) -> Result<(), ListenBrainzError> {
            let mut state = self.state.lock();
            let is_write = matches!(call, Call::SendFeedback { .. } | Call::SubmitListen { .. });
            let is_read = !is_write && call != Call::ValidateToken;
            let is_page = matches!(call, Call::Feedbacks { .. } | Call::Listens { .. });
            state.calls.push(call);
            if (is_write && state.fail_writes) || (is_read && state.fail_reads) {
                return Err(ListenBrainzError::Network("connection reset".to_string()));
            }
            if is_page && state.fail_pages {
                return Err(ListenBrainzError::Network("timeout".to_string()));
            }
            Ok(())
        }

        fn check_token(&self, token: &str) -> Result<(), ListenBrainzError> {
            if self.state.lock().tokens.contains_key(token) {
                Ok(())
            } else {
                Err(ListenBrainzError::InvalidToken)
            }
        }
    }

    #[async_trait]
    impl ListenBrainzApi for MockListenBrainz {
        async fn validate_token(&self, token: &str) -> Result<String, ListenBrainzError> {
            self.record(Call::ValidateToken)?;
            self.state
                .lock()
                .tokens
                .get(token)
                .cloned()
                .ok_or(ListenBrainzError::InvalidToken)
        }

        async fn feedback_count(&self, _user_name: &str) -> Result<usize, ListenBrainzError> {
            self.record(Call::FeedbackCount)?;
            let state = self.state.lock();
            Ok(state.feedbacks.len() + state.unusable_feedbacks)
        }

        async fn feedbacks(
            &self,
            _user_name: &str,
            offset: usize,
            count: usize,
        ) -> Result<FeedbackPage, ListenBrainzError> {
            self.record(Call::Feedbacks { offset, count })?;
            let state = self.state.lock();
            let total = state.feedbacks.len() + state.unusable_feedbacks;
            let end = offset.saturating_add(count).min(total);
            let fetched = end.saturating_sub(offset);
            let entries = state
                .feedbacks
                .iter()
                .skip(offset)
                .take(fetched)
                .cloned()
                .collect();
            Ok(FeedbackPage { fetched, entries })
        }

        async fn send_feedback(
            &self,
            token: &str,
            recording_mbid: &str,
            score: FeedbackScore,
        ) -> Result<(), ListenBrainzError> {
            self.record(Call::SendFeedback {
                recording_mbid: recording_mbid.to_string(),
                score,
            })?;
            self.check_token(token)?;

            let mut state = self.state.lock();
            state.feedbacks.retain(|f| f.recording_mbid != recording_mbid);
            if score == FeedbackScore::Love {
                state.feedbacks.insert(
                    0,
                    RemoteFeedback {
                        recording_mbid: recording_mbid.to_string(),
                        created: Utc::now(),
                    },
                );
            }
            Ok(())
        }

        async fn listen_count(&self, _user_name: &str) -> Result<usize, ListenBrainzError> {
            self.record(Call::ListenCount)?;
            Ok(self.state.lock().listens.len())
        }

        async fn listens(
            &self,
            _user_name: &str,
            max_ts: Option<DateTime<Utc>>,
            count: usize,
        ) -> Result<ListenPage, ListenBrainzError> {
            self.record(Call::Listens { max_ts, count })?;
            let state = self.state.lock();
            let entries: Vec<_> = state
                .listens
                .iter()
                .filter(|l| max_ts.is_none_or(|max| l.listened_at < max))
                .take(count)
                .cloned()
                .collect();
            Ok(ListenPage {
                fetched: entries.len(),
                oldest: entries.iter().map(|l| l.listened_at).min(),
                entries,
            })
        }

        async fn submit_listen(
            &self,
            token: &str,
            submission: &ListenSubmission,
        ) -> Result<(), ListenBrainzError> {
            self.record(Call::SubmitListen {
                listen_type: submission.listen_type,
            })?;
            self.check_token(token)?;

            if submission.listen_type == ListenType::Single
                && let Some(listened_at) = submission.listened_at
            {
                let mut state = self.state.lock();
                let listen = RemoteListen {
                    listened_at,
                    track_name: submission.track_name.clone(),
                    artist_name: Some(submission.artist_name.clone()),
                    release_name: submission.release_name.clone(),
                    recording_mbid: submission.recording_mbid.clone(),
                    release_mbid: submission.release_mbid.clone(),
                    track_number: submission.track_number,
                };
                let position = state
                    .listens
                    .iter()
                    .position(|l| l.listened_at < listened_at)
                    .unwrap_or(state.listens.len());
                state.listens.insert(position, listen);
            }
            Ok(())
        }
    }
}
