//! ListenBrainz HTTP client
//!
//! Handles communication with the ListenBrainz web service.
//! See: https://listenbrainz.readthedocs.io/en/latest/users/api/
//!
//! Read endpoints are public and addressed by user name; write endpoints
//! need the user's token in an `Authorization: Token <uuid>` header.
//! Timeouts are left to reqwest and surface as [`ListenBrainzError::Network`].

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::domain::{FeedbackPage, FeedbackScore, ListenBrainzError, ListenPage, ListenSubmission};
use super::{adapter, dto};

/// Default API root
pub const DEFAULT_API_URL: &str = "https://api.listenbrainz.org";

/// ListenBrainz API client
#[derive(Debug, Clone)]
pub struct ListenBrainzClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ListenBrainzClient {
    /// Create a client for the given API root
    ///
    /// The client accepts gzip-compressed responses and sends a User-Agent
    /// header identifying the application.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ListenBrainzError> {
        let http_client = reqwest::Client::builder()
            .gzip(true)
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| ListenBrainzError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn user_url(&self, user_name: &str, path: &str) -> String {
        format!(
            "{}/1/user/{}{}",
            self.base_url,
            urlencoding::encode(user_name),
            path
        )
    }

    /// Resolve the user name behind a token
    pub async fn validate_token(&self, token: &str) -> Result<String, ListenBrainzError> {
        let request = self
            .http_client
            .get(self.url("/1/validate-token"))
            .header("Authorization", format!("Token {token}"));
        let response: dto::ValidateTokenResponse = self.send_json(request).await?;
        adapter::to_user_name(response)
    }

    /// Total number of recordings loved by a user
    pub async fn feedback_count(&self, user_name: &str) -> Result<usize, ListenBrainzError> {
        let url = format!(
            "{}/1/feedback/user/{}/get-feedback?score=1&count=0",
            self.base_url,
            urlencoding::encode(user_name)
        );
        let response: dto::FeedbackResponse = self.send_json(self.http_client.get(url)).await?;
        adapter::to_feedback_count(&response)
    }

    /// One page of loved recordings, most recent first
    pub async fn feedbacks(
        &self,
        user_name: &str,
        offset: usize,
        count: usize,
    ) -> Result<FeedbackPage, ListenBrainzError> {
        let url = format!(
            "{}/1/feedback/user/{}/get-feedback?score=1&offset={}&count={}",
            self.base_url,
            urlencoding::encode(user_name),
            offset,
            count
        );
        let response: dto::FeedbackResponse = self.send_json(self.http_client.get(url)).await?;
        Ok(adapter::to_feedback_page(response))
    }

    /// Love a recording, or erase the feedback on it
    pub async fn send_feedback(
        &self,
        token: &str,
        recording_mbid: &str,
        score: FeedbackScore,
    ) -> Result<(), ListenBrainzError> {
        let body = dto::FeedbackRequest {
            recording_mbid: recording_mbid.to_string(),
            score: score.value(),
        };
        let request = self
            .http_client
            .post(self.url("/1/feedback/recording-feedback"))
            .header("Authorization", format!("Token {token}"))
            .json(&body);
        self.send(request).await?;
        Ok(())
    }

    /// Total number of listens of a user
    pub async fn listen_count(&self, user_name: &str) -> Result<usize, ListenBrainzError> {
        let url = self.user_url(user_name, "/listen-count");
        let response: dto::ListenCountResponse = self.send_json(self.http_client.get(url)).await?;
        Ok(adapter::to_listen_count(response))
    }

    /// One page of listens older than `max_ts`, most recent first
    pub async fn listens(
        &self,
        user_name: &str,
        max_ts: Option<DateTime<Utc>>,
        count: usize,
    ) -> Result<ListenPage, ListenBrainzError> {
        let mut url = format!("{}?count={}", self.user_url(user_name, "/listens"), count);
        if let Some(max_ts) = max_ts {
            url.push_str(&format!("&max_ts={}", max_ts.timestamp()));
        }
        let response: dto::ListensResponse = self.send_json(self.http_client.get(url)).await?;
        Ok(adapter::to_listen_page(response))
    }

    /// Submit a listen, or a "playing now" notification
    pub async fn submit_listen(
        &self,
        token: &str,
        submission: &ListenSubmission,
    ) -> Result<(), ListenBrainzError> {
        let request = self
            .http_client
            .post(self.url("/1/submit-listens"))
            .header("Authorization", format!("Token {token}"))
            .json(&adapter::to_submit_request(submission));
        self.send(request).await?;
        Ok(())
    }

    /// Send a request, mapping failure statuses to errors
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ListenBrainzError> {
        let response = request
            .send()
            .await
            .map_err(|e| ListenBrainzError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::TOO_MANY_REQUESTS => Err(ListenBrainzError::RateLimited),
            StatusCode::UNAUTHORIZED => Err(ListenBrainzError::InvalidToken),
            _ => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<dto::ErrorResponse>(&body)
                    .ok()
                    .and_then(|e| e.error)
                    .unwrap_or_else(|| body.chars().take(200).collect());
                Err(ListenBrainzError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ListenBrainzError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ListenBrainzError::Parse(e.to_string()))
    }
}
