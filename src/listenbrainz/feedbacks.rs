//! Loved recordings synchronizer.
//!
//! A cycle for one user:
//!
//! 1. Resolve the remote user name from the token (cached per token).
//! 2. Fetch the remote total. Unchanged total and nothing pending locally
//!    means nothing to do.
//! 3. Fetch pages from offset 0 until a short page, the remote total or the
//!    per-cycle budget. Each loved recording matching exactly one local
//!    track is imported as `Synchronized` if missing.
//! 4. Push pending rows: `PendingAdd` is loved, `PendingRemove` is erased.
//!
//! Remote entries never remove local ones: only local unstars do.

use super::context::{StatusBoard, SyncConcern, SyncContexts, SyncPhase, UserSyncContext, UserSyncStatus};
use super::domain::{FeedbackScore, RemoteFeedback};
use super::{SyncEnv, is_invalid_token, resolve_user_name, sync_token};
use crate::error::{Result, ResultExt};
use crate::model::{BackendKind, Starred, StarredId, Subject, SyncState, TrackId, UserId};

const BACKEND: BackendKind = BackendKind::ListenBrainz;

/// Offset of the next page to request, or `None` when the cycle is done.
///
/// `fetched` counts every entry of the page just received, usable or not.
pub fn next_page_offset(
    offset: usize,
    fetched: usize,
    page_size: usize,
    remote_total: usize,
    budget: usize,
) -> Option<usize> {
    let next = offset.saturating_add(fetched);
    if fetched < page_size || next >= remote_total || next >= budget {
        None
    } else {
        Some(next)
    }
}

enum CycleEnd {
    Done,
    /// The user is gone or moved to another backend
    NotApplicable,
}

/// Synchronizes loved recordings of every ListenBrainz feedback user.
#[derive(Debug)]
pub struct FeedbacksSynchronizer {
    env: SyncEnv,
    contexts: SyncContexts,
}

impl FeedbacksSynchronizer {
    pub fn new(env: SyncEnv, board: StatusBoard) -> Self {
        Self {
            env,
            contexts: SyncContexts::new(SyncConcern::Feedbacks, board),
        }
    }

    pub fn context(&self, user: UserId) -> Option<&UserSyncContext> {
        self.contexts.get(user)
    }

    /// Users with a context, current or stale.
    pub fn known_users(&self) -> Vec<UserId> {
        self.contexts.users()
    }

    /// Users that currently use ListenBrainz for feedback.
    pub async fn users(&self) -> Result<Vec<UserId>> {
        let mut session = self.env.db.read().await?;
        let users = session.users_with_feedback_backend(BACKEND).await?;
        Ok(users.into_iter().map(|u| u.id).collect())
    }

    /// Run a full cycle for `user`.
    ///
    /// Returns the resulting status, or `None` if the user was not synced
    /// (not a ListenBrainz user, or a cycle already running).
    pub async fn sync_user(&mut self, user: UserId) -> Option<UserSyncStatus> {
        let Self { env, contexts } = self;

        if !contexts.get_or_create(user).begin_cycle() {
            tracing::debug!(target: "listenbrainz::feedbacks", user = %user, "Sync already in progress");
            return None;
        }
        contexts.publish(user);

        let result = run_cycle(env, contexts.get_or_create(user)).await;

        let context = contexts.get_or_create(user);
        match result {
            Ok(CycleEnd::NotApplicable) => {
                tracing::debug!(target: "listenbrainz::feedbacks", user = %user, "Not a ListenBrainz feedback user");
                contexts.remove(user);
                return None;
            }
            Ok(CycleEnd::Done) => {
                let counters = context.counters;
                context.end_cycle(None);
                tracing::info!(
                    target: "listenbrainz::feedbacks",
                    user = %user,
                    remote_user = context.remote_user_name.as_deref().unwrap_or_default(),
                    fetched = counters.fetched,
                    matched = counters.matched,
                    imported = counters.imported,
                    pushed = counters.pushed,
                    push_failures = counters.push_failures,
                    "Feedback sync done"
                );
            }
            Err(e) => {
                if is_invalid_token(&e) {
                    context.forget_user_name();
                }
                tracing::warn!(target: "listenbrainz::feedbacks", user = %user, "Feedback sync aborted: {}", e);
                context.end_cycle(Some(e.to_string()));
            }
        }

        contexts.publish(user);
        contexts.get(user).map(UserSyncContext::status)
    }

    /// Push one pending row right away.
    ///
    /// Rows that are gone, synchronized already or not ListenBrainz rows are
    /// ignored. Failures leave the row pending for the next cycle.
    pub async fn push_feedback(&mut self, id: StarredId) {
        let Self { env, contexts } = self;

        let starred = match load_starred(env, id).await {
            Ok(Some(starred)) => starred,
            Ok(None) => {
                tracing::debug!(target: "listenbrainz::feedbacks", id = %id, "Nothing to push");
                return;
            }
            Err(e) => {
                tracing::warn!(target: "listenbrainz::feedbacks", id = %id, "Cannot load feedback: {}", e);
                return;
            }
        };

        let user = starred.user_id;
        let token = match sync_token(env, user, SyncConcern::Feedbacks).await {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(target: "listenbrainz::feedbacks", user = %user, "Cannot push feedback: {}", e);
                return;
            }
        };

        let context = contexts.get_or_create(user);
        if let Err(e) = push_starred(env, context, &token, &starred).await {
            if is_invalid_token(&e) {
                context.forget_user_name();
            }
            tracing::warn!(target: "listenbrainz::feedbacks", user = %user, id = %id, "Feedback push failed: {}", e);
        }
        contexts.publish(user);
    }
}

async fn load_starred(env: &SyncEnv, id: StarredId) -> Result<Option<Starred>> {
    let mut session = env.db.read().await?;
    Ok(session
        .find_starred_by_id(id)
        .await?
        .filter(|s| s.backend == BACKEND && s.sync_state != SyncState::Synchronized))
}

async fn run_cycle(env: &SyncEnv, context: &mut UserSyncContext) -> Result<CycleEnd> {
    let user = context.user_id;
    let Some(token) = sync_token(env, user, SyncConcern::Feedbacks).await? else {
        return Ok(CycleEnd::NotApplicable);
    };

    context.phase = SyncPhase::ValidatingToken;
    let user_name = resolve_user_name(env, context, &token).await?;

    context.phase = SyncPhase::Counting;
    let remote_total = env.api.feedback_count(&user_name).await?;
    let has_pending = {
        let mut session = env.db.read().await?;
        session.has_pending_starred(user, BACKEND).await?
    };

    let changed = context.remote_count != Some(remote_total);
    tracing::debug!(
        target: "listenbrainz::feedbacks",
        user = %user,
        remote_total,
        changed,
        has_pending,
        "Feedback count fetched"
    );

    if remote_total > 0 && (changed || has_pending) {
        // A cached count stands for a completed import only
        context.remote_count = None;
        fetch_pages(env, context, &user_name, remote_total).await?;
    }
    context.remote_count = Some(remote_total);

    if has_pending {
        push_pending(env, context, &token).await?;
    }

    Ok(CycleEnd::Done)
}

async fn fetch_pages(
    env: &SyncEnv,
    context: &mut UserSyncContext,
    user_name: &str,
    remote_total: usize,
) -> Result<()> {
    let page_size = env.config.feedback_page_size();
    let budget = env.config.max_sync_feedback_count;
    if budget == 0 {
        return Ok(());
    }

    context.phase = SyncPhase::Fetching;
    loop {
        let page = env
            .api
            .feedbacks(user_name, context.current_offset, page_size)
            .await?;
        context.counters.fetched += page.fetched;
        tracing::debug!(
            target: "listenbrainz::feedbacks",
            user = %context.user_id,
            offset = context.current_offset,
            fetched = page.fetched,
            usable = page.entries.len(),
            "Feedback page received"
        );

        for entry in &page.entries {
            import_feedback(env, context, entry).await?;
        }

        match next_page_offset(context.current_offset, page.fetched, page_size, remote_total, budget) {
            Some(next) => context.current_offset = next,
            None => {
                context.current_offset += page.fetched;
                return Ok(());
            }
        }
    }
}

/// Single local track carrying the recording, if any.
async fn match_recording(env: &SyncEnv, recording_mbid: &str) -> Result<Option<TrackId>> {
    let mut session = env.db.read().await?;
    let tracks = session.find_tracks_by_recording_mbid(recording_mbid).await?;
    match tracks.as_slice() {
        [track] => Ok(Some(*track)),
        [] => {
            tracing::debug!(target: "listenbrainz::feedbacks", recording_mbid, "No track for this recording");
            Ok(None)
        }
        _ => {
            tracing::debug!(target: "listenbrainz::feedbacks", recording_mbid, "Duplicate recording MBIDs");
            Ok(None)
        }
    }
}

async fn import_feedback(
    env: &SyncEnv,
    context: &mut UserSyncContext,
    entry: &RemoteFeedback,
) -> Result<()> {
    let Some(track) = match_recording(env, &entry.recording_mbid).await? else {
        return Ok(());
    };
    context.counters.matched += 1;

    let user = context.user_id;
    let subject = Subject::Track(track);
    {
        // Known rows keep their state and date: pending ones are pushed later
        let mut session = env.db.read().await?;
        if session.find_starred(subject, user, BACKEND).await?.is_some() {
            return Ok(());
        }
    }

    let mut session = env.db.write().await?;
    if session.find_user(user).await?.is_none()
        || !session.subject_exists(subject).await?
        || session.find_starred(subject, user, BACKEND).await?.is_some()
    {
        return Ok(());
    }
    session
        .create_starred(subject, user, BACKEND, SyncState::Synchronized, entry.created)
        .await?;
    session.commit().await?;

    context.counters.imported += 1;
    tracing::debug!(target: "listenbrainz::feedbacks", user = %user, track = %track, "Imported feedback");
    Ok(())
}

async fn push_pending(env: &SyncEnv, context: &mut UserSyncContext, token: &str) -> Result<()> {
    context.phase = SyncPhase::Pushing;
    let pending = {
        let mut session = env.db.read().await?;
        session
            .pending_starred(context.user_id, BACKEND, env.config.max_pending_per_cycle)
            .await
            .with_context("loading pending feedback")?
    };

    for starred in &pending {
        match push_starred(env, context, token, starred).await {
            Ok(()) => {}
            Err(e) if is_invalid_token(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(
                    target: "listenbrainz::feedbacks",
                    user = %context.user_id,
                    id = %starred.id,
                    "Feedback push failed, will retry: {}",
                    e
                );
            }
        }
    }
    Ok(())
}

/// Recording to address remotely, if the subject has one.
async fn recording_of(env: &SyncEnv, subject: Subject) -> Result<Option<String>> {
    let Subject::Track(track) = subject else {
        return Ok(None);
    };
    let mut session = env.db.read().await?;
    Ok(session
        .find_track(track)
        .await?
        .and_then(|t| t.recording_mbid))
}

/// Send one pending row and record the outcome.
async fn push_starred(
    env: &SyncEnv,
    context: &mut UserSyncContext,
    token: &str,
    starred: &Starred,
) -> Result<()> {
    let Some(recording_mbid) = recording_of(env, starred.subject).await? else {
        return settle_locally(env, starred).await;
    };

    let result = match starred.sync_state {
        SyncState::PendingAdd => push_love(env, context, token, starred, &recording_mbid).await,
        SyncState::PendingRemove => push_erase(env, context, token, starred, &recording_mbid).await,
        SyncState::Synchronized => Ok(()),
    };
    if result.is_err() {
        context.counters.push_failures += 1;
    }
    result
}

async fn push_love(
    env: &SyncEnv,
    context: &mut UserSyncContext,
    token: &str,
    starred: &Starred,
    recording_mbid: &str,
) -> Result<()> {
    env.api
        .send_feedback(token, recording_mbid, FeedbackScore::Love)
        .await?;

    let mut session = env.db.write().await?;
    let updated = session
        .set_starred_state(starred.id, SyncState::Synchronized)
        .await?;
    session.commit().await?;

    if updated {
        context.counters.pushed += 1;
        context.adjust_remote_count(1);
        return Ok(());
    }

    // Unstarred while the love was in flight
    tracing::debug!(target: "listenbrainz::feedbacks", id = %starred.id, "Feedback vanished, erasing");
    env.api
        .send_feedback(token, recording_mbid, FeedbackScore::Erase)
        .await?;
    Ok(())
}

async fn push_erase(
    env: &SyncEnv,
    context: &mut UserSyncContext,
    token: &str,
    starred: &Starred,
    recording_mbid: &str,
) -> Result<()> {
    env.api
        .send_feedback(token, recording_mbid, FeedbackScore::Erase)
        .await?;

    let mut session = env.db.write().await?;
    let removed = session
        .remove_starred_in_state(starred.id, SyncState::PendingRemove)
        .await?;
    session.commit().await?;

    if removed {
        context.counters.pushed += 1;
        context.adjust_remote_count(-1);
    }
    Ok(())
}

/// Rows ListenBrainz cannot address resolve locally.
async fn settle_locally(env: &SyncEnv, starred: &Starred) -> Result<()> {
    let mut session = env.db.write().await?;
    match starred.sync_state {
        SyncState::PendingAdd => {
            session
                .set_starred_state(starred.id, SyncState::Synchronized)
                .await?;
        }
        SyncState::PendingRemove => {
            session
                .remove_starred_in_state(starred.id, SyncState::PendingRemove)
                .await?;
        }
        SyncState::Synchronized => {}
    }
    session.commit().await?;
    Ok(())
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use std::sync::Arc;

    use chrono::DateTime;
    use proptest::prelude::*;

    use super::*;
    use crate::config::ListenBrainzConfig;
    use crate::listenbrainz::api::mocks::{Call, MockListenBrainz};
    use crate::test_utils::{insert_user_with_backends, temp_db};

    const TOKEN: &str = "2b1a1e5e-0000-4000-8000-000000000001";

    fn remote_feed(n: usize) -> Vec<RemoteFeedback> {
        (0..n)
            .map(|i| RemoteFeedback {
                recording_mbid: format!("00000000-0000-4000-8000-{i:012}"),
                created: DateTime::from_timestamp(1_650_000_000 + i as i64, 0).unwrap(),
            })
            .collect()
    }

    async fn page_requests(n: usize, page_size: usize) -> usize {
        let (db, _dir) = temp_db().await;
        let user = insert_user_with_backends(
            &db,
            "alice",
            None,
            Some(BackendKind::ListenBrainz),
            Some(TOKEN),
        )
        .await;

        let mock = Arc::new(
            MockListenBrainz::new()
                .with_token(TOKEN, "alice-lb")
                .with_feedbacks(remote_feed(n)),
        );
        let config = ListenBrainzConfig {
            feedback_page_size: page_size,
            max_sync_feedback_count: 10_000,
            ..ListenBrainzConfig::default()
        };
        let env = SyncEnv::new(db, mock.clone(), config);
        let mut sync = FeedbacksSynchronizer::new(env, StatusBoard::default());
        sync.sync_user(user).await;

        mock.count_calls(|c| matches!(c, Call::Feedbacks { .. }))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// A remote feed of N items at page size P takes ceil(N/P) requests.
        #[test]
        fn pagination_terminates(n in 0usize..60, page_size in 1usize..12) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let requests = runtime.block_on(page_requests(n, page_size));
            prop_assert_eq!(requests, n.div_ceil(page_size));
        }

        /// The step function never loops past the total or the budget.
        #[test]
        fn step_function_bounded(total in 0usize..500, page_size in 1usize..50, budget in 1usize..500) {
            let mut offset = 0;
            let mut pages = 0;
            loop {
                let fetched = page_size.min(total.saturating_sub(offset));
                pages += 1;
                match next_page_offset(offset, fetched, page_size, total, budget) {
                    Some(next) => {
                        prop_assert!(next > offset);
                        prop_assert!(next < total && next < budget);
                        offset = next;
                    }
                    None => break,
                }
            }
            prop_assert!(pages <= total.min(budget).div_ceil(page_size).max(1));
        }
    }
}
