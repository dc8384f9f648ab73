//! Listens synchronizer.
//!
//! Same cycle as the feedback one, but remote listens are paged backwards in
//! time: each request asks for listens strictly older than the oldest
//! timestamp seen so far. A remote listen is matched to a local track by
//! recording MBID, or failing that by track and release names.
//!
//! Outbound, pending listens are submitted as `single` listens. "Playing
//! now" notifications are sent as they come and never stored.

use chrono::{DateTime, Utc};

use super::adapter;
use super::context::{StatusBoard, SyncConcern, SyncContexts, SyncPhase, UserSyncContext, UserSyncStatus};
use super::domain::{ListenPage, ListenType, RemoteListen};
use super::{SyncEnv, is_invalid_token, resolve_user_name, sync_token};
use crate::error::{Result, ResultExt};
use crate::model::{BackendKind, Listen, ListenEntry, ListenId, SyncState, TimedListen, Track, TrackId, UserId};

const BACKEND: BackendKind = BackendKind::ListenBrainz;

/// Cursor of the next page to request, or `None` when the cycle is done.
///
/// `fetched_total` counts every entry received so far in the cycle.
///
/// The cursor is exclusive: the next request only returns listens strictly
/// older than `page.oldest`. Listens sharing that second but cut off by the
/// page boundary are skipped for this cycle and only show up once newer
/// listens shift the pages.
pub fn next_cursor(
    page: &ListenPage,
    page_size: usize,
    fetched_total: usize,
    remote_total: usize,
    budget: usize,
) -> Option<DateTime<Utc>> {
    if page.fetched == 0
        || page.fetched < page_size
        || fetched_total >= remote_total
        || fetched_total >= budget
    {
        return None;
    }
    page.oldest
}

enum CycleEnd {
    Done,
    /// The user is gone or moved to another backend
    NotApplicable,
}

/// Synchronizes listens of every ListenBrainz scrobbling user.
#[derive(Debug)]
pub struct ListensSynchronizer {
    env: SyncEnv,
    contexts: SyncContexts,
}

impl ListensSynchronizer {
    pub fn new(env: SyncEnv, board: StatusBoard) -> Self {
        Self {
            env,
            contexts: SyncContexts::new(SyncConcern::Listens, board),
        }
    }

    pub fn context(&self, user: UserId) -> Option<&UserSyncContext> {
        self.contexts.get(user)
    }

    /// Users with a context, current or stale.
    pub fn known_users(&self) -> Vec<UserId> {
        self.contexts.users()
    }

    /// Users that currently scrobble to ListenBrainz.
    pub async fn users(&self) -> Result<Vec<UserId>> {
        let mut session = self.env.db.read().await?;
        let users = session.users_with_scrobbling_backend(BACKEND).await?;
        Ok(users.into_iter().map(|u| u.id).collect())
    }

    /// Run a full cycle for `user`.
    ///
    /// Returns `None` if the user was not synced.
    pub async fn sync_user(&mut self, user: UserId) -> Option<UserSyncStatus> {
        let Self { env, contexts } = self;

        if !contexts.get_or_create(user).begin_cycle() {
            tracing::debug!(target: "listenbrainz::listens", user = %user, "Sync already in progress");
            return None;
        }
        contexts.publish(user);

        let result = run_cycle(env, contexts.get_or_create(user)).await;

        let context = contexts.get_or_create(user);
        match result {
            Ok(CycleEnd::NotApplicable) => {
                tracing::debug!(target: "listenbrainz::listens", user = %user, "Not a ListenBrainz scrobbling user");
                contexts.remove(user);
                return None;
            }
            Ok(CycleEnd::Done) => {
                let counters = context.counters;
                context.end_cycle(None);
                tracing::info!(
                    target: "listenbrainz::listens",
                    user = %user,
                    remote_user = context.remote_user_name.as_deref().unwrap_or_default(),
                    fetched = counters.fetched,
                    matched = counters.matched,
                    imported = counters.imported,
                    pushed = counters.pushed,
                    push_failures = counters.push_failures,
                    "Listen sync done"
                );
            }
            Err(e) => {
                if is_invalid_token(&e) {
                    context.forget_user_name();
                }
                tracing::warn!(target: "listenbrainz::listens", user = %user, "Listen sync aborted: {}", e);
                context.end_cycle(Some(e.to_string()));
            }
        }

        contexts.publish(user);
        contexts.get(user).map(UserSyncContext::status)
    }

    /// Submit one pending listen right away.
    pub async fn submit_listen(&mut self, id: ListenId) {
        let Self { env, contexts } = self;

        let entry = match load_pending(env, id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(target: "listenbrainz::listens", id = %id, "Nothing to submit");
                return;
            }
            Err(e) => {
                tracing::warn!(target: "listenbrainz::listens", id = %id, "Cannot load listen: {}", e);
                return;
            }
        };

        let user = entry.user_id;
        let token = match sync_token(env, user, SyncConcern::Listens).await {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(target: "listenbrainz::listens", user = %user, "Cannot submit listen: {}", e);
                return;
            }
        };

        let context = contexts.get_or_create(user);
        if let Err(e) = push_listen(env, context, &token, &entry).await {
            if is_invalid_token(&e) {
                context.forget_user_name();
            }
            tracing::warn!(target: "listenbrainz::listens", user = %user, id = %id, "Listen submission failed: {}", e);
        }
        contexts.publish(user);
    }

    /// Tell ListenBrainz what the user is listening to. Best effort.
    pub async fn playing_now(&mut self, listen: Listen) {
        if let Err(e) = send_playing_now(&self.env, listen).await {
            tracing::debug!(
                target: "listenbrainz::listens",
                user = %listen.user_id,
                track = %listen.track_id,
                "Playing now not sent: {}",
                e
            );
        }
    }
}

async fn load_pending(env: &SyncEnv, id: ListenId) -> Result<Option<ListenEntry>> {
    let mut session = env.db.read().await?;
    Ok(session
        .find_listen_by_id(id)
        .await?
        .filter(|l| l.backend == BACKEND && l.sync_state == SyncState::PendingAdd))
}

async fn load_track(env: &SyncEnv, track: TrackId) -> Result<Option<Track>> {
    let mut session = env.db.read().await?;
    session.find_track(track).await
}

async fn send_playing_now(env: &SyncEnv, listen: Listen) -> Result<()> {
    let Some(token) = sync_token(env, listen.user_id, SyncConcern::Listens).await? else {
        return Ok(());
    };
    let Some(track) = load_track(env, listen.track_id).await? else {
        return Ok(());
    };
    let Some(submission) = adapter::to_submission(&track, ListenType::PlayingNow, None) else {
        return Ok(());
    };
    env.api.submit_listen(&token, &submission).await?;
    tracing::debug!(target: "listenbrainz::listens", user = %listen.user_id, track = %track.id, "Playing now sent");
    Ok(())
}

async fn run_cycle(env: &SyncEnv, context: &mut UserSyncContext) -> Result<CycleEnd> {
    let user = context.user_id;
    let Some(token) = sync_token(env, user, SyncConcern::Listens).await? else {
        return Ok(CycleEnd::NotApplicable);
    };

    context.phase = SyncPhase::ValidatingToken;
    let user_name = resolve_user_name(env, context, &token).await?;

    context.phase = SyncPhase::Counting;
    let remote_total = env.api.listen_count(&user_name).await?;
    let has_pending = {
        let mut session = env.db.read().await?;
        session.has_pending_listens(user, BACKEND).await?
    };

    let changed = context.remote_count != Some(remote_total);
    tracing::debug!(
        target: "listenbrainz::listens",
        user = %user,
        remote_total,
        changed,
        has_pending,
        "Listen count fetched"
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
    let page_size = env.config.listen_page_size();
    let budget = env.config.max_sync_listen_count;
    if budget == 0 {
        return Ok(());
    }

    context.phase = SyncPhase::Fetching;
    loop {
        let page = env.api.listens(user_name, context.cursor, page_size).await?;
        context.counters.fetched += page.fetched;
        tracing::debug!(
            target: "listenbrainz::listens",
            user = %context.user_id,
            max_ts = ?context.cursor,
            fetched = page.fetched,
            usable = page.entries.len(),
            "Listen page received"
        );

        for entry in &page.entries {
            import_listen(env, context, entry).await?;
        }

        match next_cursor(&page, page_size, context.counters.fetched, remote_total, budget) {
            Some(cursor) => context.cursor = Some(cursor),
            None => return Ok(()),
        }
    }
}

/// Whether a candidate agrees with what the remote listen says about it.
///
/// Only used to break ties between tracks sharing a name and release.
fn is_compatible(track: &Track, listen: &RemoteListen) -> bool {
    if let Some(artist_name) = &listen.artist_name
        && !track.artists.iter().any(|a| &a.name == artist_name)
    {
        return false;
    }
    if let (Some(expected), Some(number)) = (listen.track_number, track.track_number)
        && expected != number
    {
        return false;
    }
    if let (Some(expected), Some(mbid)) = (
        &listen.release_mbid,
        track.release.as_ref().and_then(|r| r.mbid.as_ref()),
    ) && expected != mbid
    {
        return false;
    }
    true
}

/// Single local track the remote listen refers to, if any.
async fn match_listen(env: &SyncEnv, listen: &RemoteListen) -> Result<Option<TrackId>> {
    let mut session = env.db.read().await?;

    if let Some(recording_mbid) = &listen.recording_mbid
        && let [track] = session
            .find_tracks_by_recording_mbid(recording_mbid)
            .await?
            .as_slice()
    {
        return Ok(Some(*track));
    }

    let Some(release_name) = &listen.release_name else {
        tracing::debug!(target: "listenbrainz::listens", track = %listen.track_name, "Unmatched listen without release");
        return Ok(None);
    };

    let mut candidates = session
        .find_tracks_by_name_and_release(&listen.track_name, release_name)
        .await?;
    if candidates.len() > 1 {
        candidates.retain(|track| is_compatible(track, listen));
    }

    match candidates.as_slice() {
        [track] => Ok(Some(track.id)),
        _ => {
            tracing::debug!(
                target: "listenbrainz::listens",
                track = %listen.track_name,
                release = %release_name,
                candidates = candidates.len(),
                "Unmatched listen"
            );
            Ok(None)
        }
    }
}

async fn import_listen(env: &SyncEnv, context: &mut UserSyncContext, entry: &RemoteListen) -> Result<()> {
    let Some(track) = match_listen(env, entry).await? else {
        return Ok(());
    };
    context.counters.matched += 1;

    let user = context.user_id;
    {
        let mut session = env.db.read().await?;
        if session
            .find_listen(user, track, BACKEND, entry.listened_at)
            .await?
            .is_some()
        {
            return Ok(());
        }
    }

    let listen = TimedListen {
        user_id: user,
        track_id: track,
        listened_at: entry.listened_at,
    };
    let mut session = env.db.write().await?;
    if session.find_user(user).await?.is_none()
        || !session.subject_exists(track.into()).await?
        || session
            .find_listen(user, track, BACKEND, entry.listened_at)
            .await?
            .is_some()
    {
        return Ok(());
    }
    session
        .create_listen(&listen, BACKEND, SyncState::Synchronized)
        .await?;
    session.commit().await?;

    context.counters.imported += 1;
    tracing::debug!(target: "listenbrainz::listens", user = %user, track = %track, "Imported listen");
    Ok(())
}

async fn push_pending(env: &SyncEnv, context: &mut UserSyncContext, token: &str) -> Result<()> {
    context.phase = SyncPhase::Pushing;
    let pending = {
        let mut session = env.db.read().await?;
        session
            .pending_listens(context.user_id, BACKEND, env.config.max_pending_per_cycle)
            .await
            .with_context("loading pending listens")?
    };

    for entry in &pending {
        match push_listen(env, context, token, entry).await {
            Ok(()) => {}
            Err(e) if is_invalid_token(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(
                    target: "listenbrainz::listens",
                    user = %context.user_id,
                    id = %entry.id,
                    "Listen submission failed, will retry: {}",
                    e
                );
            }
        }
    }
    Ok(())
}

/// Submit one pending listen and record the outcome.
async fn push_listen(
    env: &SyncEnv,
    context: &mut UserSyncContext,
    token: &str,
    entry: &ListenEntry,
) -> Result<()> {
    let Some(track) = load_track(env, entry.track_id).await? else {
        return Ok(());
    };

    let Some(submission) = adapter::to_submission(&track, ListenType::Single, Some(entry.listened_at)) else {
        // Nothing ListenBrainz could accept: keep it local
        tracing::debug!(target: "listenbrainz::listens", id = %entry.id, "Listen has no artist, kept local");
        let mut session = env.db.write().await?;
        session.set_listen_state(entry.id, SyncState::Synchronized).await?;
        session.commit().await?;
        return Ok(());
    };

    if let Err(e) = env.api.submit_listen(token, &submission).await {
        context.counters.push_failures += 1;
        return Err(e.into());
    }

    let mut session = env.db.write().await?;
    let updated = session
        .set_listen_state(entry.id, SyncState::Synchronized)
        .await?;
    session.commit().await?;

    if updated {
        context.counters.pushed += 1;
        context.adjust_remote_count(1);
    }
    Ok(())
}
