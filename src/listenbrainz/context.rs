//! Per-user synchronization state.
//!
//! Contexts live in a [`SyncContexts`] registry owned by one synchronizer.
//! They are created lazily the first time a user needs syncing and are
//! never persisted: a restart begins with empty contexts, which only costs
//! a full refetch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::model::UserId;

/// What a synchronizer reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncConcern {
    Feedbacks,
    Listens,
}

impl fmt::Display for SyncConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncConcern::Feedbacks => "feedbacks",
            SyncConcern::Listens => "listens",
        })
    }
}

/// Where a user's cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    NotYetSynced,
    ValidatingToken,
    Counting,
    Fetching,
    Pushing,
    Idle,
}

/// Progress counters of the current (or last) cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncCounters {
    /// Remote entries received, usable or not
    pub fetched: usize,
    /// Entries resolved to a local track
    pub matched: usize,
    /// Matched entries that were missing locally
    pub imported: usize,
    /// Pending local entries acknowledged by the remote
    pub pushed: usize,
    /// Pending local entries the remote refused or never got
    pub push_failures: usize,
}

/// In-memory sync state of one user for one concern.
#[derive(Debug, Clone)]
pub struct UserSyncContext {
    pub user_id: UserId,
    /// Token the cached user name was resolved from
    pub token: Option<String>,
    pub remote_user_name: Option<String>,
    pub phase: SyncPhase,
    pub syncing: bool,
    /// Offset of the next feedback page
    pub current_offset: usize,
    /// `max_ts` of the next listens page
    pub cursor: Option<DateTime<Utc>>,
    /// Remote total as of the last count request
    pub remote_count: Option<usize>,
    pub counters: SyncCounters,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl UserSyncContext {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            token: None,
            remote_user_name: None,
            phase: SyncPhase::NotYetSynced,
            syncing: false,
            current_offset: 0,
            cursor: None,
            remote_count: None,
            counters: SyncCounters::default(),
            last_sync: None,
            last_error: None,
        }
    }

    /// Start a cycle. Returns `false` if one is already running.
    ///
    /// Every cycle restarts from the most recent remote entry.
    pub fn begin_cycle(&mut self) -> bool {
        if self.syncing {
            return false;
        }
        self.syncing = true;
        self.phase = SyncPhase::ValidatingToken;
        self.current_offset = 0;
        self.cursor = None;
        self.counters = SyncCounters::default();
        self.last_error = None;
        true
    }

    pub fn end_cycle(&mut self, error: Option<String>) {
        self.syncing = false;
        self.phase = SyncPhase::Idle;
        self.last_sync = Some(Utc::now());
        self.last_error = error;
    }

    /// Cached user name, valid only for the token it was resolved from.
    pub fn cached_user_name(&self, token: &str) -> Option<&str> {
        match (&self.token, &self.remote_user_name) {
            (Some(cached), Some(name)) if cached == token => Some(name),
            _ => None,
        }
    }

    pub fn cache_user_name(&mut self, token: &str, user_name: String) {
        self.token = Some(token.to_string());
        self.remote_user_name = Some(user_name);
    }

    /// Forget the resolved identity, e.g. after the token was refused.
    pub fn forget_user_name(&mut self) {
        self.token = None;
        self.remote_user_name = None;
    }

    /// Adjust the cached remote count after a successful push.
    pub fn adjust_remote_count(&mut self, delta: isize) {
        if let Some(count) = self.remote_count.as_mut() {
            *count = count.saturating_add_signed(delta);
        }
    }

    pub fn status(&self) -> UserSyncStatus {
        UserSyncStatus {
            phase: self.phase,
            syncing: self.syncing,
            remote_user_name: self.remote_user_name.clone(),
            remote_count: self.remote_count,
            counters: self.counters,
            last_sync: self.last_sync,
            last_error: self.last_error.clone(),
        }
    }
}

/// Snapshot of a [`UserSyncContext`], readable from any thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSyncStatus {
    pub phase: SyncPhase,
    pub syncing: bool,
    pub remote_user_name: Option<String>,
    pub remote_count: Option<usize>,
    pub counters: SyncCounters,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Published statuses, keyed by concern and user.
pub type StatusBoard = Arc<RwLock<HashMap<(SyncConcern, UserId), UserSyncStatus>>>;

/// Registry of the contexts of one synchronizer.
#[derive(Debug)]
pub struct SyncContexts {
    concern: SyncConcern,
    contexts: HashMap<UserId, UserSyncContext>,
    board: StatusBoard,
}

impl SyncContexts {
    pub fn new(concern: SyncConcern, board: StatusBoard) -> Self {
        Self {
            concern,
            contexts: HashMap::new(),
            board,
        }
    }

    pub fn get(&self, user: UserId) -> Option<&UserSyncContext> {
        self.contexts.get(&user)
    }

    pub fn get_or_create(&mut self, user: UserId) -> &mut UserSyncContext {
        self.contexts
            .entry(user)
            .or_insert_with(|| UserSyncContext::new(user))
    }

    /// Drop the context of a user that no longer uses this backend.
    pub fn remove(&mut self, user: UserId) {
        self.contexts.remove(&user);
        self.board.write().remove(&(self.concern, user));
    }

    /// Users with a context.
    pub fn users(&self) -> Vec<UserId> {
        self.contexts.keys().copied().collect()
    }

    /// Make the current state of `user` visible through the board.
    pub fn publish(&self, user: UserId) {
        if let Some(context) = self.contexts.get(&user) {
            self.board
                .write()
                .insert((self.concern, user), context.status());
        }
    }
}
