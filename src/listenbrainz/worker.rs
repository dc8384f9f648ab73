//! Background ListenBrainz worker.
//!
//! A single task owns both synchronizers, so cycles never overlap and the
//! per-user contexts need no locking. Work reaches it two ways:
//!
//! - commands sent through a [`SyncHandle`] (immediate pushes, "playing
//!   now", ad-hoc syncs)
//! - two timers, one per concern, firing after the initial delay and then
//!   every configured period
//!
//! # Usage
//!
//! ```ignore
//! let worker = SyncWorker::new(env);
//! let handle = worker.handle();
//! let task = worker.start();
//! handle.sync_all();
//! ```

use std::collections::BTreeSet;
use std::future;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use super::SyncEnv;
use super::context::{StatusBoard, SyncConcern, UserSyncStatus};
use super::feedbacks::FeedbacksSynchronizer;
use super::listens::ListensSynchronizer;
use crate::config::ListenBrainzConfig;
use crate::model::{Listen, ListenId, StarredId, UserId};

const COMMAND_CHANNEL_SIZE: usize = 256;

/// Commands that can be sent to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    /// Push one pending feedback row
    PushFeedback(StarredId),
    /// Submit one pending listen
    SubmitListen(ListenId),
    /// Send a "playing now" notification
    PlayingNow(Listen),
    /// Run a full cycle of both concerns for one user
    SyncUser(UserId),
    /// Run a full cycle of both concerns for every user
    SyncAll,
    /// Stop the worker
    Stop,
}

/// Outcome of one user's cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub concern: SyncConcern,
    pub user: UserId,
    pub status: UserSyncStatus,
}

/// Cheap, cloneable access to a running worker.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    command_tx: mpsc::Sender<SyncCommand>,
    board: StatusBoard,
}

impl SyncHandle {
    /// Queue a command without waiting.
    ///
    /// A full or closed queue drops the command: whatever it concerned is
    /// still pending in the database and gets picked up by the next cycle.
    pub fn send(&self, command: SyncCommand) {
        if let Err(e) = self.command_tx.try_send(command) {
            tracing::warn!(target: "listenbrainz::worker", "Command dropped: {}", e);
        }
    }

    pub fn push_feedback(&self, id: StarredId) {
        self.send(SyncCommand::PushFeedback(id));
    }

    pub fn submit_listen(&self, id: ListenId) {
        self.send(SyncCommand::SubmitListen(id));
    }

    pub fn playing_now(&self, listen: Listen) {
        self.send(SyncCommand::PlayingNow(listen));
    }

    pub fn sync_user(&self, user: UserId) {
        self.send(SyncCommand::SyncUser(user));
    }

    pub fn sync_all(&self) {
        self.send(SyncCommand::SyncAll);
    }

    pub fn stop(&self) {
        self.send(SyncCommand::Stop);
    }

    /// Last published feedback sync status of a user.
    pub fn feedback_status(&self, user: UserId) -> Option<UserSyncStatus> {
        self.status(SyncConcern::Feedbacks, user)
    }

    /// Last published listen sync status of a user.
    pub fn listen_status(&self, user: UserId) -> Option<UserSyncStatus> {
        self.status(SyncConcern::Listens, user)
    }

    fn status(&self, concern: SyncConcern, user: UserId) -> Option<UserSyncStatus> {
        self.board.read().get(&(concern, user)).cloned()
    }
}

/// Both synchronizers, driven by the worker loop.
#[derive(Debug)]
struct Synchronizers {
    feedbacks: FeedbacksSynchronizer,
    listens: ListensSynchronizer,
}

impl Synchronizers {
    /// Returns `false` when the worker should stop.
    async fn handle_command(&mut self, command: SyncCommand) -> bool {
        tracing::trace!(target: "listenbrainz::worker", ?command, "Command received");
        match command {
            SyncCommand::PushFeedback(id) => self.feedbacks.push_feedback(id).await,
            SyncCommand::SubmitListen(id) => self.listens.submit_listen(id).await,
            SyncCommand::PlayingNow(listen) => self.listens.playing_now(listen).await,
            SyncCommand::SyncUser(user) => {
                self.feedbacks.sync_user(user).await;
                self.listens.sync_user(user).await;
            }
            SyncCommand::SyncAll => {
                self.sync_all(SyncConcern::Feedbacks).await;
                self.sync_all(SyncConcern::Listens).await;
            }
            SyncCommand::Stop => return false,
        }
        true
    }

    /// Users to cycle through: current ListenBrainz users, plus users with a
    /// context that may have left ListenBrainz since.
    async fn users(&self, concern: SyncConcern) -> Vec<UserId> {
        let (current, known) = match concern {
            SyncConcern::Feedbacks => (self.feedbacks.users().await, self.feedbacks.known_users()),
            SyncConcern::Listens => (self.listens.users().await, self.listens.known_users()),
        };
        let current = current.unwrap_or_else(|e| {
            tracing::warn!(target: "listenbrainz::worker", %concern, "Cannot list users: {}", e);
            Vec::new()
        });
        current
            .into_iter()
            .chain(known)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    async fn sync_all(&mut self, concern: SyncConcern) -> Vec<SyncReport> {
        let users = self.users(concern).await;
        tracing::debug!(target: "listenbrainz::worker", %concern, users = users.len(), "Sync pass started");

        let mut reports = Vec::with_capacity(users.len());
        for user in users {
            let status = match concern {
                SyncConcern::Feedbacks => self.feedbacks.sync_user(user).await,
                SyncConcern::Listens => self.listens.sync_user(user).await,
            };
            if let Some(status) = status {
                reports.push(SyncReport {
                    concern,
                    user,
                    status,
                });
            }
        }
        reports
    }
}

/// Owns the synchronizers and runs them on one task.
#[derive(Debug)]
pub struct SyncWorker {
    synchronizers: Synchronizers,
    config: ListenBrainzConfig,
    board: StatusBoard,
    command_tx: mpsc::Sender<SyncCommand>,
    command_rx: mpsc::Receiver<SyncCommand>,
}

impl SyncWorker {
    pub fn new(env: SyncEnv) -> Self {
        let board = StatusBoard::default();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        Self {
            config: env.config.clone(),
            synchronizers: Synchronizers {
                feedbacks: FeedbacksSynchronizer::new(env.clone(), board.clone()),
                listens: ListensSynchronizer::new(env, board.clone()),
            },
            board,
            command_tx,
            command_rx,
        }
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            command_tx: self.command_tx.clone(),
            board: self.board.clone(),
        }
    }

    /// Run one full pass of both concerns on the caller's task.
    pub async fn sync_all_now(&mut self) -> Vec<SyncReport> {
        let mut reports = self.synchronizers.sync_all(SyncConcern::Feedbacks).await;
        reports.extend(self.synchronizers.sync_all(SyncConcern::Listens).await);
        reports
    }

    /// Run one full cycle of both concerns for one user on the caller's task.
    pub async fn sync_user_now(&mut self, user: UserId) -> Vec<SyncReport> {
        let mut reports = Vec::new();
        if let Some(status) = self.synchronizers.feedbacks.sync_user(user).await {
            reports.push(SyncReport {
                concern: SyncConcern::Feedbacks,
                user,
                status,
            });
        }
        if let Some(status) = self.synchronizers.listens.sync_user(user).await {
            reports.push(SyncReport {
                concern: SyncConcern::Listens,
                user,
                status,
            });
        }
        reports
    }

    /// Start the worker background task.
    ///
    /// Returns immediately; the task ends after [`SyncCommand::Stop`] or
    /// once every handle is dropped.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let Self {
            synchronizers,
            config,
            command_tx,
            command_rx,
            ..
        } = self;
        // Only handles keep the channel open
        drop(command_tx);

        tokio::spawn(run(synchronizers, config, command_rx))
    }
}

fn periodic_timer(period: Option<std::time::Duration>, initial_delay: std::time::Duration) -> Option<Interval> {
    period.map(|period| {
        let mut timer = interval_at(Instant::now() + initial_delay, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    })
}

/// Tick of an optional timer; a disabled timer never fires.
async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => future::pending().await,
    }
}

async fn run(
    mut synchronizers: Synchronizers,
    config: ListenBrainzConfig,
    mut command_rx: mpsc::Receiver<SyncCommand>,
) {
    let initial_delay = config.initial_delay();
    let mut feedbacks_timer = periodic_timer(config.feedbacks_period(), initial_delay);
    let mut listens_timer = periodic_timer(config.listens_period(), initial_delay);

    tracing::info!(
        target: "listenbrainz::worker",
        initial_delay_secs = initial_delay.as_secs(),
        feedbacks_period = ?config.feedbacks_period(),
        listens_period = ?config.listens_period(),
        "ListenBrainz worker started"
    );

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else {
                    break;
                };
                if !synchronizers.handle_command(command).await {
                    break;
                }
            }

            _ = tick(&mut feedbacks_timer) => {
                synchronizers.sync_all(SyncConcern::Feedbacks).await;
            }

            _ = tick(&mut listens_timer) => {
                synchronizers.sync_all(SyncConcern::Listens).await;
            }
        }
    }

    tracing::info!(target: "listenbrainz::worker", "ListenBrainz worker stopped");
}
