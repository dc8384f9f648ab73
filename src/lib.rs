//! playsync - listen and feedback persistence for a self-hosted media server.
//!
//! Users pick, per concern, where their listens ("scrobbling") and their
//! starred artists, releases and tracks ("feedback") are recorded:
//!
//! - [`backend::InternalBackend`] keeps everything in the local database.
//! - [`listenbrainz::ListenBrainzBackend`] stores rows locally as pending
//!   and a background [`listenbrainz::SyncWorker`] reconciles them with the
//!   user's ListenBrainz account, both ways.
//!
//! Callers only talk to the [`service::Service`] façade, which resolves the
//! user's current backend on every call.

pub mod backend;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod listenbrainz;
pub mod model;
pub mod service;
#[cfg(test)]
pub mod test_utils;
