//! Long-running mode.

use tokio::runtime::Runtime;

use super::{open_db, sync_env};
use crate::config::Config;
use crate::listenbrainz::SyncWorker;
use crate::service::Service;

/// Open the database, start the ListenBrainz worker when enabled and keep
/// the services up until Ctrl-C.
pub fn cmd_run(rt: &Runtime, config: &Config) -> anyhow::Result<()> {
    rt.block_on(run(config))
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let db = open_db(config).await?;

    let worker = if config.backends.listenbrainz {
        let worker = SyncWorker::new(sync_env(db.clone(), config)?);
        let handle = worker.handle();
        Some((handle, worker.start()))
    } else {
        None
    };

    let service = Service::new(
        db.clone(),
        config,
        worker.as_ref().map(|(handle, _)| handle.clone()),
    );
    tracing::info!(
        internal = config.backends.internal,
        listenbrainz = config.backends.listenbrainz,
        "playsync running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    drop(service);
    if let Some((handle, task)) = worker {
        handle.stop();
        drop(handle);
        task.await?;
    }
    db.close().await;
    Ok(())
}
