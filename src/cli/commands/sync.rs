//! One-shot ListenBrainz synchronization.

use anyhow::bail;
use tokio::runtime::Runtime;

use super::{open_db, sync_env};
use crate::config::Config;
use crate::listenbrainz::SyncWorker;
use crate::listenbrainz::worker::SyncReport;

/// Run a full feedback and listen pass, for every ListenBrainz user or only
/// `user`, and print what happened.
pub fn cmd_sync(rt: &Runtime, config: &Config, user: Option<&str>) -> anyhow::Result<()> {
    if !config.backends.listenbrainz {
        bail!("the ListenBrainz backend is disabled in the configuration");
    }
    rt.block_on(sync(config, user))
}

async fn sync(config: &Config, user: Option<&str>) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let mut worker = SyncWorker::new(sync_env(db.clone(), config)?);

    let reports = match user {
        Some(login) => {
            let found = {
                let mut session = db.read().await?;
                session.find_user_by_login(login).await?
            };
            let Some(found) = found else {
                bail!("no user named '{login}'");
            };
            worker.sync_user_now(found.id).await
        }
        None => worker.sync_all_now().await,
    };

    if reports.is_empty() {
        println!("No user to sync with ListenBrainz");
    }
    for report in &reports {
        print_report(report);
    }

    db.close().await;
    Ok(())
}

fn print_report(report: &SyncReport) {
    let status = &report.status;
    let counters = &status.counters;
    println!(
        "user {} {:<9} remote={:<16} fetched={} matched={} imported={} pushed={} failed={}",
        report.user,
        report.concern.to_string(),
        status.remote_user_name.as_deref().unwrap_or("?"),
        counters.fetched,
        counters.matched,
        counters.imported,
        counters.pushed,
        counters.push_failures,
    );
    if let Some(error) = &status.last_error {
        println!("  error: {error}");
    }
}
