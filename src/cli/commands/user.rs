//! User management commands.

use anyhow::{Context, bail};
use tokio::runtime::Runtime;

use super::{BackendChoice, open_db};
use crate::config::Config;
use crate::model::{BackendKind, User};

/// Create a user.
pub fn cmd_user_add(rt: &Runtime, config: &Config, login: &str) -> anyhow::Result<()> {
    rt.block_on(user_add(config, login))
}

/// Update the backends and token of a user.
///
/// `token` is `None` to leave the token alone, `Some(None)` to clear it.
pub fn cmd_user_set(
    rt: &Runtime,
    config: &Config,
    login: &str,
    scrobbling: Option<BackendChoice>,
    feedback: Option<BackendChoice>,
    token: Option<Option<&str>>,
) -> anyhow::Result<()> {
    if let Some(Some(token)) = token {
        uuid::Uuid::parse_str(token).context("a ListenBrainz token is a UUID")?;
    }
    rt.block_on(user_set(config, login, scrobbling, feedback, token))
}

/// Show a user.
pub fn cmd_user_show(rt: &Runtime, config: &Config, login: &str) -> anyhow::Result<()> {
    rt.block_on(user_show(config, login))
}

async fn user_add(config: &Config, login: &str) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let mut session = db.write().await?;
    if session.find_user_by_login(login).await?.is_some() {
        bail!("user '{login}' already exists");
    }
    let user = session.create_user(login).await?;
    session.commit().await?;

    println!("Created user '{}' (id {})", user.login_name, user.id);
    db.close().await;
    Ok(())
}

async fn user_set(
    config: &Config,
    login: &str,
    scrobbling: Option<BackendChoice>,
    feedback: Option<BackendChoice>,
    token: Option<Option<&str>>,
) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let mut session = db.write().await?;
    let Some(user) = session.find_user_by_login(login).await? else {
        bail!("no user named '{login}'");
    };

    if let Some(choice) = scrobbling {
        session.set_scrobbling_backend(user.id, choice.kind()).await?;
    }
    if let Some(choice) = feedback {
        session.set_feedback_backend(user.id, choice.kind()).await?;
    }
    if let Some(token) = token {
        session.set_listenbrainz_token(user.id, token).await?;
    }
    let updated = session.find_user(user.id).await?;
    session.commit().await?;

    if let Some(user) = updated {
        print_user(&user, config);
    }
    db.close().await;
    Ok(())
}

async fn user_show(config: &Config, login: &str) -> anyhow::Result<()> {
    let db = open_db(config).await?;
    let user = {
        let mut session = db.read().await?;
        session.find_user_by_login(login).await?
    };
    let Some(user) = user else {
        bail!("no user named '{login}'");
    };

    print_user(&user, config);
    db.close().await;
    Ok(())
}

fn print_user(user: &User, config: &Config) {
    let backend = |kind: Option<BackendKind>| match kind {
        Some(kind) if config.backends.is_enabled(kind) => kind.to_string(),
        Some(kind) => format!("{kind} (disabled)"),
        None => "none".to_string(),
    };

    println!("User:       {} (id {})", user.login_name, user.id);
    println!("Scrobbling: {}", backend(user.scrobbling_backend));
    println!("Feedback:   {}", backend(user.feedback_backend));
    println!(
        "Token:      {}",
        if user.listenbrainz_token.is_some() {
            "set"
        } else {
            "not set"
        }
    );
}
