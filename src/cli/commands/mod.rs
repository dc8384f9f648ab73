//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `run`: services plus the ListenBrainz worker, until Ctrl-C
//! - `user`: user records and backend selection
//! - `sync`: one synchronous ListenBrainz pass
//!
//! `init-config` needs no runtime and lives here.

mod run;
mod sync;
mod user;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::db::{self, Db};
use crate::listenbrainz::{ListenBrainzApi, ListenBrainzClient, SyncEnv};
use crate::model::BackendKind;

pub use run::cmd_run;
pub use sync::cmd_sync;
pub use user::{cmd_user_add, cmd_user_set, cmd_user_show};

/// Listen and feedback persistence with ListenBrainz reconciliation
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true, env = "PLAYSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the services and the ListenBrainz worker until Ctrl-C
    Run,
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Run one full ListenBrainz pass and print the results
    Sync {
        /// Only sync this user
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Write the effective configuration to the config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Create a user with no backend selected
    Add {
        /// Login name
        login: String,
    },
    /// Change the backends or the ListenBrainz token of a user
    Set {
        /// Login name
        login: String,
        /// Backend recording listens
        #[arg(long, value_enum)]
        scrobbling: Option<BackendChoice>,
        /// Backend recording starred items
        #[arg(long, value_enum)]
        feedback: Option<BackendChoice>,
        /// ListenBrainz user token
        #[arg(long, conflicts_with = "clear_token")]
        token: Option<String>,
        /// Forget the ListenBrainz user token
        #[arg(long)]
        clear_token: bool,
    },
    /// Show a user and its backend selection
    Show {
        /// Login name
        login: String,
    },
}

/// Backend selection as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    Internal,
    Listenbrainz,
    None,
}

impl BackendChoice {
    pub fn kind(self) -> Option<BackendKind> {
        match self {
            BackendChoice::Internal => Some(BackendKind::Internal),
            BackendChoice::Listenbrainz => Some(BackendKind::ListenBrainz),
            BackendChoice::None => None,
        }
    }
}

/// Run the specified CLI command. No command means `run`.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    };

    match &cli.command {
        None | Some(Commands::Run) => cmd_run(&rt, &config),
        Some(Commands::User { command }) => match command {
            UserCommand::Add { login } => cmd_user_add(&rt, &config, login),
            UserCommand::Set {
                login,
                scrobbling,
                feedback,
                token,
                clear_token,
            } => {
                let token = match (token, clear_token) {
                    (Some(token), _) => Some(Some(token.as_str())),
                    (None, true) => Some(None),
                    (None, false) => None,
                };
                cmd_user_set(&rt, &config, login, *scrobbling, *feedback, token)
            }
            UserCommand::Show { login } => cmd_user_show(&rt, &config, login),
        },
        Some(Commands::Sync { user }) => cmd_sync(&rt, &config, user.as_deref()),
        Some(Commands::InitConfig { force }) => cmd_init_config(&config, cli.config.as_deref(), *force),
    }
}

/// Save `config` to `path`, or to the default location.
pub fn cmd_init_config(config: &Config, path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::config_path().ok_or(config::ConfigError::NoConfigDir)?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists, use --force to overwrite it", path.display());
    }
    config::save_to(config, &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Open the configured database, creating it if needed.
pub(crate) async fn open_db(config: &Config) -> anyhow::Result<Db> {
    let url = db::db_url(Some(&config.database.path));
    Ok(Db::open(&url).await?)
}

/// Everything the ListenBrainz synchronizers need, against the real API.
pub(crate) fn sync_env(db: Db, config: &Config) -> anyhow::Result<SyncEnv> {
    let api: Arc<dyn ListenBrainzApi> =
        Arc::new(ListenBrainzClient::new(config.listenbrainz.api_url.clone())?);
    Ok(SyncEnv::new(db, api, config.listenbrainz.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_user_set() {
        let cli = Cli::try_parse_from([
            "playsync",
            "user",
            "set",
            "alice",
            "--scrobbling",
            "listenbrainz",
            "--feedback",
            "none",
        ])
        .unwrap();

        let Some(Commands::User {
            command:
                UserCommand::Set {
                    login,
                    scrobbling,
                    feedback,
                    token,
                    clear_token,
                },
        }) = cli.command
        else {
            panic!("expected user set");
        };
        assert_eq!(login, "alice");
        assert_eq!(scrobbling.and_then(BackendChoice::kind), Some(BackendKind::ListenBrainz));
        assert_eq!(feedback, Some(BackendChoice::None));
        assert_eq!(feedback.and_then(BackendChoice::kind), None);
        assert!(token.is_none());
        assert!(!clear_token);
    }

    #[test]
    fn test_token_and_clear_token_conflict() {
        let result = Cli::try_parse_from([
            "playsync",
            "user",
            "set",
            "alice",
            "--token",
            "00000000-0000-0000-0000-000000000000",
            "--clear-token",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();

        cmd_init_config(&config, Some(&path), false).unwrap();
        assert!(cmd_init_config(&config, Some(&path), false).is_err());

        config.listenbrainz.listen_page_size = 50;
        cmd_init_config(&config, Some(&path), true).unwrap();
        assert_eq!(config::load_from(&path).listenbrainz.listen_page_size, 50);
    }

    #[test]
    fn test_no_command_defaults_to_run() {
        let cli = Cli::try_parse_from(["playsync"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }
}
