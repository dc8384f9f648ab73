//! Command-line interface.

mod commands;

pub use commands::{BackendChoice, Cli, Commands, UserCommand, run_command};
