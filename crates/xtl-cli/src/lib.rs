//! The `xtl` command-line relay.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;

pub use bootstrap::{RelayContext, bootstrap};
pub use commands::{Commands, GlossaryCommand, RelayArgs, RulesCommand};
pub use error::CliError;
pub use parser::Cli;
