//! Main CLI parser and top-level argument handling.

use clap::Parser;

use crate::commands::Commands;

/// Local relay between XUnity.AutoTranslator and an OpenAI-compatible API.
#[derive(Parser, Debug)]
#[command(name = "xtl")]
#[command(about = "Translate game text through an LLM with context and a learned glossary")]
#[command(version)]
pub struct Cli {
    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
