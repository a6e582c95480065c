//! Subcommand definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use xtl_core::RelayConfig;

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the translation relay until Ctrl+C
    Serve {
        #[command(flatten)]
        relay: RelayArgs,

        /// Print every relay event to stdout as a JSON line
        #[arg(long)]
        events: bool,
    },

    /// Inspect or extend a glossary file
    #[command(subcommand)]
    Glossary(GlossaryCommand),

    /// Work with pre/post-processing rule files
    #[command(subcommand)]
    Rules(RulesCommand),
}

#[derive(Subcommand, Debug)]
pub enum GlossaryCommand {
    /// Print the known-terms block the relay would send for TEXT
    Lookup {
        /// Glossary file (`_Substitutions.txt`)
        #[arg(long)]
        path: PathBuf,
        text: String,
    },

    /// Add a term, applying the same checks as learned terms
    Add {
        /// Glossary file (`_Substitutions.txt`)
        #[arg(long)]
        path: PathBuf,
        source: String,
        target: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// Run the rule files next to a glossary over TEXT
    Apply {
        /// Glossary file or the directory holding the rule files
        #[arg(long)]
        path: PathBuf,
        /// Use `_Postprocessors.txt` instead of `_Preprocessors.txt`
        #[arg(long)]
        post: bool,
        text: String,
    },
}

/// Relay settings. Every flag falls back to an `XTL_*` environment variable
/// (also read from `.env`), then to the built-in default.
#[derive(Args, Debug, Default, Clone)]
pub struct RelayArgs {
    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "XTL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Comma-separated API keys, used round-robin
    #[arg(long, env = "XTL_API_KEYS", hide_env_values = true)]
    pub api_keys: Option<String>,

    /// Model identifier
    #[arg(long, env = "XTL_MODEL")]
    pub model: Option<String>,

    /// Host to bind
    #[arg(long, env = "XTL_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "XTL_PORT")]
    pub port: Option<u16>,

    /// Number of requests handled concurrently
    #[arg(long, env = "XTL_WORKERS")]
    pub workers: Option<usize>,

    /// System prompt sent before every conversation
    #[arg(long, env = "XTL_SYSTEM_PROMPT")]
    pub system_prompt: Option<String>,

    /// Text prepended to every user message
    #[arg(long, env = "XTL_PRE_PROMPT")]
    pub pre_prompt: Option<String>,

    /// Previous turns replayed per client
    #[arg(long, env = "XTL_CONTEXT_DEPTH")]
    pub context_depth: Option<usize>,

    /// Sampling temperature
    #[arg(long, env = "XTL_TEMPERATURE")]
    pub temperature: Option<f64>,

    /// Enable glossary hints and term learning
    #[arg(long, env = "XTL_GLOSSARY")]
    pub glossary: bool,

    /// Glossary file; rule files are read from the same directory
    #[arg(long, env = "XTL_GLOSSARY_PATH")]
    pub glossary_path: Option<PathBuf>,

    /// Chance that a request asks the model to extract new terms
    #[arg(long, env = "XTL_EXTRACTION_PROBABILITY")]
    pub extraction_probability: Option<f64>,

    /// Maximum number of client contexts kept in memory
    #[arg(long, env = "XTL_MAX_CLIENTS")]
    pub max_clients: Option<usize>,
}

impl RelayArgs {
    /// Overlay the given flags on the default configuration.
    pub fn into_config(self) -> RelayConfig {
        let mut config = RelayConfig::with_defaults();
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(api_keys) = self.api_keys {
            config.api_keys = api_keys;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(system_prompt) = self.system_prompt {
            config.system_prompt = system_prompt;
        }
        if let Some(pre_prompt) = self.pre_prompt {
            config.pre_prompt = pre_prompt;
        }
        if let Some(depth) = self.context_depth {
            config.context_depth = depth;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(probability) = self.extraction_probability {
            config.extraction_probability = probability;
        }
        if let Some(max_clients) = self.max_clients {
            config.max_clients = max_clients;
        }
        config.glossary_enabled = self.glossary;
        config.glossary_path = self.glossary_path;
        config
    }
}
