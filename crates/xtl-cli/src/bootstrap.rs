//! Composition root: wires the relay engine to its adapters.

use std::sync::Arc;

use tracing::debug;

use xtl_core::{RelayConfig, RelayEngine, RelayEventEmitter, RelayServices, validate_config};
use xtl_proxy::{OpenAiChatClient, RelayLogHub, RelaySupervisor};

use crate::error::CliError;

/// Everything `serve` needs, built once.
#[derive(Debug)]
pub struct RelayContext {
    pub engine: Arc<RelayEngine>,
    pub hub: Arc<RelayLogHub>,
    pub supervisor: RelaySupervisor,
}

/// Validate `config` and build the engine, event hub and supervisor.
pub fn bootstrap(config: RelayConfig) -> Result<RelayContext, CliError> {
    validate_config(&config)?;
    if config.credentials().is_empty() {
        return Err(CliError::Config(
            "no API key configured (set --api-keys or XTL_API_KEYS)".to_string(),
        ));
    }

    let hub = Arc::new(RelayLogHub::new());
    let emitter: Arc<dyn RelayEventEmitter> = hub.clone();
    let client = OpenAiChatClient::new()
        .map_err(|e| CliError::Relay(format!("Failed to build HTTP client: {e}")))?;

    debug!(endpoint = %config.endpoint, model = %config.model, "Bootstrapping relay");
    let services = RelayServices::new(config.max_clients);
    let engine = Arc::new(RelayEngine::new(
        config,
        services,
        Arc::new(client),
        Arc::clone(&emitter),
    ));
    let supervisor = RelaySupervisor::new(emitter);

    Ok(RelayContext {
        engine,
        hub,
        supervisor,
    })
}
