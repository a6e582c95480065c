//! Serve command handler.
//!
//! Runs the relay until Ctrl+C, then drains in-flight requests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use xtl_proxy::{RelayLogEntry, RelayStatus};

use crate::bootstrap::RelayContext;

/// How often the supervisor is polled for a crashed server task.
const STATUS_POLL: Duration = Duration::from_secs(1);

/// Execute the serve command.
pub async fn execute(ctx: RelayContext, print_events: bool) -> Result<()> {
    let printer = print_events.then(|| spawn_event_printer(ctx.hub.subscribe()));

    let addr = ctx.supervisor.start(Arc::clone(&ctx.engine)).await?;
    let config = ctx.engine.config();
    println!("xtl relay listening on http://{addr}/");
    println!("  endpoint: {}", config.endpoint);
    println!("  model:    {}", config.model);
    println!("  workers:  {}", config.workers);
    if config.glossary_enabled {
        println!(
            "  glossary: {} terms",
            ctx.engine.services().glossary.len()
        );
    }
    println!("Press Ctrl+C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(STATUS_POLL);
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                break;
            }
            _ = ticker.tick() => {
                if ctx.supervisor.status().await == RelayStatus::Crashed {
                    anyhow::bail!("Relay server stopped unexpectedly");
                }
            }
        }
    }

    info!("Shutting down, waiting for in-flight requests");
    ctx.supervisor.stop().await?;
    ctx.engine.close();

    let usage = ctx.engine.services().usage.totals();
    info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        "Token usage this session"
    );

    if let Some(printer) = printer {
        printer.abort();
    }
    Ok(())
}

/// Print every relay event as one JSON line.
fn spawn_event_printer(mut rx: broadcast::Receiver<RelayLogEntry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(entry) => match serde_json::to_string(&entry) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!("Failed to serialize relay event: {e}"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
