//! Relay supervisor for managing the HTTP server lifecycle.
//!
//! The `RelaySupervisor` owns the server task internally, using
//! `tokio::sync::Mutex` for async-safe access. Callers (CLI, GUIs) start,
//! stop and reconfigure the relay without holding task handles themselves.
//!
//! - **Bind-then-report**: the listener binds first, then the real address
//!   is reported
//! - **Crash detection**: `status()` uses the cancellation token to tell a
//!   clean stop from a crash
//! - **Drain on stop**: stopping waits for in-flight requests to finish

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use xtl_core::{ConfigError, RelayConfig, RelayEngine, RelayEvent, RelayEventEmitter, validate_config};

/// Handle to a running relay server.
struct RelayHandle {
    cancel_token: CancellationToken,
    join_handle: JoinHandle<AnyResult<()>>,
    bound_addr: SocketAddr,
    engine: Arc<RelayEngine>,
}

/// Status of the relay server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    /// Relay is not running.
    Stopped,
    /// Relay is running and listening.
    Running {
        /// Address the relay is listening on.
        address: SocketAddr,
    },
    /// Relay started but finished without being stopped.
    Crashed,
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Running { address } => write!(f, "Running on {address}"),
            Self::Crashed => write!(f, "Crashed"),
        }
    }
}

/// Error from supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Relay is already running on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("Failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    #[error("Relay is not running")]
    NotRunning,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Supervisor for the relay server.
///
/// ```ignore
/// let supervisor = RelaySupervisor::new(hub.clone());
/// let addr = supervisor.start(engine).await?;
/// println!("Status: {}", supervisor.status().await);
/// supervisor.stop().await?;
/// ```
pub struct RelaySupervisor {
    handle: Mutex<Option<RelayHandle>>,
    events: Arc<dyn RelayEventEmitter>,
}

impl RelaySupervisor {
    #[must_use]
    pub fn new(events: Arc<dyn RelayEventEmitter>) -> Self {
        Self {
            handle: Mutex::new(None),
            events,
        }
    }

    /// Start serving `engine` on the host and port of its configuration.
    ///
    /// Binds before spawning so the returned address is the real one (port 0
    /// picks a free port).
    pub async fn start(&self, engine: Arc<RelayEngine>) -> Result<SocketAddr, SupervisorError> {
        let mut guard = self.handle.lock().await;

        if let Some(old) = guard.take() {
            if !old.join_handle.is_finished() {
                let addr = old.bound_addr;
                *guard = Some(old);
                return Err(SupervisorError::AlreadyRunning(addr));
            }
            match old.join_handle.await {
                Ok(Ok(())) => debug!("Previous relay task completed normally"),
                Ok(Err(e)) => warn!("Previous relay task ended with error: {e}"),
                Err(e) => warn!("Previous relay task panicked: {e}"),
            }
        }

        let config = engine.config();
        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener =
            TcpListener::bind(&bind_addr)
                .await
                .map_err(|e| SupervisorError::BindFailed {
                    address: bind_addr.clone(),
                    reason: e.to_string(),
                })?;

        let bound_addr = listener
            .local_addr()
            .map_err(|e| SupervisorError::Internal(format!("Failed to get local address: {e}")))?;

        info!(workers = config.workers, "Relay bound to {bound_addr}");

        let cancel_token = CancellationToken::new();
        let cancel_clone = cancel_token.clone();
        let task_engine = Arc::clone(&engine);
        let join_handle: JoinHandle<AnyResult<()>> = tokio::spawn(async move {
            debug!(addr = %bound_addr, "Relay task starting");
            crate::serve(listener, task_engine, cancel_clone).await
        });

        self.events.emit(RelayEvent::ServerStarted {
            address: bound_addr,
            workers: config.workers,
        });

        *guard = Some(RelayHandle {
            cancel_token,
            join_handle,
            bound_addr,
            engine,
        });

        Ok(bound_addr)
    }

    /// Stop accepting connections and wait for in-flight requests to drain.
    ///
    /// A request mid-retry is not cancelled, so this can take as long as the
    /// slowest outstanding request.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let mut guard = self.handle.lock().await;
        let Some(handle) = guard.take() else {
            return Err(SupervisorError::NotRunning);
        };

        info!("Stopping relay on {}", handle.bound_addr);
        handle.cancel_token.cancel();

        let result = match handle.join_handle.await {
            Ok(Ok(())) => {
                info!("Relay stopped cleanly");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Relay task ended with error: {e}");
                Err(SupervisorError::Internal(format!("Relay error: {e}")))
            }
            Err(join_err) => {
                error!("Relay task panicked: {join_err}");
                Err(SupervisorError::Internal(format!(
                    "Task panicked: {join_err}"
                )))
            }
        };
        self.events.emit(RelayEvent::ServerStopped);
        result
    }

    /// Current status of the relay.
    pub async fn status(&self) -> RelayStatus {
        let mut guard = self.handle.lock().await;
        let Some(handle) = guard.as_ref() else {
            return RelayStatus::Stopped;
        };

        if handle.join_handle.is_finished() {
            let was_cancelled = handle.cancel_token.is_cancelled();
            *guard = None;
            if was_cancelled {
                RelayStatus::Stopped
            } else {
                warn!("Detected crashed relay, cleaning up handle");
                RelayStatus::Crashed
            }
        } else {
            RelayStatus::Running {
                address: handle.bound_addr,
            }
        }
    }

    /// Bound address if running.
    pub async fn bound_address(&self) -> Option<SocketAddr> {
        let guard = self.handle.lock().await;
        guard
            .as_ref()
            .filter(|h| !h.join_handle.is_finished())
            .map(|h| h.bound_addr)
    }

    /// Validate and apply a new configuration to the running relay.
    ///
    /// Host, port and worker count only change on the next start.
    pub async fn update_config(&self, config: RelayConfig) -> Result<(), SupervisorError> {
        validate_config(&config)?;

        let guard = self.handle.lock().await;
        let handle = guard.as_ref().ok_or(SupervisorError::NotRunning)?;

        let current = handle.engine.config();
        if current.host != config.host || current.port != config.port || current.workers != config.workers {
            warn!("Host, port and worker changes take effect after a restart");
        }
        // Reloading the glossary and rule files is blocking file I/O.
        let engine = Arc::clone(&handle.engine);
        tokio::task::spawn_blocking(move || engine.apply_config(config))
            .await
            .map_err(|e| SupervisorError::Internal(format!("Config update task failed: {e}")))?;
        info!("Relay configuration updated");
        Ok(())
    }
}

impl fmt::Debug for RelaySupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaySupervisor").finish_non_exhaustive()
    }
}
