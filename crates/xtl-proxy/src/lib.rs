//! HTTP adapters for the xtl translation relay.
//!
//! - `server` - axum inbound server (`GET /?text=`, `GET /health`)
//! - `client` - reqwest implementation of the chat-completion port
//! - `log_hub` - broadcast event hub with a bounded backlog
//! - `supervisor` - start/stop/status of the server task

#![deny(unsafe_code)]

pub mod client;
pub mod log_hub;
pub mod models;
pub mod server;
pub mod supervisor;

pub use client::{OpenAiChatClient, REQUEST_TIMEOUT, parse_completion};
pub use log_hub::{RelayLogEntry, RelayLogHub};
pub use server::{create_router, serve};
pub use supervisor::{RelayStatus, RelaySupervisor, SupervisorError};
