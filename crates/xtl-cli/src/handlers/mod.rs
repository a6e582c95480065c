//! Command handlers.
//!
//! Handlers are thin wrappers: they take parsed arguments, call into
//! `xtl-core`/`xtl-proxy`, and format output for the terminal.

pub mod glossary;
pub mod rules;
pub mod serve;
