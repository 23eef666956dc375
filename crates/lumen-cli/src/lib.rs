//! Lumen CLI library.
//!
//! Wires the engagement engine to SQLite storage and exposes it as the
//! `lumen` command.

mod cli;
pub mod commands;
mod config;
pub mod service;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use service::Service;
