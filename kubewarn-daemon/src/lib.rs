//! kubewarn daemon library.
//!
//! Exposes the daemon internals for integration testing.
//! In production, `kubewarn-daemon` runs as a binary (main.rs).

pub mod api;
pub mod cli;
pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod modules;
pub mod orchestrator;
