//! wantwatch-core library.
//!
//! One invocation of [`run::RunCoordinator::run`] is one complete cycle:
//! load the baseline, fetch a fresh listing count per tracked item, classify
//! every count against the baseline, persist the next baseline, then notify.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums at the library seams, each mapped to an
//!   [`error::ErrorCode`]; `anyhow::Result` for configuration loading.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod baseline;
pub mod catalog;
pub mod config;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod lock;
pub mod model;
pub mod notify;
pub mod retry;
pub mod run;
