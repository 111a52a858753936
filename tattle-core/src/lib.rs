//! # tattle-core
//!
//! Core library for tattle - forwards a coding agent's session log to a
//! chat channel.
//!
//! An external interactive agent appends JSONL records to per-session log
//! files while it works. This library tails those files, extracts the
//! records a human operator must see (assistant replies, interactive
//! prompts), guarantees each is delivered at most once across restarts,
//! and forwards the result through a pluggable [`Messenger`].
//!
//! ## Architecture
//!
//! One periodic tick drives the pipeline end to end:
//!
//! ```text
//! filesystem → SessionResolver/FileSetTracker → IncrementalReader
//!            → RecordClassifier → DedupGuard → DeliveryPipeline → Messenger
//! ```
//!
//! [`CheckpointStore`] persists read offsets and delivered identifiers so
//! a restart neither re-delivers nor loses records.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tattle_core::{Config, Monitor, NoTerminal, WebhookMessenger};
//!
//! # async fn run() -> tattle_core::Result<()> {
//! let config = Config::load()?;
//! let messenger = Arc::new(WebhookMessenger::new(&config.webhook)?);
//! let mut monitor = Monitor::new(&config, messenger, Arc::new(NoTerminal))?;
//! let _report = monitor.tick().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use checkpoint::CheckpointStore;
pub use config::Config;
pub use deliver::{render_interaction, split_message, Delivery, DeliveryPipeline, Messenger};
pub use error::{Error, Result};
pub use monitor::{AgentTerminal, Monitor, NoTerminal};
pub use notify::WebhookMessenger;
pub use types::*;

// Public modules
pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod dedup;
pub mod deliver;
pub mod error;
pub mod fileset;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod plan;
pub mod reader;
pub mod session;
pub mod types;
