//! # threadrelay-core
//!
//! Core library for threadrelay - relays a terminal coding assistant's
//! session into a chat thread.
//!
//! This library provides:
//! - Transcript tailing and event extraction
//! - Terminal snapshot classification and prompt dedup
//! - A per-conversation outbound queue with merging, tool-result editing,
//!   status messages, splitting and retry
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Two sources are polled independently:
//! - **Transcript:** the assistant's append-only JSONL log, tailed by byte
//!   offset ([`monitor`], [`transcript`])
//! - **Terminal:** the multiplexer pane, snapshotted and classified
//!   ([`status`], [`terminal`])
//!
//! Both feed the [`outbound`] queue, which turns tasks into send/edit/delete
//! calls on a [`ChatAdapter`]. [`Pipeline`] wires everything together.
//!
//! ## Example
//!
//! ```rust,no_run
//! use threadrelay_core::{classify, UiState};
//!
//! let state = classify("Do you want to proceed?\n❯ 1. Yes\nEsc to cancel");
//! assert!(matches!(state, UiState::InteractivePrompt { .. }));
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use monitor::MonitorPool;
pub use outbound::{Affordance, ChatAdapter, DeliveryError, MessageQueue};
pub use pipeline::{Pipeline, SessionBinding};
pub use status::{Multiplexer, StatusHandle, StatusPoller};
pub use terminal::classify;
pub use types::*;

// Public modules
pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod outbound;
pub mod pipeline;
pub mod status;
pub mod terminal;
pub mod transcript;
pub mod types;

#[cfg(test)]
mod test_support;
