//! Boundary to the chat backend.
//!
//! The queue worker only ever talks to a [`ChatAdapter`]. Implementations must
//! be callable from background tasks and must report backend rate limiting as
//! [`DeliveryError::RetryAfter`] so the worker can honour the hint.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ConversationKey, MessageRef, PromptKind};

/// Failure of a single send/edit/delete call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Backend asked us to wait before trying again
    #[error("rate limited, retry after {0}s")]
    RetryAfter(u64),

    /// Target message no longer exists (deleted, too old to edit)
    #[error("message no longer exists")]
    MessageGone,

    /// Any other failure (network, backend error)
    #[error("{0}")]
    Failed(String),
}

impl DeliveryError {
    /// The backend's wait hint, if this is a rate-limit failure.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DeliveryError::RetryAfter(secs) => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryError::MessageGone)
    }
}

/// Extra controls an adapter may attach to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Affordance {
    /// An interactive prompt; `options` are the choices found on screen
    Prompt {
        kind: PromptKind,
        options: Vec<(usize, String)>,
    },
    /// The assistant exited and can be started again
    Restart,
}

/// Send/edit/delete primitives of a chat backend.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    async fn send(&self, key: &ConversationKey, text: &str) -> Result<MessageRef, DeliveryError>;

    async fn edit(
        &self,
        key: &ConversationKey,
        message: MessageRef,
        text: &str,
    ) -> Result<(), DeliveryError>;

    async fn delete(&self, key: &ConversationKey, message: MessageRef)
        -> Result<(), DeliveryError>;

    /// Send a message carrying interactive controls.
    ///
    /// Backends without buttons can rely on the default, which sends plain text.
    async fn send_interactive(
        &self,
        key: &ConversationKey,
        text: &str,
        affordance: &Affordance,
    ) -> Result<MessageRef, DeliveryError> {
        let _ = affordance;
        self.send(key, text).await
    }
}
