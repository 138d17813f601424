//! In-memory fakes for the chat and multiplexer boundaries, shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::outbound::{Affordance, ChatAdapter, DeliveryError};
use crate::status::Multiplexer;
use crate::types::{ConversationKey, MessageRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    Send {
        key: ConversationKey,
        id: i64,
        text: String,
    },
    Edit {
        key: ConversationKey,
        id: i64,
        text: String,
    },
    Delete {
        key: ConversationKey,
        id: i64,
    },
    Interactive {
        key: ConversationKey,
        id: i64,
        text: String,
        affordance: Affordance,
    },
}

/// Chat backend that records every successful call.
#[derive(Default)]
pub struct RecordingChat {
    calls: Mutex<Vec<ChatCall>>,
    next_id: AtomicI64,
    send_failures: Mutex<VecDeque<DeliveryError>>,
    edit_failure: Mutex<Option<DeliveryError>>,
    throttled: Mutex<HashMap<ConversationKey, u64>>,
    failed: AtomicUsize,
}

impl RecordingChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Texts of plain and interactive sends, in order.
    pub fn sends(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Send { text, .. } | ChatCall::Interactive { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ChatCall::Edit { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ChatCall::Delete { .. }))
            .count()
    }

    /// Make the next send fail with `error`; queued failures are used in order.
    pub fn fail_next_send(&self, error: DeliveryError) {
        self.send_failures.lock().unwrap().push_back(error);
    }

    /// Make every edit fail with `error`.
    pub fn fail_edits(&self, error: DeliveryError) {
        *self.edit_failure.lock().unwrap() = Some(error);
    }

    /// Make every send to `key` answer with a `secs` rate limit.
    pub fn throttle(&self, key: ConversationKey, secs: u64) {
        self.throttled.lock().unwrap().insert(key, secs);
    }

    pub fn failed_attempts(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn take_send_failure(&self, key: &ConversationKey) -> Option<DeliveryError> {
        let failure = match self.throttled.lock().unwrap().get(key) {
            Some(&secs) => Some(DeliveryError::RetryAfter(secs)),
            None => self.send_failures.lock().unwrap().pop_front(),
        };
        if failure.is_some() {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        failure
    }
}

#[async_trait]
impl ChatAdapter for RecordingChat {
    async fn send(&self, key: &ConversationKey, text: &str) -> std::result::Result<MessageRef, DeliveryError> {
        if let Some(e) = self.take_send_failure(key) {
            return Err(e);
        }
        let id = self.next_id();
        self.calls.lock().unwrap().push(ChatCall::Send {
            key: *key,
            id,
            text: text.to_string(),
        });
        Ok(MessageRef(id))
    }

    async fn edit(
        &self,
        key: &ConversationKey,
        message: MessageRef,
        text: &str,
    ) -> std::result::Result<(), DeliveryError> {
        if let Some(e) = self.edit_failure.lock().unwrap().clone() {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(e);
        }
        self.calls.lock().unwrap().push(ChatCall::Edit {
            key: *key,
            id: message.0,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete(
        &self,
        key: &ConversationKey,
        message: MessageRef,
    ) -> std::result::Result<(), DeliveryError> {
        self.calls.lock().unwrap().push(ChatCall::Delete {
            key: *key,
            id: message.0,
        });
        Ok(())
    }

    async fn send_interactive(
        &self,
        key: &ConversationKey,
        text: &str,
        affordance: &Affordance,
    ) -> std::result::Result<MessageRef, DeliveryError> {
        if let Some(e) = self.take_send_failure(key) {
            return Err(e);
        }
        let id = self.next_id();
        self.calls.lock().unwrap().push(ChatCall::Interactive {
            key: *key,
            id,
            text: text.to_string(),
            affordance: affordance.clone(),
        });
        Ok(MessageRef(id))
    }
}

/// Multiplexer whose panes are set by the test.
#[derive(Default)]
pub struct FakeMultiplexer {
    panes: Mutex<HashMap<String, (String, Option<String>)>>,
}

impl FakeMultiplexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_pane(&self, window: &str, text: &str, process: Option<&str>) {
        self.panes.lock().unwrap().insert(
            window.to_string(),
            (text.to_string(), process.map(str::to_string)),
        );
    }

    pub fn remove_pane(&self, window: &str) {
        self.panes.lock().unwrap().remove(window);
    }
}

#[async_trait]
impl Multiplexer for FakeMultiplexer {
    async fn capture_pane_text(&self, window: &str) -> Result<String> {
        self.panes
            .lock()
            .unwrap()
            .get(window)
            .map(|(text, _)| text.clone())
            .ok_or_else(|| Error::Multiplexer(format!("window not found: {}", window)))
    }

    async fn foreground_process_name(&self, window: &str) -> Result<Option<String>> {
        self.panes
            .lock()
            .unwrap()
            .get(window)
            .map(|(_, process)| process.clone())
            .ok_or_else(|| Error::Multiplexer(format!("window not found: {}", window)))
    }
}
