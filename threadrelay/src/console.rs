//! Chat backend that prints every operation as one JSON line on stdout.
//!
//! Useful for dry runs: pipe the output into `jq` to see exactly what a real
//! chat backend would have been asked to do.

use std::io::Write;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use threadrelay_core::{Affordance, ChatAdapter, ConversationKey, DeliveryError, MessageRef};

#[derive(Serialize)]
struct ChatLine<'a> {
    op: &'static str,
    ts: chrono::DateTime<chrono::Utc>,
    chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<i64>,
    message_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    buttons: Vec<String>,
}

/// Console "chat": message ids count up from 1.
pub struct ConsoleChat {
    next_id: AtomicI64,
    // Serializes writers so lines from different workers never interleave
    out: Mutex<()>,
}

impl ConsoleChat {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            out: Mutex::new(()),
        }
    }

    fn emit(&self, line: ChatLine<'_>) -> Result<(), DeliveryError> {
        let json = serde_json::to_string(&line).map_err(|e| DeliveryError::Failed(e.to_string()))?;
        let _guard = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", json)
            .and_then(|_| stdout.flush())
            .map_err(|e| DeliveryError::Failed(e.to_string()))
    }

    fn line<'a>(
        op: &'static str,
        key: &ConversationKey,
        message: MessageRef,
        text: Option<&'a str>,
    ) -> ChatLine<'a> {
        ChatLine {
            op,
            ts: chrono::Utc::now(),
            chat_id: key.chat_id,
            thread_id: key.thread_id,
            message_id: message.0,
            text,
            buttons: Vec::new(),
        }
    }

    fn allocate(&self) -> MessageRef {
        MessageRef(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

fn button_labels(affordance: &Affordance) -> Vec<String> {
    match affordance {
        Affordance::Prompt { options, .. } => options
            .iter()
            .map(|(index, label)| format!("{}. {}", index + 1, label))
            .collect(),
        Affordance::Restart => vec!["Restart".to_string()],
    }
}

#[async_trait]
impl ChatAdapter for ConsoleChat {
    async fn send(&self, key: &ConversationKey, text: &str) -> Result<MessageRef, DeliveryError> {
        let message = self.allocate();
        self.emit(Self::line("send", key, message, Some(text)))?;
        Ok(message)
    }

    async fn edit(
        &self,
        key: &ConversationKey,
        message: MessageRef,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.emit(Self::line("edit", key, message, Some(text)))
    }

    async fn delete(&self, key: &ConversationKey, message: MessageRef) -> Result<(), DeliveryError> {
        self.emit(Self::line("delete", key, message, None))
    }

    async fn send_interactive(
        &self,
        key: &ConversationKey,
        text: &str,
        affordance: &Affordance,
    ) -> Result<MessageRef, DeliveryError> {
        let message = self.allocate();
        let mut line = Self::line("send", key, message, Some(text));
        line.buttons = button_labels(affordance);
        self.emit(line)?;
        Ok(message)
    }
}
