//! Suppresses re-sending a prompt that is still on screen.
//!
//! The status loop sees the same dialog on every tick until the user answers
//! it. Each window remembers the last prompt it sent (kind plus a fingerprint
//! of its text) and only a different prompt, or a changed one, goes out again.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::types::{MessageRef, PromptKind};

/// Characters of prompt text that go into the fingerprint.
const FINGERPRINT_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SentPrompt {
    kind: PromptKind,
    fingerprint: String,
    message: MessageRef,
}

/// Last prompt sent per window.
#[derive(Debug, Default)]
pub struct InteractiveTracker {
    sent: HashMap<String, SentPrompt>,
}

impl InteractiveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this prompt differs from what the window last sent.
    pub fn should_send(&self, window: &str, kind: PromptKind, content: &str) -> bool {
        match self.sent.get(window) {
            None => true,
            Some(sent) => sent.kind != kind || sent.fingerprint != fingerprint(content),
        }
    }

    pub fn mark_sent(&mut self, window: &str, kind: PromptKind, message: MessageRef, content: &str) {
        self.sent.insert(
            window.to_string(),
            SentPrompt {
                kind,
                fingerprint: fingerprint(content),
                message,
            },
        );
    }

    /// Forget the window's prompt so an identical one can be sent again.
    pub fn clear(&mut self, window: &str) {
        self.sent.remove(window);
    }

    /// Message carrying the window's live prompt.
    pub fn message_ref(&self, window: &str) -> Option<MessageRef> {
        self.sent.get(window).map(|s| s.message)
    }
}

/// Short hex digest of the first [`FINGERPRINT_CHARS`] characters.
pub fn fingerprint(content: &str) -> String {
    let prefix_end = content
        .char_indices()
        .nth(FINGERPRINT_CHARS)
        .map_or(content.len(), |(idx, _)| idx);

    let mut hasher = Sha256::new();
    hasher.update(content[..prefix_end].as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..6])
}
