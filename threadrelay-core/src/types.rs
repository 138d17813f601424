//! Core domain types for threadrelay
//!
//! These types are the values that flow between the pipeline stages:
//! transcript records become [`ParsedEvent`]s, events and terminal
//! snapshots become [`OutboundTask`]s, and tasks become chat actions.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One run of the assistant, identified by its transcript file name |
//! | **Window** | The multiplexer window the assistant process lives in |
//! | **Conversation** | A chat thread bound 1:1 to a session, addressed by [`ConversationKey`] |
//! | **Task** | One unit of outbound work for a conversation's queue worker |
//! | **Prompt** | An interactive dialog the assistant is blocked on (permission, question, ...) |

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

// ============================================
// Transcript events
// ============================================

/// One typed event extracted from a transcript record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedEvent {
    /// `uuid` of the record the event came from
    pub record_id: Option<String>,
    /// Record timestamp, when present and well-formed
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ParsedEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            record_id: None,
            timestamp: None,
            kind,
        }
    }

    pub fn tool_id(&self) -> Option<&str> {
        match &self.kind {
            EventKind::ToolInvocation { tool_id, .. } | EventKind::ToolResult { tool_id, .. } => {
                Some(tool_id)
            }
            _ => None,
        }
    }
}

/// What a [`ParsedEvent`] carries.
///
/// Thinking blocks are recognized by the extractor but never become events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Assistant prose
    Text { content: String },
    /// The assistant called a tool
    ToolInvocation {
        tool_name: String,
        tool_id: String,
        /// Most relevant input field, truncated for display
        input_summary: String,
    },
    /// Output of a tool call, matched to its invocation by `tool_id`
    ToolResult {
        tool_id: String,
        /// Truncated preview of the output
        content: String,
        is_error: bool,
    },
    /// System record (produced, never rendered)
    System { content: String },
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Text { .. } => "text",
            EventKind::ToolInvocation { .. } => "tool_invocation",
            EventKind::ToolResult { .. } => "tool_result",
            EventKind::System { .. } => "system",
        }
    }
}

// ============================================
// Conversations
// ============================================

/// Identity of one chat thread: chat plus optional thread within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConversationKey {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
}

impl ConversationKey {
    pub fn new(chat_id: i64, thread_id: Option<i64>) -> Self {
        Self { chat_id, thread_id }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.thread_id.unwrap_or(0))
    }
}

/// Reference to a message the chat backend accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MessageRef(pub i64);

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================
// Outbound tasks
// ============================================

/// One unit of outbound work.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundTask {
    pub key: ConversationKey,
    pub text: String,
    pub kind: TaskKind,
}

/// How the queue worker handles a task.
///
/// Only [`TaskKind::Content`] merges with its neighbours; every other kind
/// is delivered on its own and ends any merge window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Plain text, merged and split as needed
    Content,
    /// Sent as a new message whose ref is remembered under `tool_id`
    ToolInvocation { tool_id: String },
    /// Edits the paired invocation message in place
    ToolResult { tool_id: String, is_error: bool },
    /// Sent once, then edited in place
    Status,
    /// Deletes the status message
    StatusClear,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Content => "content",
            TaskKind::ToolInvocation { .. } => "tool_invocation",
            TaskKind::ToolResult { .. } => "tool_result",
            TaskKind::Status => "status",
            TaskKind::StatusClear => "status_clear",
        }
    }
}

impl OutboundTask {
    pub fn content(key: ConversationKey, text: impl Into<String>) -> Self {
        Self {
            key,
            text: text.into(),
            kind: TaskKind::Content,
        }
    }

    pub fn tool_invocation(
        key: ConversationKey,
        text: impl Into<String>,
        tool_id: impl Into<String>,
    ) -> Self {
        Self {
            key,
            text: text.into(),
            kind: TaskKind::ToolInvocation {
                tool_id: tool_id.into(),
            },
        }
    }

    pub fn tool_result(
        key: ConversationKey,
        text: impl Into<String>,
        tool_id: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            key,
            text: text.into(),
            kind: TaskKind::ToolResult {
                tool_id: tool_id.into(),
                is_error,
            },
        }
    }

    pub fn status(key: ConversationKey, text: impl Into<String>) -> Self {
        Self {
            key,
            text: text.into(),
            kind: TaskKind::Status,
        }
    }

    pub fn status_clear(key: ConversationKey) -> Self {
        Self {
            key,
            text: String::new(),
            kind: TaskKind::StatusClear,
        }
    }

    pub fn is_mergeable(&self) -> bool {
        matches!(self.kind, TaskKind::Content)
    }
}

// ============================================
// Terminal state
// ============================================

/// Known interactive prompt kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PromptKind {
    /// "Do you want to proceed?" style tool permission dialog
    PermissionRequest,
    /// Multi-choice question with checkbox options
    Question,
    /// Plan approval after plan mode
    PlanApproval,
    /// Checkpoint restore picker
    RestoreCheckpoint,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::PermissionRequest => "PermissionPrompt",
            PromptKind::Question => "AskUserQuestion",
            PromptKind::PlanApproval => "ExitPlanMode",
            PromptKind::RestoreCheckpoint => "RestoreCheckpoint",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioral state derived from one terminal snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiState {
    Busy,
    Idle,
    InteractivePrompt { kind: PromptKind, content: String },
    Exited,
    /// Nothing recognizable on screen
    Unknown,
}

/// Verdict on the pane's foreground process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited,
    /// Unrecognized name; never treated as an exit
    Inconclusive,
}
