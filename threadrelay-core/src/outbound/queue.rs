//! Per-conversation outbound message queue.
//!
//! Every [`ConversationKey`] gets at most one worker task. The worker is
//! spawned lazily by [`MessageQueue::enqueue`], runs until its backlog is
//! empty, then exits; the next enqueue spawns a fresh one.
//!
//! Each worker iteration:
//! 1. sleeps for the merge delay so bursts of text can coalesce
//! 2. takes one batch off the backlog (see [`take_batch`])
//! 3. turns it into send/edit/delete calls on the [`ChatAdapter`]
//!
//! Delivery failures are retried via [`deliver_with_retry`] and otherwise
//! logged; a failed task never stops the worker.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::types::{ConversationKey, MessageRef, OutboundTask, TaskKind};

use super::adapter::ChatAdapter;
use super::retry::{deliver_with_retry, RetryPolicy};
use super::split::split_message;

/// Queue tuning, derived from [`QueueConfig`].
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub merge_delay: Duration,
    pub merge_max_length: usize,
    pub max_message_length: usize,
    pub retry: RetryPolicy,
}

impl QueueSettings {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            merge_delay: config.merge_delay(),
            merge_max_length: config.merge_max_length,
            max_message_length: config.max_message_length,
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// A sent tool invocation waiting for its result.
#[derive(Debug, Clone)]
struct ToolMessage {
    message: MessageRef,
    text: String,
}

#[derive(Default)]
struct QueueState {
    backlogs: HashMap<ConversationKey, VecDeque<OutboundTask>>,
    workers: HashMap<ConversationKey, JoinHandle<()>>,
    closed: bool,
}

struct QueueInner {
    chat: Arc<dyn ChatAdapter>,
    settings: QueueSettings,
    state: Mutex<QueueState>,
    /// tool_id -> invocation message
    tool_messages: Mutex<HashMap<String, ToolMessage>>,
    /// At most one status message per conversation
    status_messages: Mutex<HashMap<ConversationKey, MessageRef>>,
    /// Signalled whenever the last worker exits
    idle: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle to the outbound queue. Cheap to clone; clones share workers and state.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Arc<QueueInner>,
}

impl MessageQueue {
    pub fn new(chat: Arc<dyn ChatAdapter>, config: &QueueConfig) -> Self {
        Self::with_settings(chat, QueueSettings::from_config(config))
    }

    pub fn with_settings(chat: Arc<dyn ChatAdapter>, settings: QueueSettings) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                chat,
                settings,
                state: Mutex::new(QueueState::default()),
                tool_messages: Mutex::new(HashMap::new()),
                status_messages: Mutex::new(HashMap::new()),
                idle: Notify::new(),
            }),
        }
    }

    /// Append a task to its conversation's backlog, spawning a worker if none runs.
    ///
    /// Must be called from within a tokio runtime. Returns `false` once the
    /// queue has been shut down.
    pub fn enqueue(&self, task: OutboundTask) -> bool {
        let key = task.key;
        let mut state = lock(&self.inner.state);
        if state.closed {
            tracing::debug!(key = %key, kind = task.kind.as_str(), "Queue closed, dropping task");
            return false;
        }

        state.backlogs.entry(key).or_default().push_back(task);
        if !state.workers.contains_key(&key) {
            let handle = tokio::spawn(run_worker(Arc::clone(&self.inner), key));
            state.workers.insert(key, handle);
        }
        true
    }

    /// Number of tasks waiting for `key`.
    pub fn pending(&self, key: &ConversationKey) -> usize {
        lock(&self.inner.state)
            .backlogs
            .get(key)
            .map_or(0, VecDeque::len)
    }

    /// Number of live workers.
    pub fn active_workers(&self) -> usize {
        lock(&self.inner.state).workers.len()
    }

    /// Forget one tool pairing, or all of them.
    pub fn clear_tool_messages(&self, tool_id: Option<&str>) {
        let mut tools = lock(&self.inner.tool_messages);
        match tool_id {
            Some(id) => {
                tools.remove(id);
            }
            None => tools.clear(),
        }
    }

    /// Forget the status message of `key` without deleting it.
    pub fn clear_status_message(&self, key: &ConversationKey) {
        lock(&self.inner.status_messages).remove(key);
    }

    /// Wait until every worker has emptied its backlog and exited.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if lock(&self.inner.state).workers.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Refuse new tasks, let workers drain within `timeout`, then abort the rest.
    ///
    /// Returns `true` when everything drained in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        lock(&self.inner.state).closed = true;

        if tokio::time::timeout(timeout, self.drain()).await.is_ok() {
            tracing::info!("Outbound queue drained");
            return true;
        }

        let mut state = lock(&self.inner.state);
        let abandoned: usize = state.backlogs.values().map(VecDeque::len).sum();
        for (key, handle) in state.workers.drain() {
            tracing::warn!(key = %key, "Aborting outbound worker on shutdown");
            handle.abort();
        }
        state.backlogs.clear();
        tracing::warn!(abandoned, "Outbound queue shutdown timed out");
        false
    }
}

/// Take the next unit of work off a backlog.
///
/// A `Content` head absorbs the `Content` tasks behind it, joined by newlines,
/// until the next one would push the text past `max_merge` characters or a
/// task of another kind is reached. Any other kind is taken alone.
pub fn take_batch(backlog: &mut VecDeque<OutboundTask>, max_merge: usize) -> Option<OutboundTask> {
    let mut head = backlog.pop_front()?;
    if !head.is_mergeable() {
        return Some(head);
    }

    let mut merged_len = head.text.chars().count();
    while let Some(next) = backlog.front() {
        if !next.is_mergeable() {
            break;
        }
        let next_len = next.text.chars().count();
        if merged_len + 1 + next_len > max_merge && !head.text.is_empty() {
            break;
        }
        if let Some(next) = backlog.pop_front() {
            head.text.push('\n');
            head.text.push_str(&next.text);
            merged_len += 1 + next_len;
        }
    }
    Some(head)
}

async fn run_worker(inner: Arc<QueueInner>, key: ConversationKey) {
    tracing::debug!(key = %key, "Outbound worker started");
    loop {
        tokio::time::sleep(inner.settings.merge_delay).await;

        let task = {
            let mut state = lock(&inner.state);
            let next = state
                .backlogs
                .get_mut(&key)
                .and_then(|backlog| take_batch(backlog, inner.settings.merge_max_length));
            match next {
                Some(task) => task,
                None => {
                    state.backlogs.remove(&key);
                    state.workers.remove(&key);
                    if state.workers.is_empty() {
                        inner.idle.notify_waiters();
                    }
                    tracing::debug!(key = %key, "Outbound worker idle, exiting");
                    return;
                }
            }
        };

        inner.process(task).await;
    }
}

impl QueueInner {
    async fn process(&self, task: OutboundTask) {
        let key = task.key;
        match task.kind {
            TaskKind::Content => self.process_content(&key, &task.text).await,
            TaskKind::ToolInvocation { tool_id } => {
                self.process_tool_invocation(&key, task.text, tool_id).await
            }
            TaskKind::ToolResult { tool_id, is_error } => {
                self.process_tool_result(&key, &task.text, &tool_id, is_error)
                    .await
            }
            TaskKind::Status => self.process_status(&key, &task.text).await,
            TaskKind::StatusClear => self.process_status_clear(&key).await,
        }
    }

    async fn send(&self, key: &ConversationKey, text: &str) -> Option<MessageRef> {
        let result = deliver_with_retry(&self.settings.retry, "send", || {
            self.chat.send(key, text)
        })
        .await;
        match result {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to send message");
                None
            }
        }
    }

    async fn process_content(&self, key: &ConversationKey, text: &str) {
        for chunk in split_message(text, self.settings.max_message_length) {
            if let Some(message) = self.send(key, &chunk).await {
                tracing::info!(
                    key = %key,
                    message = %message,
                    chars = chunk.chars().count(),
                    "Sent content"
                );
            }
        }
    }

    async fn process_tool_invocation(&self, key: &ConversationKey, text: String, tool_id: String) {
        let Some(message) = self.send(key, &text).await else {
            return;
        };
        tracing::info!(key = %key, message = %message, tool_id = %tool_id, "Sent tool invocation");
        lock(&self.tool_messages).insert(tool_id, ToolMessage { message, text });
    }

    async fn process_tool_result(
        &self,
        key: &ConversationKey,
        text: &str,
        tool_id: &str,
        is_error: bool,
    ) {
        let pairing = lock(&self.tool_messages).remove(tool_id);
        let Some(tool) = pairing else {
            tracing::debug!(key = %key, tool_id, "No invocation message for tool result, skipping");
            return;
        };

        let edited = if is_error {
            if text.is_empty() {
                format!("{} ❌", tool.text)
            } else {
                format!("{} ❌\n{}", tool.text, text)
            }
        } else {
            format!("{} ✅", tool.text)
        };

        let result = deliver_with_retry(&self.settings.retry, "edit", || {
            self.chat.edit(key, tool.message, &edited)
        })
        .await;
        match result {
            Ok(()) => {
                tracing::info!(key = %key, message = %tool.message, tool_id, "Edited tool result");
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    message = %tool.message,
                    error = %e,
                    "Failed to edit tool message, sending new"
                );
                self.send(key, &edited).await;
            }
        }
    }

    async fn process_status(&self, key: &ConversationKey, text: &str) {
        let existing = lock(&self.status_messages).get(key).copied();

        if let Some(message) = existing {
            let result = deliver_with_retry(&self.settings.retry, "edit", || {
                self.chat.edit(key, message, text)
            })
            .await;
            match result {
                Ok(()) => return,
                Err(e) => {
                    // Message deleted or too old to edit
                    tracing::debug!(key = %key, message = %message, error = %e, "Status edit failed");
                    lock(&self.status_messages).remove(key);
                }
            }
        }

        if let Some(message) = self.send(key, text).await {
            lock(&self.status_messages).insert(*key, message);
        }
    }

    async fn process_status_clear(&self, key: &ConversationKey) {
        let existing = lock(&self.status_messages).remove(key);
        let Some(message) = existing else {
            return;
        };
        if let Err(e) = self.chat.delete(key, message).await {
            tracing::debug!(key = %key, message = %message, error = %e, "Failed to delete status message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::DeliveryError;
    use crate::test_support::{ChatCall, RecordingChat};

    fn key() -> ConversationKey {
        ConversationKey::new(100, Some(7))
    }

    fn queue(chat: &Arc<RecordingChat>) -> MessageQueue {
        MessageQueue::new(chat.clone(), &QueueConfig::default())
    }

    #[test]
    fn test_take_batch_merges_content() {
        let mut backlog: VecDeque<_> = vec![
            OutboundTask::content(key(), "a"),
            OutboundTask::content(key(), "b"),
            OutboundTask::tool_invocation(key(), "tool", "t1"),
            OutboundTask::content(key(), "c"),
        ]
        .into();

        let first = take_batch(&mut backlog, 100).unwrap();
        assert_eq!(first.text, "a\nb");
        let second = take_batch(&mut backlog, 100).unwrap();
        assert_eq!(second.kind, TaskKind::ToolInvocation { tool_id: "t1".into() });
        let third = take_batch(&mut backlog, 100).unwrap();
        assert_eq!(third.text, "c");
        assert!(take_batch(&mut backlog, 100).is_none());
    }

    #[test]
    fn test_take_batch_respects_max_merge() {
        let mut backlog: VecDeque<_> = vec![
            OutboundTask::content(key(), "aaaa"),
            OutboundTask::content(key(), "bbbb"),
            OutboundTask::content(key(), "cccc"),
        ]
        .into();

        // "aaaa\nbbbb" is 9 chars, adding "\ncccc" would be 14
        let first = take_batch(&mut backlog, 10).unwrap();
        assert_eq!(first.text, "aaaa\nbbbb");
        assert_eq!(backlog.len(), 1);
    }

    #[test]
    fn test_take_batch_oversized_head_is_taken_alone() {
        let mut backlog: VecDeque<_> = vec![
            OutboundTask::content(key(), "x".repeat(50)),
            OutboundTask::content(key(), "y"),
        ]
        .into();
        let first = take_batch(&mut backlog, 10).unwrap();
        assert_eq!(first.text.len(), 50);
        assert_eq!(backlog.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_within_debounce_is_merged() {
        let chat = RecordingChat::new();
        let q = queue(&chat);

        q.enqueue(OutboundTask::content(key(), "first"));
        q.enqueue(OutboundTask::content(key(), "second"));
        q.drain().await;

        assert_eq!(chat.sends(), vec!["first\nsecond"]);
        assert_eq!(q.active_workers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_never_crosses_tool_invocation() {
        let chat = RecordingChat::new();
        let q = queue(&chat);

        q.enqueue(OutboundTask::content(key(), "before"));
        q.enqueue(OutboundTask::tool_invocation(key(), "🔧 **Bash**(ls)", "t1"));
        q.enqueue(OutboundTask::content(key(), "after"));
        q.drain().await;

        assert_eq!(chat.sends(), vec!["before", "🔧 **Bash**(ls)", "after"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_result_edits_invocation() {
        let chat = RecordingChat::new();
        let q = queue(&chat);

        q.enqueue(OutboundTask::tool_invocation(key(), "🔧 **Bash**(ls)", "t1"));
        q.enqueue(OutboundTask::tool_result(key(), "", "t1", false));
        q.drain().await;

        let calls = chat.calls();
        assert_eq!(calls.len(), 2);
        let ChatCall::Send { id, .. } = &calls[0] else {
            panic!("expected send, got {:?}", calls[0]);
        };
        assert_eq!(
            calls[1],
            ChatCall::Edit {
                key: key(),
                id: *id,
                text: "🔧 **Bash**(ls) ✅".to_string(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tool_result_appends_error() {
        let chat = RecordingChat::new();
        let q = queue(&chat);

        q.enqueue(OutboundTask::tool_invocation(key(), "🔧 **Bash**(false)", "t1"));
        q.enqueue(OutboundTask::tool_result(key(), "exit code 1", "t1", true));
        q.drain().await;

        assert_eq!(chat.edits(), vec!["🔧 **Bash**(false) ❌\nexit code 1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpaired_tool_result_is_dropped() {
        let chat = RecordingChat::new();
        let q = queue(&chat);

        q.enqueue(OutboundTask::tool_result(key(), "boom", "never-sent", true));
        q.drain().await;

        assert!(chat.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_result_pairing_is_consumed_once() {
        let chat = RecordingChat::new();
        let q = queue(&chat);

        q.enqueue(OutboundTask::tool_invocation(key(), "🔧 **Read**(a.rs)", "t1"));
        q.enqueue(OutboundTask::tool_result(key(), "", "t1", false));
        q.enqueue(OutboundTask::tool_result(key(), "", "t1", false));
        q.drain().await;

        assert_eq!(chat.sends().len(), 1);
        assert_eq!(chat.edits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_edit_falls_back_to_send() {
        let chat = RecordingChat::new();
        chat.fail_edits(DeliveryError::MessageGone);
        let q = queue(&chat);

        q.enqueue(OutboundTask::tool_invocation(key(), "🔧 **Bash**(ls)", "t1"));
        q.enqueue(OutboundTask::tool_result(key(), "", "t1", false));
        q.drain().await;

        assert_eq!(chat.sends(), vec!["🔧 **Bash**(ls)", "🔧 **Bash**(ls) ✅"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_lifecycle() {
        let chat = RecordingChat::new();
        let q = queue(&chat);

        q.enqueue(OutboundTask::status(key(), "working"));
        q.enqueue(OutboundTask::status(key(), "still working"));
        q.enqueue(OutboundTask::status_clear(key()));
        q.drain().await;

        let calls = chat.calls();
        assert_eq!(calls.len(), 3);
        let ChatCall::Send { id, .. } = &calls[0] else {
            panic!("expected send, got {:?}", calls[0]);
        };
        assert!(matches!(&calls[1], ChatCall::Edit { id: e, .. } if e == id));
        assert_eq!(calls[2], ChatCall::Delete { key: key(), id: *id });

        // A cleared status starts over with a fresh send
        q.enqueue(OutboundTask::status(key(), "again"));
        q.drain().await;
        assert_eq!(chat.sends().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_clear_without_status_is_noop() {
        let chat = RecordingChat::new();
        let q = queue(&chat);
        q.enqueue(OutboundTask::status_clear(key()));
        q.drain().await;
        assert!(chat.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_content_is_split() {
        let chat = RecordingChat::new();
        let config = QueueConfig {
            max_message_length: 10,
            merge_max_length: 10,
            ..Default::default()
        };
        let q = MessageQueue::new(chat.clone(), &config);

        q.enqueue(OutboundTask::content(key(), "aaaaaaa bbbbbbb"));
        q.drain().await;

        assert_eq!(chat.sends(), vec!["aaaaaaa", " bbbbbbb"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_retries_after_rate_limit() {
        let chat = RecordingChat::new();
        chat.fail_next_send(DeliveryError::RetryAfter(2));
        let q = queue(&chat);

        q.enqueue(OutboundTask::content(key(), "hello"));
        q.drain().await;

        assert_eq!(chat.sends(), vec!["hello"]);
        assert_eq!(chat.failed_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_survives_failed_task() {
        let chat = RecordingChat::new();
        for _ in 0..3 {
            chat.fail_next_send(DeliveryError::Failed("down".into()));
        }
        let q = queue(&chat);

        q.enqueue(OutboundTask::tool_invocation(key(), "lost", "t1"));
        q.enqueue(OutboundTask::content(key(), "delivered"));
        q.drain().await;

        assert_eq!(chat.sends(), vec!["delivered"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_have_independent_workers() {
        let chat = RecordingChat::new();
        let q = queue(&chat);
        let other = ConversationKey::new(200, None);

        q.enqueue(OutboundTask::content(key(), "one"));
        q.enqueue(OutboundTask::content(other, "two"));
        assert_eq!(q.active_workers(), 2);
        q.drain().await;

        let mut sends = chat.sends();
        sends.sort();
        assert_eq!(sends, vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_respawns_after_idle() {
        let chat = RecordingChat::new();
        let q = queue(&chat);

        q.enqueue(OutboundTask::content(key(), "one"));
        q.drain().await;
        assert_eq!(q.active_workers(), 0);

        q.enqueue(OutboundTask::content(key(), "two"));
        q.drain().await;
        assert_eq!(chat.sends(), vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_new_tasks() {
        let chat = RecordingChat::new();
        let q = queue(&chat);

        q.enqueue(OutboundTask::content(key(), "queued"));
        assert!(q.shutdown(Duration::from_secs(10)).await);
        assert!(!q.enqueue(OutboundTask::content(key(), "late")));
        assert_eq!(chat.sends(), vec!["queued"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_timeout_aborts_workers() {
        let chat = RecordingChat::new();
        for _ in 0..3 {
            chat.fail_next_send(DeliveryError::RetryAfter(60));
        }
        let q = queue(&chat);

        q.enqueue(OutboundTask::content(key(), "stuck"));
        assert!(!q.shutdown(Duration::from_secs(5)).await);
        assert_eq!(q.active_workers(), 0);
        assert_eq!(q.pending(&key()), 0);
    }

    #[test]
    fn test_clear_helpers() {
        let chat = RecordingChat::new();
        let q = queue(&chat);
        lock(&q.inner.tool_messages).insert(
            "t1".into(),
            ToolMessage {
                message: MessageRef(1),
                text: "x".into(),
            },
        );
        lock(&q.inner.status_messages).insert(key(), MessageRef(2));

        q.clear_tool_messages(Some("t1"));
        q.clear_status_message(&key());
        assert!(lock(&q.inner.tool_messages).is_empty());
        assert!(lock(&q.inner.status_messages).is_empty());
    }
}
