//! Session event pipeline
//!
//! Wires the pieces together for a set of bound sessions:
//!
//! ```text
//! MonitorPool ──events──▶ render ──tasks──▶ MessageQueue ──▶ ChatAdapter
//! StatusPoller ──prompts/status/exit──────────────┘
//! ```
//!
//! Each session is bound to one chat conversation and one multiplexer
//! window. Bindings live in memory only.
//!
//! ## Shutdown
//!
//! [`Pipeline::shutdown`] stops both poll loops first so no new tasks are
//! produced, then gives the queue workers the configured timeout to drain
//! before aborting them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::monitor::MonitorPool;
use crate::outbound::{ChatAdapter, MessageQueue};
use crate::status::{Multiplexer, StatusHandle, StatusPoller};
use crate::transcript::task_for_event;
use crate::types::{ConversationKey, OutboundTask, ParsedEvent};

/// One session's chat conversation and multiplexer window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    pub session_id: String,
    pub window: String,
    pub key: ConversationKey,
    /// Transcript path; resolved from the session id when absent
    pub transcript: Option<PathBuf>,
}

type Bindings = Arc<RwLock<HashMap<String, SessionBinding>>>;

/// Running pipeline: both poll loops plus the outbound queue.
pub struct Pipeline {
    monitor: Arc<MonitorPool>,
    queue: MessageQueue,
    status: StatusHandle,
    bindings: Bindings,
    shutdown_tx: watch::Sender<bool>,
    loops: Vec<JoinHandle<()>>,
    shutdown_timeout: std::time::Duration,
}

impl Pipeline {
    /// Build every component from `config` and start the poll loops.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &Config,
        chat: Arc<dyn ChatAdapter>,
        mux: Arc<dyn Multiplexer>,
    ) -> Self {
        let monitor = Arc::new(MonitorPool::new(&config.monitor));
        let queue = MessageQueue::new(Arc::clone(&chat), &config.queue);
        let (poller, status) = StatusPoller::new(config, mux, chat, queue.clone());
        let bindings: Bindings = Arc::new(RwLock::new(HashMap::new()));

        monitor.subscribe(route_events(Arc::clone(&bindings), queue.clone()));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loops = vec![
            tokio::spawn(Arc::clone(&monitor).run(shutdown_rx.clone())),
            tokio::spawn(poller.run(shutdown_rx)),
        ];

        tracing::info!("Pipeline started");
        Self {
            monitor,
            queue,
            status,
            bindings,
            shutdown_tx,
            loops,
            shutdown_timeout: config.queue.shutdown_timeout(),
        }
    }

    /// Bind a session and start monitoring both its transcript and window.
    ///
    /// Returns the transcript path being tailed.
    pub fn attach(&self, binding: SessionBinding) -> PathBuf {
        let path = self
            .monitor
            .register_session(&binding.session_id, binding.transcript.clone());
        self.status.watch(&binding.window, binding.key);
        tracing::info!(
            session_id = %binding.session_id,
            window = %binding.window,
            key = %binding.key,
            "Session attached"
        );
        self.bindings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(binding.session_id.clone(), binding);
        path
    }

    /// Undo [`attach`](Self::attach).
    pub fn detach(&self, session_id: &str) -> Result<SessionBinding> {
        let binding = self
            .bindings
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        self.monitor.unregister_session(session_id);
        self.status.unwatch(&binding.window);
        tracing::info!(session_id, "Session detached");
        Ok(binding)
    }

    /// Monitor a transcript without binding it to a conversation.
    ///
    /// Its events still reach callbacks added with [`subscribe`](Self::subscribe).
    pub fn register_session(&self, session_id: &str, path: Option<PathBuf>) -> PathBuf {
        self.monitor.register_session(session_id, path)
    }

    pub fn unregister_session(&self, session_id: &str) -> bool {
        self.monitor.unregister_session(session_id)
    }

    pub fn subscribe(&self, callback: impl Fn(&str, &[ParsedEvent]) + Send + Sync + 'static) {
        self.monitor.subscribe(callback);
    }

    pub fn enqueue(&self, task: OutboundTask) -> bool {
        self.queue.enqueue(task)
    }

    /// The user answered the prompt in `window` from chat.
    pub fn prompt_answered(&self, window: &str) {
        self.status.prompt_answered(window);
    }

    pub fn binding(&self, session_id: &str) -> Option<SessionBinding> {
        self.bindings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
            .cloned()
    }

    pub fn monitor(&self) -> &Arc<MonitorPool> {
        &self.monitor
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Stop the poll loops, then drain the queue.
    ///
    /// Returns `true` when the queue drained within the timeout.
    pub async fn shutdown(self) -> bool {
        tracing::info!("Pipeline shutting down");
        // Receivers may already be gone if a loop ended on its own
        let _ = self.shutdown_tx.send(true);
        for handle in self.loops {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Poll loop ended abnormally");
            }
        }
        self.queue.shutdown(self.shutdown_timeout).await
    }
}

/// Subscriber that turns a bound session's events into queue tasks.
fn route_events(
    bindings: Bindings,
    queue: MessageQueue,
) -> impl Fn(&str, &[ParsedEvent]) + Send + Sync + 'static {
    move |session_id: &str, events: &[ParsedEvent]| {
        let key = match bindings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(session_id)
        {
            Some(binding) => binding.key,
            None => {
                tracing::debug!(session_id, count = events.len(), "Events for unbound session");
                return;
            }
        };

        for task in events.iter().filter_map(|e| task_for_event(key, e)) {
            queue.enqueue(task);
        }
    }
}
