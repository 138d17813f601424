//! Terminal status-poll loop.
//!
//! Every tick the loop looks at each watched multiplexer window:
//!
//! 1. the pane's foreground process tells whether the assistant exited
//! 2. the pane text is classified into a [`UiState`]
//! 3. the state becomes chat output: a prompt notification, a busy status
//!    message, or clearing that status again
//!
//! Prompt and exit notices are sent on their own tasks; their outcome is
//! folded back in at the start of a later tick. The loop exclusively owns the
//! [`InteractiveTracker`]. Other components reach it through a
//! [`StatusHandle`], which queues commands the loop applies at the start of
//! its next tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::error::Result;
use crate::outbound::{deliver_with_retry, Affordance, ChatAdapter, MessageQueue, RetryPolicy};
use crate::terminal::{
    parse_question_options, render_exit, render_prompt, InteractiveTracker, StateClassifier,
};
use crate::types::{
    ConversationKey, MessageRef, OutboundTask, ProcessState, PromptKind, UiState,
};

/// Read side of the terminal multiplexer.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Visible text of the window's pane.
    async fn capture_pane_text(&self, window: &str) -> Result<String>;

    /// Name of the pane's foreground process, if the multiplexer reports one.
    async fn foreground_process_name(&self, window: &str) -> Result<Option<String>>;
}

/// Commands applied by the loop before its next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCommand {
    Watch { window: String, key: ConversationKey },
    Unwatch { window: String },
    /// The user answered the window's prompt from chat
    PromptAnswered { window: String },
}

/// Cloneable sender side of the status loop.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: mpsc::UnboundedSender<StatusCommand>,
}

impl StatusHandle {
    pub fn watch(&self, window: &str, key: ConversationKey) {
        self.send(StatusCommand::Watch {
            window: window.to_string(),
            key,
        });
    }

    pub fn unwatch(&self, window: &str) {
        self.send(StatusCommand::Unwatch {
            window: window.to_string(),
        });
    }

    pub fn prompt_answered(&self, window: &str) {
        self.send(StatusCommand::PromptAnswered {
            window: window.to_string(),
        });
    }

    fn send(&self, command: StatusCommand) {
        if self.tx.send(command).is_err() {
            tracing::debug!("Status loop gone, command dropped");
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    key: ConversationKey,
    /// A busy status message is showing in chat
    status_shown: bool,
    /// The exit notice went out and the assistant has not come back since
    exit_notified: bool,
    /// A prompt or exit notice for this window is still being delivered
    delivering: bool,
}

impl WindowState {
    fn new(key: ConversationKey) -> Self {
        Self {
            key,
            status_shown: false,
            exit_notified: false,
            delivering: false,
        }
    }
}

/// Outcome of a direct send, reported back to the loop.
#[derive(Debug)]
enum Delivered {
    Prompt {
        window: String,
        kind: PromptKind,
        content: String,
        message: MessageRef,
    },
    Exit {
        window: String,
    },
    Failed {
        window: String,
    },
}

impl Delivered {
    fn window(&self) -> &str {
        match self {
            Delivered::Prompt { window, .. }
            | Delivered::Exit { window }
            | Delivered::Failed { window } => window,
        }
    }
}

/// The status-poll loop and everything it owns.
pub struct StatusPoller {
    mux: Arc<dyn Multiplexer>,
    chat: Arc<dyn ChatAdapter>,
    queue: MessageQueue,
    classifier: StateClassifier,
    tracker: InteractiveTracker,
    retry: RetryPolicy,
    busy_text: String,
    poll_interval: Duration,
    windows: HashMap<String, WindowState>,
    commands: mpsc::UnboundedReceiver<StatusCommand>,
    /// Prompt and exit sends run here so a throttled conversation never holds up the tick
    deliveries: JoinSet<Delivered>,
}

impl StatusPoller {
    pub fn new(
        config: &Config,
        mux: Arc<dyn Multiplexer>,
        chat: Arc<dyn ChatAdapter>,
        queue: MessageQueue,
    ) -> (Self, StatusHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let poller = Self {
            mux,
            chat,
            queue,
            classifier: StateClassifier::new(&config.status),
            tracker: InteractiveTracker::new(),
            retry: RetryPolicy::from_config(&config.queue),
            busy_text: config.status.busy_text.clone(),
            poll_interval: config.status.poll_interval(),
            windows: HashMap::new(),
            commands: rx,
            deliveries: JoinSet::new(),
        };
        (poller, StatusHandle { tx })
    }

    pub fn watched_windows(&self) -> usize {
        self.windows.len()
    }

    fn apply(&mut self, command: StatusCommand) {
        match command {
            StatusCommand::Watch { window, key } => {
                tracing::debug!(window = %window, key = %key, "Watching window");
                self.windows.insert(window, WindowState::new(key));
            }
            StatusCommand::Unwatch { window } => {
                self.tracker.clear(&window);
                if let Some(state) = self.windows.remove(&window) {
                    if state.status_shown {
                        self.queue.enqueue(OutboundTask::status_clear(state.key));
                    }
                }
            }
            StatusCommand::PromptAnswered { window } => self.tracker.clear(&window),
        }
    }

    fn apply_pending_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
    }

    /// Fold finished sends back into window and tracker state.
    fn collect_deliveries(&mut self) {
        while let Some(joined) = self.deliveries.try_join_next() {
            let delivered = match joined {
                Ok(delivered) => delivered,
                Err(e) => {
                    tracing::warn!(error = %e, "Delivery task failed");
                    continue;
                }
            };
            // The window may have been unwatched while the send was in flight
            let Some(state) = self.windows.get_mut(delivered.window()) else {
                continue;
            };
            state.delivering = false;
            match delivered {
                Delivered::Prompt {
                    window,
                    kind,
                    content,
                    message,
                } => self.tracker.mark_sent(&window, kind, message, &content),
                Delivered::Exit { .. } => state.exit_notified = true,
                // Left unmarked so the next tick tries again
                Delivered::Failed { .. } => {}
            }
        }
    }

    /// One pass over every watched window.
    pub async fn tick(&mut self) {
        self.collect_deliveries();
        self.apply_pending_commands();
        let windows: Vec<String> = self.windows.keys().cloned().collect();
        for window in windows {
            self.poll_window(&window).await;
        }
    }

    async fn poll_window(&mut self, window: &str) {
        let Some(mut state) = self.windows.get(window).copied() else {
            return;
        };
        if let Some(ui_state) = self.observe(window, &mut state).await {
            self.act(window, &mut state, ui_state);
        }
        if let Some(slot) = self.windows.get_mut(window) {
            *slot = state;
        }
    }

    /// Current state of the window, with a shell in the foreground read as `Exited`.
    ///
    /// `None` when the multiplexer could not answer, which is expected while a
    /// window is closing.
    async fn observe(&self, window: &str, state: &mut WindowState) -> Option<UiState> {
        let process = match self.mux.foreground_process_name(window).await {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(window, error = %e, "Window unavailable, skipping tick");
                return None;
            }
        };

        match self.classifier.process_state(process.as_deref()) {
            ProcessState::Exited => return Some(UiState::Exited),
            ProcessState::Running => state.exit_notified = false,
            ProcessState::Inconclusive => {}
        }

        match self.mux.capture_pane_text(window).await {
            Ok(snapshot) => Some(self.classifier.classify(&snapshot)),
            Err(e) => {
                tracing::debug!(window, error = %e, "Pane capture failed, skipping tick");
                None
            }
        }
    }

    fn act(&mut self, window: &str, state: &mut WindowState, ui_state: UiState) {
        match ui_state {
            UiState::InteractivePrompt { kind, content } => {
                self.handle_prompt(window, state, kind, content);
            }
            UiState::Busy => {
                self.tracker.clear(window);
                if !state.status_shown {
                    self.queue
                        .enqueue(OutboundTask::status(state.key, self.busy_text.clone()));
                    state.status_shown = true;
                }
            }
            UiState::Idle => {
                // Whatever prompt was showing has been answered in the terminal
                self.tracker.clear(window);
                self.clear_status(state);
            }
            UiState::Exited => self.handle_exit(window, state),
            UiState::Unknown => {}
        }
    }

    fn clear_status(&self, state: &mut WindowState) {
        if state.status_shown {
            self.queue.enqueue(OutboundTask::status_clear(state.key));
            state.status_shown = false;
        }
    }

    fn handle_exit(&mut self, window: &str, state: &mut WindowState) {
        self.tracker.clear(window);
        self.clear_status(state);
        if state.exit_notified || state.delivering {
            return;
        }
        state.delivering = true;

        let chat = Arc::clone(&self.chat);
        let retry = self.retry;
        let key = state.key;
        let window = window.to_string();
        self.deliveries.spawn(async move {
            let text = render_exit(&window);
            let affordance = Affordance::Restart;
            let result = deliver_with_retry(&retry, "send_interactive", || {
                chat.send_interactive(&key, &text, &affordance)
            })
            .await;
            match result {
                Ok(_) => {
                    tracing::info!(window = %window, key = %key, "Assistant exited, notice sent");
                    Delivered::Exit { window }
                }
                Err(e) => {
                    tracing::warn!(window = %window, error = %e, "Failed to send exit notice");
                    Delivered::Failed { window }
                }
            }
        });
    }

    fn handle_prompt(
        &mut self,
        window: &str,
        state: &mut WindowState,
        kind: PromptKind,
        content: String,
    ) {
        if state.delivering || !self.tracker.should_send(window, kind, &content) {
            return;
        }
        self.clear_status(state);
        state.delivering = true;

        let chat = Arc::clone(&self.chat);
        let retry = self.retry;
        let key = state.key;
        let window = window.to_string();
        self.deliveries.spawn(async move {
            let options = match kind {
                PromptKind::Question => parse_question_options(&content),
                _ => Vec::new(),
            };
            let affordance = Affordance::Prompt { kind, options };
            let text = render_prompt(kind, &content);
            let result = deliver_with_retry(&retry, "send_interactive", || {
                chat.send_interactive(&key, &text, &affordance)
            })
            .await;
            match result {
                Ok(message) => {
                    tracing::info!(window = %window, key = %key, prompt = %kind, message = %message, "Sent prompt");
                    Delivered::Prompt {
                        window,
                        kind,
                        content,
                        message,
                    }
                }
                Err(e) => {
                    tracing::warn!(window = %window, prompt = %kind, error = %e, "Failed to send prompt");
                    Delivered::Failed { window }
                }
            }
        });
    }

    /// Tick until `shutdown` turns true or its sender goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.poll_interval, "Status poller started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        tracing::info!("Status poller stopped");
    }
}
