//! Transcript monitor pool and poll loop.
//!
//! The pool owns one [`MonitoredTranscript`] per registered session and polls
//! them all on a fixed interval. New events are handed to every subscriber
//! as `(session_id, events)`, in transcript order.
//!
//! Files are polled instead of watched: the assistant truncates and rewrites
//! its transcripts, and a plain stat-and-read per tick handles that without
//! special cases. File I/O runs on the blocking pool so a slow disk never
//! delays the loop's own timer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::MonitorConfig;
use crate::transcript::MonitoredTranscript;
use crate::types::ParsedEvent;

/// Subscriber called with each session's new events.
pub type EventCallback = Arc<dyn Fn(&str, &[ParsedEvent]) + Send + Sync>;

type SharedTranscript = Arc<Mutex<MonitoredTranscript>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Registered sessions plus the subscribers their events go to.
pub struct MonitorPool {
    projects_dir: PathBuf,
    working_dir: Option<PathBuf>,
    skip_existing: bool,
    poll_interval: Duration,
    sessions: Mutex<HashMap<String, SharedTranscript>>,
    callbacks: RwLock<Vec<EventCallback>>,
}

impl MonitorPool {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            projects_dir: config.projects_dir(),
            working_dir: config.working_dir(),
            skip_existing: config.skip_existing,
            poll_interval: config.poll_interval(),
            sessions: Mutex::new(HashMap::new()),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Locate the transcript of `session_id`.
    ///
    /// An existing `{projects_dir}/*/{session_id}.jsonl` wins. Otherwise the
    /// path is derived from the working directory the way the assistant names
    /// its project directories, even though the file may not exist yet.
    pub fn resolve_transcript_path(&self, session_id: &str) -> PathBuf {
        let file_name = format!("{}.jsonl", session_id);
        let pattern = format!(
            "{}/*/{}",
            glob::Pattern::escape(&self.projects_dir.to_string_lossy()),
            glob::Pattern::escape(&file_name)
        );

        match glob::glob(&pattern) {
            Ok(paths) => {
                if let Some(found) = paths.filter_map(|p| p.ok()).find(|p| p.is_file()) {
                    return found;
                }
            }
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Invalid transcript glob");
            }
        }

        let working_dir = self
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        let derived = self
            .projects_dir
            .join(project_dir_name(&working_dir))
            .join(file_name);
        tracing::debug!(
            session_id,
            path = %derived.display(),
            "Transcript not found, using derived path"
        );
        derived
    }

    /// Start monitoring a session. Registering twice keeps the first path.
    ///
    /// With `skip_existing` the tailer starts at the current end of file so
    /// earlier history is not replayed.
    pub fn register_session(&self, session_id: &str, path: Option<PathBuf>) -> PathBuf {
        if let Some(existing) = lock(&self.sessions).get(session_id) {
            return lock(existing).path().to_path_buf();
        }

        let path = path.unwrap_or_else(|| self.resolve_transcript_path(session_id));
        let mut transcript = MonitoredTranscript::new(&path);
        if self.skip_existing {
            transcript.skip_to_end();
        }

        let mut sessions = lock(&self.sessions);
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(transcript)));
        let path = lock(entry).path().to_path_buf();
        tracing::info!(
            session_id,
            path = %path.display(),
            skip_existing = self.skip_existing,
            "Monitoring session"
        );
        path
    }

    /// Stop monitoring a session. Returns whether it was registered.
    pub fn unregister_session(&self, session_id: &str) -> bool {
        let removed = lock(&self.sessions).remove(session_id).is_some();
        if removed {
            tracing::info!(session_id, "Stopped monitoring session");
        }
        removed
    }

    pub fn session_ids(&self) -> Vec<String> {
        lock(&self.sessions).keys().cloned().collect()
    }

    pub fn subscribe(&self, callback: impl Fn(&str, &[ParsedEvent]) + Send + Sync + 'static) {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Poll every session once and dispatch what was found.
    ///
    /// Returns the number of events dispatched.
    pub async fn poll_once(&self) -> usize {
        let sessions: Vec<(String, SharedTranscript)> = lock(&self.sessions)
            .iter()
            .map(|(id, t)| (id.clone(), Arc::clone(t)))
            .collect();

        let mut dispatched = 0;
        for (session_id, transcript) in sessions {
            let reader = Arc::clone(&transcript);
            let events = match tokio::task::spawn_blocking(move || lock(&reader).poll()).await {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Transcript poll task failed");
                    continue;
                }
            };
            if events.is_empty() {
                continue;
            }

            if !self.is_current(&session_id, &transcript) {
                tracing::debug!(
                    session_id = %session_id,
                    dropped = events.len(),
                    "Session unregistered mid-poll, dropping events"
                );
                continue;
            }

            tracing::info!(session_id = %session_id, count = events.len(), "Polled events");
            self.dispatch(&session_id, &events);
            dispatched += events.len();
        }
        dispatched
    }

    /// Poll until `shutdown` turns true or its sender goes away.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.poll_interval, "Monitor pool started");

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
                    self.poll_once().await;
                }
            }
        }
        tracing::info!("Monitor pool stopped");
    }

    fn is_current(&self, session_id: &str, transcript: &SharedTranscript) -> bool {
        lock(&self.sessions)
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, transcript))
    }

    fn dispatch(&self, session_id: &str, events: &[ParsedEvent]) {
        let callbacks: Vec<EventCallback> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in callbacks {
            callback(session_id, events);
        }
    }
}

/// Project directory name for a working directory: every character that is
/// not an ASCII letter or digit becomes `-`.
pub fn project_dir_name(working_dir: &Path) -> String {
    working_dir
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
