//! tmux-backed [`Multiplexer`].
//!
//! Windows are addressed as `{session_name}:{window}` inside the configured
//! tmux session.

use async_trait::async_trait;
use threadrelay_core::{Error, Multiplexer, Result};
use tokio::process::Command;

pub struct TmuxMultiplexer {
    session_name: String,
}

impl TmuxMultiplexer {
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
        }
    }

    fn target(&self, window: &str) -> String {
        format!("{}:{}", self.session_name, window)
    }

    async fn tmux(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("tmux")
            .args(args)
            .output()
            .await
            .map_err(|e| Error::Multiplexer(format!("failed to run tmux: {}", e)))?;

        if !output.status.success() {
            // "can't find window" lands here once a window is closed
            return Err(Error::Multiplexer(format!(
                "tmux {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Multiplexer for TmuxMultiplexer {
    async fn capture_pane_text(&self, window: &str) -> Result<String> {
        let target = self.target(window);
        self.tmux(&["capture-pane", "-p", "-t", &target]).await
    }

    async fn foreground_process_name(&self, window: &str) -> Result<Option<String>> {
        let target = self.target(window);
        let name = self
            .tmux(&["display-message", "-p", "-t", &target, "#{pane_current_command}"])
            .await?;
        let name = name.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }
}
