//! Transcript side of the pipeline: tailing, extraction and rendering.

pub mod extract;
pub mod render;
pub mod tailer;

pub use extract::{parse_line, summarize_tool_input};
pub use render::{render_event, task_for_event};
pub use tailer::MonitoredTranscript;
