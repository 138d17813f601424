//! Turning parsed events into chat text and queue tasks.

use crate::types::{ConversationKey, EventKind, OutboundTask, ParsedEvent};

/// Chat text for an event, or `None` when the event is not shown on its own.
///
/// Successful tool results only ever surface as an edit of their invocation
/// message, so they render to nothing here.
pub fn render_event(event: &ParsedEvent) -> Option<String> {
    match &event.kind {
        EventKind::Text { content } => Some(content.clone()),
        EventKind::ToolInvocation {
            tool_name,
            input_summary,
            ..
        } => Some(render_invocation(tool_name, input_summary)),
        EventKind::ToolResult {
            content,
            is_error: true,
            ..
        } => Some(format!("❌ Error: {}", content)),
        EventKind::ToolResult { .. } | EventKind::System { .. } => None,
    }
}

pub fn render_invocation(tool_name: &str, input_summary: &str) -> String {
    if input_summary.is_empty() {
        format!("🔧 **{}**", tool_name)
    } else {
        format!("🔧 **{}**({})", tool_name, input_summary)
    }
}

/// Queue task for an event addressed to `key`.
///
/// A tool result carries its error preview (or nothing) as text; the queue
/// folds it into the invocation message it belongs to.
pub fn task_for_event(key: ConversationKey, event: &ParsedEvent) -> Option<OutboundTask> {
    match &event.kind {
        EventKind::Text { content } => Some(OutboundTask::content(key, content.clone())),
        EventKind::ToolInvocation {
            tool_name,
            tool_id,
            input_summary,
        } => Some(OutboundTask::tool_invocation(
            key,
            render_invocation(tool_name, input_summary),
            tool_id.clone(),
        )),
        EventKind::ToolResult {
            tool_id,
            content,
            is_error,
        } => {
            let text = if *is_error { content.clone() } else { String::new() };
            Some(OutboundTask::tool_result(key, text, tool_id.clone(), *is_error))
        }
        EventKind::System { .. } => None,
    }
}
