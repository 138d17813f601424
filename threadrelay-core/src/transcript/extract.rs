//! Transcript record → typed events.
//!
//! One JSONL line of the assistant's transcript yields zero or more
//! [`ParsedEvent`]s. Only a handful of fields are read; everything else in the
//! record is ignored so schema additions do not break extraction.
//!
//! # Error Handling
//!
//! - **Blank or malformed lines**: yield no events, never an error.
//! - **Malformed content blocks**: the block is skipped, its siblings are kept.
//! - **Unknown record or block types**: ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::types::{EventKind, ParsedEvent};

/// Display length of tool input summaries.
pub const SUMMARY_MAX_CHARS: usize = 80;

/// Display length of tool result previews.
pub const RESULT_PREVIEW_MAX_CHARS: usize = 200;

/// Tool name → the input field worth showing for it.
const TOOL_SUMMARY_FIELDS: &[(&str, &str)] = &[
    ("Read", "file_path"),
    ("Write", "file_path"),
    ("Edit", "file_path"),
    ("Glob", "pattern"),
    ("Grep", "pattern"),
    ("Bash", "command"),
    ("WebFetch", "url"),
    ("WebSearch", "query"),
    ("Task", "description"),
];

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRecord {
    uuid: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<String>,
    message: Option<RawMessage>,
    /// Top-level content of system records
    content: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    /// Blocks are decoded one at a time so a bad block only loses itself
    Blocks(Vec<Value>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default = "unknown_tool")]
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "thinking")]
    Thinking,
    #[serde(other)]
    Unknown,
}

fn unknown_tool() -> String {
    "unknown".to_string()
}

/// Parse one transcript line.
pub fn parse_line(line: &str) -> Vec<ParsedEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let record: RawRecord = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping malformed transcript line");
            return Vec::new();
        }
    };

    let kinds = match record.record_type.as_deref() {
        Some("assistant") => assistant_events(record.message.as_ref()),
        Some("user") => user_events(record.message.as_ref()),
        Some("system") => vec![EventKind::System {
            content: record
                .content
                .as_ref()
                .map(value_to_text)
                .unwrap_or_default(),
        }],
        _ => Vec::new(),
    };

    let timestamp = record.timestamp.as_deref().and_then(parse_timestamp);
    kinds
        .into_iter()
        .map(|kind| ParsedEvent {
            record_id: record.uuid.clone(),
            timestamp,
            kind,
        })
        .collect()
}

fn content_blocks(message: Option<&RawMessage>) -> impl Iterator<Item = ContentBlock> + '_ {
    let blocks: &[Value] = match message.and_then(|m| m.content.as_ref()) {
        Some(RawContent::Blocks(blocks)) => blocks,
        _ => &[],
    };
    blocks
        .iter()
        .filter_map(|block| match ContentBlock::deserialize(block) {
            Ok(b) => Some(b),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed content block");
                None
            }
        })
}

fn assistant_events(message: Option<&RawMessage>) -> Vec<EventKind> {
    content_blocks(message)
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => {
                Some(EventKind::Text { content: text })
            }
            ContentBlock::ToolUse { id, name, input } => {
                let input_summary = summarize_tool_input(&name, &input);
                Some(EventKind::ToolInvocation {
                    tool_name: name,
                    tool_id: id,
                    input_summary,
                })
            }
            // Thinking is never forwarded
            _ => None,
        })
        .collect()
}

fn user_events(message: Option<&RawMessage>) -> Vec<EventKind> {
    content_blocks(message)
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some(EventKind::ToolResult {
                tool_id: tool_use_id,
                content: truncate(&value_to_text(&content), RESULT_PREVIEW_MAX_CHARS),
                is_error,
            }),
            _ => None,
        })
        .collect()
}

/// The most relevant input field of a tool call, truncated for display.
///
/// Known tools use their mapped field; anything else falls back to the
/// first non-empty string input.
pub fn summarize_tool_input(tool_name: &str, input: &Value) -> String {
    let Some(fields) = input.as_object() else {
        return String::new();
    };

    let mapped = TOOL_SUMMARY_FIELDS
        .iter()
        .find(|(name, _)| *name == tool_name)
        .and_then(|(_, field)| fields.get(*field));
    if let Some(value) = mapped {
        return truncate(&value_to_text(value), SUMMARY_MAX_CHARS);
    }

    fields
        .values()
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(|s| truncate(s, SUMMARY_MAX_CHARS))
        .unwrap_or_default()
}

/// Flatten a JSON content value to display text.
///
/// Arrays of `{"type":"text","text":...}` blocks are joined with newlines.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj
                    .get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Cut `s` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn only(events: Vec<ParsedEvent>) -> EventKind {
        assert_eq!(events.len(), 1, "expected one event, got {:?}", events);
        events.into_iter().next().unwrap().kind
    }

    #[test]
    fn test_assistant_text() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Hello"}]}}"#;
        assert_eq!(
            only(parse_line(line)),
            EventKind::Text {
                content: "Hello".to_string()
            }
        );
    }

    #[test]
    fn test_whitespace_text_is_dropped() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"  \n "}]}}"#;
        assert!(parse_line(line).is_empty());
    }

    #[test]
    fn test_shell_tool_summary() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"toolu_1","name":"Bash","input":{"command":"ls -la"}}]}}"#;
        assert_eq!(
            only(parse_line(line)),
            EventKind::ToolInvocation {
                tool_name: "Bash".to_string(),
                tool_id: "toolu_1".to_string(),
                input_summary: "ls -la".to_string(),
            }
        );
    }

    #[test]
    fn test_thinking_is_dropped() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm","signature":"x"},{"type":"text","text":"Done"}]}}"#;
        assert_eq!(
            only(parse_line(line)),
            EventKind::Text {
                content: "Done".to_string()
            }
        );
    }

    #[test]
    fn test_mixed_blocks_keep_order() {
        let line = r#"{"type":"assistant","uuid":"u1","timestamp":"2025-01-02T03:04:05.678Z","message":{"content":[{"type":"text","text":"Reading"},{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"/src/main.rs"}}]}}"#;
        let events = parse_line(line);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].kind, EventKind::Text { .. }));
        assert!(matches!(
            &events[1].kind,
            EventKind::ToolInvocation { input_summary, .. } if input_summary == "/src/main.rs"
        ));
        assert_eq!(events[1].record_id.as_deref(), Some("u1"));
        assert!(events[1].timestamp.is_some());
    }

    #[test]
    fn test_tool_results() {
        let line = r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"t1","content":"ok","is_error":false},{"type":"tool_result","tool_use_id":"t2","content":[{"type":"text","text":"line one"},{"type":"text","text":"line two"}],"is_error":true}]}}"#;
        let events = parse_line(line);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].kind,
            EventKind::ToolResult {
                tool_id: "t1".to_string(),
                content: "ok".to_string(),
                is_error: false,
            }
        );
        assert_eq!(
            events[1].kind,
            EventKind::ToolResult {
                tool_id: "t2".to_string(),
                content: "line one\nline two".to_string(),
                is_error: true,
            }
        );
    }

    #[test]
    fn test_result_preview_truncated() {
        let long = "x".repeat(500);
        let line = json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "tool_use_id": "t1", "content": long}]}
        })
        .to_string();
        let EventKind::ToolResult { content, .. } = only(parse_line(&line)) else {
            panic!("expected tool result");
        };
        assert_eq!(content.chars().count(), RESULT_PREVIEW_MAX_CHARS);
        assert!(content.ends_with("..."));
    }

    #[test]
    fn test_user_prompt_text_yields_nothing() {
        let line = r#"{"type":"user","message":{"role":"user","content":"fix the bug"}}"#;
        assert!(parse_line(line).is_empty());
    }

    #[test]
    fn test_system_record() {
        let line = r#"{"type":"system","content":"Conversation compacted","level":"info"}"#;
        assert_eq!(
            only(parse_line(line)),
            EventKind::System {
                content: "Conversation compacted".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_and_blank_lines() {
        assert!(parse_line("").is_empty());
        assert!(parse_line("   ").is_empty());
        assert!(parse_line("{not json").is_empty());
        assert!(parse_line(r#"{"type":"assistant","message":{"content":[{"type":"te"#).is_empty());
        assert!(parse_line(r#"{"type":"file-history-snapshot","snapshot":{}}"#).is_empty());
        assert!(parse_line("[1,2,3]").is_empty());
    }

    #[test]
    fn test_bad_block_does_not_lose_siblings() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":42},{"type":"text","text":"kept"}]}}"#;
        assert_eq!(
            only(parse_line(line)),
            EventKind::Text {
                content: "kept".to_string()
            }
        );
    }

    #[test]
    fn test_summary_fallback_and_truncation() {
        let input = json!({"timeout": 5, "target": "", "path": "docs/readme.md"});
        assert_eq!(summarize_tool_input("CustomTool", &input), "docs/readme.md");

        let input = json!({"command": "a".repeat(100)});
        let summary = summarize_tool_input("Bash", &input);
        assert_eq!(summary.chars().count(), SUMMARY_MAX_CHARS);
        assert!(summary.ends_with("..."));

        assert_eq!(summarize_tool_input("Bash", &json!(null)), "");
        assert_eq!(summarize_tool_input("TodoWrite", &json!({"todos": []})), "");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("héllo", 5), "héllo");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }
}
