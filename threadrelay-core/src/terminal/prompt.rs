//! Chat text for interactive prompts and exit notices.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::PromptKind;

static CHECKBOX_OPTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*←?\s*[☐✔☒]\s+(.+)").unwrap());

static NUMBERED_OPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[❯>]\s*)?\d+[.)]\s+(.+)").unwrap());

fn title(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::PermissionRequest => "Permission required",
        PromptKind::Question => "Question from Claude",
        PromptKind::PlanApproval => "Plan ready for approval",
        PromptKind::RestoreCheckpoint => "Restore checkpoint?",
    }
}

fn preview_lines(kind: PromptKind) -> usize {
    match kind {
        PromptKind::Question => 8,
        _ => 5,
    }
}

/// Notification for a prompt: its first non-blank lines in a code block.
pub fn render_prompt(kind: PromptKind, content: &str) -> String {
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let limit = preview_lines(kind);

    let mut preview = lines
        .iter()
        .take(limit)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    if lines.len() > limit {
        preview.push_str("\n...");
    }
    format!("**{}**\n\n```\n{}\n```", title(kind), preview)
}

/// Notice that the assistant left `window`.
pub fn render_exit(window: &str) -> String {
    format!("Claude has exited in **{}**", window)
}

/// Choices shown by a question prompt, numbered from 0 in screen order.
///
/// Recognizes checkbox lines (`☐ label`, `← ☐ label`) and numbered lines
/// (`1. label`, `2) label`).
pub fn parse_question_options(content: &str) -> Vec<(usize, String)> {
    content
        .lines()
        .filter_map(|line| {
            CHECKBOX_OPTION
                .captures(line)
                .or_else(|| NUMBERED_OPTION.captures(line))
                .map(|caps| caps[1].trim().to_string())
        })
        .enumerate()
        .collect()
}
