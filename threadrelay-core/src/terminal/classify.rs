//! Terminal snapshot classifier
//!
//! Reads the text of the assistant's terminal pane and decides what the
//! assistant is doing.
//!
//! ## Pane Layout
//!
//! ```text
//! [Content area - messages, tool output, dialogs]
//! ✻ Reading…                      (spinner line while working)
//! ────────────────────
//! >                               (input prompt when idle)
//! ────────────────────
//! ```
//!
//! ## Detection Order
//!
//! 1. **Interactive prompt**: an opening line (dialog title) anywhere on
//!    screen, confirmed by a closing line (key hints) below it.
//! 2. **Busy**: a spinner glyph in the last few lines.
//! 3. **Idle**: a bare prompt marker in the last few lines.
//!
//! Process exit is judged separately from the pane's foreground process name,
//! see [`StateClassifier::process_state`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::StatusConfig;
use crate::types::{ProcessState, PromptKind, UiState};

/// Spinner glyphs the assistant animates while working.
pub const SPINNER_CHARS: &[char] = &[
    '·', '✻', '✽', '✶', '⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏',
];

/// How many trailing lines the busy/idle checks look at.
const TAIL_LINES: usize = 3;

/// Longest line still treated as a bare prompt.
const MAX_PROMPT_LINE_CHARS: usize = 20;

const PROMPT_MARKERS: &[char] = &['>', '❯'];

/// Dialog openings, checked in order on every line.
static OPENINGS: Lazy<Vec<(PromptKind, Regex)>> = Lazy::new(|| {
    vec![
        (
            PromptKind::PlanApproval,
            Regex::new(r"(?i)would you like to proceed\?|claude has written up a plan").unwrap(),
        ),
        (
            PromptKind::Question,
            Regex::new(r"^\s*(?:←\s*)?[☐✔☒]\s+\S").unwrap(),
        ),
        (
            PromptKind::PermissionRequest,
            Regex::new(r"(?i)do you want to (?:proceed|make this edit|create|allow|run)").unwrap(),
        ),
        (
            PromptKind::RestoreCheckpoint,
            Regex::new(r"(?i)restore the code").unwrap(),
        ),
    ]
});

/// Key hints shown once a dialog accepts input.
static CLOSING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)esc to (?:cancel|exit)|enter to (?:select|confirm|continue)|ctrl-g to edit")
        .unwrap()
});

/// Classify a pane snapshot.
///
/// Never returns [`UiState::Exited`]; that comes from the process check.
pub fn classify(snapshot: &str) -> UiState {
    if let Some((kind, content)) = detect_interactive(snapshot) {
        return UiState::InteractivePrompt { kind, content };
    }
    if detect_busy(snapshot) {
        return UiState::Busy;
    }
    if detect_idle(snapshot) {
        return UiState::Idle;
    }
    UiState::Unknown
}

/// Find the first confirmed dialog, returning its kind and the text from its
/// opening line to the end of the snapshot.
///
/// Questions need no closing line since their options can push the key hints
/// off screen. An opening without a closing does not stop the scan.
pub fn detect_interactive(snapshot: &str) -> Option<(PromptKind, String)> {
    let lines: Vec<&str> = snapshot.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let Some(kind) = OPENINGS
            .iter()
            .find(|(_, re)| re.is_match(line))
            .map(|(kind, _)| *kind)
        else {
            continue;
        };

        let confirmed = kind == PromptKind::Question
            || lines[i + 1..].iter().any(|l| CLOSING.is_match(l));
        if confirmed {
            let content = lines[i..].join("\n").trim_end().to_string();
            return Some((kind, content));
        }
    }
    None
}

fn tail_lines(snapshot: &str) -> impl Iterator<Item = &str> {
    let lines: Vec<&str> = snapshot.trim().lines().collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines.into_iter().skip(start)
}

/// A spinner glyph in the last few lines.
pub fn detect_busy(snapshot: &str) -> bool {
    tail_lines(snapshot).any(|line| line.contains(SPINNER_CHARS))
}

/// A bare prompt marker in the last few lines.
pub fn detect_idle(snapshot: &str) -> bool {
    tail_lines(snapshot).any(|line| is_prompt_line(line.trim()))
}

fn is_prompt_line(line: &str) -> bool {
    let Some(marker) = line.chars().last() else {
        return false;
    };
    if !PROMPT_MARKERS.contains(&marker) {
        return false;
    }
    if line.chars().count() == 1 {
        return true;
    }
    if line.chars().count() >= MAX_PROMPT_LINE_CHARS || line.contains('<') {
        return false;
    }
    // Redirections (`2>`, `&>`, `>>`) and arrows (`->`, `=>`)
    let before = line.chars().rev().nth(1);
    !matches!(before, Some(c) if c.is_ascii_digit() || matches!(c, '&' | '>' | '-' | '='))
}

/// Classifier carrying the configured process names.
#[derive(Debug, Clone)]
pub struct StateClassifier {
    assistant_process_names: Vec<String>,
    shell_process_names: Vec<String>,
}

impl StateClassifier {
    pub fn new(config: &StatusConfig) -> Self {
        Self {
            assistant_process_names: config.assistant_process_names.clone(),
            shell_process_names: config.shell_process_names.clone(),
        }
    }

    pub fn classify(&self, snapshot: &str) -> UiState {
        classify(snapshot)
    }

    /// Judge the pane's foreground process.
    ///
    /// Only a known shell means the assistant exited. Names that are neither
    /// the assistant nor a shell (a tool it spawned, a pager) are inconclusive.
    pub fn process_state(&self, process_name: Option<&str>) -> ProcessState {
        let Some(name) = process_name.map(str::trim).filter(|n| !n.is_empty()) else {
            return ProcessState::Inconclusive;
        };
        let matches = |names: &[String]| names.iter().any(|n| n.eq_ignore_ascii_case(name));

        if matches(&self.assistant_process_names) {
            ProcessState::Running
        } else if matches(&self.shell_process_names) {
            ProcessState::Exited
        } else {
            ProcessState::Inconclusive
        }
    }
}

impl Default for StateClassifier {
    fn default() -> Self {
        Self::new(&StatusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERMISSION: &str = "\
⏺ Bash(rm -rf build/)
╭──────────────────────────────────────────╮
│ Bash command                             │
│   rm -rf build/                          │
│ Do you want to proceed?                  │
│ ❯ 1. Yes                                 │
│   2. No, and tell Claude what to do      │
╰──────────────────────────────────────────╯
  Esc to cancel";

    const QUESTION: &str = "\
Which database should we use?
← ☐ Postgres
  ☐ SQLite
  ☐ Something else";

    #[test]
    fn test_permission_prompt() {
        let UiState::InteractivePrompt { kind, content } = classify(PERMISSION) else {
            panic!("expected interactive prompt");
        };
        assert_eq!(kind, PromptKind::PermissionRequest);
        assert!(content.starts_with("│ Do you want to proceed?"));
        assert!(content.ends_with("Esc to cancel"));
    }

    #[test]
    fn test_unconfirmed_permission_is_not_a_prompt() {
        let text = "Do you want to proceed?\n❯ 1. Yes";
        assert!(detect_interactive(text).is_none());
    }

    #[test]
    fn test_question_needs_no_closing() {
        let (kind, content) = detect_interactive(QUESTION).unwrap();
        assert_eq!(kind, PromptKind::Question);
        assert!(content.starts_with("← ☐ Postgres"));
    }

    #[test]
    fn test_plan_approval_wins_over_later_openings() {
        let text = "\
Claude has written up a plan and is ready to execute.
Would you like to proceed?
❯ 1. Yes, and auto-accept edits
  2. No, keep planning
ctrl-g to edit in vim";
        let (kind, content) = detect_interactive(text).unwrap();
        assert_eq!(kind, PromptKind::PlanApproval);
        assert!(content.starts_with("Claude has written up a plan"));
    }

    #[test]
    fn test_restore_checkpoint() {
        let text = "Rewind\nRestore the code to this point?\n❯ Yes\nEnter to confirm · Esc to exit";
        let (kind, _) = detect_interactive(text).unwrap();
        assert_eq!(kind, PromptKind::RestoreCheckpoint);
    }

    #[test]
    fn test_busy_spinner() {
        let text = "⏺ Reading files\n\n✻ Pondering… (12s · esc to interrupt)\n";
        assert_eq!(classify(text), UiState::Busy);
    }

    #[test]
    fn test_spinner_outside_tail_is_ignored() {
        let text = "✻ old spinner\nline\nline\nline\n>";
        assert_eq!(classify(text), UiState::Idle);
    }

    #[test]
    fn test_idle_prompt() {
        assert_eq!(classify("some output\n>\n"), UiState::Idle);
        assert_eq!(classify("some output\n❯"), UiState::Idle);
        assert_eq!(classify("done\nclaude>"), UiState::Idle);
    }

    #[test]
    fn test_markup_and_redirection_are_not_prompts() {
        assert!(!is_prompt_line("<div>"));
        assert!(!is_prompt_line("cat a 2>"));
        assert!(!is_prompt_line("echo hi >>"));
        assert!(!is_prompt_line("a ->"));
        assert!(!is_prompt_line("x =>"));
        assert!(!is_prompt_line("this line is far too long to be a prompt>"));
        assert_eq!(classify("fn main() -> Result<()>"), UiState::Unknown);
    }

    #[test]
    fn test_unknown_and_empty() {
        assert_eq!(classify(""), UiState::Unknown);
        assert_eq!(classify("just some text"), UiState::Unknown);
    }

    #[test]
    fn test_interactive_beats_busy() {
        let text = format!("{}\n✻ Working…", PERMISSION);
        assert!(matches!(classify(&text), UiState::InteractivePrompt { .. }));
    }

    #[test]
    fn test_process_state() {
        let classifier = StateClassifier::default();
        assert_eq!(classifier.process_state(Some("claude")), ProcessState::Running);
        assert_eq!(classifier.process_state(Some("node")), ProcessState::Running);
        assert_eq!(classifier.process_state(Some("zsh")), ProcessState::Exited);
        assert_eq!(classifier.process_state(Some("bash")), ProcessState::Exited);
        assert_eq!(classifier.process_state(Some("cargo")), ProcessState::Inconclusive);
        assert_eq!(classifier.process_state(Some("")), ProcessState::Inconclusive);
        assert_eq!(classifier.process_state(None), ProcessState::Inconclusive);
    }
}
