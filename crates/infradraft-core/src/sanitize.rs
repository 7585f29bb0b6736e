//! Free-text feedback sanitation before it is fed back to generators.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

pub const MAX_FEEDBACK_CHARS: usize = 500;

const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '`', '$', '\\'];

const INJECTION_MARKERS: &[&str] = &[
    "ignore previous",
    "ignore above",
    "disregard",
    "you are now",
    "system:",
    "assistant:",
    "new instructions",
    "forget everything",
];

fn injection_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let alternatives: Vec<String> = INJECTION_MARKERS.iter().map(|m| regex::escape(m)).collect();
        Regex::new(&format!("(?i){}", alternatives.join("|"))).expect("marker pattern is valid")
    })
}

/// Clean operator feedback so it can be embedded as a generation constraint.
///
/// Shell metacharacters and control characters (except newline and tab) are
/// dropped, injection markers are removed case-insensitively, and the result
/// is cut at [`MAX_FEEDBACK_CHARS`] characters with `...` appended.
pub fn sanitize_feedback(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let stripped: String = trimmed
        .chars()
        .filter(|c| !SHELL_METACHARACTERS.contains(c))
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();

    let pattern = injection_pattern();
    for found in pattern.find_iter(&stripped) {
        warn!(marker = %found.as_str().to_lowercase(), "prompt injection marker removed from feedback");
    }
    let mut cleaned = pattern.replace_all(&stripped, "").trim().to_string();

    let length = cleaned.chars().count();
    if length > MAX_FEEDBACK_CHARS {
        warn!(from = length, to = MAX_FEEDBACK_CHARS, "feedback truncated");
        cleaned = cleaned.chars().take(MAX_FEEDBACK_CHARS).collect::<String>() + "...";
    }

    if cleaned != trimmed {
        info!("feedback sanitized");
    }
    cleaned
}
