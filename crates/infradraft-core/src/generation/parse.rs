//! Strict parsing of tagged model output.
//!
//! Tagged output looks like:
//!
//! ```text
//! REASONING:
//! - pinned base image
//! CONTENT:
//! FROM rust:1.75-slim
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const REASONING_MARKER: &str = "REASONING:";
const CONTENT_MARKER: &str = "CONTENT:";

/// Reasoning and artifact content split out of a model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub reasoning: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("missing {0} marker")]
    MissingMarker(&'static str),

    #[error("CONTENT appears before REASONING")]
    MarkersOutOfOrder,

    #[error("marker {0} appears more than once")]
    DuplicateMarker(&'static str),

    #[error("content section is empty")]
    EmptyContent,
}

/// Parse a response that must carry both `REASONING:` and `CONTENT:` markers
/// at the start of a line.
pub fn parse_model_output(raw: &str) -> Result<ModelOutput, ParseError> {
    let reasoning_at = single_marker(raw, REASONING_MARKER)?
        .ok_or(ParseError::MissingMarker(REASONING_MARKER))?;
    let content_at =
        single_marker(raw, CONTENT_MARKER)?.ok_or(ParseError::MissingMarker(CONTENT_MARKER))?;
    if content_at < reasoning_at {
        return Err(ParseError::MarkersOutOfOrder);
    }

    let reasoning = raw[reasoning_at + REASONING_MARKER.len()..content_at].trim();
    let content = strip_code_fence(&raw[content_at + CONTENT_MARKER.len()..]);
    if content.is_empty() {
        return Err(ParseError::EmptyContent);
    }

    Ok(ModelOutput {
        reasoning: reasoning.to_string(),
        content,
    })
}

/// Accept untagged output as plain content; tagged output goes through the
/// strict parser and its errors are returned unchanged.
pub fn parse_or_plain(raw: &str) -> Result<ModelOutput, ParseError> {
    let tagged = line_offsets(raw, REASONING_MARKER).next().is_some()
        || line_offsets(raw, CONTENT_MARKER).next().is_some();
    if tagged {
        return parse_model_output(raw);
    }
    let content = strip_code_fence(raw);
    if content.is_empty() {
        return Err(ParseError::EmptyContent);
    }
    Ok(ModelOutput {
        reasoning: String::new(),
        content,
    })
}

/// Return the body of the first fenced block, or the trimmed input when there
/// is none. Multi-file output (`FILENAME:` blocks) is returned untouched.
pub fn strip_code_fence(text: &str) -> String {
    if text.contains("FILENAME:") || !text.contains("```") {
        return text.trim().to_string();
    }
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[\w.+-]*[ \t]*\r?\n(.*?)```").expect("fence pattern is valid")
    });
    match fence.captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => text.replace("```", "").trim().to_string(),
    }
}

fn line_offsets<'a>(raw: &'a str, marker: &'static str) -> impl Iterator<Item = usize> + 'a {
    let mut offset = 0usize;
    raw.split_inclusive('\n').filter_map(move |line| {
        let start = offset;
        offset += line.len();
        let indent = line.len() - line.trim_start().len();
        line.trim_start()
            .starts_with(marker)
            .then_some(start + indent)
    })
}

fn single_marker(raw: &str, marker: &'static str) -> Result<Option<usize>, ParseError> {
    let mut found = line_offsets(raw, marker);
    let first = found.next();
    if found.next().is_some() {
        return Err(ParseError::DuplicateMarker(marker));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_output() {
        let raw = "REASONING:\n- pinned image\nCONTENT:\n```dockerfile\nFROM rust:1.75\n```\n";
        let out = parse_model_output(raw).unwrap();
        assert_eq!(out.reasoning, "- pinned image");
        assert_eq!(out.content, "FROM rust:1.75");
    }

    #[test]
    fn test_missing_content_marker_is_an_error() {
        let err = parse_model_output("REASONING: fine\nFROM rust").unwrap_err();
        assert_eq!(err, ParseError::MissingMarker("CONTENT:"));
    }

    #[test]
    fn test_out_of_order_markers() {
        let err = parse_model_output("CONTENT:\nFROM x\nREASONING: y").unwrap_err();
        assert_eq!(err, ParseError::MarkersOutOfOrder);
    }

    #[test]
    fn test_empty_content_is_rejected() {
        let err = parse_model_output("REASONING: ok\nCONTENT:\n   \n").unwrap_err();
        assert_eq!(err, ParseError::EmptyContent);
    }

    #[test]
    fn test_parse_or_plain_never_swallows_tag_errors() {
        assert!(parse_or_plain("REASONING: only reasoning").is_err());
        let plain = parse_or_plain("apiVersion: v1\nkind: Service\n").unwrap();
        assert_eq!(plain.content, "apiVersion: v1\nkind: Service");
        assert!(plain.reasoning.is_empty());
    }

    #[test]
    fn test_strip_code_fence_keeps_multi_file_blocks() {
        let multi = "FILENAME: a.yml\n```yaml\na: 1\n```";
        assert_eq!(strip_code_fence(multi), multi);
        assert_eq!(strip_code_fence("Here:\n```yaml\nx: 1\n```\nbye"), "x: 1");
    }
}
