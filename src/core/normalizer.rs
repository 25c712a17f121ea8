//! Turns model text that is supposed to be JSON into parsed data.
//!
//! Only syntactic cleanup happens here: comment lines, trailing `//`
//! annotations, code fences and a leading language tag are removed. The
//! remaining text either parses or the caller gets a `ParseError`; nothing
//! is guessed.

use crate::utils::error::{AssessmentError, Result};
use serde::de::DeserializeOwned;

pub const COMMENT_MARKER: &str = "//";

/// Runs the cleanup steps and returns the text that will be parsed.
pub fn clean(text: &str) -> String {
    let kept: Vec<String> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with(COMMENT_MARKER))
        .map(strip_trailing_comment)
        .collect();
    let joined = kept.join("\n");

    let unfenced = joined.trim_matches(|c: char| c == '`' || c.is_whitespace());
    strip_language_tag(unfenced)
        .trim_matches(|c: char| c == '`' || c.is_whitespace())
        .to_string()
}

pub fn normalize<T: DeserializeOwned>(stage: &str, text: &str) -> Result<T> {
    let cleaned = clean(text);
    if cleaned.is_empty() {
        return Err(AssessmentError::parse(stage, "response was empty after cleanup"));
    }
    serde_json::from_str(&cleaned).map_err(|e| AssessmentError::parse(stage, e.to_string()))
}

/// Drops a `// ...` annotation that follows JSON on the same line. Markers
/// inside string literals are left alone.
fn strip_trailing_comment(line: &str) -> String {
    let mut in_string = false;
    let mut escaped = false;
    let mut previous_slash = false;

    for (index, ch) in line.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                previous_slash = false;
            }
            '/' if previous_slash => {
                return line[..index - 1].trim_end().to_string();
            }
            '/' => previous_slash = true,
            _ => previous_slash = false,
        }
    }

    line.to_string()
}

/// `json\n{...}` or `json{...}` → `{...}`. Only a bare alphanumeric token
/// directly in front of an object or array counts as a tag.
fn strip_language_tag(text: &str) -> &str {
    let token_len = text
        .char_indices()
        .find(|(_, c)| !c.is_ascii_alphanumeric())
        .map(|(index, _)| index)
        .unwrap_or(text.len());

    if token_len == 0 || !text.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return text;
    }

    let rest = text[token_len..].trim_start();
    if rest.starts_with('{') || rest.starts_with('[') {
        rest
    } else {
        text
    }
}
