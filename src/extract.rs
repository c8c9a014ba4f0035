//! Pulls a JSON object out of free-form model text.
//!
//! Models wrap their JSON in prose or markdown fences, and the prose itself
//! may contain braces. Candidates are found with a string-aware balanced
//! brace scan and tried in order until one deserializes.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON object found in model output")]
    NoJsonObject,
    #[error("embedded JSON did not match the expected shape: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Every balanced `{...}` span, ordered by opening brace.
///
/// One forward pass with a stack of open braces. Quotes only start a string
/// inside an object, so stray quotes in prose do not hide later objects.
pub fn find_json_objects(text: &str) -> Vec<&str> {
    let mut open: Vec<usize> = Vec::new();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(idx),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, idx + 1));
                }
            }
            _ => {}
        }
    }

    // Spans close inner-first; candidates are tried outer-first.
    spans.sort_unstable_by_key(|&(start, _)| start);
    spans.into_iter().map(|(start, end)| &text[start..end]).collect()
}

/// Parses the first embedded object that fits `T`.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T, ExtractError> {
    let mut last_err = None;
    for candidate in find_json_objects(text) {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.map_or(ExtractError::NoJsonObject, ExtractError::Invalid))
}
