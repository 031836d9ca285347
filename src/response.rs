//! Reconciliation of the shapes the report API answers with.
//!
//! A body is either a bare array of rows, an object wrapping the rows in `data`, or
//! something that did not parse. The last case can optionally be run through a
//! best-effort repair pass; by default it fails with `MalformedResponse`.

use crate::error::{ReportError, Result};
use crate::schema::ReportRow;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static BARE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)(\s*:)").expect("static regex is valid")
});

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("static regex is valid"));

const SNIPPET_LEN: usize = 120;

#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Array(Vec<Value>),
    Wrapped(Vec<Value>),
    Malformed(String),
}

impl RawResponse {
    pub fn classify(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            // double-encoded payloads arrive as one JSON string
            Ok(Value::String(inner)) => Self::classify_value(
                serde_json::from_str::<Value>(&inner).ok(),
                &inner,
            ),
            Ok(value) => Self::classify_value(Some(value), body),
            Err(_) => Self::Malformed(body.to_string()),
        }
    }

    fn classify_value(value: Option<Value>, text: &str) -> Self {
        match value {
            Some(Value::Array(items)) => Self::Array(items),
            Some(Value::Object(mut map)) => match map.remove("data") {
                Some(Value::Array(items)) => Self::Wrapped(items),
                _ => Self::Malformed(text.to_string()),
            },
            _ => Self::Malformed(text.to_string()),
        }
    }

    /// Resolves the response into rows. `repair` enables the heuristic repair pass
    /// for bodies that are not valid JSON.
    pub fn into_rows(self, repair: bool) -> Result<Vec<ReportRow>> {
        match self {
            Self::Array(items) => rows_from_values(items),
            Self::Wrapped(items) => {
                debug!("Response rows were wrapped in a 'data' field");
                rows_from_values(items)
            }
            Self::Malformed(text) if repair => {
                let value = repair_json(&text)?;
                warn!("Report response was not valid JSON; used repaired body");
                match Self::classify_value(Some(value), &text) {
                    Self::Malformed(_) => Err(ReportError::MalformedResponse(format!(
                        "repaired body has no row array: {}",
                        snippet(&text)
                    ))),
                    resolved => resolved.into_rows(false),
                }
            }
            Self::Malformed(text) => Err(ReportError::MalformedResponse(format!(
                "expected an array or an object with a 'data' array: {}",
                snippet(&text)
            ))),
        }
    }
}

fn rows_from_values(items: Vec<Value>) -> Result<Vec<ReportRow>> {
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(ReportError::MalformedResponse(format!(
                "row {} is not an object: {}",
                idx,
                snippet(&other.to_string())
            ))),
        })
        .collect()
}

fn snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_LEN {
        text.to_string()
    } else {
        let cut: String = text.chars().take(SNIPPET_LEN).collect();
        format!("{}…", cut)
    }
}

/// Best-effort repair of almost-JSON text.
///
/// Walks every `{` or `[` in `text`, takes the bracket-balanced block starting there,
/// quotes bare object keys and drops trailing commas. The first block that then parses
/// wins, so bracketed log prefixes ahead of the payload are skipped. Both rewrites
/// leave string literals alone.
pub fn repair_json(text: &str) -> Result<Value> {
    let mut last_failure = None;

    for (start, _) in text.match_indices(|c: char| c == '{' || c == '[') {
        let Some(block) = extract_balanced(&text[start..]) else {
            continue;
        };

        let repaired = rewrite_outside_strings(block, |chunk| {
            let quoted = BARE_KEY.replace_all(chunk, "$1\"$2\"$3");
            TRAILING_COMMA.replace_all(&quoted, "$1").into_owned()
        });

        match serde_json::from_str(&repaired) {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!("Candidate block at offset {} did not parse: {}", start, e);
                last_failure = Some(format!("repair failed ({}): {}", e, snippet(&repaired)));
            }
        }
    }

    Err(ReportError::MalformedResponse(last_failure.unwrap_or_else(|| {
        format!("no balanced JSON block in: {}", snippet(text))
    })))
}

/// The bracket-balanced block opening at the start of `text`, honouring string literals.
fn extract_balanced(text: &str) -> Option<&str> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
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
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[..offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Applies `rewrite` to every stretch of `text` outside double-quoted strings.
fn rewrite_outside_strings<F>(text: &str, rewrite: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut output = String::with_capacity(text.len() + 16);
    let mut chunk_start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    in_string = false;
                    output.push_str(&text[chunk_start..=idx]);
                    chunk_start = idx + 1;
                }
                _ => {}
            }
        } else if ch == '"' {
            output.push_str(&rewrite(&text[chunk_start..idx]));
            in_string = true;
            chunk_start = idx;
        }
    }

    if in_string {
        output.push_str(&text[chunk_start..]);
    } else {
        output.push_str(&rewrite(&text[chunk_start..]));
    }

    output
}
