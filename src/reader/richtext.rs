// src/reader/richtext.rs
// Plain-text extraction from Linear's two embedded document formats.
//
// Comments and issue descriptions arrive as a structured node tree; issue
// content arrives as a base64-wrapped CRDT document state. The CRDT path is
// a readability heuristic, not a parser: the denylist and ratio threshold
// below are tuned to keep editor metadata out of user-facing text and must
// not be adjusted casually.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use regex::Regex;
use serde_json::Value;

/// Structural node names that never carry user text.
const SKIP_EXACT: &[&str] = &[
    "prosemirror",
    "paragraph",
    "heading",
    "bullet_list",
    "list_item",
    "ordered_list",
    "level",
    "link",
    "null",
    "strong",
    "em",
    "code",
    "table",
    "table_row",
    "table_cell",
    "table_header",
    "colspan",
    "rowspan",
    "colwidth",
    "issuemention",
    "label",
    "href",
    "title",
    "order",
    "attrs",
    "content",
    "marks",
    "type",
    "text",
    "doc",
    "blockquote",
    "code_block",
    "hard_break",
    "horizontal_rule",
    "image",
    "suggestion_usermentions",
    "todo_item",
    "done",
    "language",
];

/// Markers that show up with trailing encoded characters attached.
const SKIP_PREFIXES: &[&str] = &["suggestion_usermentions", "issuemention", "prosemirror"];

/// All patterns here are static literals; compilation cannot fail.
fn compiled(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => unreachable!("invalid built-in pattern: {e}"),
    }
}

/// Printable ASCII plus the Hangul block.
static READABLE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| compiled(r"[\x{ac00}-\x{d7af}\x{0020}-\x{007e}]+"));

static ENCODED_ID: LazyLock<Regex> = LazyLock::new(|| compiled(r"^w[\$\)\(A-Z]"));

static UUID_SHAPED: LazyLock<Regex> = LazyLock::new(|| compiled(r"^[a-f0-9-]{36}$"));

static HANGUL: LazyLock<Regex> = LazyLock::new(|| compiled(r"[\x{ac00}-\x{d7af}]"));

static TRAILING_OPEN_PAREN: LazyLock<Regex> = LazyLock::new(|| compiled(r"\s*\(\s*$"));

static LEADING_CLOSE_PAREN: LazyLock<Regex> = LazyLock::new(|| compiled(r"^\s*\)\s*"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| compiled(r"\s+"));

/// Flatten a structured body (comment `bodyData` / issue `descriptionData`)
/// to plain text. A plain string that is not JSON is returned as-is.
pub fn structured_text(body: &Value) -> String {
    match body {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => flatten(&parsed),
            Err(_) => raw.clone(),
        },
        Value::Null => String::new(),
        other => flatten(other),
    }
}

fn flatten(node: &Value) -> String {
    match node {
        Value::Object(map) => {
            let node_type = map.get("type").and_then(Value::as_str).unwrap_or("");
            match node_type {
                "text" => map
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                "suggestion_userMentions" => {
                    let label = map
                        .get("attrs")
                        .and_then(|a| a.get("label"))
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    if label.is_empty() {
                        String::new()
                    } else {
                        format!("@{label}")
                    }
                }
                "hardBreak" => "\n".to_string(),
                _ => map
                    .get("content")
                    .map(flatten)
                    .unwrap_or_default(),
            }
        }
        Value::Array(items) => items.iter().map(flatten).collect(),
        _ => String::new(),
    }
}

/// Best-effort plain text from a base64-encoded CRDT document state.
/// Returns an empty string whenever decoding or filtering leaves nothing.
pub fn encoded_text(content_state: &str) -> String {
    if content_state.is_empty() {
        return String::new();
    }

    let Ok(decoded) = BASE64.decode(content_state) else {
        return String::new();
    };
    let text = String::from_utf8_lossy(&decoded);

    let mut kept: Vec<String> = Vec::new();
    for run in READABLE_RUNS.find_iter(&text) {
        let run = run.as_str().trim();
        if run.chars().count() < 2 {
            continue;
        }

        let lower = run.to_lowercase();
        if SKIP_EXACT.contains(&lower.as_str()) {
            continue;
        }
        if SKIP_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            continue;
        }
        // Encoded ids and JSON-ish fragments
        if ENCODED_ID.is_match(run) {
            continue;
        }
        if run.starts_with('{') || run.contains("{\"") {
            continue;
        }
        if run.starts_with("link") && run.contains('{') {
            continue;
        }
        if UUID_SHAPED.is_match(run) {
            continue;
        }
        // Short ASCII noise (short Hangul runs are real words)
        if run.chars().count() <= 2 && !HANGUL.is_match(run) {
            continue;
        }
        let special = run
            .chars()
            .filter(|c| "()[]{}$#@*&^%".contains(*c))
            .count();
        if special as f64 / run.chars().count() as f64 > 0.3 {
            continue;
        }

        kept.push(run.to_string());
    }

    let joined = kept.join(" ");
    let joined = TRAILING_OPEN_PAREN.replace(&joined, "");
    let joined = LEADING_CLOSE_PAREN.replace(&joined, "");
    WHITESPACE.replace_all(&joined, " ").trim().to_string()
}
