//! Extraction of chart specifications embedded in prose.
//!
//! The backend sometimes inlines a chart spec as JSON inside a text reply,
//! either in a fenced code block or bare. [`extract_chart_spec`] pulls the
//! first such spec out and returns the prose that remains.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use datachat_core::types::ChartSpec;

use crate::diagnostics::DiagnosticSink;

const COMPONENT: &str = "extractor";

// =============================================================================
// Compiled patterns
// =============================================================================

/// A fenced block holding a single JSON object, optionally tagged.
static FENCED_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|vega-lite|vega)?\s*(\{.+?\})\s*```").expect("Invalid fence regex")
});

/// A lead-in sentence left dangling at the end once its chart is removed,
/// e.g. "Here's the chart:" or "Here is a bar chart of revenue by month:".
static ORPHAN_LEAD_IN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bhere(?:'s|\u{2019}s|\s+is)\s+(?:a\s+|the\s+)?(?:(?:bar|line|pie)\s+)?(?:chart|graph|plot|trend|visuali[sz]ation)\b[^.:]*:\s*$",
    )
    .expect("Invalid lead-in regex")
});

// =============================================================================
// Extraction
// =============================================================================

/// Split `text` into cleaned prose and an embedded chart spec, if any.
///
/// Fenced blocks are tried first, then bare objects. Only a JSON object with
/// an `encoding` or `mark` key counts as a chart spec. Malformed JSON is
/// treated as "no spec". A trailing orphaned lead-in sentence is removed in
/// every case.
pub fn extract_chart_spec(text: &str, sink: &dyn DiagnosticSink) -> (String, Option<ChartSpec>) {
    let (remaining, spec) = match extract_fenced(text) {
        Some(found) => found,
        None => match extract_inline(text) {
            Some(found) => found,
            None => (text.to_string(), None),
        },
    };

    if let Some(spec) = &spec {
        let keys: Vec<&str> = spec.keys().map(String::as_str).collect();
        sink.info(
            COMPONENT,
            format!("Extracted chart spec from text: {keys:?}"),
        );
    }

    (strip_orphan_lead_in(&remaining), spec)
}

/// Parse `candidate` and keep it only if it looks like a chart spec.
fn as_chart_spec(candidate: &str) -> Option<ChartSpec> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) if map.contains_key("encoding") || map.contains_key("mark") => {
            Some(map)
        }
        _ => None,
    }
}

fn extract_fenced(text: &str) -> Option<(String, Option<ChartSpec>)> {
    for caps in FENCED_JSON_RE.captures_iter(text) {
        let (Some(block), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Some(spec) = as_chart_spec(body.as_str()) {
            let mut remaining = String::with_capacity(text.len());
            remaining.push_str(&text[..block.start()]);
            remaining.push_str(&text[block.end()..]);
            return Some((remaining.trim().to_string(), Some(spec)));
        }
    }
    None
}

fn extract_inline(text: &str) -> Option<(String, Option<ChartSpec>)> {
    for (start, _) in text.match_indices('{') {
        let rest = &text[start..];
        if !rest.contains("\"mark\"") && !rest.contains("\"encoding\"") {
            continue;
        }

        // The object may run to the end of the text.
        if let Ok(value) = serde_json::from_str::<Value>(rest) {
            if let Value::Object(map) = value {
                if map.contains_key("encoding") || map.contains_key("mark") {
                    return Some((text[..start].trim_end().to_string(), Some(map)));
                }
            }
            continue;
        }

        let Some(len) = matching_brace_len(rest) else {
            continue;
        };
        let end = start + len;
        if let Some(spec) = as_chart_spec(&text[start..end]) {
            let remaining = format!("{}{}", &text[..start], &text[end..]);
            return Some((remaining.trim().to_string(), Some(spec)));
        }
    }
    None
}

/// Byte length of the balanced `{...}` at the start of `s`.
///
/// Braces inside JSON string literals are ignored.
fn matching_brace_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
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
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove a trailing "Here's the chart:"-style sentence.
pub fn strip_orphan_lead_in(text: &str) -> String {
    ORPHAN_LEAD_IN_RE.replace(text, "").trim().to_string()
}
