//! Streamed message parser.
//!
//! Fans one backend [`ProtocolMessage`] out into the ordered
//! [`DisplayMessage`]s it describes: text (with charts found inside it), sql,
//! data, chart, reasoning and error. A malformed part is reported and skipped
//! without affecting its siblings.

use std::sync::Arc;

use serde_json::Value;

use datachat_core::types::{ChartImage, ChartSpec, DisplayMessage, VEGA_LITE_SCHEMA};

use crate::decoder::decode_table;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::extractor::extract_chart_spec;
use crate::protocol::{
    AnalysisMessage, ChartMessage, DataMessage, ErrorMessage, Payload, ProtocolMessage,
    SystemMessage, TextMessage,
};

const COMPONENT: &str = "parser";

/// Converts protocol messages into display messages.
#[derive(Clone)]
pub struct MessageParser {
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl MessageParser {
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &dyn DiagnosticSink {
        self.sink.as_ref()
    }

    /// Parse one protocol message into zero or more display messages.
    ///
    /// User echoes and empty messages produce nothing.
    pub fn parse(&self, message: &ProtocolMessage) -> Vec<DisplayMessage> {
        match message {
            ProtocolMessage::UserEcho(_) | ProtocolMessage::Empty => Vec::new(),
            ProtocolMessage::System(system) => self.parse_system(system),
        }
    }

    fn parse_system(&self, system: &SystemMessage) -> Vec<DisplayMessage> {
        let mut out = Vec::new();

        if let Some(text) = self.part(&system.text, "text") {
            self.parse_text(text, &mut out);
        }
        if let Some(data) = self.part(&system.data, "data") {
            self.parse_data(data, &mut out);
        }
        if let Some(chart) = self.part(&system.chart, "chart") {
            self.parse_chart(chart, &mut out);
        }
        if let Some(analysis) = self.part(&system.analysis, "analysis") {
            self.parse_analysis(analysis, &mut out);
        }
        if let Some(error) = self.part(&system.error, "error") {
            self.parse_error(error, &mut out);
        }

        out
    }

    /// The parsed part, or `None` after reporting a malformed one.
    fn part<'m, T>(&self, payload: &'m Option<Payload<T>>, name: &str) -> Option<&'m T> {
        match payload.as_ref()? {
            Payload::Parsed(inner) => Some(inner),
            Payload::Malformed(reason) => {
                self.sink
                    .warn(COMPONENT, format!("Skipping malformed {name} part: {reason}"));
                None
            }
        }
    }

    fn parse_text(&self, text: &TextMessage, out: &mut Vec<DisplayMessage>) {
        let joined = text.parts.join(" ");
        if joined.trim().is_empty() {
            return;
        }

        let (clean, spec) = extract_chart_spec(&joined, self.sink());
        if let Some(mut spec) = spec {
            ensure_schema(&mut spec);
            out.push(DisplayMessage::chart_spec(spec));
        }
        if !clean.trim().is_empty() {
            out.push(DisplayMessage::text(clean));
        }
    }

    fn parse_data(&self, data: &DataMessage, out: &mut Vec<DisplayMessage>) {
        let sql = data
            .generated_sql
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if let Some(sql) = &sql {
            out.push(DisplayMessage::sql(sql.clone()));
        }

        let Some(result) = &data.result else {
            return;
        };
        if result.is_null() {
            return;
        }
        if let Some(table) = decode_table(&result.plainify(), self.sink()) {
            out.push(DisplayMessage::data(table, sql));
        }
    }

    fn parse_chart(&self, chart: &ChartMessage, out: &mut Vec<DisplayMessage>) {
        let Some(result) = &chart.result else {
            return;
        };

        if let Some(config) = result.vega_config.as_ref().filter(|c| !c.is_null()) {
            match config.plainify() {
                Value::Object(mut spec) if !spec.is_empty() => {
                    ensure_schema(&mut spec);
                    let keys: Vec<&str> = spec.keys().map(String::as_str).collect();
                    self.sink
                        .info(COMPONENT, format!("Chart spec parsed: {keys:?}"));
                    out.push(DisplayMessage::chart_spec(spec));
                }
                Value::Object(_) => {}
                other => self.sink.warn(
                    COMPONENT,
                    format!("Failed to parse chart vega config: expected an object, got {other}"),
                ),
            }
        }

        if let Some(blob) = &result.image {
            match blob.bytes() {
                Ok(Some(bytes)) => out.push(DisplayMessage::chart_image(ChartImage {
                    mime_type: blob.mime_type.clone(),
                    bytes,
                })),
                Ok(None) => {}
                Err(e) => self
                    .sink
                    .warn(COMPONENT, format!("Failed to decode chart image: {e}")),
            }
        }
    }

    fn parse_analysis(&self, analysis: &AnalysisMessage, out: &mut Vec<DisplayMessage>) {
        let Some(event) = analysis.progress_event.as_ref().filter(|e| !is_blank(e)) else {
            return;
        };
        out.push(DisplayMessage::reasoning(describe_progress(event)));
    }

    fn parse_error(&self, error: &ErrorMessage, out: &mut Vec<DisplayMessage>) {
        if let Some(text) = error.text.as_deref().filter(|t| !t.is_empty()) {
            out.push(DisplayMessage::error(text));
        }
    }
}

/// Parse one message with a throwaway parser bound to `sink`.
pub fn parse_message(message: &ProtocolMessage, sink: Arc<dyn DiagnosticSink>) -> Vec<DisplayMessage> {
    MessageParser::new(sink).parse(message)
}

fn ensure_schema(spec: &mut ChartSpec) {
    spec.entry("$schema")
        .or_insert_with(|| Value::String(VEGA_LITE_SCHEMA.to_string()));
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Human-readable rendering of an analysis progress event.
fn describe_progress(event: &Value) -> String {
    match event {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}: {s}"),
                other => format!("{key}: {other}"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}
