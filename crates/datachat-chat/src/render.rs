//! Render planning.
//!
//! [`RenderPlanner`] decides how each display message of a turn should be
//! drawn and produces [`RenderDirective`]s for a rendering front end. It
//! draws nothing itself. Chart specs are normalized here, tables get a CSV
//! export and a human-readable display copy, and tables without a dedicated
//! chart may get a synthesized one.

use std::sync::Arc;

use chrono::DateTime;

use datachat_core::types::{
    ChartImage, ChartSpec, DisplayMessage, MessageKind, Role, Scalar, TableResult,
};
use datachat_core::DataChatConfig;

use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::fallback::{chart_from_table, FallbackOptions};
use crate::normalizer::{has_data_source, normalize_chart_spec};

const COMPONENT: &str = "render";

/// File name offered for table downloads.
pub const CSV_FILE_NAME: &str = "datachat_results.csv";
pub const CSV_MIME_TYPE: &str = "text/csv";

/// Column-name fragments that suggest a date or time column.
const DATE_HINTS: [&str; 9] = [
    "date", "month", "year", "time", "created", "updated", "day", "week", "quarter",
];

/// Non-null values inspected when deciding whether a column holds epoch seconds.
const TIMESTAMP_SAMPLE: usize = 5;

/// Display format for converted timestamp columns.
const TIMESTAMP_FORMAT: &str = "%b %Y";

// =============================================================================
// Directives
// =============================================================================

/// One drawing instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderDirective {
    /// The user's own question.
    UserText(String),
    ErrorBanner(String),
    Markdown(String),
    /// Collapsible reasoning trace.
    Reasoning(String),
    /// Collapsible SQL code block.
    Sql(String),
    /// A vector chart, ready for the renderer.
    VegaLite(ChartSpec),
    Image(ChartImage),
    /// A result table with its download.
    Table { table: TableResult, csv: CsvExport },
}

/// A downloadable CSV rendition of a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvExport {
    pub file_name: String,
    pub mime_type: String,
    pub content: String,
}

impl CsvExport {
    pub fn from_table(table: &TableResult) -> Self {
        Self {
            file_name: CSV_FILE_NAME.to_string(),
            mime_type: CSV_MIME_TYPE.to_string(),
            content: to_csv(table),
        }
    }
}

/// Presentation switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    pub show_sql: bool,
    pub show_reasoning: bool,
    pub enable_chart_rendering: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_sql: true,
            show_reasoning: false,
            enable_chart_rendering: true,
        }
    }
}

impl RenderOptions {
    pub fn from_config(config: &DataChatConfig) -> Self {
        Self {
            show_sql: config.display.show_sql,
            show_reasoning: config.display.show_reasoning,
            enable_chart_rendering: config.features.enable_chart_rendering,
        }
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Maps display messages to render directives.
#[derive(Clone)]
pub struct RenderPlanner {
    options: RenderOptions,
    sink: Arc<dyn DiagnosticSink>,
}

impl Default for RenderPlanner {
    fn default() -> Self {
        Self::new(RenderOptions::default(), Arc::new(TracingSink))
    }
}

impl RenderPlanner {
    pub fn new(options: RenderOptions, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { options, sink }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Plan a whole turn.
    ///
    /// A fallback chart is only synthesized when no message of the turn
    /// carries a dedicated chart spec.
    pub fn plan_turn(&self, messages: &[DisplayMessage]) -> Vec<RenderDirective> {
        let has_api_chart = messages.iter().any(DisplayMessage::has_chart_spec);
        messages
            .iter()
            .flat_map(|m| self.plan_message(m, has_api_chart))
            .collect()
    }

    /// Plan a single message.
    pub fn plan_message(&self, message: &DisplayMessage, has_api_chart: bool) -> Vec<RenderDirective> {
        let mut out = Vec::new();

        if message.role == Role::User {
            out.push(RenderDirective::UserText(message.content.clone()));
            return out;
        }

        match message.kind {
            MessageKind::Error => out.push(RenderDirective::ErrorBanner(message.content.clone())),
            MessageKind::Reasoning => {
                if self.options.show_reasoning {
                    out.push(RenderDirective::Reasoning(message.content.clone()));
                }
            }
            MessageKind::Sql => {
                if self.options.show_sql {
                    let sql = message.sql_text.as_deref().unwrap_or(&message.content);
                    out.push(RenderDirective::Sql(clean_sql(sql)));
                }
            }
            MessageKind::Chart => {
                self.plan_chart(message, &mut out);
                push_markdown(&message.content, &mut out);
            }
            MessageKind::Data => {
                if let Some(table) = &message.table {
                    self.plan_table(table, has_api_chart, &mut out);
                }
                push_markdown(&message.content, &mut out);
            }
            MessageKind::Text => push_markdown(&message.content, &mut out),
        }

        if message.kind != MessageKind::Sql && self.options.show_sql {
            if let Some(sql) = message.sql_text.as_deref().filter(|s| !s.is_empty()) {
                out.push(RenderDirective::Sql(clean_sql(sql)));
            }
        }

        out
    }

    fn plan_chart(&self, message: &DisplayMessage, out: &mut Vec<RenderDirective>) {
        if let Some(spec) = &message.chart_spec {
            let normalized = normalize_chart_spec(spec, self.sink.as_ref());
            if has_data_source(&normalized) {
                out.push(RenderDirective::VegaLite(normalized));
            } else {
                self.sink
                    .warn(COMPONENT, "Chart spec has no data source, skipping".to_string());
            }
        } else if let Some(image) = &message.chart_image {
            out.push(RenderDirective::Image(image.clone()));
        }
    }

    fn plan_table(&self, table: &TableResult, has_api_chart: bool, out: &mut Vec<RenderDirective>) {
        if table.rows.is_empty() {
            return;
        }
        let display = format_timestamp_columns(table, self.sink.as_ref());
        let csv = CsvExport::from_table(&display);

        let fallback = if !has_api_chart
            && self.options.enable_chart_rendering
            && display.row_count() > 1
        {
            chart_from_table(&display, &FallbackOptions::default())
        } else {
            None
        };

        out.push(RenderDirective::Table {
            table: display,
            csv,
        });
        if let Some(spec) = fallback {
            self.sink
                .debug(COMPONENT, "Synthesized fallback chart for table".to_string());
            out.push(RenderDirective::VegaLite(spec));
        }
    }
}

fn push_markdown(content: &str, out: &mut Vec<RenderDirective>) {
    if !content.is_empty() {
        out.push(RenderDirective::Markdown(content.to_string()));
    }
}

/// Strip code fence markers from SQL text.
pub fn clean_sql(sql: &str) -> String {
    sql.replace("```sql", "").replace("```", "").trim().to_string()
}

// =============================================================================
// Tables
// =============================================================================

/// A display copy of `table` with epoch-second date columns as `"%b %Y"`.
///
/// A column qualifies when its name contains a date hint, every non-null
/// value is numeric and the first few non-null values all lie in
/// (1e9, 3e9). Nulls stay null.
pub fn format_timestamp_columns(table: &TableResult, sink: &dyn DiagnosticSink) -> TableResult {
    let mut display = table.clone();

    for (index, column) in table.columns.iter().enumerate() {
        let lower = column.to_lowercase();
        if !DATE_HINTS.iter().any(|hint| lower.contains(hint)) {
            continue;
        }
        if !is_epoch_seconds_column(table, index) {
            continue;
        }

        for row in &mut display.rows {
            let Some(cell) = row.get_mut(index) else {
                continue;
            };
            if let Some(formatted) = numeric_cell(cell).and_then(format_epoch_seconds) {
                *cell = Scalar::String(formatted);
            }
        }
        sink.info(
            COMPONENT,
            format!("Converted timestamp column '{column}' to readable dates"),
        );
    }

    display
}

fn is_epoch_seconds_column(table: &TableResult, index: usize) -> bool {
    let values: Vec<Option<f64>> = table
        .column_values(index)
        .filter(|c| !c.is_null())
        .map(numeric_cell)
        .collect();
    if values.is_empty() || values.iter().any(Option::is_none) {
        return false;
    }
    values
        .iter()
        .take(TIMESTAMP_SAMPLE)
        .flatten()
        .all(|v| *v > 1e9 && *v < 3e9)
}

fn numeric_cell(cell: &Scalar) -> Option<f64> {
    match cell {
        Scalar::Number(n) => n.as_f64(),
        Scalar::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn format_epoch_seconds(seconds: f64) -> Option<String> {
    DateTime::from_timestamp(seconds.trunc() as i64, 0)
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Render `table` as CSV with a header row.
///
/// Fields containing a comma, a quote or a line break are quoted, with
/// embedded quotes doubled. Nulls are empty fields.
pub fn to_csv(table: &TableResult) -> String {
    let mut out = String::new();
    push_csv_record(&mut out, table.columns.iter().map(String::as_str));
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(Scalar::display_text).collect();
        push_csv_record(&mut out, cells.iter().map(String::as_str));
    }
    out
}

fn push_csv_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use datachat_core::types::VEGA_LITE_SCHEMA;
    use serde_json::{json, Value};

    fn make_planner(options: RenderOptions) -> (RenderPlanner, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (RenderPlanner::new(options, sink.clone()), sink)
    }

    fn make_table(columns: &[&str], rows: Vec<Vec<Scalar>>) -> TableResult {
        TableResult::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    fn make_spec(value: Value) -> ChartSpec {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn sales_table(rows: usize) -> TableResult {
        make_table(
            &["category", "total"],
            (0..rows)
                .map(|i| vec![Scalar::from(format!("c{i}")), Scalar::from(i as i64)])
                .collect(),
        )
    }

    // ---- Message kinds ----

    #[test]
    fn test_error_text_and_user() {
        let (planner, _) = make_planner(RenderOptions::default());
        let plan = planner.plan_turn(&[
            DisplayMessage::user("top sellers?"),
            DisplayMessage::text("Here they are."),
            DisplayMessage::error("quota exceeded"),
            DisplayMessage::text(""),
        ]);
        assert_eq!(
            plan,
            vec![
                RenderDirective::UserText("top sellers?".into()),
                RenderDirective::Markdown("Here they are.".into()),
                RenderDirective::ErrorBanner("quota exceeded".into()),
            ]
        );
    }

    #[test]
    fn test_reasoning_visibility() {
        let msg = DisplayMessage::reasoning("grouping by month");
        let (hidden, _) = make_planner(RenderOptions::default());
        assert!(hidden.plan_message(&msg, false).is_empty());
        let (shown, _) = make_planner(RenderOptions {
            show_reasoning: true,
            ..RenderOptions::default()
        });
        assert_eq!(
            shown.plan_message(&msg, false),
            vec![RenderDirective::Reasoning("grouping by month".into())]
        );
    }

    #[test]
    fn test_sql_visibility_and_fence_stripping() {
        let msg = DisplayMessage::sql("```sql\nSELECT 1\n```");
        let (shown, _) = make_planner(RenderOptions::default());
        assert_eq!(
            shown.plan_message(&msg, false),
            vec![RenderDirective::Sql("SELECT 1".into())]
        );
        let (hidden, _) = make_planner(RenderOptions {
            show_sql: false,
            ..RenderOptions::default()
        });
        assert!(hidden.plan_message(&msg, false).is_empty());
    }

    #[test]
    fn test_sql_attached_to_data_message() {
        let (planner, _) = make_planner(RenderOptions {
            enable_chart_rendering: false,
            ..RenderOptions::default()
        });
        let msg = DisplayMessage::data(sales_table(1), Some("SELECT 1".into()));
        let plan = planner.plan_message(&msg, false);
        assert!(matches!(plan[0], RenderDirective::Table { .. }));
        assert_eq!(plan[1], RenderDirective::Sql("SELECT 1".into()));
    }

    // ---- Charts ----

    #[test]
    fn test_chart_spec_is_normalized() {
        let (planner, _) = make_planner(RenderOptions::default());
        let msg = DisplayMessage::chart_spec(make_spec(json!({
            "$schema": "https://vega.github.io/schema/vega-lite/v4.json",
            "mark": "bar",
            "transform": [{"window": []}],
            "data": {"values": [{"a": 1}]}
        })));
        let plan = planner.plan_message(&msg, true);
        let RenderDirective::VegaLite(spec) = &plan[0] else {
            panic!("expected chart, got {plan:?}");
        };
        assert_eq!(spec["$schema"], VEGA_LITE_SCHEMA);
        assert!(!spec.contains_key("transform"));
    }

    #[test]
    fn test_chart_without_data_source_is_skipped() {
        let (planner, sink) = make_planner(RenderOptions::default());
        let msg = DisplayMessage::chart_spec(make_spec(json!({"mark": "bar", "data": {"values": []}})));
        assert!(planner.plan_message(&msg, true).is_empty());
        assert!(sink.contains("render", "no data source"));
    }

    #[test]
    fn test_chart_image() {
        let (planner, _) = make_planner(RenderOptions::default());
        let image = ChartImage {
            mime_type: Some("image/png".into()),
            bytes: vec![1, 2, 3],
        };
        let plan = planner.plan_message(&DisplayMessage::chart_image(image.clone()), false);
        assert_eq!(plan, vec![RenderDirective::Image(image)]);
    }

    // ---- Tables ----

    #[test]
    fn test_table_with_csv_and_fallback_chart() {
        let (planner, _) = make_planner(RenderOptions::default());
        let plan = planner.plan_turn(&[DisplayMessage::data(sales_table(3), None)]);
        assert_eq!(plan.len(), 2);
        let RenderDirective::Table { table, csv } = &plan[0] else {
            panic!("expected table");
        };
        assert_eq!(table.row_count(), 3);
        assert_eq!(csv.file_name, "datachat_results.csv");
        assert_eq!(csv.mime_type, "text/csv");
        assert!(csv.content.starts_with("category,total\nc0,0\n"));
        assert!(matches!(&plan[1], RenderDirective::VegaLite(spec) if spec["mark"]["type"] == "bar"));
    }

    #[test]
    fn test_no_fallback_chart_when_turn_has_api_chart() {
        let (planner, _) = make_planner(RenderOptions::default());
        let plan = planner.plan_turn(&[
            DisplayMessage::data(sales_table(3), None),
            DisplayMessage::chart_spec(make_spec(json!({"mark": "bar", "data": {"values": [{"a": 1}]}}))),
        ]);
        let charts = plan
            .iter()
            .filter(|d| matches!(d, RenderDirective::VegaLite(_)))
            .count();
        assert_eq!(charts, 1);
    }

    #[test]
    fn test_no_fallback_chart_for_single_row_or_when_disabled() {
        let (planner, _) = make_planner(RenderOptions::default());
        assert_eq!(planner.plan_turn(&[DisplayMessage::data(sales_table(1), None)]).len(), 1);

        let (disabled, _) = make_planner(RenderOptions {
            enable_chart_rendering: false,
            ..RenderOptions::default()
        });
        assert_eq!(disabled.plan_turn(&[DisplayMessage::data(sales_table(5), None)]).len(), 1);
    }

    #[test]
    fn test_table_without_rows_is_not_drawn() {
        let (planner, _) = make_planner(RenderOptions::default());
        let msg = DisplayMessage::data(make_table(&["a"], Vec::new()), None);
        assert!(planner.plan_message(&msg, false).is_empty());
    }

    // ---- Timestamp columns ----

    #[test]
    fn test_epoch_seconds_column_formatted() {
        let table = make_table(
            &["order_month", "orders"],
            vec![
                vec![Scalar::from(1704067200_i64), Scalar::from(10_i64)],
                vec![Scalar::Null, Scalar::from(11_i64)],
                vec![Scalar::from(1706745600_i64), Scalar::from(12_i64)],
            ],
        );
        let sink = RecordingSink::new();
        let display = format_timestamp_columns(&table, &sink);
        assert_eq!(display.rows[0][0], Scalar::from("Jan 2024"));
        assert_eq!(display.rows[1][0], Scalar::Null);
        assert_eq!(display.rows[2][0], Scalar::from("Feb 2024"));
        assert_eq!(display.rows[0][1], Scalar::from(10_i64));
        assert!(sink.contains("render", "order_month"));
        // The source table is untouched.
        assert_eq!(table.rows[0][0], Scalar::from(1704067200_i64));
    }

    #[test]
    fn test_timestamp_needs_name_hint() {
        let table = make_table(&["amount"], vec![vec![Scalar::from(1704067200_i64)]]);
        let display = format_timestamp_columns(&table, &RecordingSink::new());
        assert_eq!(display, table);
    }

    #[test]
    fn test_timestamp_needs_epoch_range() {
        let table = make_table(&["year"], vec![vec![Scalar::from(2024_i64)], vec![Scalar::from(2023_i64)]]);
        let display = format_timestamp_columns(&table, &RecordingSink::new());
        assert_eq!(display, table);
    }

    #[test]
    fn test_timestamp_needs_numeric_column() {
        let table = make_table(
            &["created_at"],
            vec![vec![Scalar::from(1704067200_i64)], vec![Scalar::from("yesterday")]],
        );
        let display = format_timestamp_columns(&table, &RecordingSink::new());
        assert_eq!(display, table);
    }

    // ---- CSV ----

    #[test]
    fn test_csv_quoting() {
        let table = make_table(
            &["name", "note"],
            vec![
                vec![Scalar::from("Acme, Inc."), Scalar::from("said \"hi\"")],
                vec![Scalar::from("plain"), Scalar::Null],
                vec![Scalar::from("multi\nline"), Scalar::from(true)],
            ],
        );
        assert_eq!(
            to_csv(&table),
            "name,note\n\"Acme, Inc.\",\"said \"\"hi\"\"\"\nplain,\n\"multi\nline\",true\n"
        );
    }

    #[test]
    fn test_clean_sql() {
        assert_eq!(clean_sql("```sql\nSELECT *\nFROM t\n```"), "SELECT *\nFROM t");
        assert_eq!(clean_sql("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_options_from_config() {
        let mut config = DataChatConfig::default();
        config.display.show_sql = false;
        config.display.show_reasoning = true;
        config.features.enable_chart_rendering = false;
        let options = RenderOptions::from_config(&config);
        assert!(!options.show_sql);
        assert!(options.show_reasoning);
        assert!(!options.enable_chart_rendering);
    }
}
