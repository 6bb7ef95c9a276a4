//! Fallback chart synthesis for tables that arrive without a chart.
//!
//! The backend's own chart is always preferred. When a turn has none, a
//! simple spec is derived from the shape of the table.

use serde_json::{json, Map, Number, Value};

use datachat_core::types::{ChartSpec, Scalar, TableResult, VEGA_LITE_SCHEMA};

/// Bar/line/point colour.
const CHART_COLOR: &str = "#4285F4";
const CHART_HEIGHT: u32 = 400;

/// Supported fallback chart shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
}

impl std::str::FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bar" => Ok(ChartType::Bar),
            "line" => Ok(ChartType::Line),
            "pie" => Ok(ChartType::Pie),
            "scatter" => Ok(ChartType::Scatter),
            other => Err(format!("unknown chart type: {other}")),
        }
    }
}

/// Overrides for [`chart_from_table`]. Unset fields are detected.
#[derive(Clone, Debug, Default)]
pub struct FallbackOptions {
    pub chart_type: Option<ChartType>,
    pub x_column: Option<String>,
    pub y_column: Option<String>,
    pub title: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnKind {
    Numeric,
    Text,
    Other,
}

/// Build a chart spec from `table`, or `None` when no x/y pair fits.
pub fn chart_from_table(table: &TableResult, options: &FallbackOptions) -> Option<ChartSpec> {
    if table.rows.is_empty() || table.columns.is_empty() {
        return None;
    }

    let kinds = column_kinds(table);
    let (x, y) = match (&options.x_column, &options.y_column) {
        (Some(x), Some(y)) => (x.clone(), y.clone()),
        _ => auto_select_columns(table, &kinds)?,
    };
    let x_index = table.column_index(&x)?;
    let y_index = table.column_index(&y)?;
    let chart_type = options
        .chart_type
        .unwrap_or_else(|| detect_chart_type(table));

    let x_type = field_type(kinds[x_index]);
    let y_type = field_type(kinds[y_index]);
    let tooltip = json!([
        {"field": x, "type": x_type},
        {"field": y, "type": y_type}
    ]);

    let (mark, encoding) = match chart_type {
        ChartType::Bar => (
            json!({"type": "bar", "color": CHART_COLOR}),
            json!({
                "x": {"field": x, "type": x_type, "sort": "-y"},
                "y": {"field": y, "type": y_type},
                "tooltip": tooltip
            }),
        ),
        ChartType::Line => (
            json!({"type": "line", "color": CHART_COLOR, "point": true}),
            json!({
                "x": {"field": x, "type": x_type},
                "y": {"field": y, "type": y_type},
                "tooltip": tooltip
            }),
        ),
        ChartType::Pie => (
            json!({"type": "arc"}),
            json!({
                "theta": {"field": y, "type": "quantitative"},
                "color": {"field": x, "type": "nominal"},
                "tooltip": tooltip
            }),
        ),
        ChartType::Scatter => (
            json!({"type": "circle", "color": CHART_COLOR, "size": 60}),
            json!({
                "x": {"field": x, "type": x_type},
                "y": {"field": y, "type": y_type},
                "tooltip": tooltip
            }),
        ),
    };

    let mut spec = Map::new();
    spec.insert("$schema".into(), json!(VEGA_LITE_SCHEMA));
    spec.insert("title".into(), json!(options.title));
    spec.insert("width".into(), json!("container"));
    spec.insert("height".into(), json!(CHART_HEIGHT));
    spec.insert("data".into(), json!({"values": data_values(table, &kinds)}));
    spec.insert("mark".into(), mark);
    spec.insert("encoding".into(), encoding);
    spec.insert(
        "params".into(),
        json!([{"name": "zoom", "select": "interval", "bind": "scales"}]),
    );
    Some(spec)
}

fn detect_chart_type(table: &TableResult) -> ChartType {
    let rows = table.row_count();
    if table.column_count() == 2 && rows <= 20 {
        return ChartType::Bar;
    }
    let has_date_column = table.columns.iter().any(|c| {
        let lower = c.to_lowercase();
        lower.contains("date") || lower.contains("month")
    });
    if has_date_column {
        return ChartType::Line;
    }
    ChartType::Bar
}

/// x is the first text column, y the first numeric column other than x.
/// Falls back to the first two columns.
fn auto_select_columns(table: &TableResult, kinds: &[ColumnKind]) -> Option<(String, String)> {
    let columns = &table.columns;
    if columns.len() < 2 {
        return None;
    }
    let x = columns
        .iter()
        .zip(kinds)
        .find(|(_, kind)| **kind == ColumnKind::Text)
        .map_or(&columns[0], |(column, _)| column);
    let y = columns
        .iter()
        .zip(kinds)
        .find(|(column, kind)| **kind == ColumnKind::Numeric && *column != x)
        .map(|(column, _)| column)
        .or_else(|| columns.iter().find(|column| *column != x))?;
    Some((x.clone(), y.clone()))
}

fn column_kinds(table: &TableResult) -> Vec<ColumnKind> {
    (0..table.column_count())
        .map(|index| {
            let mut seen = false;
            let mut all_numeric = true;
            let mut any_text = false;
            for cell in table.column_values(index).filter(|c| !c.is_null()) {
                seen = true;
                match cell {
                    Scalar::Number(_) => {}
                    Scalar::String(s) if s.trim().parse::<f64>().is_ok() => {}
                    Scalar::String(_) => {
                        all_numeric = false;
                        any_text = true;
                    }
                    _ => all_numeric = false,
                }
            }
            match (seen, all_numeric, any_text) {
                (true, true, _) => ColumnKind::Numeric,
                (true, false, true) => ColumnKind::Text,
                _ => ColumnKind::Other,
            }
        })
        .collect()
}

fn field_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Numeric => "quantitative",
        _ => "nominal",
    }
}

/// Rows as field maps, with numeric text in numeric columns converted.
fn data_values(table: &TableResult, kinds: &[ColumnKind]) -> Vec<Value> {
    table
        .rows
        .iter()
        .map(|row| {
            let record: Map<String, Value> = table
                .columns
                .iter()
                .zip(row)
                .zip(kinds)
                .map(|((column, cell), kind)| {
                    let value = match (kind, cell) {
                        (ColumnKind::Numeric, Scalar::String(s)) => numeric_text(s),
                        _ => cell.to_json(),
                    };
                    (column.clone(), value)
                })
                .collect();
            Value::Object(record)
        })
        .collect()
}

fn numeric_text(s: &str) -> Value {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Value::Number(i.into());
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| Value::String(s.to_string()), Value::Number)
}
