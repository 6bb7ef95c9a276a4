//! Tabular result decoding.
//!
//! Turns a backend data result (schema + rows, already plainified) into a
//! [`TableResult`]. Rows come in one of three shapes: variant-wrapped struct
//! rows (`{"fields": {"col": {"stringValue": "x"}}}`), plain mappings keyed by
//! column name, or plain sequences. The exact `data` encoding is preferred;
//! the display-oriented `formattedData` encoding is only consulted when
//! `data` yields no rows at all.

use serde_json::{Map, Value};

use datachat_core::types::{Scalar, TableResult};

use crate::diagnostics::DiagnosticSink;

const COMPONENT: &str = "decoder";

// =============================================================================
// Cell variants
// =============================================================================

/// A tagged cell wrapper as sent by the backend.
#[derive(Clone, Debug, PartialEq)]
pub enum CellVariant {
    String(Value),
    Number(Value),
    Bool(Value),
    Integer(Value),
    Null,
    /// A tag this client does not know; holds the first value found.
    Unknown(Value),
}

impl CellVariant {
    /// Classify a wrapper object.
    ///
    /// Tags are tried in a fixed order (string, number, bool, integer), so a
    /// wrapper carrying several of them resolves to the first.
    pub fn from_wrapper(wrapper: &Map<String, Value>) -> Self {
        if let Some(v) = wrapper.get("stringValue") {
            return CellVariant::String(v.clone());
        }
        if let Some(v) = wrapper.get("numberValue") {
            return CellVariant::Number(v.clone());
        }
        if let Some(v) = wrapper.get("boolValue") {
            return CellVariant::Bool(v.clone());
        }
        if let Some(v) = wrapper.get("integerValue") {
            return CellVariant::Integer(v.clone());
        }
        if wrapper.contains_key("nullValue") {
            return CellVariant::Null;
        }
        match wrapper.values().next() {
            Some(first) => CellVariant::Unknown(first.clone()),
            None => CellVariant::Null,
        }
    }

    pub fn into_scalar(self) -> Scalar {
        match self {
            CellVariant::Null => Scalar::Null,
            CellVariant::Integer(Value::String(s)) => match s.parse::<i64>() {
                Ok(n) => Scalar::from(n),
                Err(_) => Scalar::String(s),
            },
            CellVariant::String(v)
            | CellVariant::Number(v)
            | CellVariant::Bool(v)
            | CellVariant::Integer(v)
            | CellVariant::Unknown(v) => Scalar::from_json(&v),
        }
    }
}

/// Resolve a single cell: wrapper objects are unwrapped, scalars pass through.
/// Every row shape goes through this, plain mappings included: a cell that
/// is still an object is read as a value wrapper, since [`Scalar`] has no map.
fn cell_value(value: &Value) -> Scalar {
    match value {
        Value::Object(wrapper) => CellVariant::from_wrapper(wrapper).into_scalar(),
        other => Scalar::from_json(other),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a plainified data result.
///
/// Returns `None` when the payload is not an object or when it yields
/// neither columns nor rows.
pub fn decode_table(payload: &Value, sink: &dyn DiagnosticSink) -> Option<TableResult> {
    let Some(result) = payload.as_object() else {
        sink.warn(COMPONENT, format!("data result is not an object: {payload}"));
        return None;
    };

    let mut columns = schema_columns(result);
    let mut rows = extract_rows(result.get("data"), &mut columns, sink);

    if rows.is_empty() {
        rows = extract_rows(result.get("formattedData"), &mut columns, sink);
        if !rows.is_empty() {
            sink.debug(
                COMPONENT,
                format!("used formattedData fallback ({} rows)", rows.len()),
            );
        }
    }

    if columns.is_empty() && rows.is_empty() {
        sink.debug(COMPONENT, "data result has no columns and no rows".to_string());
        return None;
    }

    let table = TableResult::new(columns, rows);
    sink.info(
        COMPONENT,
        format!(
            "Parsed data: {} cols, {} rows",
            table.column_count(),
            table.row_count()
        ),
    );
    Some(table)
}

/// Column names from `schema.fields`, in declared order.
fn schema_columns(result: &Map<String, Value>) -> Vec<String> {
    let Some(fields) = result
        .get("schema")
        .and_then(|s| s.get("fields"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            field
                .get("name")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| format!("col_{i}"))
        })
        .collect()
}

/// Rows from one encoding. Fills `columns` from the first mapping row when
/// the schema declared none.
fn extract_rows(
    data: Option<&Value>,
    columns: &mut Vec<String>,
    sink: &dyn DiagnosticSink,
) -> Vec<Vec<Scalar>> {
    let Some(items) = data.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match item {
            Value::Object(row) => {
                let cells = match row.get("fields") {
                    Some(Value::Object(fields)) => fields,
                    _ => row,
                };
                if columns.is_empty() {
                    columns.extend(cells.keys().cloned());
                }
                rows.push(
                    columns
                        .iter()
                        .map(|c| cells.get(c).map(cell_value).unwrap_or(Scalar::Null))
                        .collect(),
                );
            }
            Value::Array(values) => rows.push(values.iter().map(cell_value).collect()),
            other => sink.debug(COMPONENT, format!("skipping row {index}: {other}")),
        }
    }
    rows
}
