//! Chart-spec repair for the target renderer.
//!
//! The backend emits specs for an older grammar version than the renderer
//! runs. [`normalize_chart_spec`] applies four independent passes to a copy
//! of the spec:
//!
//! 1. drop `transform` when any step is a `window` or `sort` step,
//! 2. drop empty `sort` objects from the `x`/`y`/`color`/`theta` channels,
//! 3. rescale epoch-second temporal fields to milliseconds,
//! 4. pin `$schema` to the supported grammar version.

use serde_json::{Map, Number, Value};

use datachat_core::types::{ChartSpec, VEGA_LITE_SCHEMA};

use crate::diagnostics::DiagnosticSink;

const COMPONENT: &str = "normalizer";

/// Channels whose `sort` may be an empty object.
const SORTABLE_CHANNELS: [&str; 4] = ["x", "y", "color", "theta"];

/// Channels checked for temporal fields.
const TEMPORAL_CHANNELS: [&str; 3] = ["x", "y", "color"];

/// Rows sampled when deciding whether a temporal field is in seconds.
const TEMPORAL_SAMPLE_ROWS: usize = 5;

/// Exclusive bounds of plausible epoch-second values (1973 to 2065).
const EPOCH_SECONDS_MIN: f64 = 1e8;
const EPOCH_SECONDS_MAX: f64 = 3e9;

/// Return a repaired copy of `spec`. The input is left untouched.
pub fn normalize_chart_spec(spec: &ChartSpec, sink: &dyn DiagnosticSink) -> ChartSpec {
    let mut spec = spec.clone();

    drop_window_transforms(&mut spec, sink);
    drop_empty_sorts(&mut spec);
    fix_temporal_units(&mut spec, sink);
    spec.insert(
        "$schema".to_string(),
        Value::String(VEGA_LITE_SCHEMA.to_string()),
    );

    spec
}

fn drop_window_transforms(spec: &mut ChartSpec, sink: &dyn DiagnosticSink) {
    let stale = spec
        .get("transform")
        .and_then(Value::as_array)
        .is_some_and(|steps| {
            steps.iter().any(|step| {
                step.as_object()
                    .is_some_and(|s| s.contains_key("window") || s.contains_key("sort"))
            })
        });

    if stale {
        spec.remove("transform");
        sink.info(
            COMPONENT,
            "Removed incompatible window transform from chart spec".to_string(),
        );
    }
}

fn drop_empty_sorts(spec: &mut ChartSpec) {
    let Some(encoding) = spec.get_mut("encoding").and_then(Value::as_object_mut) else {
        return;
    };
    for channel in SORTABLE_CHANNELS {
        let Some(axis) = encoding.get_mut(channel).and_then(Value::as_object_mut) else {
            continue;
        };
        let empty = match axis.get("sort") {
            Some(Value::Null) => true,
            Some(Value::Object(sort)) => sort.is_empty(),
            _ => false,
        };
        if empty {
            axis.remove("sort");
        }
    }
}

/// Field names bound to temporal channels, in channel order.
fn temporal_fields(spec: &ChartSpec) -> Vec<String> {
    let Some(encoding) = spec.get("encoding").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut fields = Vec::new();
    for channel in TEMPORAL_CHANNELS {
        let Some(axis) = encoding.get(channel).and_then(Value::as_object) else {
            continue;
        };
        if axis.get("type").and_then(Value::as_str) != Some("temporal") {
            continue;
        }
        if let Some(field) = axis.get("field").and_then(Value::as_str) {
            if !field.is_empty() && !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
    }
    fields
}

fn fix_temporal_units(spec: &mut ChartSpec, sink: &dyn DiagnosticSink) {
    let fields = temporal_fields(spec);
    if fields.is_empty() {
        return;
    }
    let Some(values) = spec
        .get_mut("data")
        .and_then(|d| d.get_mut("values"))
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    if values.is_empty() {
        return;
    }

    for field in &fields {
        if !looks_like_epoch_seconds(values, field) {
            continue;
        }
        for row in values.iter_mut() {
            if let Some(cell) = row.as_object_mut().and_then(|r| r.get_mut(field)) {
                if let Some(scaled) = to_millis(cell) {
                    *cell = scaled;
                }
            }
        }
        sink.info(
            COMPONENT,
            format!("Converted temporal field '{field}' from seconds to milliseconds"),
        );
    }
}

/// True when the numeric samples among the first rows are all in epoch-second range.
///
/// Non-numeric samples (strings, nulls, missing keys) are skipped rather than
/// disqualifying the field; at least one numeric sample is required.
fn looks_like_epoch_seconds(rows: &[Value], field: &str) -> bool {
    let samples: Vec<f64> = rows
        .iter()
        .take(TEMPORAL_SAMPLE_ROWS)
        .filter_map(|row| row.get(field).and_then(Value::as_f64))
        .collect();

    !samples.is_empty()
        && samples
            .iter()
            .all(|v| *v > EPOCH_SECONDS_MIN && *v < EPOCH_SECONDS_MAX)
}

/// `value * 1000`, keeping integers integral.
fn to_millis(value: &Value) -> Option<Value> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        if let Some(ms) = i.checked_mul(1000) {
            return Some(Value::Number(ms.into()));
        }
    }
    n.as_f64()
        .and_then(|f| Number::from_f64(f * 1000.0))
        .map(Value::Number)
}

/// True when the spec names a data source the renderer can draw from.
pub fn has_data_source(spec: &Map<String, Value>) -> bool {
    if spec.contains_key("datasets") {
        return true;
    }
    let Some(data) = spec.get("data").and_then(Value::as_object) else {
        return false;
    };
    let truthy = |key: &str| match data.get(key) {
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    };
    truthy("values") || truthy("name") || truthy("url")
}
