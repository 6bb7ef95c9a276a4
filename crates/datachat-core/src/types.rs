use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

// =============================================================================
// Enums
// =============================================================================

/// Author of a display message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The conversational-analytics backend.
    Assistant,
}

/// What a display message carries. Determines which optional fields are set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Prose.
    Text,
    /// A decoded result table.
    Data,
    /// A chart, either as a vector spec or a rasterized image.
    Chart,
    /// A generated query.
    Sql,
    /// A progress or trace event from the backend's analysis step.
    Reasoning,
    /// A failure reported by the backend or by the stream itself.
    Error,
}

impl MessageKind {
    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Data => "data",
            MessageKind::Chart => "chart",
            MessageKind::Sql => "sql",
            MessageKind::Reasoning => "reasoning",
            MessageKind::Error => "error",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Chart specification
// =============================================================================

/// A visualization-grammar chart specification.
///
/// Treated as an opaque JSON mapping; only `data.values`, `encoding`,
/// `transform` and `$schema` are ever inspected.
pub type ChartSpec = Map<String, Value>;

/// The grammar version the downstream renderer accepts.
pub const VEGA_LITE_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";

/// A rasterized chart, used when no vector spec is available.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartImage {
    /// MIME type reported by the backend, if any.
    pub mime_type: Option<String>,
    /// Raw image bytes.
    pub bytes: Vec<u8>,
}

// =============================================================================
// Table cells and results
// =============================================================================

/// A single table cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// Convert a plain JSON value into a cell.
    ///
    /// Arrays and objects have no scalar form and are kept as their JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => Scalar::Number(n.clone()),
            Value::String(s) => Scalar::String(s.clone()),
            other => Scalar::String(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Numeric value of the cell, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text used when the cell is shown or exported. Null renders as empty.
    pub fn display_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Number(n) => Value::Number(n.clone()),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n.into())
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// A decoded result table: named columns and positionally aligned rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl TableResult {
    /// Build a table, reconciling every row to the column count.
    ///
    /// Short rows are padded with nulls. A row wider than the column list
    /// extends it with synthesized `col_{i}` names so no value is dropped.
    pub fn new(mut columns: Vec<String>, mut rows: Vec<Vec<Scalar>>) -> Self {
        let widest = rows.iter().map(Vec::len).max().unwrap_or(0);
        while columns.len() < widest {
            columns.push(format!("col_{}", columns.len()));
        }
        for row in &mut rows {
            row.resize(columns.len(), Scalar::Null);
        }
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// True when there is nothing to show at all.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }

    /// Position of the first column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate the cells of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Scalar> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }
}

// =============================================================================
// DisplayMessage
// =============================================================================

/// One renderable unit produced from the backend's response stream.
///
/// Created by the message parser and never mutated afterwards. Use the
/// constructors so that the optional fields always match `kind`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayMessage {
    pub role: Role,
    pub kind: MessageKind,
    /// Plain text; empty for pure data/chart messages.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_spec: Option<ChartSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_image: Option<ChartImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_text: Option<String>,
}

impl DisplayMessage {
    fn assistant(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            kind,
            content: content.into(),
            table: None,
            chart_spec: None,
            chart_image: None,
            sql_text: None,
        }
    }

    /// The user's own question, as displayed by the caller.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            ..Self::assistant(MessageKind::Text, content)
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::assistant(MessageKind::Text, content)
    }

    /// A generated query. The text is carried both as content and `sql_text`.
    pub fn sql(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            sql_text: Some(sql.clone()),
            ..Self::assistant(MessageKind::Sql, sql)
        }
    }

    /// A result table, optionally correlated with the query that produced it.
    pub fn data(table: TableResult, sql_text: Option<String>) -> Self {
        Self {
            table: Some(table),
            sql_text,
            ..Self::assistant(MessageKind::Data, "")
        }
    }

    pub fn chart_spec(spec: ChartSpec) -> Self {
        Self {
            chart_spec: Some(spec),
            ..Self::assistant(MessageKind::Chart, "")
        }
    }

    pub fn chart_image(image: ChartImage) -> Self {
        Self {
            chart_image: Some(image),
            ..Self::assistant(MessageKind::Chart, "")
        }
    }

    pub fn reasoning(content: impl Into<String>) -> Self {
        Self::assistant(MessageKind::Reasoning, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::assistant(MessageKind::Error, content)
    }

    /// True for a chart message carrying a vector spec.
    pub fn has_chart_spec(&self) -> bool {
        self.kind == MessageKind::Chart && self.chart_spec.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ---- Enums ----

    #[test]
    fn test_message_kind_serialization() {
        let kinds = [
            (MessageKind::Text, "\"text\""),
            (MessageKind::Data, "\"data\""),
            (MessageKind::Chart, "\"chart\""),
            (MessageKind::Sql, "\"sql\""),
            (MessageKind::Reasoning, "\"reasoning\""),
            (MessageKind::Error, "\"error\""),
        ];
        for (kind, expected) in kinds {
            assert_eq!(serde_json::to_string(&kind).unwrap(), expected);
            assert_eq!(format!("\"{}\"", kind), expected);
        }
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    // ---- Scalar ----

    #[test]
    fn test_scalar_from_json_scalars() {
        assert_eq!(Scalar::from_json(&Value::Null), Scalar::Null);
        assert_eq!(Scalar::from_json(&json!(true)), Scalar::Bool(true));
        assert_eq!(Scalar::from_json(&json!(3)), Scalar::from(3_i64));
        assert_eq!(Scalar::from_json(&json!("x")), Scalar::from("x"));
    }

    #[test]
    fn test_scalar_from_json_compound_becomes_text() {
        let cell = Scalar::from_json(&json!([1, 2]));
        assert_eq!(cell, Scalar::from("[1,2]"));
    }

    #[test]
    fn test_scalar_display_text() {
        assert_eq!(Scalar::Null.display_text(), "");
        assert_eq!(Scalar::from(42_i64).display_text(), "42");
        assert_eq!(Scalar::from(false).display_text(), "false");
        assert_eq!(Scalar::from("abc").display_text(), "abc");
    }

    #[test]
    fn test_scalar_untagged_serialization() {
        let row = vec![Scalar::Null, Scalar::from(1_i64), Scalar::from("a")];
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"[null,1,"a"]"#);
    }

    // ---- TableResult ----

    #[test]
    fn test_table_pads_short_rows() {
        let table = TableResult::new(
            vec!["a".into(), "b".into()],
            vec![vec![Scalar::from(1_i64)], vec![]],
        );
        assert_eq!(table.rows[0], vec![Scalar::from(1_i64), Scalar::Null]);
        assert_eq!(table.rows[1], vec![Scalar::Null, Scalar::Null]);
    }

    #[test]
    fn test_table_extends_columns_for_wide_rows() {
        let table = TableResult::new(vec![], vec![vec![Scalar::from(1_i64), Scalar::from(2_i64)]]);
        assert_eq!(table.columns, vec!["col_0", "col_1"]);
        assert_eq!(table.rows[0].len(), 2);
    }

    #[test]
    fn test_table_is_empty() {
        assert!(TableResult::default().is_empty());
        let headers_only = TableResult::new(vec!["a".into()], vec![]);
        assert!(!headers_only.is_empty());
    }

    #[test]
    fn test_table_column_lookup() {
        let table = TableResult::new(
            vec!["city".into(), "total".into()],
            vec![
                vec![Scalar::from("Oslo"), Scalar::from(3_i64)],
                vec![Scalar::from("Rome"), Scalar::from(5_i64)],
            ],
        );
        assert_eq!(table.column_index("total"), Some(1));
        assert_eq!(table.column_index("missing"), None);
        let totals: Vec<f64> = table.column_values(1).filter_map(Scalar::as_f64).collect();
        assert_eq!(totals, vec![3.0, 5.0]);
    }

    // ---- DisplayMessage ----

    #[test]
    fn test_sql_message_carries_sql_text() {
        let msg = DisplayMessage::sql("SELECT 1");
        assert_eq!(msg.kind, MessageKind::Sql);
        assert_eq!(msg.content, "SELECT 1");
        assert_eq!(msg.sql_text.as_deref(), Some("SELECT 1"));
        assert_eq!(msg.role, Role::Assistant);
    }

    #[test]
    fn test_user_message_role() {
        let msg = DisplayMessage::user("how many orders?");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.kind, MessageKind::Text);
    }

    #[test]
    fn test_chart_constructors_populate_one_payload() {
        let spec_msg = DisplayMessage::chart_spec(Map::new());
        assert!(spec_msg.chart_spec.is_some());
        assert!(spec_msg.chart_image.is_none());
        assert!(spec_msg.has_chart_spec());

        let image_msg = DisplayMessage::chart_image(ChartImage {
            mime_type: Some("image/png".into()),
            bytes: vec![1, 2, 3],
        });
        assert!(image_msg.chart_spec.is_none());
        assert!(image_msg.chart_image.is_some());
        assert!(!image_msg.has_chart_spec());
    }

    #[test]
    fn test_display_message_skips_absent_fields() {
        let json = serde_json::to_value(DisplayMessage::text("hi")).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["kind"], "text");
        assert!(!obj.contains_key("table"));
        assert!(!obj.contains_key("chart_spec"));
        assert!(!obj.contains_key("sql_text"));
    }
}
