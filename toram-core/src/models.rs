//! Data models for normalized Toram item data.

use rusqlite::types::Value;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Item header shared by equipment and crystals
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub sell_price: String,
    pub secondary_cost: String, // process cost for crystals, buy price for equipment
    pub description: String,
}

/// Attribute value as read from a stat cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl StatValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatValue::Integer(i) => Some(*i as f64),
            StatValue::Real(f) => Some(*f),
            StatValue::Text(_) => None,
        }
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Integer(i) => write!(f, "{}", i),
            StatValue::Real(r) => write!(f, "{}", r),
            StatValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub id: u32,
    pub item_id: i64,
    pub label: String,
    pub value: StatValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDrop {
    pub id: u32,
    pub item_id: i64,
    pub monster_name: String,
    pub monster_url: String,
    pub monster_level: String,
    pub location_name: String,
    pub location_url: String,
}

/// Crystal usage entry ("Used For" section)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub id: u32,
    pub item_id: i64,
    pub usage_type: String,
    pub item_name: String,
    pub item_url: String,
    pub location_name: String,
    pub location_url: String,
}

/// Normalized aggregate for one source row.
///
/// `usage` is only populated by the dedicated crystal table path. Child ids restart
/// at 1 for every item and are not unique across items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompleteView {
    pub table: String,
    pub item: Item,
    pub attributes: Vec<Attribute>,
    pub drops: Vec<ItemDrop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Vec<Usage>>,
}

impl CompleteView {
    pub fn usage(&self) -> &[Usage] {
        self.usage.as_deref().unwrap_or(&[])
    }
}

/// One row of a legacy table, keyed by physical column name.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    cells: HashMap<String, Value>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.cells.insert(column.into(), value);
    }

    /// Builder-style insert, mostly for tests.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value.into());
        self
    }

    /// Cell value; `None` when the column is absent or NULL.
    pub fn get(&self, column: &str) -> Option<&Value> {
        match self.cells.get(column) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    /// Rendered cell text when the cell is non-null (empty text included).
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).map(render_value)
    }

    /// Rendered cell text when the cell holds something meaningful
    /// (not NULL, not empty text, not zero).
    pub fn present_text(&self, column: &str) -> Option<String> {
        self.get(column).filter(|v| is_truthy(v)).map(render_value)
    }

    /// Rendered text of a present cell, or an empty string.
    pub fn text_or_empty(&self, column: &str) -> String {
        self.present_text(column).unwrap_or_default()
    }

    /// First non-null cell among `columns`.
    pub fn first_text(&self, columns: &[&str]) -> Option<String> {
        columns.iter().find_map(|c| self.text(c))
    }

    /// Numeric `id` column, 0 when missing or unparseable.
    pub fn id(&self) -> i64 {
        match self.get("id") {
            Some(Value::Integer(i)) => *i,
            Some(Value::Real(f)) if f.is_finite() => *f as i64,
            Some(Value::Text(s)) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }
}

impl FromIterator<(String, Value)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().collect(),
        }
    }
}

/// NULL, empty text, empty blobs and numeric zero count as absent.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Integer(i) => *i != 0,
        Value::Real(f) => *f != 0.0 && !f.is_nan(),
        Value::Text(s) => !s.is_empty(),
        Value::Blob(b) => !b.is_empty(),
    }
}

pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}
