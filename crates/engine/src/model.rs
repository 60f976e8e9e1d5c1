use std::collections::HashSet;

use serde::ser::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// Source side
// ---------------------------------------------------------------------------

/// One record from the source, fetched fresh on every run.
///
/// `key` is the sole join key between source and destination and must be
/// stable across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRecord {
    pub key: String,
    pub name: String,
    pub customer_name: Option<String>,
    pub customer_id: Option<i64>,
    pub deal_type_id: Option<i64>,
    pub deal_type_name: Option<String>,
    /// Phase name; matched exactly against the status filter.
    pub status: Option<String>,
    pub owner_name: Option<String>,
    /// The record's own product name; matched by the category filter.
    pub category: Option<String>,
    pub amount: Option<f64>,
    pub expected_close: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub sub_items: Vec<SubItem>,
}

/// A nested line item, expanded into its own output row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubItem {
    pub product_id: Option<i64>,
    pub category: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub amount: Option<f64>,
}

// ---------------------------------------------------------------------------
// Destination side
// ---------------------------------------------------------------------------

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Int(i64),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// `None` and empty strings both become `Empty`.
    pub fn opt_text(s: Option<&str>) -> Self {
        match s {
            Some(s) if !s.is_empty() => Cell::Text(s.to_string()),
            _ => Cell::Empty,
        }
    }

    pub fn opt_number(n: Option<f64>) -> Self {
        n.map(Cell::Number).unwrap_or(Cell::Empty)
    }

    pub fn opt_int(n: Option<i64>) -> Self {
        n.map(Cell::Int).unwrap_or(Cell::Empty)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Text form used for CSV export and key comparison.
    /// Integral floats render without a fractional part (`3.0` → `"3"`).
    pub fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => format!("{}", n),
            Cell::Int(n) => n.to_string(),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Empty => serializer.serialize_str(""),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Cell::Number(_) => serializer.serialize_str(""),
            Cell::Int(n) => serializer.serialize_i64(*n),
        }
    }
}

/// One destination row. Arity always equals `HEADERS.len()`; the first
/// cell holds the record key.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct OutputRow(pub Vec<Cell>);

impl OutputRow {
    pub fn key(&self) -> String {
        self.0.first().map(Cell::render).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.0
    }

    pub fn rendered(&self) -> Vec<String> {
        self.0.iter().map(Cell::render).collect()
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Normalize a key read back from the destination.
///
/// Spreadsheets hand integral ids back as `"12"`, `12` or `12.0` depending on
/// the render option, so a trailing all-zero fraction is dropped. Blank cells
/// yield `None`.
pub fn normalize_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some((int_part, frac)) = trimmed.split_once('.') {
        let digits = int_part.strip_prefix('-').unwrap_or(int_part);
        if !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
            && !frac.is_empty()
            && frac.bytes().all(|b| b == b'0')
        {
            return Some(int_part.to_string());
        }
    }
    Some(trimmed.to_string())
}

/// Key text for a JSON cell value (numbers, strings; `null` → `None`).
pub fn key_from_json(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => normalize_key(s),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                normalize_key(&n.to_string())
            }
        }
        other => normalize_key(&other.to_string()),
    }
}

/// Keys currently present in the destination.
///
/// Built from the raw key column, so a record spanning several rows
/// appears once. First-seen order is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeySet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_column<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for value in values {
            if let Some(key) = normalize_key(value.as_ref()) {
                set.insert(key);
            }
        }
        set
    }

    /// Returns `false` if the key was already present.
    pub fn insert(&mut self, key: String) -> bool {
        if self.members.contains(&key) {
            return false;
        }
        self.members.insert(key.clone());
        self.order.push(key);
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(" 12 ").as_deref(), Some("12"));
        assert_eq!(normalize_key("12.0").as_deref(), Some("12"));
        assert_eq!(normalize_key("-7.00").as_deref(), Some("-7"));
        assert_eq!(normalize_key("12.5").as_deref(), Some("12.5"));
        assert_eq!(normalize_key("v1.0").as_deref(), Some("v1.0"));
        assert_eq!(normalize_key("012").as_deref(), Some("012"));
        assert_eq!(normalize_key("   "), None);
    }

    #[test]
    fn test_key_from_json() {
        assert_eq!(key_from_json(&serde_json::json!(42)).as_deref(), Some("42"));
        assert_eq!(key_from_json(&serde_json::json!(42.0)).as_deref(), Some("42"));
        assert_eq!(key_from_json(&serde_json::json!("42")).as_deref(), Some("42"));
        assert_eq!(key_from_json(&serde_json::json!("")), None);
        assert_eq!(key_from_json(&serde_json::Value::Null), None);
    }

    #[test]
    fn test_key_set_dedups_and_keeps_order() {
        let set = KeySet::from_column(["3", "1", "3", "", "2", "1.0"]);
        let keys: Vec<&String> = set.iter().collect();
        assert_eq!(keys, ["3", "1", "2"]);
        assert_eq!(set.len(), 3);
        assert!(set.contains("1"));
        assert!(!set.contains(""));
    }

    #[test]
    fn test_cell_render() {
        assert_eq!(Cell::Number(3.0).render(), "3");
        assert_eq!(Cell::Number(2.5).render(), "2.5");
        assert_eq!(Cell::Int(-4).render(), "-4");
        assert_eq!(Cell::Empty.render(), "");
        assert_eq!(Cell::opt_text(Some("")), Cell::Empty);
    }

    #[test]
    fn test_cell_serializes_as_scalars() {
        let row = OutputRow(vec![
            Cell::Int(1),
            Cell::text("a"),
            Cell::Empty,
            Cell::Number(1.5),
        ]);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json, serde_json::json!([1, "a", "", 1.5]));
        assert_eq!(row.key(), "1");
    }
}
