//! Record Transformer: one source record → one or more flat rows.
//!
//! # Row layout
//!
//! | #  | Column          | From                                        |
//! |----|-----------------|---------------------------------------------|
//! | 1  | `Deal ID`       | record key (integer when it round-trips)    |
//! | 2  | `Deal Name`     | record                                      |
//! | 3  | `Customer`      | record                                      |
//! | 4  | `Customer ID`   | record                                      |
//! | 5  | `Deal Type`     | record                                      |
//! | 6  | `Phase`         | record status                               |
//! | 7  | `Owner`         | record                                      |
//! | 8  | `Product`       | sub-item category, else record category     |
//! | 9  | `Quantity`      | sub-item                                    |
//! | 10 | `Unit Price`    | sub-item                                    |
//! | 11 | `Line Amount`   | sub-item                                    |
//! | 12 | `Deal Amount`   | record total                                |
//! | 13 | `Expected Close`| record                                      |
//! | 14 | `Created At`    | record                                      |
//! | 15 | `Updated At`    | record                                      |
//! | 16 | `Users`         | derived from the deal name                  |
//! | 17 | `Term`          | derived from the deal name                  |
//!
//! A record without sub-items still yields exactly one row; the sub-item
//! columns are present as empty cells, never omitted.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Cell, OutputRow, SourceRecord, SubItem};

pub const HEADERS: [&str; 17] = [
    "Deal ID",
    "Deal Name",
    "Customer",
    "Customer ID",
    "Deal Type",
    "Phase",
    "Owner",
    "Product",
    "Quantity",
    "Unit Price",
    "Line Amount",
    "Deal Amount",
    "Expected Close",
    "Created At",
    "Updated At",
    "Users",
    "Term",
];

/// Zero-based index of the key column.
pub const KEY_COLUMN: usize = 0;

pub fn transform(record: &SourceRecord) -> Vec<OutputRow> {
    let (users, term) = extract_users_and_term(&record.name);

    let base = [
        key_cell(&record.key),
        Cell::text(record.name.as_str()),
        Cell::opt_text(record.customer_name.as_deref()),
        Cell::opt_int(record.customer_id),
        Cell::opt_text(record.deal_type_name.as_deref()),
        Cell::opt_text(record.status.as_deref()),
        Cell::opt_text(record.owner_name.as_deref()),
    ];

    let tail = [
        Cell::opt_number(record.amount),
        Cell::opt_text(record.expected_close.as_deref()),
        Cell::text(record.created_at.as_str()),
        Cell::text(record.updated_at.as_str()),
        Cell::opt_text(Some(users.as_str())),
        Cell::opt_text(Some(term.as_str())),
    ];

    let build = |item: Option<&SubItem>| -> OutputRow {
        let mut cells = Vec::with_capacity(HEADERS.len());
        cells.extend(base.iter().cloned());
        match item {
            Some(item) => {
                let product = item
                    .category
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .or(record.category.as_deref());
                cells.push(Cell::opt_text(product));
                cells.push(Cell::opt_number(item.quantity));
                cells.push(Cell::opt_number(item.unit_price));
                cells.push(Cell::opt_number(item.amount));
            }
            None => {
                cells.push(Cell::opt_text(record.category.as_deref()));
                cells.extend([Cell::Empty, Cell::Empty, Cell::Empty]);
            }
        }
        cells.extend(tail.iter().cloned());
        OutputRow(cells)
    };

    if record.sub_items.is_empty() {
        vec![build(None)]
    } else {
        record.sub_items.iter().map(|item| build(Some(item))).collect()
    }
}

/// Integer keys are written as numbers so the sheet sorts them naturally,
/// but only when the text survives the round-trip (`"007"` stays text).
fn key_cell(key: &str) -> Cell {
    match key.parse::<i64>() {
        Ok(n) if n.to_string() == key => Cell::Int(n),
        _ => Cell::text(key),
    }
}

// ── Derived fields ──────────────────────────────────────────────────

fn users_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+|X)ユーザー").unwrap())
}

fn term_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+|X)(カ月|ヶ月|か月)").unwrap())
}

/// Pull the seat count and contract term out of a free-text deal name,
/// e.g. `"Trial_10ユーザー_3カ月"` → `("10", "3カ月")`. Missing parts are `""`.
pub fn extract_users_and_term(name: &str) -> (String, String) {
    let users = users_pattern()
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let term = term_pattern()
        .captures(name)
        .map(|c| format!("{}{}", &c[1], &c[2]))
        .unwrap_or_default();

    (users, term)
}
