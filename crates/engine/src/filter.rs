use crate::model::SourceRecord;

/// Inclusion filter over two independent predicates.
///
/// An empty `category` and an empty `statuses` list both mean
/// "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Case-insensitive substring, matched against the record's category
    /// or any sub-item's category.
    pub category: String,
    /// Exact status names; the record's status must be one of them.
    pub statuses: Vec<String>,
}

impl RecordFilter {
    pub fn new(category: impl Into<String>, statuses: Vec<String>) -> Self {
        Self {
            category: category.into(),
            statuses,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.category.is_empty() && self.statuses.is_empty()
    }
}

pub fn include(record: &SourceRecord, filter: &RecordFilter) -> bool {
    if !filter.statuses.is_empty() {
        let Some(status) = record.status.as_deref() else {
            return false;
        };
        if !filter.statuses.iter().any(|s| s == status) {
            return false;
        }
    }

    if filter.category.is_empty() {
        return true;
    }

    let needle = filter.category.to_lowercase();
    let matches = |category: Option<&str>| {
        category
            .map(|c| c.to_lowercase().contains(&needle))
            .unwrap_or(false)
    };

    matches(record.category.as_deref())
        || record
            .sub_items
            .iter()
            .any(|item| matches(item.category.as_deref()))
}

/// Split a comma-separated status list: `"Won, Lost,,"` → `["Won", "Lost"]`.
pub fn parse_status_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubItem;

    fn rec(status: Option<&str>, category: Option<&str>, sub: &[&str]) -> SourceRecord {
        SourceRecord {
            key: "1".into(),
            status: status.map(String::from),
            category: category.map(String::from),
            sub_items: sub
                .iter()
                .map(|c| SubItem {
                    category: Some(c.to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_unrestricted_passes_everything() {
        let filter = RecordFilter::default();
        assert!(filter.is_unrestricted());
        assert!(include(&rec(None, None, &[]), &filter));
        assert!(include(&rec(Some("Lost"), Some("x"), &[]), &filter));
    }

    #[test]
    fn test_status_exact_membership() {
        let filter = RecordFilter::new("", vec!["Won".into(), "Closed".into()]);
        assert!(include(&rec(Some("Won"), None, &[]), &filter));
        assert!(!include(&rec(Some("won"), None, &[]), &filter));
        assert!(!include(&rec(Some("Won "), None, &[]), &filter));
        assert!(!include(&rec(None, None, &[]), &filter));
    }

    #[test]
    fn test_status_checked_before_category() {
        let filter = RecordFilter::new("suite", vec!["Won".into()]);
        assert!(!include(&rec(Some("Lost"), Some("Suite"), &[]), &filter));
    }

    #[test]
    fn test_category_case_insensitive_substring() {
        let filter = RecordFilter::new("SUITE", vec![]);
        assert!(include(&rec(None, Some("Design Suite Pro"), &[]), &filter));
        assert!(!include(&rec(None, Some("Viewer"), &[]), &filter));
        assert!(!include(&rec(None, None, &[]), &filter));
    }

    #[test]
    fn test_category_matches_any_sub_item() {
        let filter = RecordFilter::new("suite", vec![]);
        assert!(include(&rec(None, Some("Bundle"), &["Seats", "suite addon"]), &filter));
        assert!(!include(&rec(None, Some("Bundle"), &["Seats"]), &filter));
    }

    #[test]
    fn test_parse_status_list() {
        assert_eq!(parse_status_list("Won, Lost,,"), vec!["Won", "Lost"]);
        assert_eq!(parse_status_list("  "), Vec::<String>::new());
        assert_eq!(parse_status_list("受注"), vec!["受注"]);
    }
}
