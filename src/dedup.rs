// src/dedup.rs

use std::collections::HashSet;
use tracing::{info, warn};

use crate::model::Label;

/// Kept and removed items, both in input order.
#[derive(Debug)]
pub struct Deduplicated<T> {
    pub kept: Vec<T>,
    pub removed: Vec<T>,
}

/// First occurrence of each key wins. Empty keys are always kept.
pub fn dedup_by_key<T, F>(items: Vec<T>, key: F) -> Deduplicated<T>
where
    F: Fn(&T) -> &str,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(items.len());
    let mut removed = Vec::new();
    for item in items {
        let k = key(&item);
        if k.is_empty() || seen.insert(k.to_string()) {
            kept.push(item);
        } else {
            removed.push(item);
        }
    }
    Deduplicated { kept, removed }
}

/// Drop labels repeating an invoice number already seen.
pub fn deduplicate(labels: Vec<Label>) -> Deduplicated<Label> {
    let result = dedup_by_key(labels, |l| l.invoice_number.as_str());
    for dup in &result.removed {
        warn!(
            invoice = %dup.invoice_number,
            file = %dup.source.display(),
            page = dup.page_index + 1,
            "Duplicate label removed"
        );
    }
    info!(
        kept = result.kept.len(),
        removed = result.removed.len(),
        "Deduplication done"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rect;
    use std::path::PathBuf;

    fn label(invoice: &str, page: usize) -> Label {
        let mut l = Label::new(PathBuf::from("a.pdf"), page, 0, Rect::new(0.0, 0.0, 1.0, 1.0));
        l.invoice_number = invoice.to_string();
        l
    }

    #[test]
    fn test_duplicate_invoice_removed() {
        let out = deduplicate(vec![label("100", 0), label("100", 1), label("200", 2)]);
        let kept: Vec<_> = out.kept.iter().map(|l| l.invoice_number.as_str()).collect();
        assert_eq!(kept, vec!["100", "200"]);
        assert_eq!(out.removed.len(), 1);
        assert_eq!(out.removed[0].page_index, 1);
    }

    #[test]
    fn test_empty_keys_always_kept_and_order_preserved() {
        let out = dedup_by_key(vec!["", "b", "a", "", "b", "c", "a"], |s| *s);
        assert_eq!(out.kept, vec!["", "b", "a", "", "c"]);
        assert_eq!(out.removed, vec!["b", "a"]);
    }

    #[test]
    fn test_no_kept_key_repeats() {
        let keys = ["7", "3", "7", "", "9", "3", "", "1"];
        let out = dedup_by_key(keys.to_vec(), |s| *s);
        let non_empty: Vec<_> = out.kept.iter().filter(|k| !k.is_empty()).collect();
        let unique: HashSet<_> = non_empty.iter().collect();
        assert_eq!(non_empty.len(), unique.len());
        assert_eq!(out.kept.len() + out.removed.len(), keys.len());
    }
}
