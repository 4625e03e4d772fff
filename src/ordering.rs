// src/ordering.rs

use std::cmp::Ordering;

use crate::model::{Label, ProductLine};

/// Sort key of a product: code, color, numeric size, raw size.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProductKey {
    pub code: String,
    pub color: String,
    pub size_number: u32,
    pub size: String,
}

/// Split a variant like "Preto,38" or "Azul/M" on the first `,` or `/`.
pub fn split_variant(variant: &str) -> (String, String) {
    match variant.find([',', '/']) {
        Some(at) => (
            variant[..at].trim().to_string(),
            variant[at + 1..].trim().to_string(),
        ),
        None => (variant.trim().to_string(), String::new()),
    }
}

pub fn product_key(code: &str, variant: &str) -> ProductKey {
    let (color, size) = split_variant(variant);
    let digits: String = size.chars().take_while(char::is_ascii_digit).collect();
    ProductKey {
        code: code.trim().to_string(),
        color,
        size_number: digits.parse().unwrap_or(u32::MAX),
        size,
    }
}

impl ProductLine {
    pub fn sort_key(&self) -> ProductKey {
        product_key(&self.code, &self.variant)
    }
}

/// Quantity-1 lines first by key, then the rest by (quantity, key).
pub fn order_products(lines: &mut [ProductLine]) {
    lines.sort_by(|a, b| two_bucket(a.quantity, &a.sort_key(), b.quantity, &b.sort_key()));
}

fn two_bucket(qa: u32, ka: &ProductKey, qb: u32, kb: &ProductKey) -> Ordering {
    let bucket = |q: u32| u8::from(q > 1);
    bucket(qa)
        .cmp(&bucket(qb))
        .then_with(|| if qa > 1 { qa.cmp(&qb) } else { Ordering::Equal })
        .then_with(|| ka.cmp(kb))
}

/// Lead product key and total units of a label.
fn label_key(label: &Label) -> (u32, ProductKey) {
    let lead = label
        .manifest
        .iter()
        .map(ProductLine::sort_key)
        .min()
        .unwrap_or(ProductKey {
            code: String::new(),
            color: String::new(),
            size_number: 0,
            size: String::new(),
        });
    (label.total_units(), lead)
}

/// Order manifests, then labels: single-unit labels by lead product, then
/// multi-unit labels by (units, lead product). Invoice number breaks ties.
pub fn order_labels(labels: &mut [Label]) {
    for label in labels.iter_mut() {
        order_products(&mut label.manifest);
    }
    labels.sort_by_cached_key(|l| {
        let (units, lead) = label_key(l);
        let multi = units > 1;
        (multi, if multi { units } else { 0 }, lead, l.invoice_number.clone())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rect;
    use std::path::PathBuf;

    #[test]
    fn test_split_variant() {
        assert_eq!(split_variant("Preto,38"), ("Preto".into(), "38".into()));
        assert_eq!(split_variant("Azul / M"), ("Azul".into(), "M".into()));
        assert_eq!(split_variant("Unico"), ("Unico".into(), String::new()));
    }

    #[test]
    fn test_sized_variant_sorts_before_unsized() {
        let mut lines = vec![
            ProductLine::new("A", "", "Red", 1),
            ProductLine::new("A", "", "Red,37", 1),
        ];
        order_products(&mut lines);
        assert_eq!(lines[0].variant, "Red,37");
        assert_eq!(lines[1].variant, "Red");
    }

    #[test]
    fn test_numeric_sizes_sort_numerically() {
        let mut lines = vec![
            ProductLine::new("T", "", "Preto,40", 1),
            ProductLine::new("T", "", "Preto,38", 1),
            ProductLine::new("T", "", "Preto,M", 1),
            ProductLine::new("T", "", "Branco,44", 1),
        ];
        order_products(&mut lines);
        let variants: Vec<_> = lines.iter().map(|l| l.variant.as_str()).collect();
        assert_eq!(variants, vec!["Branco,44", "Preto,38", "Preto,40", "Preto,M"]);
    }

    #[test]
    fn test_multi_quantity_bucket_after_singles() {
        let mut lines = vec![
            ProductLine::new("Z", "", "", 3),
            ProductLine::new("B", "", "", 1),
            ProductLine::new("A", "", "", 2),
            ProductLine::new("C", "", "", 2),
            ProductLine::new("A", "", "", 1),
        ];
        order_products(&mut lines);
        let got: Vec<_> = lines.iter().map(|l| (l.code.as_str(), l.quantity)).collect();
        assert_eq!(got, vec![("A", 1), ("B", 1), ("A", 2), ("C", 2), ("Z", 3)]);
    }

    #[test]
    fn test_label_ordering_uses_two_buckets() {
        let mk = |inv: &str, lines: Vec<ProductLine>| {
            let mut l = Label::new(PathBuf::from("x.pdf"), 0, 0, Rect::new(0.0, 0.0, 1.0, 1.0));
            l.invoice_number = inv.to_string();
            l.manifest = lines;
            l
        };
        let mut labels = vec![
            mk("1", vec![ProductLine::new("B", "", "", 2)]),
            mk("2", vec![ProductLine::new("C", "", "", 1)]),
            mk("3", vec![ProductLine::new("A", "", "", 1), ProductLine::new("D", "", "", 1)]),
            mk("4", vec![ProductLine::new("A", "", "", 1)]),
            mk("5", vec![]),
        ];
        order_labels(&mut labels);
        let got: Vec<_> = labels.iter().map(|l| l.invoice_number.as_str()).collect();
        assert_eq!(got, vec!["5", "4", "2", "3", "1"]);
    }
}
