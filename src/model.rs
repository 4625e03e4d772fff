// src/model.rs

use serde::Serialize;
use std::path::PathBuf;

/// One product line of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProductLine {
    pub code: String,
    pub description: String,
    pub variant: String,
    pub quantity: u32,
}

impl ProductLine {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        variant: impl Into<String>,
        quantity: u32,
    ) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            variant: variant.into(),
            quantity: quantity.max(1),
        }
    }

    /// Identity used when merging lines of a recurring order.
    pub fn merge_key(&self) -> (&str, &str, &str) {
        (&self.code, &self.description, &self.variant)
    }
}

/// Total units over a set of product lines.
pub fn total_units(lines: &[ProductLine]) -> u32 {
    lines.iter().map(|p| p.quantity).sum()
}

/// Rectangle in page space, origin at the top-left corner, y growing down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    pub fn expand(&self, by: f32, bounds: &Rect) -> Rect {
        Rect {
            x0: (self.x0 - by).max(bounds.x0),
            y0: (self.y0 - by).max(bounds.y0),
            x1: (self.x1 + by).min(bounds.x1),
            y1: (self.y1 + by).min(bounds.y1),
        }
    }
}

/// Special handling a label receives downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelKind {
    /// Regular simplified tax label carrying an invoice number.
    None,
    /// Declaration-of-contents label issued without a formal invoice.
    Cpf,
    /// Buyer pickup label.
    Pickup,
    /// Alternate marketplace dual-page layout.
    AltFormat,
}

/// Where the manifest of a label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    Order,
    Tracking { partial: bool },
    Invoice,
    Pickup,
    Document,
    Unresolved,
}

/// Invoice details a label picks up from the invoice index or its own page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceMeta {
    pub series: String,
    pub issued_at: String,
    pub access_key: Option<String>,
}

/// One physical shipping label.
#[derive(Debug, Clone, Serialize)]
pub struct Label {
    /// Real invoice number, or a synthetic per-region id.
    pub invoice_number: String,
    pub synthetic_id: bool,
    pub source: PathBuf,
    pub page_index: usize,
    pub region: Rect,
    pub region_index: usize,
    pub kind: LabelKind,
    #[serde(skip)]
    pub text: String,
    pub order_number: Option<String>,
    pub tracking: Option<String>,
    pub tax_id: Option<String>,
    pub sender_name: Option<String>,
    pub invoice: Option<InvoiceMeta>,
    pub manifest: Vec<ProductLine>,
    /// Products printed in the source document itself.
    #[serde(skip)]
    pub embedded: Vec<ProductLine>,
    pub data_source: Option<DataSource>,
    /// Second page of the alternate dual-page format.
    pub companion_page: Option<usize>,
    pub store_id: Option<String>,
}

impl Label {
    pub fn new(source: PathBuf, page_index: usize, region_index: usize, region: Rect) -> Self {
        Self {
            invoice_number: String::new(),
            synthetic_id: false,
            source,
            page_index,
            region,
            region_index,
            kind: LabelKind::Cpf,
            text: String::new(),
            order_number: None,
            tracking: None,
            tax_id: None,
            sender_name: None,
            invoice: None,
            manifest: Vec::new(),
            embedded: Vec::new(),
            data_source: None,
            companion_page: None,
            store_id: None,
        }
    }

    pub fn total_units(&self) -> u32 {
        total_units(&self.manifest)
    }

    pub fn is_unresolved(&self) -> bool {
        self.manifest.is_empty()
    }
}

/// A parsed tax-invoice document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRecord {
    pub number: String,
    pub series: String,
    pub issued_at: String,
    pub access_key: Option<String>,
    pub issuer_tax_id: Option<String>,
    pub issuer_name: String,
    pub products: Vec<ProductLine>,
}

impl InvoiceRecord {
    pub fn line_count(&self) -> usize {
        self.products.len()
    }

    pub fn unit_count(&self) -> u32 {
        total_units(&self.products)
    }

    pub fn meta(&self) -> InvoiceMeta {
        InvoiceMeta {
            series: self.series.clone(),
            issued_at: self.issued_at.clone(),
            access_key: self.access_key.clone(),
        }
    }
}

/// One order from the marketplace order export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub order_number: String,
    pub tracking: Option<String>,
    pub products: Vec<ProductLine>,
}

impl OrderRecord {
    pub fn line_count(&self) -> usize {
        self.products.len()
    }

    pub fn unit_count(&self) -> u32 {
        total_units(&self.products)
    }

    /// Append lines not already present (by code, description, variant).
    pub fn merge(&mut self, lines: Vec<ProductLine>) {
        for line in lines {
            if !self.products.iter().any(|p| p.merge_key() == line.merge_key()) {
                self.products.push(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_merge_keeps_distinct_lines() {
        let mut order = OrderRecord {
            order_number: "250101ABCDEFGH".into(),
            tracking: None,
            products: vec![ProductLine::new("A", "Shirt", "Red,M", 1)],
        };
        order.merge(vec![
            ProductLine::new("A", "Shirt", "Red,M", 1),
            ProductLine::new("B", "Pants", "Blue,42", 2),
        ]);
        assert_eq!(order.line_count(), 2);
        assert_eq!(order.unit_count(), 3);
    }

    #[test]
    fn test_rect_expand_is_clamped() {
        let page = Rect::new(0.0, 0.0, 100.0, 100.0);
        let r = Rect::new(1.0, 50.0, 99.0, 99.0).expand(2.0, &page);
        assert_eq!(r, Rect::new(0.0, 48.0, 100.0, 100.0));
    }
}
