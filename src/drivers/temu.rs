// src/drivers/temu.rs

use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

use super::{ACCEPT_SCORE, DetectedDocument, Driver, build_label, page_region, sample};
use crate::error::Result;
use crate::model::{Label, LabelKind, ProductLine};
use crate::pdf_extract::SourcePdf;
use crate::segmenter::Segmenter;

static ITEM_SKU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)SKU\s*[:#]?\s*([A-Z0-9\-_.]{2,})").expect("valid sku regex"));
static ITEM_QTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:QTY|QUANTITY|QTD)\s*[:#]?\s*(\d+)").expect("valid quantity regex")
});
static MARKETPLACE_ORDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ORDER(?:\s+ID)?|PEDIDO)\s*[:#]?\s*([A-Z0-9\-]{6,})\b")
        .expect("valid order regex")
});

/// Item lines of a marketplace page: `SKU <code> … QTY <n>` on one line.
pub fn parse_item_lines(text: &str) -> Vec<ProductLine> {
    text.lines()
        .filter(|line| {
            let up = line.to_uppercase();
            up.contains("SKU") && (up.contains("QTY") || up.contains("QUANTITY") || up.contains("QTD"))
        })
        .filter_map(|line| {
            let code = ITEM_SKU.captures(line)?.get(1)?.as_str().to_string();
            let quantity = ITEM_QTY
                .captures(line)
                .and_then(|c| c[1].parse().ok())
                .unwrap_or(1);
            Some(ProductLine::new(code, "", "", quantity))
        })
        .collect()
}

/// One label per page, products from the page's own item lines.
pub(super) fn per_page_labels(pdf: &SourcePdf, driver: &'static str) -> Vec<Label> {
    let mut labels = Vec::new();
    for page in 0..pdf.page_count() {
        let Some(region) = page_region(pdf, page) else {
            continue;
        };
        let mut label = build_label(pdf, page, &region, None);
        // Marketplace labels go with the regular output unless they are pickups.
        if label.kind == LabelKind::Cpf {
            label.kind = LabelKind::None;
        }
        if label.order_number.is_none() {
            label.order_number = MARKETPLACE_ORDER
                .captures(&region.text)
                .map(|c| c[1].to_string());
        }
        label.embedded = parse_item_lines(&region.text);
        labels.push(label);
    }
    info!(driver, labels = labels.len(), "Per-page labels extracted");
    labels
}

/// Additive marker score over the upper-cased sample.
pub(super) fn marker_score(text: &str, brand: &str, order: &[&str], ship: &[&str]) -> u32 {
    let mut score = 0;
    if text.contains(brand) {
        score += 65;
    }
    if order.iter().any(|m| text.contains(m)) {
        score += 10;
    }
    if ship.iter().any(|m| text.contains(m)) {
        score += 5;
    }
    score
}

pub struct TemuDriver;

impl Driver for TemuDriver {
    fn name(&self) -> &'static str {
        "temu"
    }

    fn detect(&self, pdf: &SourcePdf) -> Option<DetectedDocument> {
        let score = marker_score(&sample(pdf, 2), "TEMU", &["ORDER", "PEDIDO"], &["SHIP", "ENVIO"]);
        (score >= ACCEPT_SCORE).then(|| DetectedDocument::new(self.name(), score, pdf.path().to_path_buf()))
    }

    fn extract(
        &self,
        _detected: &DetectedDocument,
        pdf: &SourcePdf,
        _segmenter: &Segmenter,
    ) -> Result<Vec<Label>> {
        Ok(per_page_labels(pdf, self.name()))
    }
}
