// src/drivers/tiktok.rs

use super::temu::{marker_score, per_page_labels};
use super::{ACCEPT_SCORE, DetectedDocument, Driver, sample};
use crate::error::Result;
use crate::model::Label;
use crate::pdf_extract::SourcePdf;
use crate::segmenter::Segmenter;

/// TikTok Shop shipping labels, one per page.
pub struct TikTokDriver;

impl Driver for TikTokDriver {
    fn name(&self) -> &'static str {
        "tiktok"
    }

    fn detect(&self, pdf: &SourcePdf) -> Option<DetectedDocument> {
        let text = sample(pdf, 2);
        let score = marker_score(&text, "TIKTOK", &["ORDER ID", "PEDIDO"], &["SHIP", "ENVIO"]);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::Registry;
    use crate::text_layout::tests::doc_with_pages;
    use std::path::Path;

    #[test]
    fn test_tiktok_wins_over_temu_markers() {
        let doc = doc_with_pages(
            300.0,
            400.0,
            &[&[
                (10.0, 380.0, 8.0, "TikTok Shop"),
                (10.0, 360.0, 8.0, "Order ID: 576123456789012345"),
                (10.0, 340.0, 8.0, "SKU: KIT-3 Qty: 2"),
            ]],
        );
        let pdf = SourcePdf::from_document(Path::new("tt.pdf"), doc);
        let registry = Registry::with_default_drivers();
        let (driver, found) = registry.detect_best(&pdf).unwrap();
        assert_eq!(driver.name(), "tiktok");
        let labels = driver.extract(&found, &pdf, &Segmenter::default()).unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].order_number.as_deref(), Some("576123456789012345"));
        assert_eq!(labels[0].embedded[0].quantity, 2);
    }
}
