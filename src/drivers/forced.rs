// src/drivers/forced.rs

use tracing::{debug, info};

use super::{DetectedDocument, Driver, build_label, page_region, page_regions};
use crate::error::Result;
use crate::model::{Label, LabelKind};
use crate::pdf_extract::SourcePdf;
use crate::segmenter::{Region, Segmenter};

/// Auto-crop margin around the text of a single-label cpf page.
const CROP_MARGIN: f32 = 2.0;

/// Driver chosen by file name. Never sniffs content.
pub struct ForcedDriver {
    kind: LabelKind,
}

impl ForcedDriver {
    /// Buyer pickup labels, one per page, whole page.
    pub fn pickup() -> Self {
        Self { kind: LabelKind::Pickup }
    }

    /// Labels without a formal invoice.
    pub fn cpf() -> Self {
        Self { kind: LabelKind::Cpf }
    }

    /// Large pages are segmented; small ones are one label cropped to its text.
    fn cpf_regions(&self, pdf: &SourcePdf, page: usize, segmenter: &Segmenter) -> Vec<Region> {
        let Some(layout) = pdf.layout(page) else {
            return Vec::new();
        };
        if !segmenter.is_small_format(layout) {
            let (grid, regions) = page_regions(pdf, page, segmenter);
            debug!(page = page + 1, ?grid, regions = regions.len(), "Cpf page segmented");
            return regions;
        }
        let rect = layout
            .content_bounds()
            .map(|b| b.expand(CROP_MARGIN, &layout.page_rect()))
            .unwrap_or_else(|| layout.page_rect());
        let text = pdf.page_text(page).to_string();
        if text.trim().chars().count() < segmenter.min_region_chars() {
            return Vec::new();
        }
        vec![Region { index: 0, rect, text }]
    }
}

impl Driver for ForcedDriver {
    fn name(&self) -> &'static str {
        match self.kind {
            LabelKind::Pickup => "forced-pickup",
            _ => "forced-cpf",
        }
    }

    fn detect(&self, _pdf: &SourcePdf) -> Option<DetectedDocument> {
        None
    }

    fn extract(
        &self,
        _detected: &DetectedDocument,
        pdf: &SourcePdf,
        segmenter: &Segmenter,
    ) -> Result<Vec<Label>> {
        let mut labels = Vec::new();
        for page in 0..pdf.page_count() {
            let regions = match self.kind {
                LabelKind::Cpf => self.cpf_regions(pdf, page, segmenter),
                _ => page_region(pdf, page).into_iter().collect(),
            };
            for region in &regions {
                labels.push(build_label(pdf, page, region, Some(self.kind)));
            }
        }
        info!(driver = self.name(), labels = labels.len(), "Routed labels extracted");
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_layout::tests::doc_with_pages;
    use std::path::Path;

    #[test]
    fn test_pickup_keeps_real_invoice() {
        let doc = doc_with_pages(
            300.0,
            420.0,
            &[
                &[(10.0, 400.0, 8.0, "RETIRADA PELO COMPRADOR"), (10.0, 388.0, 8.0, "NF: 5150")],
                &[(10.0, 400.0, 8.0, "RETIRADA PELO COMPRADOR sem nota")],
            ],
        );
        let pdf = SourcePdf::from_document(Path::new("beka.pdf"), doc);
        let driver = ForcedDriver::pickup();
        let found = DetectedDocument::routed(driver.name(), pdf.path().to_path_buf());
        let labels = driver.extract(&found, &pdf, &Segmenter::default()).unwrap();
        assert_eq!(labels.len(), 2);
        assert!(labels.iter().all(|l| l.kind == LabelKind::Pickup));
        assert_eq!(labels[0].invoice_number, "5150");
        assert_eq!(labels[0].region.width(), 300.0);
        assert_eq!(labels[1].invoice_number, "beka-p2-r1");
    }

    #[test]
    fn test_small_cpf_page_is_cropped_to_text() {
        let doc = doc_with_pages(300.0, 420.0, &[&[(20.0, 400.0, 10.0, "Pedido: 250301ABCD1234")]]);
        let pdf = SourcePdf::from_document(Path::new("lanim.pdf"), doc);
        let driver = ForcedDriver::cpf();
        let found = DetectedDocument::routed(driver.name(), pdf.path().to_path_buf());
        let labels = driver.extract(&found, &pdf, &Segmenter::default()).unwrap();
        assert_eq!(labels.len(), 1);
        let label = &labels[0];
        assert_eq!(label.kind, LabelKind::Cpf);
        assert!(label.synthetic_id);
        assert_eq!(label.order_number.as_deref(), Some("250301ABCD1234"));
        assert!((label.region.x0 - 18.0).abs() < 0.01);
        assert!(label.region.width() < 300.0);
    }
}
