// src/drivers/generic.rs

use tracing::info;

use super::{DetectedDocument, Driver, build_label, page_regions};
use crate::error::Result;
use crate::model::Label;
use crate::pdf_extract::SourcePdf;
use crate::segmenter::Segmenter;

/// Fallback for unrecognised documents: segments every page.
pub struct GenericDriver;

impl Driver for GenericDriver {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn detect(&self, pdf: &SourcePdf) -> Option<DetectedDocument> {
        Some(DetectedDocument::new(self.name(), 1, pdf.path().to_path_buf()))
    }

    fn extract(
        &self,
        _detected: &DetectedDocument,
        pdf: &SourcePdf,
        segmenter: &Segmenter,
    ) -> Result<Vec<Label>> {
        let mut labels = Vec::new();
        for page in 0..pdf.page_count() {
            let (_, regions) = page_regions(pdf, page, segmenter);
            labels.extend(regions.iter().map(|r| build_label(pdf, page, r, None)));
        }
        info!(labels = labels.len(), "Generic labels extracted");
        Ok(labels)
    }
}
