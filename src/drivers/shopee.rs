// src/drivers/shopee.rs

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info};

use super::{
    ACCEPT_SCORE, DetectedDocument, Driver, build_label, page_regions, parse_declaration, sample,
};
use crate::error::Result;
use crate::heuristics::{extract_all_tracking, has_declaration_marker, has_tax_label_marker};
use crate::model::{Label, ProductLine};
use crate::pdf_extract::SourcePdf;
use crate::segmenter::Segmenter;

const LABEL_MARKER: &str = "DANFE SIMPLIFICADO - ETIQUETA";
const SAMPLE_PAGES: usize = 3;

static NUMERIC_TRACKING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bBR\d{10,}\b").expect("valid tracking regex"));

/// Simplified tax labels, optionally followed by declaration-of-contents pages.
pub struct ShopeeDriver;

/// Declaration products keyed by the tracking codes printed next to them.
#[derive(Debug, Default)]
struct DeclarationProducts {
    by_tracking: HashMap<String, Vec<ProductLine>>,
    global: Vec<ProductLine>,
}

impl DeclarationProducts {
    fn collect(pdf: &SourcePdf) -> Self {
        let mut out = Self::default();
        for page in 0..pdf.page_count() {
            let text = pdf.page_text(page);
            if !has_declaration_marker(text) {
                continue;
            }
            let products = parse_declaration(text);
            if products.is_empty() {
                continue;
            }
            let tracks = extract_all_tracking(&text.to_uppercase());
            debug!(page = page + 1, products = products.len(), tracks = tracks.len(), "Declaration page");
            if tracks.is_empty() {
                out.global.extend(products);
            } else {
                for track in tracks {
                    out.by_tracking
                        .entry(track)
                        .or_default()
                        .extend(products.iter().cloned());
                }
            }
        }
        out
    }

    /// First tracking code with declared products wins, else the global pool.
    fn for_codes(&self, codes: &[String]) -> Vec<ProductLine> {
        codes
            .iter()
            .find_map(|c| self.by_tracking.get(c))
            .cloned()
            .unwrap_or_else(|| self.global.clone())
    }
}

impl Driver for ShopeeDriver {
    fn name(&self) -> &'static str {
        "shopee"
    }

    fn detect(&self, pdf: &SourcePdf) -> Option<DetectedDocument> {
        let text = sample(pdf, SAMPLE_PAGES);
        let mut score = 0;
        if text.contains(LABEL_MARKER) {
            score += 65;
        }
        if has_declaration_marker(&text) {
            score += 25;
        }
        if NUMERIC_TRACKING.is_match(&text) {
            score += 10;
        }
        if score < ACCEPT_SCORE {
            return None;
        }

        let mut tracks: Vec<String> = NUMERIC_TRACKING
            .find_iter(&text)
            .map(|m| m.as_str().to_string())
            .collect();
        tracks.sort();
        tracks.dedup();
        let mut found = DetectedDocument::new(self.name(), score, pdf.path().to_path_buf());
        found.metadata.insert("tracks".into(), tracks.join(","));
        Some(found)
    }

    fn extract(
        &self,
        _detected: &DetectedDocument,
        pdf: &SourcePdf,
        segmenter: &Segmenter,
    ) -> Result<Vec<Label>> {
        let declared = DeclarationProducts::collect(pdf);

        let mut pages: Vec<usize> = (0..pdf.page_count())
            .filter(|&i| pdf.page_text(i).to_uppercase().contains(LABEL_MARKER))
            .collect();
        if pages.is_empty() {
            pages = (0..pdf.page_count()).collect();
        }

        let mut labels = Vec::new();
        for page in pages {
            let page_tracks = extract_all_tracking(&pdf.page_text(page).to_uppercase());
            let (grid, regions) = page_regions(pdf, page, segmenter);
            debug!(page = page + 1, ?grid, regions = regions.len(), "Page segmented");

            for region in &regions {
                // Declaration quadrants sit next to labels on some sheets.
                if has_declaration_marker(&region.text) && !has_tax_label_marker(&region.text) {
                    continue;
                }
                let mut label = build_label(pdf, page, region, None);
                let codes = extract_all_tracking(&region.text.to_uppercase());
                let codes = if codes.is_empty() { &page_tracks } else { &codes };
                label.embedded = declared.for_codes(codes);
                labels.push(label);
            }
        }

        info!(labels = labels.len(), declared = declared.by_tracking.len(), "Shopee labels extracted");
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LabelKind;
    use crate::text_layout::tests::doc_with_pages;
    use std::path::Path;

    fn shopee_pdf() -> SourcePdf {
        // Page 1: two labels in the top quadrants of a 600x800 sheet.
        // Page 2: declaration listing the products for the second label.
        let doc = doc_with_pages(
            600.0,
            800.0,
            &[
                &[
                    (10.0, 780.0, 8.0, "DANFE SIMPLIFICADO - ETIQUETA"),
                    (10.0, 768.0, 8.0, "NF: 1001"),
                    (10.0, 756.0, 8.0, "BR2500000000001"),
                    (310.0, 780.0, 8.0, "DANFE SIMPLIFICADO - ETIQUETA"),
                    (310.0, 768.0, 8.0, "NF: 1002"),
                    (310.0, 756.0, 8.0, "BR2500000000002"),
                ],
                &[
                    (10.0, 780.0, 8.0, "DECLARAÇÃO DE CONTEÚDO"),
                    (10.0, 768.0, 8.0, "BR2500000000002"),
                    (10.0, 756.0, 8.0, "Nº CÓDIGO DESCRIÇÃO QTD VALOR"),
                    (10.0, 744.0, 8.0, "1 SAIA-9 Saia Midi Azul,P 2 80,00"),
                ],
            ],
        );
        SourcePdf::from_document(Path::new("lote.pdf"), doc)
    }

    #[test]
    fn test_detect_scores_markers() {
        let pdf = shopee_pdf();
        let found = ShopeeDriver.detect(&pdf).unwrap();
        assert!((found.confidence - 1.0).abs() < 1e-6);
        assert_eq!(found.metadata["tracks"], "BR2500000000001,BR2500000000002");
    }

    #[test]
    fn test_tracking_alone_is_not_enough() {
        let doc = doc_with_pages(300.0, 400.0, &[&[(10.0, 380.0, 8.0, "BR2500000000001 and more")]]);
        let pdf = SourcePdf::from_document(Path::new("x.pdf"), doc);
        assert!(ShopeeDriver.detect(&pdf).is_none());
    }

    #[test]
    fn test_extract_links_declaration_by_tracking() {
        let pdf = shopee_pdf();
        let found = ShopeeDriver.detect(&pdf).unwrap();
        let labels = ShopeeDriver.extract(&found, &pdf, &Segmenter::default()).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].invoice_number, "1001");
        assert_eq!(labels[0].kind, LabelKind::None);
        assert!(labels[0].embedded.is_empty());
        assert_eq!(labels[1].region_index, 1);
        assert_eq!(labels[1].tracking.as_deref(), Some("BR2500000000002"));
        assert_eq!(labels[1].embedded, vec![ProductLine::new("SAIA-9", "Saia Midi", "Azul,P", 2)]);
    }
}
