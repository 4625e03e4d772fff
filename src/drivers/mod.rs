//! Document drivers.
//!
//! A driver recognises one family of input PDF and turns it into labels.
//! The [`Registry`] is built once per run and handed to the pipeline; file
//! name routing is checked before any content sniffing.

mod alt_format;
mod declaration;
mod forced;
mod generic;
mod shopee;
mod temu;
mod tiktok;

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::RoutingConfig;
use crate::error::Result;
use crate::heuristics::{extract_fields, label_type};
use crate::model::{Label, LabelKind};
use crate::pdf_extract::SourcePdf;
use crate::segmenter::{Grid, Region, Segmenter};

pub use alt_format::{AltFormatDriver, attribute_code, parse_invoice_page};
pub use declaration::parse_declaration;
pub use forced::ForcedDriver;
pub use generic::GenericDriver;
pub use shopee::ShopeeDriver;
pub use temu::{TemuDriver, parse_item_lines};
pub use tiktok::TikTokDriver;

/// Detection scores are summed in hundredths; this many accepts a document.
pub const ACCEPT_SCORE: u32 = 70;

/// What a detector concluded about one PDF.
#[derive(Debug, Clone, Serialize)]
pub struct DetectedDocument {
    pub kind: &'static str,
    /// In [0, 1].
    pub confidence: f32,
    pub metadata: BTreeMap<String, String>,
    pub source: PathBuf,
}

impl DetectedDocument {
    pub fn new(kind: &'static str, score: u32, source: PathBuf) -> Self {
        Self {
            kind,
            confidence: (score.min(100) as f32) / 100.0,
            metadata: BTreeMap::new(),
            source,
        }
    }

    /// Document assigned by file name, without sniffing.
    pub fn routed(kind: &'static str, source: PathBuf) -> Self {
        Self::new(kind, 100, source)
    }
}

pub trait Driver: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the document does not belong to this driver.
    fn detect(&self, pdf: &SourcePdf) -> Option<DetectedDocument>;

    fn extract(
        &self,
        detected: &DetectedDocument,
        pdf: &SourcePdf,
        segmenter: &Segmenter,
    ) -> Result<Vec<Label>>;
}

/// Ordered set of drivers for one run.
pub struct Registry {
    sniffers: Vec<Box<dyn Driver>>,
    pickup: ForcedDriver,
    cpf: ForcedDriver,
    alt_format: AltFormatDriver,
}

impl Registry {
    /// Empty registry; drivers are tried in registration order.
    pub fn new() -> Self {
        Self {
            sniffers: Vec::new(),
            pickup: ForcedDriver::pickup(),
            cpf: ForcedDriver::cpf(),
            alt_format: AltFormatDriver,
        }
    }

    pub fn with_default_drivers() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ShopeeDriver));
        registry.register(Box::new(TikTokDriver));
        registry.register(Box::new(TemuDriver));
        registry.register(Box::new(AltFormatDriver));
        registry.register(Box::new(GenericDriver));
        registry
    }

    pub fn register(&mut self, driver: Box<dyn Driver>) {
        self.sniffers.push(driver);
    }

    pub fn driver_names(&self) -> Vec<&'static str> {
        self.sniffers.iter().map(|d| d.name()).collect()
    }

    /// Driver forced by the file name, if any.
    pub fn route(&self, file_name: &str, routing: &RoutingConfig) -> Option<&dyn Driver> {
        if routing.is_pickup_pdf(file_name) {
            Some(&self.pickup as &dyn Driver)
        } else if routing.is_cpf_pdf(file_name) {
            Some(&self.cpf as &dyn Driver)
        } else if routing.is_alt_format_pdf(file_name) {
            Some(&self.alt_format as &dyn Driver)
        } else {
            None
        }
    }

    /// Highest-confidence detection; ties keep the earlier driver.
    pub fn detect_best(&self, pdf: &SourcePdf) -> Option<(&dyn Driver, DetectedDocument)> {
        let mut best: Option<(&dyn Driver, DetectedDocument)> = None;
        for driver in &self.sniffers {
            let Some(found) = driver.detect(pdf) else {
                continue;
            };
            debug!(driver = driver.name(), confidence = found.confidence, "Detector matched");
            let better = best
                .as_ref()
                .is_none_or(|(_, b)| found.confidence > b.confidence);
            if better {
                best = Some((driver.as_ref(), found));
            }
        }
        best
    }

    /// Routing first, then content sniffing.
    pub fn classify(
        &self,
        pdf: &SourcePdf,
        routing: &RoutingConfig,
    ) -> Option<(&dyn Driver, DetectedDocument)> {
        let file_name = pdf.file_name();
        if let Some(driver) = self.route(&file_name, routing) {
            info!(driver = driver.name(), "Routed by file name");
            return Some((driver, DetectedDocument::routed(driver.name(), pdf.path().to_path_buf())));
        }
        self.detect_best(pdf)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_default_drivers()
    }
}

/// Upper-cased text of the first `pages` pages.
fn sample(pdf: &SourcePdf, pages: usize) -> String {
    pdf.leading_text(pages).to_uppercase()
}

/// Build a label from one region: fields, kind, invoice or synthetic id.
pub(crate) fn build_label(
    pdf: &SourcePdf,
    page_index: usize,
    region: &Region,
    forced: Option<LabelKind>,
) -> Label {
    let fields = extract_fields(&region.text);
    let (kind, rule) = match forced {
        Some(kind) => (kind, "forced"),
        None => label_type::classify(&region.text),
    };

    let mut label = Label::new(pdf.path().to_path_buf(), page_index, region.index, region.rect);
    label.kind = kind;
    match fields.invoice_number {
        Some(number) if kind != LabelKind::Cpf => label.invoice_number = number,
        _ => {
            label.invoice_number =
                label_type::synthetic_invoice_id(&pdf.stem(), page_index, region.index);
            label.synthetic_id = true;
        }
    }
    label.order_number = fields.order_number;
    label.tracking = fields.tracking;
    label.sender_name = fields.sender_name;
    label.text = region.text.clone();

    debug!(
        page = page_index + 1,
        region = region.index + 1,
        kind = ?kind,
        rule,
        invoice = %label.invoice_number,
        "Label read"
    );
    label
}

/// Whole page as one region.
pub(crate) fn page_region(pdf: &SourcePdf, page_index: usize) -> Option<Region> {
    let layout = pdf.layout(page_index)?;
    Some(Region {
        index: 0,
        rect: layout.page_rect(),
        text: pdf.page_text(page_index).to_string(),
    })
}

/// Label regions of one page. A page read through the plain-text fallback
/// has no positioned runs to cut, so it comes back whole.
pub(crate) fn page_regions(
    pdf: &SourcePdf,
    page_index: usize,
    segmenter: &Segmenter,
) -> (Grid, Vec<Region>) {
    let Some(layout) = pdf.layout(page_index) else {
        return (Grid::WholePage, Vec::new());
    };
    if !layout.runs.is_empty() {
        return segmenter.segment(layout);
    }
    let regions = page_region(pdf, page_index)
        .filter(|r| r.text.trim().chars().count() >= segmenter.min_region_chars())
        .into_iter()
        .collect();
    (Grid::WholePage, regions)
}
