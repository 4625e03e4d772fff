// src/drivers/alt_format.rs

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use super::{ACCEPT_SCORE, DetectedDocument, Driver, build_label, page_region};
use crate::error::Result;
use crate::heuristics::label_type::is_alt_format;
use crate::model::{InvoiceRecord, Label, LabelKind, ProductLine};
use crate::pdf_extract::SourcePdf;
use crate::segmenter::Segmenter;

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)N[uú]mero:\s*\n?\s*(\d+)").expect("valid number regex"));
static ACCESS_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{44}").expect("valid access key regex"));
static ISSUER_TAX_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CNPJ[^:\n]*:\s*([\d./-]+)").expect("valid cnpj regex"));
static ISSUER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"NOME/RAZ.O SOCIAL[^:\n]*:\s*(.+)").expect("valid name regex"));
static ITEMS_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)ITEM\s+CONTE.*?QUANT\.\s*\n(.*)").expect("valid items regex")
});
static ATTRIBUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z][a-z]*/.+)$").expect("valid attributes regex"));
static PARENTHESISED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("valid parenthesis regex"));

/// Dual-page format: a label page followed by its invoice page.
pub struct AltFormatDriver;

/// Compact product code from an attribute string:
/// `Rakka/Roxo(紫色)-BR41/42` becomes `RakkaRoxoBR4142`.
pub fn attribute_code(attributes: &str) -> String {
    PARENTHESISED
        .replace_all(attributes, "")
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Invoice data printed on the second page of a pair. `None` without a number.
pub fn parse_invoice_page(text: &str) -> Option<InvoiceRecord> {
    let number = NUMBER.captures(text)?.get(1)?.as_str().to_string();
    let access_key = ACCESS_KEY.find(text).map(|m| m.as_str().to_string());
    let issuer_tax_id = ISSUER_TAX_ID
        .captures(text)
        .map(|c| c[1].chars().filter(char::is_ascii_digit).collect::<String>())
        .filter(|d| !d.is_empty());
    let issuer_name = ISSUER_NAME
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();

    Some(InvoiceRecord {
        number,
        series: String::new(),
        issued_at: String::new(),
        access_key,
        issuer_tax_id,
        issuer_name,
        products: parse_items(text),
    })
}

/// Item block: code line, wrapped description and attributes, quantity line.
fn parse_items(text: &str) -> Vec<ProductLine> {
    let Some(section) = ITEMS_SECTION.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    let lines: Vec<&str> = section
        .as_str()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let Some((item_code, rest)) = lines.split_first() else {
        return Vec::new();
    };

    let (quantity, middle) = match rest.iter().rposition(|l| l.chars().all(|c| c.is_ascii_digit())) {
        Some(at) => (rest[at].parse().unwrap_or(1), &rest[..at]),
        None => (1, rest),
    };
    // The PDF wraps mid-word, so wrapped pieces join without spaces.
    let middle = middle.concat();
    let (description, attributes) = match ATTRIBUTES.find(&middle) {
        Some(m) => (middle[..m.start()].trim().to_string(), m.as_str().to_string()),
        None => (middle.clone(), String::new()),
    };

    let code = match attribute_code(&attributes) {
        c if c.is_empty() => item_code.to_string(),
        c => c,
    };
    vec![ProductLine::new(code, description, attributes, quantity)]
}

impl Driver for AltFormatDriver {
    fn name(&self) -> &'static str {
        "alt-format"
    }

    fn detect(&self, pdf: &SourcePdf) -> Option<DetectedDocument> {
        let mut score = 0;
        if is_alt_format(pdf.page_text(0)) {
            score += 60;
        }
        let second = pdf.page_text(1).to_uppercase();
        if second.contains("DANFE") && second.contains("CHAVE") {
            score += 35;
        }
        (score >= ACCEPT_SCORE).then(|| DetectedDocument::new(self.name(), score, pdf.path().to_path_buf()))
    }

    fn extract(
        &self,
        _detected: &DetectedDocument,
        pdf: &SourcePdf,
        _segmenter: &Segmenter,
    ) -> Result<Vec<Label>> {
        let mut labels = Vec::new();
        let mut page = 0;
        while page + 1 < pdf.page_count() {
            let (label_page, invoice_page) = (page, page + 1);
            page += 2;

            let invoice_text = pdf.page_text(invoice_page);
            let upper = invoice_text.to_uppercase();
            if !upper.contains("DANFE") && !upper.contains("CHAVE") {
                warn!(page = invoice_page + 1, "Companion page is not an invoice, pair skipped");
                continue;
            }
            let Some(record) = parse_invoice_page(invoice_text) else {
                warn!(page = invoice_page + 1, "No invoice number on companion page, pair skipped");
                continue;
            };
            let Some(region) = page_region(pdf, label_page) else {
                continue;
            };

            let mut label = build_label(pdf, label_page, &region, Some(LabelKind::AltFormat));
            label.invoice_number = record.number.clone();
            label.synthetic_id = false;
            label.tax_id = record.issuer_tax_id.clone();
            label.invoice = record.access_key.is_some().then(|| record.meta());
            label.companion_page = Some(invoice_page);
            debug!(invoice = %record.number, products = record.products.len(), "Pair read");
            label.embedded = record.products;
            labels.push(label);
        }
        if pdf.page_count() % 2 == 1 {
            warn!(pages = pdf.page_count(), "Odd page count, last page unpaired");
        }
        info!(labels = labels.len(), "Alternate-format pairs extracted");
        Ok(labels)
    }
}
