// src/invoice_index.rs

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{InvoiceRecord, ProductLine};
use crate::store::sanitize_store_name;

/// Invoice number → parsed tax invoice, plus the issuers seen along the way.
#[derive(Debug, Default)]
pub struct InvoiceIndex {
    records: HashMap<String, InvoiceRecord>,
    issuers: HashMap<String, String>,
}

impl InvoiceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `dir` for zip archives and loose `.xml` files.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut index = Self::new();
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if name.starts_with('_') || name.starts_with('~') {
                continue;
            }
            if name.ends_with(".zip") {
                if let Err(e) = index.load_zip(&path) {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable invoice archive");
                }
            } else if name.ends_with(".xml") {
                match fs::read(&path) {
                    Ok(bytes) => {
                        index.ingest(&String::from_utf8_lossy(&bytes), &name);
                    }
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Skipping unreadable invoice XML")
                    }
                }
            }
        }

        info!(
            invoices = index.records.len(),
            issuers = index.issuers.len(),
            "Invoice index built"
        );
        Ok(index)
    }

    fn load_zip(&mut self, path: &Path) -> Result<()> {
        let mut archive = zip::ZipArchive::new(BufReader::new(File::open(path)?))?;
        let mut loaded = 0usize;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() || !entry.name().to_lowercase().ends_with(".xml") {
                continue;
            }
            let entry_name = entry.name().to_string();
            let mut bytes = Vec::new();
            if let Err(e) = entry.read_to_end(&mut bytes) {
                warn!(entry = %entry_name, error = %e, "Skipping unreadable archive entry");
                continue;
            }
            if self.ingest(&String::from_utf8_lossy(&bytes), &entry_name) {
                loaded += 1;
            }
        }
        debug!(file = %path.display(), loaded, "Invoice archive read");
        Ok(())
    }

    /// Parse one XML document and index it. Returns whether it was added.
    pub fn ingest(&mut self, xml: &str, origin: &str) -> bool {
        match parse_invoice_xml(xml) {
            Ok(Some(record)) => self.insert(record),
            Ok(None) => {
                debug!(origin, "XML carries no invoice number");
                false
            }
            Err(e) => {
                warn!(origin, error = %e, "Malformed invoice XML skipped");
                false
            }
        }
    }

    /// First occurrence wins.
    pub fn insert(&mut self, record: InvoiceRecord) -> bool {
        if self.records.contains_key(&record.number) {
            debug!(invoice = %record.number, "Duplicate invoice ignored");
            return false;
        }
        if let Some(tax_id) = &record.issuer_tax_id {
            self.issuers
                .entry(tax_id.clone())
                .or_insert_with(|| sanitize_store_name(&record.issuer_name));
        }
        self.records.insert(record.number.clone(), record);
        true
    }

    pub fn get(&self, invoice_number: &str) -> Option<&InvoiceRecord> {
        self.records.get(invoice_number)
    }

    /// Tax id → sanitized issuer name.
    pub fn issuers(&self) -> &HashMap<String, String> {
        &self.issuers
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// XML parsing
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ProductDraft {
    code: String,
    description: String,
    quantity: u32,
}

/// Parse an electronic invoice XML. `Ok(None)` when no invoice number is present.
pub fn parse_invoice_xml(xml: &str) -> Result<Option<InvoiceRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut number = None;
    let mut series = None;
    let mut issued_raw = None;
    let mut access_key = None;
    let mut tax_id: Option<String> = None;
    let mut issuer_name = String::new();
    let mut products = Vec::new();
    let mut draft: Option<ProductDraft> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(&e);
                if name == "infNFe" && access_key.is_none() {
                    access_key = access_key_from(&e)?;
                }
                if name == "prod" && stack.last().map(String::as_str) == Some("det") {
                    draft = Some(ProductDraft::default());
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                if local_name(&e) == "infNFe" && access_key.is_none() {
                    access_key = access_key_from(&e)?;
                }
            }
            Event::End(_) => {
                if stack.pop().as_deref() == Some("prod") {
                    if let Some(d) = draft.take() {
                        products.push(ProductLine::new(d.code, d.description, "", d.quantity));
                    }
                }
            }
            Event::Text(t) => {
                let value = t.unescape()?.trim().to_string();
                let Some(tag) = stack.last().map(String::as_str) else {
                    continue;
                };
                let parent = stack
                    .len()
                    .checked_sub(2)
                    .and_then(|i| stack.get(i))
                    .map(String::as_str);
                match (parent, tag) {
                    (Some("ide"), "nNF") if number.is_none() => number = Some(value),
                    (Some("ide"), "serie") if series.is_none() => series = Some(value),
                    (Some("ide"), "dhEmi") if issued_raw.is_none() => issued_raw = Some(value),
                    (Some("emit"), "CNPJ") => tax_id = Some(digits(&value)),
                    (Some("emit"), "CPF") if tax_id.is_none() => tax_id = Some(digits(&value)),
                    (Some("emit"), "xNome") if issuer_name.is_empty() => issuer_name = value,
                    (Some("prod"), field) => {
                        if let Some(d) = draft.as_mut() {
                            match field {
                                "cProd" => d.code = value,
                                "xProd" => d.description = value,
                                "qCom" => d.quantity = parse_quantity(&value),
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let Some(number) = number.filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    Ok(Some(InvoiceRecord {
        number,
        series: series.filter(|s| !s.is_empty()).unwrap_or_else(|| "1".to_string()),
        issued_at: issued_raw.as_deref().map(format_issue_date).unwrap_or_default(),
        access_key,
        issuer_tax_id: tax_id.filter(|t| !t.is_empty()),
        issuer_name,
        products,
    }))
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn access_key_from(e: &BytesStart) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == b"Id" {
            let key = digits(&attr.unescape_value()?);
            return Ok((!key.is_empty()).then_some(key));
        }
    }
    Ok(None)
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// `qCom` is decimal text ("2.0000"); truncated, never below one.
fn parse_quantity(raw: &str) -> u32 {
    raw.replace(',', ".")
        .parse::<f64>()
        .map(|q| q.trunc().max(1.0) as u32)
        .unwrap_or(1)
}

/// `2024-03-15T10:20:30-03:00` → `15-03-2024 10:20:30`.
pub fn format_issue_date(raw: &str) -> String {
    let out = format_description!("[day]-[month]-[year] [hour]:[minute]:[second]");
    let local = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let formatted = match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(dt) => dt.format(&out).ok(),
        Err(_) => PrimitiveDateTime::parse(raw.get(..19).unwrap_or(raw), &local)
            .ok()
            .and_then(|dt| dt.format(&out).ok()),
    };
    formatted.unwrap_or_else(|| raw.chars().take(10).collect())
}
