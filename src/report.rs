// src/report.rs

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use umya_spreadsheet::{Spreadsheet, Worksheet};

use crate::error::{Error, Result};
use crate::model::Label;
use crate::ordering::product_key;
use crate::store::Store;

/// Summed quantity of one (code, variant) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkuTotal {
    pub code: String,
    pub variant: String,
    pub quantity: u32,
}

/// Roster line of one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub id: String,
    pub name: String,
    pub labels: usize,
    pub skus: usize,
    pub units: u32,
}

impl StoreSummary {
    pub fn of(store: &Store) -> Self {
        let totals = sku_totals(&store.labels);
        Self {
            id: store.id.clone(),
            name: store.name.clone(),
            labels: store.labels.len(),
            skus: totals.len(),
            units: totals.iter().map(|t| t.quantity).sum(),
        }
    }
}

/// Quantities summed per (code, variant), in product ordering.
pub fn sku_totals(labels: &[Label]) -> Vec<SkuTotal> {
    let mut sums: HashMap<(String, String), u32> = HashMap::new();
    for line in labels.iter().flat_map(|l| &l.manifest) {
        if line.code.is_empty() && line.variant.is_empty() {
            continue;
        }
        *sums.entry((line.code.clone(), line.variant.clone())).or_default() += line.quantity;
    }
    let mut totals: Vec<SkuTotal> = sums
        .into_iter()
        .map(|((code, variant), quantity)| SkuTotal { code, variant, quantity })
        .collect();
    totals.sort_by_cached_key(|t| product_key(&t.code, &t.variant));
    totals
}

/// Quantities summed per code only.
fn code_totals(labels: &[Label]) -> BTreeMap<String, u32> {
    let mut sums = BTreeMap::new();
    for line in labels.iter().flat_map(|l| &l.manifest) {
        if !line.code.is_empty() {
            *sums.entry(line.code.clone()).or_default() += line.quantity;
        }
    }
    sums
}

fn sheet<'a>(book: &'a mut Spreadsheet, name: &str) -> Result<&'a mut Worksheet> {
    book.new_sheet(name).map_err(|e| Error::Report(format!("sheet {name}: {e}")))
}

fn header(sheet: &mut Worksheet, titles: &[&str]) {
    for (i, title) in titles.iter().enumerate() {
        let cell = sheet.get_cell_mut((i as u32 + 1, 1));
        cell.set_value(*title);
        cell.get_style_mut().get_font_mut().set_bold(true);
    }
}

fn bold_text(sheet: &mut Worksheet, col: u32, row: u32, text: &str) {
    let cell = sheet.get_cell_mut((col, row));
    cell.set_value(text);
    cell.get_style_mut().get_font_mut().set_bold(true);
}

fn bold_number(sheet: &mut Worksheet, col: u32, row: u32, value: f64) {
    let cell = sheet.get_cell_mut((col, row));
    cell.set_value_number(value);
    cell.get_style_mut().get_font_mut().set_bold(true);
}

fn widths(sheet: &mut Worksheet, widths: &[(&str, f64)]) {
    for (column, width) in widths {
        sheet.get_column_dimension_mut(column).set_width(*width);
    }
}

/// Per-store sheet: code, variant, summed quantity and a totals row.
/// Returns the distinct pair count and total units.
pub fn write_store_summary(labels: &[Label], path: &Path) -> Result<(usize, u32)> {
    let totals = sku_totals(labels);
    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    let ws = sheet(&mut book, &format!("Summary {} labels", labels.len()))?;
    header(ws, &["SKU", "Variant", "Quantity"]);

    let mut row = 2;
    for total in &totals {
        ws.get_cell_mut((1, row)).set_value(total.code.as_str());
        ws.get_cell_mut((2, row)).set_value(total.variant.as_str());
        ws.get_cell_mut((3, row)).set_value_number(total.quantity);
        row += 1;
    }
    let units: u32 = totals.iter().map(|t| t.quantity).sum();
    bold_text(ws, 1, row, "TOTAL");
    bold_number(ws, 3, row, units.into());
    widths(ws, &[("A", 25.0), ("B", 40.0), ("C", 15.0)]);

    save_atomic(&book, path)?;
    debug!(file = %path.display(), skus = totals.len(), units, "Store summary written");
    Ok((totals.len(), units))
}

/// Roster of all stores plus a per-store, per-code detail sheet.
pub fn write_global_summary(stores: &[Store], path: &Path) -> Result<()> {
    let mut book = umya_spreadsheet::new_file_empty_worksheet();
    let mut ordered: Vec<&Store> = stores.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let roster = sheet(&mut book, "Stores")?;
    header(roster, &["Store", "Labels", "SKUs", "Units"]);
    let mut row = 2;
    let (mut labels, mut skus, mut units) = (0usize, 0usize, 0u32);
    for store in &ordered {
        let summary = StoreSummary::of(store);
        roster.get_cell_mut((1, row)).set_value(summary.name.as_str());
        roster.get_cell_mut((2, row)).set_value_number(summary.labels as f64);
        roster.get_cell_mut((3, row)).set_value_number(summary.skus as f64);
        roster.get_cell_mut((4, row)).set_value_number(summary.units);
        labels += summary.labels;
        skus += summary.skus;
        units += summary.units;
        row += 1;
    }
    bold_text(roster, 1, row, "TOTAL");
    bold_number(roster, 2, row, labels as f64);
    bold_number(roster, 3, row, skus as f64);
    bold_number(roster, 4, row, units.into());
    widths(roster, &[("A", 30.0), ("B", 15.0), ("C", 12.0), ("D", 15.0)]);

    let detail = sheet(&mut book, "SKUs by Store")?;
    header(detail, &["Store", "SKU", "Quantity"]);
    let mut row = 2;
    let mut grand_total = 0u32;
    for store in &ordered {
        for (code, quantity) in code_totals(&store.labels) {
            detail.get_cell_mut((1, row)).set_value(store.name.as_str());
            detail.get_cell_mut((2, row)).set_value(code);
            detail.get_cell_mut((3, row)).set_value_number(quantity);
            grand_total += quantity;
            row += 1;
        }
    }
    bold_text(detail, 1, row, "GRAND TOTAL");
    bold_number(detail, 3, row, grand_total.into());
    widths(detail, &[("A", 30.0), ("B", 25.0), ("C", 15.0)]);

    save_atomic(&book, path)?;
    info!(file = %path.display(), stores = ordered.len(), units, "Global summary written");
    Ok(())
}

fn save_atomic(book: &Spreadsheet, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp = NamedTempFile::new_in(dir)?;
    umya_spreadsheet::writer::xlsx::write(book, tmp.path())
        .map_err(|e| Error::Report(e.to_string()))?;
    tmp.persist(path)?;
    Ok(())
}
