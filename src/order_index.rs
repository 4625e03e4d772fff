// src/order_index.rs

use calamine::{Data, Reader, open_workbook_auto};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::config::RoutingConfig;
use crate::error::Result;
use crate::model::{OrderRecord, ProductLine};

/// Shortest tracking code considered for prefix/suffix matching.
const MIN_PARTIAL_TRACKING: usize = 10;

const ORDER_COLUMNS: &[&str] = &["order_sn", "pedido", "order"];
const TRACKING_COLUMNS: &[&str] = &["tracking_number", "tracking"];
const PRODUCT_COLUMNS: &[&str] = &["product_info", "products", "itens"];

static BLOCK_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\]\s*").expect("valid block regex"));
static LEADING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+").expect("valid quantity regex"));

/// Result of a tracking lookup.
#[derive(Debug, Clone, Copy)]
pub struct TrackingHit<'a, T> {
    pub value: &'a T,
    pub partial: bool,
}

/// Orders from the marketplace export, keyed by order number.
#[derive(Debug, Default)]
pub struct OrderIndex {
    orders: HashMap<String, OrderRecord>,
    tracking: HashMap<String, String>,
    tracking_keys: Vec<String>,
    pickup_orders: HashMap<String, Vec<ProductLine>>,
    pickup_tracking: HashMap<String, Vec<ProductLine>>,
    pickup_tracking_keys: Vec<String>,
}

impl OrderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every order spreadsheet under `dir`.
    pub fn load_dir(dir: &Path, routing: &RoutingConfig) -> Result<Self> {
        let mut index = Self::new();
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let lower = name.to_lowercase();
            if !(lower.ends_with(".xlsx") || lower.ends_with(".xls") || lower.ends_with(".xlsm")) {
                continue;
            }
            if routing.is_skipped(&name) || routing.is_cost_sheet(&name) {
                debug!(file = %name, "Spreadsheet not ingested");
                continue;
            }
            let pickup = routing.is_pickup_sheet(&name);
            match index.load_sheet(&path, pickup) {
                Ok(rows) => info!(file = %name, rows, pickup, "Order spreadsheet loaded"),
                Err(e) => warn!(file = %name, error = %e, "Skipping unreadable spreadsheet"),
            }
        }

        info!(
            orders = index.orders.len(),
            tracking = index.tracking.len(),
            pickup_orders = index.pickup_orders.len(),
            "Order index built"
        );
        Ok(index)
    }

    /// Load the first worksheet of one file. Returns the number of rows used.
    pub fn load_sheet(&mut self, path: &Path, pickup: bool) -> Result<usize> {
        let mut workbook = open_workbook_auto(path)?;
        let Some(range) = workbook.worksheet_range_at(0) else {
            return Ok(0);
        };
        let range = range?;
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| r.iter().map(cell_text).collect())
            .collect();
        Ok(self.load_rows(&rows, pickup))
    }

    /// Ingest already-read rows; the header row is located by column name.
    pub fn load_rows(&mut self, rows: &[Vec<String>], pickup: bool) -> usize {
        let Some((header_at, columns)) = rows
            .iter()
            .enumerate()
            .take(10)
            .find_map(|(i, row)| Columns::locate(row).map(|c| (i, c)))
        else {
            warn!("No order-number column found");
            return 0;
        };

        let mut used = 0;
        for row in &rows[header_at + 1..] {
            let order = columns.order.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("");
            let tracking = columns.tracking.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("");
            let descriptor = columns.products.and_then(|i| row.get(i)).map(|s| s.trim()).unwrap_or("");
            let added = if pickup {
                self.add_pickup_row(order, tracking, descriptor)
            } else {
                self.add_row(order, tracking, descriptor)
            };
            if added {
                used += 1;
            }
        }
        used
    }

    pub fn add_row(&mut self, order: &str, tracking: &str, descriptor: &str) -> bool {
        if order.is_empty() {
            if !descriptor.is_empty() {
                debug!("Row with products but no order number skipped");
            }
            return false;
        }
        if !tracking.is_empty() && !self.tracking.contains_key(tracking) {
            self.tracking.insert(tracking.to_string(), order.to_string());
            self.tracking_keys.push(tracking.to_string());
        }

        let products = parse_descriptor(descriptor);
        if products.is_empty() {
            return !tracking.is_empty();
        }
        match self.orders.get_mut(order) {
            Some(existing) => existing.merge(products),
            None => {
                self.orders.insert(
                    order.to_string(),
                    OrderRecord {
                        order_number: order.to_string(),
                        tracking: (!tracking.is_empty()).then(|| tracking.to_string()),
                        products,
                    },
                );
            }
        }
        true
    }

    pub fn add_pickup_row(&mut self, order: &str, tracking: &str, descriptor: &str) -> bool {
        let products = parse_descriptor(descriptor);
        if products.is_empty() {
            return false;
        }
        if !order.is_empty() {
            self.pickup_orders
                .entry(order.to_string())
                .or_insert_with(|| products.clone());
        }
        if !tracking.is_empty() && !self.pickup_tracking.contains_key(tracking) {
            self.pickup_tracking.insert(tracking.to_string(), products);
            self.pickup_tracking_keys.push(tracking.to_string());
        }
        true
    }

    pub fn get(&self, order_number: &str) -> Option<&OrderRecord> {
        self.orders.get(order_number)
    }

    /// Exact tracking match, then prefix/suffix match. The first partial
    /// candidate in spreadsheet order wins.
    pub fn find_by_tracking(&self, tracking: &str) -> Option<TrackingHit<'_, OrderRecord>> {
        if let Some(order) = self.tracking.get(tracking) {
            return self.orders.get(order).map(|value| TrackingHit { value, partial: false });
        }
        let key = first_partial(tracking, &self.tracking_keys)?;
        self.tracking
            .get(key)
            .and_then(|order| self.orders.get(order))
            .map(|value| TrackingHit { value, partial: true })
    }

    pub fn pickup_by_order(&self, order_number: &str) -> Option<&Vec<ProductLine>> {
        self.pickup_orders.get(order_number)
    }

    pub fn pickup_by_tracking(&self, tracking: &str) -> Option<TrackingHit<'_, Vec<ProductLine>>> {
        if let Some(value) = self.pickup_tracking.get(tracking) {
            return Some(TrackingHit { value, partial: false });
        }
        let key = first_partial(tracking, &self.pickup_tracking_keys)?;
        self.pickup_tracking
            .get(key)
            .map(|value| TrackingHit { value, partial: true })
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

fn is_partial_match(a: &str, b: &str) -> bool {
    a.len() >= MIN_PARTIAL_TRACKING
        && b.len() >= MIN_PARTIAL_TRACKING
        && (a.starts_with(b) || b.starts_with(a) || a.ends_with(b) || b.ends_with(a))
}

fn first_partial<'a>(tracking: &str, keys: &'a [String]) -> Option<&'a str> {
    let mut candidates = keys.iter().filter(|k| is_partial_match(tracking, k));
    let first = candidates.next()?;
    let others = candidates.count();
    if others > 0 {
        warn!(
            tracking,
            chosen = %first,
            candidates = others + 1,
            "Ambiguous partial tracking match, taking the first"
        );
    } else {
        info!(tracking, matched = %first, "Partial tracking match");
    }
    Some(first.as_str())
}

struct Columns {
    order: Option<usize>,
    tracking: Option<usize>,
    products: Option<usize>,
}

impl Columns {
    fn locate(header: &[String]) -> Option<Self> {
        let find = |names: &[&str]| {
            header
                .iter()
                .position(|h| names.contains(&h.trim().to_lowercase().as_str()))
        };
        let order = find(ORDER_COLUMNS)?;
        Some(Self {
            order: Some(order),
            tracking: find(TRACKING_COLUMNS),
            products: find(PRODUCT_COLUMNS),
        })
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Descriptor mini-format
// ---------------------------------------------------------------------------

/// Parse `[1] Product Name: X; Variation Name: Y; Quantity: 2; ...` blocks.
/// Malformed blocks are dropped individually.
pub fn parse_descriptor(descriptor: &str) -> Vec<ProductLine> {
    BLOCK_SPLIT
        .split(descriptor)
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .filter_map(|block| {
            let parsed = parse_block(block);
            if parsed.is_none() {
                debug!(block, "Malformed product block skipped");
            }
            parsed
        })
        .collect()
}

fn parse_block(block: &str) -> Option<ProductLine> {
    let mut description = String::new();
    let mut variant = String::new();
    let mut quantity = 1u32;
    let mut parent_sku = String::new();
    let mut sku = String::new();
    let mut recognized = false;

    for part in block.split(';') {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_lowercase().as_str() {
            "product name" => description = value.to_string(),
            "variation name" => variant = value.to_string(),
            "quantity" => quantity = parse_quantity(value),
            "parent sku reference no." => parent_sku = value.to_string(),
            "sku reference no." => sku = value.to_string(),
            _ => continue,
        }
        recognized = true;
    }

    if !recognized {
        return None;
    }
    let code = if parent_sku.is_empty() { sku } else { parent_sku };
    Some(ProductLine::new(code, description, variant, quantity))
}

/// Leading digits of a quantity cell ("2 un" is 2); 1 when there are none.
fn parse_quantity(value: &str) -> u32 {
    LEADING_DIGITS
        .find(value)
        .and_then(|m| m.as_str().parse().ok())
        .filter(|&q| q > 0)
        .unwrap_or(1)
}

/// Render lines back into the descriptor mini-format.
pub fn format_descriptor(lines: &[ProductLine]) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "[{}] Product Name: {}; Variation Name: {}; Quantity: {}; Parent SKU Reference No.: {}; ",
                i + 1,
                p.description,
                p.variant,
                p.quantity,
                p.code
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
