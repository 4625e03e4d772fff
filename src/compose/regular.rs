// src/compose/regular.rs

use super::canvas::{BLACK, Canvas, DIVIDER, Font, truncate};
use super::{Composer, display_invoice, highlight_size, ordered_manifest};
use crate::barcode::Barcode;
use crate::config::{LayoutConfig, ProductDisplay};
use crate::error::Result;
use crate::model::{Label, ProductLine, Rect, total_units};

/// The label never shrinks below this share of the page height.
const MIN_LABEL_FRACTION: f32 = 0.45;
const BARCODE_HEIGHT: f32 = 35.0;
const BARCODE_SPACE: f32 = 37.0;

pub(crate) fn render(ctx: &mut Composer<'_>, label: &Label, number: usize) -> Result<()> {
    let layout = ctx.layout;
    let (width, height) = ctx.page_size();
    let (ml, mr, mt, mb) = (
        layout.margin_left,
        layout.margin_right,
        layout.margin_top,
        layout.margin_bottom,
    );
    let rows = ordered_manifest(label);
    let row_size = highlight_size(layout.font_size);
    let access_key = label.invoice.as_ref().and_then(|m| m.access_key.as_deref());

    let usable = width - ml - mr;
    let mut label_height = scaled_height(label.region, usable);
    if !rows.is_empty() {
        let barcode_space = if access_key.is_some() { BARCODE_SPACE } else { 0.0 };
        let listed = rows.len().min(layout.rows_per_page) as f32;
        // Gap, two heading rows, the listed rows and the bottom limit.
        let table_space = barcode_space + (listed + 2.0) * (row_size + 2.0) + 15.0;
        let max_height = height - mt - mb - table_space;
        if label_height > max_height {
            label_height = max_height.max(height * MIN_LABEL_FRACTION);
        }
    }
    label_height = label_height.min(height - mt - mb);

    let source = ctx.source(label)?;
    let mut canvas = Canvas::new(width, height);
    canvas.place(&source, label.region, Rect::new(ml, mt, width - mr, mt + label_height));
    ctx.footer(&mut canvas, number);

    if rows.is_empty() {
        return ctx.push(canvas);
    }

    let mut y = mt + label_height + 2.0;
    if let Some(key) = access_key {
        match Barcode::access_key(key) {
            Some(code) => {
                let area = Rect::new(ml + 5.0, y, width - mr - 5.0, y + BARCODE_HEIGHT);
                canvas.barcode(&code, area, false);
                y += BARCODE_SPACE;
            }
            None => y += 5.0,
        }
    }

    let header = product_header(label, &rows, layout.display);
    let drawn = manifest_table(&mut canvas, layout, y, &header, &rows, row_size);
    ctx.push(canvas)?;
    ctx.continuation(
        label,
        number,
        &rows[drawn..],
        |canvas, top, rest| manifest_table(canvas, layout, top, &header, rest, row_size),
        |_| {},
    )
}

/// Height of `region` once scaled to `width`.
pub(crate) fn scaled_height(region: Rect, width: f32) -> f32 {
    if region.width() <= 0.0 {
        return 0.0;
    }
    region.height() * width / region.width()
}

/// Middle column heading, carrying the invoice details and totals.
pub(crate) fn product_header(label: &Label, rows: &[ProductLine], display: ProductDisplay) -> String {
    let column = match display {
        ProductDisplay::Both => "DESCRIPTION",
        ProductDisplay::Sku | ProductDisplay::Title => "VARIANT",
    };
    let mut invoice = format!("NF: {}", display_invoice(label));
    if let Some(meta) = &label.invoice {
        if !meta.series.is_empty() {
            invoice.push_str(&format!(" S: {}", meta.series));
        }
        if !meta.issued_at.is_empty() {
            invoice.push_str(&format!(" {}", meta.issued_at));
        }
    }
    format!(
        "{column} ({invoice} ITEMS: {} UNITS: {})",
        rows.len(),
        total_units(rows)
    )
}

fn first_heading(display: ProductDisplay) -> &'static str {
    match display {
        ProductDisplay::Title => "PRODUCT",
        ProductDisplay::Sku | ProductDisplay::Both => "CODE",
    }
}

/// First and second column text of one row.
fn cells(row: &ProductLine, display: ProductDisplay) -> (String, String) {
    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
    match display {
        ProductDisplay::Sku => (or_dash(&truncate(&row.code, 16)), or_dash(&row.variant)),
        ProductDisplay::Title => {
            let title = if row.description.is_empty() { &row.code } else { &row.description };
            (or_dash(&truncate(title, 40)), or_dash(&row.variant))
        }
        ProductDisplay::Both => (
            or_dash(&truncate(&row.code, 16)),
            or_dash(&truncate(&row.description, 30)),
        ),
    }
}

/// Bordered three-column table from `top`. Returns how many rows were drawn.
pub(crate) fn manifest_table(
    canvas: &mut Canvas,
    layout: &LayoutConfig,
    top: f32,
    header: &str,
    rows: &[ProductLine],
    row_size: f32,
) -> usize {
    let (left, right) = (layout.margin_left, canvas.width() - layout.margin_right);
    let font_size = layout.font_size;
    let line_height = row_size + 2.0;
    let code_x = left + 2.0;
    let product_x = left + 95.0;
    let qty_x = right - 25.0;
    let limit = canvas.height() - layout.margin_bottom - 10.0;

    let mut y = top;
    canvas.hline(left, right, y, 0.8, BLACK);
    y += line_height;
    canvas.text(code_x, y, font_size, Font::Bold, first_heading(layout.display));
    canvas.text(product_x, y, font_size, Font::Bold, header);
    canvas.text(qty_x, y, font_size, Font::Bold, "Q.");
    y += 2.0;
    canvas.hline(left, right, y, 0.5, BLACK);
    y += line_height;

    let page_rows = rows.len().min(layout.rows_per_page);
    let mut drawn = 0;
    for row in &rows[..page_rows] {
        if y + line_height > limit {
            break;
        }
        let (first, second) = cells(row, layout.display);
        canvas.text(code_x, y, row_size, Font::Bold, &first);
        canvas.text(product_x, y, font_size, Font::Regular, &second);
        canvas.text(qty_x, y, row_size, Font::Bold, &row.quantity.to_string());
        y += line_height;
        drawn += 1;
        if drawn < page_rows && y + line_height <= limit {
            canvas.hline(left, right, y - 1.0, 0.3, DIVIDER);
        }
    }

    canvas.hline(left, right, y, 0.8, BLACK);
    canvas.line((product_x - 5.0, top), (product_x - 5.0, y), 0.5, BLACK);
    canvas.line((qty_x - 5.0, top), (qty_x - 5.0, y), 0.5, BLACK);
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::tests::{label, page_sizes, page_texts, source_pdf};
    use crate::compose::{Format, compose};
    use crate::model::InvoiceMeta;

    #[test]
    fn test_single_page_with_barcode_and_table() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_pdf(dir.path());
        let out = dir.path().join("labels.pdf");
        let labels = vec![label(&source, 0, "456", 3)];
        let stats = compose(&labels, Format::Regular, &LayoutConfig::default(), &out).unwrap();
        assert_eq!(stats.pages, 1);

        let sizes = page_sizes(&out);
        assert!((sizes[0][2] - 425.197).abs() < 0.01);
        assert!((sizes[0][3] - 651.969).abs() < 0.01);
        let text = &page_texts(&out)[0];
        assert!(text.contains("(SKU-00)"));
        assert!(text.contains("(p.1)"));
        assert!(text.contains("Do"));
        assert!(!text.contains("CONTINUATION"));
    }

    #[test]
    fn test_overflow_rows_continue_on_extra_pages() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_pdf(dir.path());
        let out = dir.path().join("labels.pdf");
        let labels = vec![label(&source, 0, "456", 23), label(&source, 1, "789", 1)];
        let stats = compose(&labels, Format::Regular, &LayoutConfig::default(), &out).unwrap();
        // 10 rows under the label, then 10 and 3 on continuation pages.
        assert_eq!(stats.pages, 4);
        let texts = page_texts(&out);
        assert!(texts[1].contains("CONTINUATION"));
        assert!(texts[1].contains("456"));
        assert!(texts[2].contains("(SKU-22)"));
        assert!(texts[3].contains("(p.2)"));
        assert!(!texts[3].contains("CONTINUATION"));
    }

    #[test]
    fn test_scaled_height() {
        let region = Rect::new(0.0, 0.0, 100.0, 200.0);
        let full = scaled_height(region, 409.197);
        assert!((full - 818.394).abs() < 0.01);
        assert_eq!(scaled_height(Rect::new(0.0, 0.0, 0.0, 10.0), 100.0), 0.0);
    }

    #[test]
    fn test_product_header_carries_invoice_details() {
        let dir = tempfile::tempdir().unwrap();
        let mut l = label(dir.path(), 0, "456", 2);
        l.invoice = Some(InvoiceMeta {
            series: "2".into(),
            issued_at: "15/01/2025".into(),
            access_key: None,
        });
        let header = product_header(&l, &l.manifest, ProductDisplay::Sku);
        assert_eq!(header, "VARIANT (NF: 456 S: 2 15/01/2025 ITEMS: 2 UNITS: 2)");
        let both = product_header(&l, &l.manifest, ProductDisplay::Both);
        assert!(both.starts_with("DESCRIPTION"));
    }

    #[test]
    fn test_cells_follow_display_mode() {
        let row = ProductLine::new("CAM-01", "Camiseta Basica Algodao Premium Gola Redonda", "Preto,M", 1);
        assert_eq!(cells(&row, ProductDisplay::Sku), ("CAM-01".into(), "Preto,M".into()));
        let (title, _) = cells(&row, ProductDisplay::Title);
        assert_eq!(title, "Camiseta Basica Algodao Premium Gola R..");
        let (_, desc) = cells(&row, ProductDisplay::Both);
        assert_eq!(desc.chars().count(), 30);
        let bare = ProductLine::new("X", "", "", 1);
        assert_eq!(cells(&bare, ProductDisplay::Sku).1, "-");
    }
}
