// src/compose/cpf.rs

use super::canvas::{BLACK, Canvas, DIVIDER, Font, truncate};
use super::regular::scaled_height;
use super::{Composer, display_invoice, highlight_size, ordered_manifest};
use crate::config::{LayoutConfig, ProductDisplay};
use crate::error::Result;
use crate::model::{Label, ProductLine, Rect, total_units};

/// Space always kept under the label for the order table.
const MIN_TABLE_SPACE: f32 = 120.0;

pub(crate) fn render(ctx: &mut Composer<'_>, label: &Label, number: usize) -> Result<()> {
    let layout = ctx.layout;
    let (width, height) = ctx.page_size();
    let (ml, mr, mt, mb) = (
        layout.margin_left,
        layout.margin_right,
        layout.margin_top,
        layout.margin_bottom,
    );
    let label_height = scaled_height(label.region, width - ml - mr)
        .min(height - mt - mb - MIN_TABLE_SPACE);

    let source = ctx.source(label)?;
    let mut canvas = Canvas::new(width, height);
    canvas.place(&source, label.region, Rect::new(ml, mt, width - mr, mt + label_height));
    ctx.footer(&mut canvas, number);

    let rows = ordered_manifest(label);
    if rows.is_empty() {
        return ctx.push(canvas);
    }
    let heading = order_heading(label, &rows);
    let drawn = order_table(&mut canvas, layout, mt + label_height + 5.0, &heading, &rows);
    ctx.push(canvas)?;
    ctx.continuation(
        label,
        number,
        &rows[drawn..],
        |canvas, top, rest| order_table(canvas, layout, top, &heading, rest),
        |_| {},
    )
}

fn order_heading(label: &Label, rows: &[ProductLine]) -> String {
    format!(
        "Order: {}    Items: {}    Units: {}",
        display_invoice(label),
        rows.len(),
        total_units(rows)
    )
}

fn headings(display: ProductDisplay) -> (&'static str, &'static str) {
    match display {
        ProductDisplay::Sku => ("SKU", "VARIATION"),
        ProductDisplay::Title => ("PRODUCT", "VARIATION"),
        ProductDisplay::Both => ("SKU", "PRODUCT"),
    }
}

fn cells(row: &ProductLine, display: ProductDisplay) -> (String, String) {
    let (first, second) = match display {
        ProductDisplay::Sku => (row.code.as_str(), row.variant.as_str()),
        ProductDisplay::Title => {
            let title = if row.description.is_empty() { &row.code } else { &row.description };
            (title.as_str(), row.variant.as_str())
        }
        ProductDisplay::Both => {
            let text = if row.description.is_empty() { &row.variant } else { &row.description };
            (row.code.as_str(), text.as_str())
        }
    };
    let first = match truncate(first, 10) {
        s if s.is_empty() => "-".to_string(),
        s => s,
    };
    let second = match truncate(second, 45).to_uppercase() {
        s if s.is_empty() => "-".to_string(),
        s => s,
    };
    (first, second)
}

/// Order line plus the two-column table. Returns how many rows were drawn.
fn order_table(
    canvas: &mut Canvas,
    layout: &LayoutConfig,
    top: f32,
    heading: &str,
    rows: &[ProductLine],
) -> usize {
    let (left, right) = (layout.margin_left, canvas.width() - layout.margin_right);
    let font_size = layout.font_size;
    let row_size = highlight_size(font_size);
    let line_height = row_size + 2.0;
    let sku_x = left + 2.0;
    let variation_x = left + 50.0;
    let qty_x = right - 35.0;
    let limit = canvas.height() - layout.margin_bottom - 5.0;

    let mut y = top;
    canvas.text(sku_x, y, font_size, Font::Bold, heading);
    y += 2.0;
    let table_top = y;
    canvas.hline(left, right, y, 0.8, BLACK);
    y += line_height;
    let (first, second) = headings(layout.display);
    canvas.text(sku_x, y, font_size, Font::Bold, first);
    canvas.text(variation_x, y, font_size, Font::Bold, second);
    canvas.text(qty_x, y, font_size, Font::Bold, "Qty");
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
        canvas.text(sku_x, y, row_size, Font::Bold, &first);
        canvas.text(variation_x, y, font_size, Font::Regular, &second);
        canvas.text(qty_x, y, row_size, Font::Bold, &row.quantity.to_string());
        y += line_height;
        drawn += 1;
        if drawn < page_rows && y + line_height <= limit {
            canvas.hline(left, right, y - 1.0, 0.3, DIVIDER);
        }
    }

    let bottom = y.min(limit);
    canvas.hline(left, right, bottom, 0.8, BLACK);
    canvas.line((variation_x - 5.0, table_top), (variation_x - 5.0, bottom), 0.5, BLACK);
    canvas.line((qty_x - 5.0, table_top), (qty_x - 5.0, bottom), 0.5, BLACK);
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::tests::{label, page_sizes, page_texts, source_pdf};
    use crate::compose::{Format, compose};
    use crate::model::LabelKind;

    #[test]
    fn test_cpf_pages_are_shorter_and_show_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_pdf(dir.path());
        let mut l = label(&source, 0, "lote-p1-r1", 2);
        l.kind = LabelKind::Cpf;
        l.synthetic_id = true;
        l.invoice = None;
        l.order_number = Some("250301ABCD1234".into());
        l.manifest[0].variant = "Azul,P".into();

        let out = dir.path().join("cpf.pdf");
        let stats = compose(&[l], Format::Cpf, &LayoutConfig::default(), &out).unwrap();
        assert_eq!(stats.pages, 1);
        let sizes = page_sizes(&out);
        assert!((sizes[0][3] - 637.795).abs() < 0.01);
        let text = &page_texts(&out)[0];
        assert!(text.contains("Order: 250301ABCD1234"));
        assert!(text.contains("(AZUL,P)"));
        assert!(text.contains("(VARIATION)"));
    }

    #[test]
    fn test_cells_truncate_and_upper_case() {
        let row = ProductLine::new("VESTIDO-LONGO-01", "Vestido", "Floral,GG", 2);
        let (sku, variation) = cells(&row, ProductDisplay::Sku);
        assert_eq!(sku, "VESTIDO-..");
        assert_eq!(variation, "FLORAL,GG");
        let (_, product) = cells(&row, ProductDisplay::Both);
        assert_eq!(product, "VESTIDO");
        let empty = ProductLine::new("", "", "", 1);
        assert_eq!(cells(&empty, ProductDisplay::Sku), ("-".to_string(), "-".to_string()));
    }
}
