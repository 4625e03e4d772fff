// src/compose/alt_format.rs

use super::canvas::{Canvas, Font};
use super::regular::{manifest_table, product_header, scaled_height};
use super::{Composer, ordered_manifest};
use crate::barcode::Barcode;
use crate::config::LayoutConfig;
use crate::error::Result;
use crate::model::{Label, Rect};

/// Width of the right-hand strip holding the vertical barcode.
pub const SIDEBAR: f32 = 28.0;
const MIN_TABLE_SPACE: f32 = 60.0;

pub(crate) fn render(ctx: &mut Composer<'_>, label: &Label, number: usize) -> Result<()> {
    let layout = ctx.layout;
    let (width, height) = ctx.page_size();
    let (ml, mr, mt, mb) = (
        layout.margin_left,
        layout.margin_right,
        layout.margin_top,
        layout.margin_bottom,
    );
    let area_width = width - ml - mr - SIDEBAR;
    let label_height = scaled_height(label.region, area_width).min(height - mt - mb - MIN_TABLE_SPACE);
    let access_key = label.invoice.as_ref().and_then(|m| m.access_key.as_deref());

    let source = ctx.source(label)?;
    let mut canvas = Canvas::new(width, height);
    canvas.place(&source, label.region, Rect::new(ml, mt, ml + area_width, mt + label_height));
    if let Some(key) = access_key {
        sidebar(&mut canvas, layout, key, mt + label_height);
    }
    ctx.footer(&mut canvas, number);

    let rows = ordered_manifest(label);
    if rows.is_empty() {
        return ctx.push(canvas);
    }
    let header = product_header(label, &rows, layout.display);
    let font_size = layout.font_size;
    let drawn = manifest_table(&mut canvas, layout, mt + label_height + 3.0, &header, &rows, font_size);
    ctx.push(canvas)?;
    ctx.continuation(
        label,
        number,
        &rows[drawn..],
        |canvas, top, rest| manifest_table(canvas, layout, top, &header, rest, font_size),
        |canvas| {
            if let Some(key) = access_key {
                key_text(canvas, layout, key);
            }
        },
    )
}

/// Access key in groups of four digits.
pub fn group_key(key: &str) -> String {
    key.as_bytes()
        .chunks(4)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_x(canvas: &Canvas, layout: &LayoutConfig) -> f32 {
    canvas.width() - layout.margin_right - SIDEBAR
}

fn key_text(canvas: &mut Canvas, layout: &LayoutConfig, key: &str) {
    let x = strip_x(canvas, layout);
    canvas.text_down(x + 1.0, layout.margin_top + 8.0, 4.0, Font::Regular, &format!("Key: {}", group_key(key)));
}

/// Captions, key text and vertical barcode down the right edge.
fn sidebar(canvas: &mut Canvas, layout: &LayoutConfig, key: &str, bottom: f32) {
    let x = strip_x(canvas, layout);
    let top = layout.margin_top;
    key_text(canvas, layout, key);
    canvas.text_down(x + 8.0, top + 8.0, 7.0, Font::Bold, "DANFE");
    canvas.text_down(x + 17.0, top + 8.0, 5.0, Font::Regular, "Simplified");

    let area = Rect::new(x + 6.0, top + 60.0, x + SIDEBAR - 2.0, bottom - 10.0);
    if area.height() <= 0.0 {
        return;
    }
    if let Some(code) = Barcode::access_key(key) {
        canvas.barcode(&code, area, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::tests::{KEY, label, page_sizes, page_texts, source_pdf};
    use crate::compose::{Format, compose};
    use crate::model::LabelKind;

    #[test]
    fn test_group_key() {
        assert_eq!(group_key("352501123456"), "3525 0112 3456");
        assert_eq!(group_key("12345"), "1234 5");
    }

    #[test]
    fn test_key_text_on_every_page() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_pdf(dir.path());
        let mut l = label(&source, 0, "1234", 14);
        l.kind = LabelKind::AltFormat;
        let out = dir.path().join("alt.pdf");
        let layout = LayoutConfig::default();
        let stats = compose(&[l], Format::AltFormat, &layout, &out).unwrap();
        assert_eq!(stats.pages, 2);
        assert!((page_sizes(&out)[1][3] - 637.795).abs() < 0.01);

        let grouped = format!("(Key: {})", group_key(KEY));
        let texts = page_texts(&out);
        assert!(texts.iter().all(|t| t.contains(&grouped)));
        assert!(texts[0].contains("(DANFE)"));
        assert!(texts[1].contains("CONTINUATION"));
        assert!(!texts[1].contains("(DANFE)"));
    }
}
