// src/compose/canvas.rs

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, StringFormat};

use super::sources::SourcePage;
use crate::barcode::Barcode;
use crate::error::Result;
use crate::model::Rect;
use crate::text_layout::win_ansi_byte;

/// Standard fonts registered on every output page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    pub(crate) fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    pub(crate) fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
        }
    }
}

pub const BLACK: f32 = 0.0;
pub const GREY: f32 = 0.4;
pub const DIVIDER: f32 = 0.6;

/// Drawing surface for one output page.
///
/// Coordinates are top-left based with y growing down, the same space label
/// regions use; conversion to PDF user space happens here.
pub struct Canvas {
    width: f32,
    height: f32,
    ops: Vec<Operation>,
    xobjects: Dictionary,
}

impl Canvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
            xobjects: Dictionary::new(),
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    fn flip(&self, y: f32) -> f32 {
        self.height - y
    }

    fn push(&mut self, operator: &str, operands: Vec<Object>) {
        self.ops.push(Operation::new(operator, operands));
    }

    /// Text with its baseline at `y`.
    pub fn text(&mut self, x: f32, y: f32, size: f32, font: Font, text: &str) {
        self.text_grey(x, y, size, font, BLACK, text);
    }

    pub fn text_grey(&mut self, x: f32, y: f32, size: f32, font: Font, grey: f32, text: &str) {
        if text.is_empty() {
            return;
        }
        let y = self.flip(y);
        self.push("q", vec![]);
        self.push("g", vec![grey.into()]);
        self.push("BT", vec![]);
        self.push("Tf", vec![font.resource_name().into(), size.into()]);
        self.push("Td", vec![x.into(), y.into()]);
        self.push("Tj", vec![encode(text)]);
        self.push("ET", vec![]);
        self.push("Q", vec![]);
    }

    /// Text reading top to bottom, glyph tops facing right, starting at (x, y).
    pub fn text_down(&mut self, x: f32, y: f32, size: f32, font: Font, text: &str) {
        if text.is_empty() {
            return;
        }
        let y = self.flip(y);
        self.push("BT", vec![]);
        self.push("Tf", vec![font.resource_name().into(), size.into()]);
        self.push(
            "Tm",
            vec![0.into(), (-1).into(), 1.into(), 0.into(), x.into(), y.into()],
        );
        self.push("Tj", vec![encode(text)]);
        self.push("ET", vec![]);
    }

    pub fn line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, grey: f32) {
        let (y0, y1) = (self.flip(from.1), self.flip(to.1));
        self.push("q", vec![]);
        self.push("G", vec![grey.into()]);
        self.push("w", vec![width.into()]);
        self.push("m", vec![from.0.into(), y0.into()]);
        self.push("l", vec![to.0.into(), y1.into()]);
        self.push("S", vec![]);
        self.push("Q", vec![]);
    }

    /// Horizontal rule across `[x0, x1]`.
    pub fn hline(&mut self, x0: f32, x1: f32, y: f32, width: f32, grey: f32) {
        self.line((x0, y), (x1, y), width, grey);
    }

    pub fn fill_rect(&mut self, rect: Rect) {
        let y = self.flip(rect.y1);
        self.push(
            "re",
            vec![rect.x0.into(), y.into(), rect.width().into(), rect.height().into()],
        );
        self.push("f", vec![]);
    }

    /// Draw `clip` of a source page scaled into `dest`, aspect kept and centred.
    /// Returns the rectangle actually covered.
    pub fn place(&mut self, page: &SourcePage, clip: Rect, dest: Rect) -> Rect {
        if clip.width() <= 0.0 || clip.height() <= 0.0 {
            return Rect::new(dest.x0, dest.y0, dest.x0, dest.y0);
        }
        let scale = (dest.width() / clip.width()).min(dest.height() / clip.height());
        let (w, h) = (clip.width() * scale, clip.height() * scale);
        let x0 = dest.x0 + (dest.width() - w) / 2.0;
        let y0 = dest.y0 + (dest.height() - h) / 2.0;
        let drawn = Rect::new(x0, y0, x0 + w, y0 + h);

        // Clip corner in the form's own space (the source page's user space).
        let [mx0, _, _, my1] = page.media_box;
        let src_x = mx0 + clip.x0;
        let src_y = my1 - clip.y1;
        let tx = drawn.x0 - scale * src_x;
        let ty = self.flip(drawn.y1) - scale * src_y;

        self.xobjects.set(page.name.as_str(), page.form_id);
        self.push("q", vec![]);
        self.push(
            "re",
            vec![drawn.x0.into(), self.flip(drawn.y1).into(), w.into(), h.into()],
        );
        self.push("W", vec![]);
        self.push("n", vec![]);
        self.push(
            "cm",
            vec![scale.into(), 0.into(), 0.into(), scale.into(), tx.into(), ty.into()],
        );
        self.push("Do", vec![Object::Name(page.name.as_bytes().to_vec())]);
        self.push("Q", vec![]);
        drawn
    }

    /// Bars of a barcode filling `dest`. Vertical barcodes run top to bottom.
    pub fn barcode(&mut self, code: &Barcode, dest: Rect, vertical: bool) {
        let modules = code.module_count();
        if modules == 0 {
            return;
        }
        let extent = if vertical { dest.height() } else { dest.width() };
        let module = extent / modules as f32;
        self.push("q", vec![]);
        self.push("g", vec![BLACK.into()]);
        for (start, run) in code.bars() {
            let offset = start as f32 * module;
            let size = run as f32 * module;
            let bar = if vertical {
                Rect::new(dest.x0, dest.y0 + offset, dest.x1, dest.y0 + offset + size)
            } else {
                Rect::new(dest.x0 + offset, dest.y0, dest.x0 + offset + size, dest.y1)
            };
            self.fill_rect(bar);
        }
        self.push("Q", vec![]);
    }

    /// Content stream bytes and the XObjects the page uses.
    pub(crate) fn finish(self) -> Result<(Vec<u8>, Dictionary)> {
        let content = Content { operations: self.ops };
        Ok((content.encode()?, self.xobjects))
    }
}

fn encode(text: &str) -> Object {
    Object::String(text.chars().map(win_ansi_byte).collect(), StringFormat::Literal)
}

/// Cut `text` to `max` characters, marking the cut with "..".
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(2)).collect();
    format!("{kept}..")
}

/// Font resource dictionary entries for the fonts above.
pub(crate) fn font_entries(regular: ObjectId, bold: ObjectId) -> Dictionary {
    let mut fonts = Dictionary::new();
    fonts.set(Font::Regular.resource_name(), regular);
    fonts.set(Font::Bold.resource_name(), bold);
    fonts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operators(canvas: Canvas) -> Vec<String> {
        let (bytes, _) = canvas.finish().unwrap();
        Content::decode(&bytes)
            .unwrap()
            .operations
            .into_iter()
            .map(|o| o.operator)
            .collect()
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("CAMISETA", 10), "CAMISETA");
        assert_eq!(truncate("CAMISETA BASICA", 10), "CAMISETA..");
        assert_eq!(truncate("Sandália", 5), "San..");
    }

    #[test]
    fn test_text_is_flipped_to_pdf_space() {
        let mut canvas = Canvas::new(200.0, 300.0);
        canvas.text(10.0, 20.0, 7.0, Font::Bold, "Q.");
        let (bytes, _) = canvas.finish().unwrap();
        let ops = Content::decode(&bytes).unwrap().operations;
        let td = ops.iter().find(|o| o.operator == "Td").unwrap();
        assert_eq!(td.operands[1].as_float().unwrap(), 280.0);
        let tf = ops.iter().find(|o| o.operator == "Tf").unwrap();
        assert_eq!(tf.operands[0].as_name().unwrap(), b"F2");
    }

    #[test]
    fn test_barcode_draws_one_rect_per_bar() {
        let code = Barcode::access_key("35240311222333000144550010000012341000012345").unwrap();
        let bars = code.bars().len();
        let mut canvas = Canvas::new(200.0, 300.0);
        canvas.barcode(&code, Rect::new(10.0, 10.0, 190.0, 45.0), false);
        let ops = operators(canvas);
        assert_eq!(ops.iter().filter(|o| *o == "re").count(), bars);
    }

    #[test]
    fn test_empty_text_draws_nothing() {
        let mut canvas = Canvas::new(200.0, 300.0);
        canvas.text(10.0, 20.0, 7.0, Font::Regular, "");
        assert!(operators(canvas).is_empty());
    }
}
