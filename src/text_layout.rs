//! Positional text extraction.
//!
//! Walks a page's content stream with a reduced PDF text-rendering state
//! machine and produces [`TextRun`]s placed in page space (origin top-left,
//! y growing downwards). The segmenter cuts pages into label regions by
//! asking a [`PageLayout`] for the text that falls inside a rectangle.
//!
//! Handled operators: `q Q cm BT ET Tf Tm Td TD T* TL Tc Tw Tz Ts Tj TJ ' "`
//! and `Do` for form XObjects.

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use regex::Regex;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::Result;
use crate::model::Rect;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
const MAX_FORM_DEPTH: usize = 8;
/// Glyph width used when a font carries no metrics, in 1/1000 em.
const DEFAULT_GLYPH_WIDTH: f32 = 500.0;
/// `TJ` adjustments below this (1/1000 em) read as a word break.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A run of text at a position on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    /// Left edge, from the page's left side.
    pub x: f32,
    /// Baseline, from the page's top side.
    pub y: f32,
    pub width: f32,
    pub size: f32,
}

impl TextRun {
    /// Point used to decide which region a run belongs to.
    fn anchor(&self) -> (f32, f32) {
        (self.x + self.width.min(self.size) * 0.5, self.y - self.size * 0.3)
    }
}

/// Text that can be queried by region.
pub trait RegionText {
    fn size(&self) -> (f32, f32);
    fn text_in(&self, rect: &Rect) -> String;

    fn full_text(&self) -> String {
        let (w, h) = self.size();
        self.text_in(&Rect::new(0.0, 0.0, w, h))
    }
}

/// All text runs of one page.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub runs: Vec<TextRun>,
}

impl PageLayout {
    /// Bounding box of all text on the page.
    pub fn content_bounds(&self) -> Option<Rect> {
        self.runs
            .iter()
            .filter(|r| !r.text.trim().is_empty())
            .map(|r| Rect::new(r.x, r.y - r.size, r.x + r.width, r.y + r.size * 0.25))
            .reduce(|a, b| Rect::new(a.x0.min(b.x0), a.y0.min(b.y0), a.x1.max(b.x1), a.y1.max(b.y1)))
    }

    pub fn page_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

impl RegionText for PageLayout {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn text_in(&self, rect: &Rect) -> String {
        let inside: Vec<&TextRun> = self
            .runs
            .iter()
            .filter(|r| {
                let (x, y) = r.anchor();
                rect.contains(x, y)
            })
            .collect();
        group_into_lines(inside)
    }
}

/// Top-to-bottom lines, runs left-to-right, one `\n` per line.
fn group_into_lines(mut runs: Vec<&TextRun>) -> String {
    runs.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<Vec<&TextRun>> = Vec::new();
    for run in runs {
        let same_line = lines
            .last()
            .is_some_and(|line| (run.y - line[0].y).abs() <= (line[0].size * 0.4).max(2.0));
        if let (true, Some(line)) = (same_line, lines.last_mut()) {
            line.push(run);
            continue;
        }
        lines.push(vec![run]);
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
            let mut out = String::new();
            let mut prev_end: Option<f32> = None;
            for run in line {
                let spaced = prev_end.is_some_and(|end| run.x - end > run.size * 0.15);
                if spaced && !out.ends_with(' ') && !run.text.starts_with(' ') {
                    out.push(' ');
                }
                out.push_str(&run.text);
                prev_end = Some(run.x + run.width);
            }
            out.trim().to_string()
        })
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Page-level entry points
// ---------------------------------------------------------------------------

/// Attribute of a page dictionary, following the `Parent` chain.
pub fn inherited_attr<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return doc.dereference(value).ok().map(|(_, o)| o);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// `[x0, y0, x1, y1]` of the page's media box in PDF user space.
pub fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let fallback = [0.0, 0.0, 612.0, 792.0];
    let Some(Object::Array(items)) = inherited_attr(doc, page_id, b"MediaBox") else {
        return fallback;
    };
    let nums: Vec<f32> = items
        .iter()
        .filter_map(|o| doc.dereference(o).ok().and_then(|(_, o)| number(o)))
        .collect();
    match nums.as_slice() {
        [a, b, c, d] => [a.min(*c), b.min(*d), a.max(*c), b.max(*d)],
        _ => fallback,
    }
}

/// Lay out the text of one page.
pub fn page_layout(doc: &Document, page_id: ObjectId) -> Result<PageLayout> {
    let mbox = media_box(doc, page_id);
    let content = doc.get_page_content(page_id)?;
    let resources = inherited_attr(doc, page_id, b"Resources").and_then(|o| o.as_dict().ok());

    let mut walker = Walker {
        doc,
        fonts: HashMap::new(),
        raw: Vec::new(),
    };
    walker.walk(&content, resources, IDENTITY, 0)?;

    let runs = walker
        .raw
        .into_iter()
        .map(|r| TextRun {
            text: r.text,
            x: r.x - mbox[0],
            y: mbox[3] - r.y,
            width: r.width,
            size: r.size,
        })
        .collect();

    Ok(PageLayout {
        width: mbox[2] - mbox[0],
        height: mbox[3] - mbox[1],
        runs,
    })
}

// ---------------------------------------------------------------------------
// Content stream walker
// ---------------------------------------------------------------------------

fn mul(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

pub(crate) fn number(o: &Object) -> Option<f32> {
    match o {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn matrix_from(operands: &[Object]) -> Option<Matrix> {
    let v: Vec<f32> = operands.iter().filter_map(number).collect();
    (v.len() == 6).then(|| [v[0], v[1], v[2], v[3], v[4], v[5]])
}

#[derive(Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Rc<FontDecoder>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horiz_scale: f32,
    leading: f32,
    rise: f32,
}

impl GraphicsState {
    fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horiz_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

struct RawRun {
    text: String,
    x: f32,
    y: f32,
    width: f32,
    size: f32,
}

struct Walker<'a> {
    doc: &'a Document,
    fonts: HashMap<ObjectId, Rc<FontDecoder>>,
    raw: Vec<RawRun>,
}

impl<'a> Walker<'a> {
    fn walk(
        &mut self,
        content: &[u8],
        resources: Option<&'a Dictionary>,
        ctm: Matrix,
        depth: usize,
    ) -> Result<()> {
        let ops = Content::decode(content)?.operations;

        let mut gs = GraphicsState::new(ctm);
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut tm = IDENTITY;
        let mut tlm = IDENTITY;

        for op in &ops {
            let args = &op.operands;
            match op.operator.as_str() {
                "q" => stack.push(gs.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        gs = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from(args) {
                        gs.ctm = mul(&m, &gs.ctm);
                    }
                }
                "BT" => {
                    tm = IDENTITY;
                    tlm = IDENTITY;
                }
                "Tf" => {
                    if let (Some(Object::Name(key)), Some(size)) =
                        (args.first(), args.get(1).and_then(number))
                    {
                        gs.font = self.font(resources, key);
                        gs.font_size = size;
                    }
                }
                "Tm" => {
                    if let Some(m) = matrix_from(args) {
                        tm = m;
                        tlm = m;
                    }
                }
                "Td" | "TD" => {
                    if let (Some(tx), Some(ty)) =
                        (args.first().and_then(number), args.get(1).and_then(number))
                    {
                        if op.operator == "TD" {
                            gs.leading = -ty;
                        }
                        tlm = mul(&[1.0, 0.0, 0.0, 1.0, tx, ty], &tlm);
                        tm = tlm;
                    }
                }
                "T*" => {
                    tlm = mul(&[1.0, 0.0, 0.0, 1.0, 0.0, -gs.leading], &tlm);
                    tm = tlm;
                }
                "TL" => gs.leading = args.first().and_then(number).unwrap_or(gs.leading),
                "Tc" => gs.char_spacing = args.first().and_then(number).unwrap_or(0.0),
                "Tw" => gs.word_spacing = args.first().and_then(number).unwrap_or(0.0),
                "Tz" => gs.horiz_scale = args.first().and_then(number).unwrap_or(100.0) / 100.0,
                "Ts" => gs.rise = args.first().and_then(number).unwrap_or(0.0),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = args.first() {
                        self.show(&gs, &mut tm, &[ShowItem::Bytes(bytes)]);
                    }
                }
                "'" | "\"" => {
                    if op.operator == "\"" {
                        gs.word_spacing = args.first().and_then(number).unwrap_or(gs.word_spacing);
                        gs.char_spacing = args.get(1).and_then(number).unwrap_or(gs.char_spacing);
                    }
                    tlm = mul(&[1.0, 0.0, 0.0, 1.0, 0.0, -gs.leading], &tlm);
                    tm = tlm;
                    if let Some(Object::String(bytes, _)) = args.last() {
                        self.show(&gs, &mut tm, &[ShowItem::Bytes(bytes)]);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = args.first() {
                        let parts: Vec<ShowItem> = items
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(bytes, _) => Some(ShowItem::Bytes(bytes)),
                                other => number(other).map(ShowItem::Adjust),
                            })
                            .collect();
                        self.show(&gs, &mut tm, &parts);
                    }
                }
                "Do" if depth < MAX_FORM_DEPTH => {
                    if let Some(Object::Name(name)) = args.first() {
                        self.form(resources, name, &gs.ctm, depth)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn form(
        &mut self,
        resources: Option<&'a Dictionary>,
        name: &[u8],
        ctm: &Matrix,
        depth: usize,
    ) -> Result<()> {
        let doc = self.doc;
        let Some(stream) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|x| doc.dereference(x).ok())
            .and_then(|(_, x)| x.as_dict().ok())
            .and_then(|x| x.get(name).ok())
            .and_then(|s| doc.dereference(s).ok())
            .and_then(|(_, s)| s.as_stream().ok())
        else {
            return Ok(());
        };
        let is_form = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|n| n == b"Form");
        if !is_form {
            return Ok(());
        }

        let content = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let form_matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|m| m.as_array().ok())
            .and_then(|m| matrix_from(m))
            .unwrap_or(IDENTITY);
        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, r)| r.as_dict().ok())
            .or(resources);

        if let Err(e) = self.walk(&content, form_resources, mul(&form_matrix, ctm), depth + 1) {
            debug!(error = %e, "Form XObject skipped");
        }
        Ok(())
    }

    fn font(&mut self, resources: Option<&'a Dictionary>, key: &[u8]) -> Option<Rc<FontDecoder>> {
        let doc = self.doc;
        let entry = resources?
            .get(b"Font")
            .ok()
            .and_then(|f| doc.dereference(f).ok())
            .and_then(|(_, f)| f.as_dict().ok())?
            .get(key)
            .ok()?;
        let (id, obj) = doc.dereference(entry).ok()?;
        if let Some(cached) = id.and_then(|id| self.fonts.get(&id)) {
            return Some(cached.clone());
        }
        let decoder = Rc::new(FontDecoder::from_dict(doc, obj.as_dict().ok()?));
        if let Some(id) = id {
            self.fonts.insert(id, decoder.clone());
        }
        Some(decoder)
    }

    fn show(&mut self, gs: &GraphicsState, tm: &mut Matrix, items: &[ShowItem]) {
        let fallback;
        let font = match gs.font.as_deref() {
            Some(f) => f,
            None => {
                fallback = FontDecoder::default();
                &fallback
            }
        };

        let start = mul(tm, &gs.ctm);
        let (x0, y0) = apply(&start, 0.0, gs.rise);
        let size = gs.font_size * (start[2] * start[2] + start[3] * start[3]).sqrt();

        let mut text = String::new();
        for item in items {
            match item {
                ShowItem::Bytes(bytes) => {
                    for code in font.codes(bytes) {
                        text.push_str(&font.decode(code));
                        let w = font.width(code) / 1000.0;
                        let mut tx = w * gs.font_size + gs.char_spacing;
                        if !font.two_byte && code == 32 {
                            tx += gs.word_spacing;
                        }
                        advance(tm, tx * gs.horiz_scale);
                    }
                }
                ShowItem::Adjust(n) => {
                    if *n < TJ_SPACE_THRESHOLD && !text.ends_with(' ') && !text.is_empty() {
                        text.push(' ');
                    }
                    advance(tm, -n / 1000.0 * gs.font_size * gs.horiz_scale);
                }
            }
        }

        if text.trim().is_empty() {
            return;
        }
        let end = mul(tm, &gs.ctm);
        let (x1, _) = apply(&end, 0.0, gs.rise);
        self.raw.push(RawRun {
            text,
            x: x0.min(x1),
            y: y0,
            width: (x1 - x0).abs(),
            size: size.abs().max(1.0),
        });
    }
}

enum ShowItem<'b> {
    Bytes(&'b [u8]),
    Adjust(f32),
}

fn advance(tm: &mut Matrix, dx: f32) {
    tm[4] += dx * tm[0];
    tm[5] += dx * tm[1];
}

// ---------------------------------------------------------------------------
// Fonts
// ---------------------------------------------------------------------------

/// Code → text and code → width for one font resource.
#[derive(Debug, Default)]
pub struct FontDecoder {
    two_byte: bool,
    to_unicode: HashMap<u32, String>,
    widths: HashMap<u32, f32>,
    default_width: Option<f32>,
}

impl FontDecoder {
    fn from_dict(doc: &Document, dict: &Dictionary) -> Self {
        let mut decoder = FontDecoder {
            two_byte: dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .is_ok_and(|n| n == b"Type0"),
            ..Default::default()
        };

        if let Some(cmap) = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, o)| o.as_stream().ok())
        {
            let bytes = cmap
                .decompressed_content()
                .unwrap_or_else(|_| cmap.content.clone());
            decoder.to_unicode = parse_to_unicode(&String::from_utf8_lossy(&bytes));
        }

        if decoder.two_byte {
            decoder.load_cid_widths(doc, dict);
        } else {
            decoder.load_simple_widths(doc, dict);
        }
        decoder
    }

    fn load_simple_widths(&mut self, doc: &Document, dict: &Dictionary) {
        let first = dict.get(b"FirstChar").ok().and_then(number).unwrap_or(0.0) as u32;
        let Some(widths) = dict
            .get(b"Widths")
            .ok()
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, o)| o.as_array().ok())
        else {
            return;
        };
        for (i, w) in widths.iter().enumerate() {
            if let Some(w) = doc.dereference(w).ok().and_then(|(_, o)| number(o)) {
                self.widths.insert(first + i as u32, w);
            }
        }
    }

    fn load_cid_widths(&mut self, doc: &Document, dict: &Dictionary) {
        let Some(descendant) = dict
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, o)| o.as_array().ok())
            .and_then(|a| a.first())
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, o)| o.as_dict().ok())
        else {
            return;
        };
        self.default_width = Some(descendant.get(b"DW").ok().and_then(number).unwrap_or(1000.0));
        let Some(w) = descendant
            .get(b"W")
            .ok()
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, o)| o.as_array().ok())
        else {
            return;
        };

        // [c [w1 w2 ...]] or [c_first c_last w]
        let mut i = 0;
        while i < w.len() {
            let Some(start) = number(&w[i]) else { break };
            match w.get(i + 1) {
                Some(Object::Array(list)) => {
                    for (k, width) in list.iter().filter_map(number).enumerate() {
                        self.widths.insert(start as u32 + k as u32, width);
                    }
                    i += 2;
                }
                Some(end) => {
                    let (Some(end), Some(width)) = (number(end), w.get(i + 2).and_then(number)) else {
                        break;
                    };
                    for code in start as u32..=end as u32 {
                        self.widths.insert(code, width);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|c| c.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
                .collect()
        } else {
            bytes.iter().map(|b| *b as u32).collect()
        }
    }

    fn decode(&self, code: u32) -> String {
        if let Some(s) = self.to_unicode.get(&code) {
            return s.clone();
        }
        if self.two_byte {
            char::from_u32(code).map(String::from).unwrap_or_default()
        } else {
            win_ansi_char(code as u8).to_string()
        }
    }

    fn width(&self, code: u32) -> f32 {
        self.widths
            .get(&code)
            .copied()
            .or(self.default_width)
            .unwrap_or(DEFAULT_GLYPH_WIDTH)
    }
}

/// Bytes 0x80..=0x9F of WinAnsiEncoding; everything else is Latin-1.
const WIN_ANSI_HIGH: [char; 32] = [
    '€', '\u{81}', '‚', 'ƒ', '„', '…', '†', '‡', 'ˆ', '‰', 'Š', '‹', 'Œ', '\u{8d}', 'Ž', '\u{8f}',
    '\u{90}', '‘', '’', '“', '”', '•', '–', '—', '˜', '™', 'š', '›', 'œ', '\u{9d}', 'ž', 'Ÿ',
];

pub fn win_ansi_char(byte: u8) -> char {
    match byte {
        0x80..=0x9F => WIN_ANSI_HIGH[(byte - 0x80) as usize],
        b => b as char,
    }
}

/// Inverse of [`win_ansi_char`]; unmappable characters become `?`.
pub fn win_ansi_byte(c: char) -> u8 {
    if let Some(i) = WIN_ANSI_HIGH.iter().position(|&h| h == c) {
        return 0x80 + i as u8;
    }
    match c as u32 {
        v @ 0x20..=0x7E | v @ 0xA0..=0xFF => v as u8,
        _ => b'?',
    }
}

static BFCHAR_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)beginbfchar(.*?)endbfchar").expect("valid cmap regex"));
static BFRANGE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)beginbfrange(.*?)endbfrange").expect("valid cmap regex"));
static HEX_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").expect("valid cmap regex")
});
static RANGE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(<[0-9A-Fa-f]*>|\[[^\]]*\])")
        .expect("valid cmap regex")
});
static HEX_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([0-9A-Fa-f]*)>").expect("valid cmap regex"));

fn hex_code(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

/// Destination strings in a CMap are UTF-16BE.
fn utf16_hex(hex: &str) -> String {
    let units: Vec<u16> = hex
        .as_bytes()
        .chunks(4)
        .filter_map(|c| std::str::from_utf8(c).ok())
        .filter_map(|c| u16::from_str_radix(c, 16).ok())
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parse the `bfchar` and `bfrange` sections of a ToUnicode CMap.
pub fn parse_to_unicode(cmap: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();

    for block in BFCHAR_BLOCK.captures_iter(cmap) {
        for pair in HEX_PAIR.captures_iter(&block[1]) {
            if let Some(code) = hex_code(&pair[1]) {
                map.insert(code, utf16_hex(&pair[2]));
            }
        }
    }

    for block in BFRANGE_BLOCK.captures_iter(cmap) {
        for entry in RANGE_ENTRY.captures_iter(&block[1]) {
            let (Some(lo), Some(hi)) = (hex_code(&entry[1]), hex_code(&entry[2])) else {
                continue;
            };
            if hi < lo || hi - lo > 0xFFFF {
                continue;
            }
            let dst = &entry[3];
            if dst.starts_with('[') {
                for (code, tok) in (lo..=hi).zip(HEX_TOKEN.captures_iter(dst)) {
                    map.insert(code, utf16_hex(&tok[1]));
                }
            } else {
                let base = utf16_hex(dst.trim_matches(|c| c == '<' || c == '>'));
                let mut chars: Vec<char> = base.chars().collect();
                for code in lo..=hi {
                    map.insert(code, chars.iter().collect());
                    if let Some(last) = chars.last_mut() {
                        *last = char::from_u32(*last as u32 + 1).unwrap_or(*last);
                    }
                }
            }
        }
    }
    map
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::{Stream, StringFormat, dictionary};

    /// Text placed by `Td`: x, y (PDF space), size, text.
    pub(crate) type Placed<'a> = (f32, f32, f32, &'a str);

    /// One-page document with Helvetica text.
    pub(crate) fn doc_with_text(width: f32, height: f32, items: &[Placed<'_>]) -> Document {
        doc_with_pages(width, height, &[items])
    }

    /// Multi-page document, every page the same size.
    pub(crate) fn doc_with_pages(width: f32, height: f32, pages: &[&[Placed<'_>]]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut kids = Vec::new();
        for items in pages {
            let mut ops = Vec::new();
            for (x, y, size, text) in items.iter() {
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new("Tf", vec!["F1".into(), (*size).into()]));
                ops.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
                let bytes: Vec<u8> = text.chars().map(win_ansi_byte).collect();
                ops.push(Operation::new("Tj", vec![Object::String(bytes, StringFormat::Literal)]));
                ops.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations: ops };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn first_page(doc: &Document) -> ObjectId {
        *doc.get_pages().values().next().unwrap()
    }

    #[test]
    fn test_layout_positions_are_top_left() {
        let doc = doc_with_text(600.0, 800.0, &[(50.0, 700.0, 10.0, "Hello")]);
        let layout = page_layout(&doc, first_page(&doc)).unwrap();
        assert_eq!(layout.width, 600.0);
        assert_eq!(layout.runs.len(), 1);
        let run = &layout.runs[0];
        assert_eq!(run.text, "Hello");
        assert!((run.x - 50.0).abs() < 0.01);
        assert!((run.y - 100.0).abs() < 0.01);
        assert!((run.width - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_text_in_region_groups_lines() {
        let doc = doc_with_text(
            600.0,
            800.0,
            &[
                (50.0, 700.0, 10.0, "Emissão:"),
                (50.0, 688.0, 10.0, "1234"),
                (400.0, 700.0, 10.0, "right side"),
                (50.0, 200.0, 10.0, "bottom"),
            ],
        );
        let layout = page_layout(&doc, first_page(&doc)).unwrap();
        let top_left = layout.text_in(&Rect::new(0.0, 0.0, 300.0, 400.0));
        assert_eq!(top_left, "Emissão:\n1234");
        let top = layout.text_in(&Rect::new(0.0, 0.0, 600.0, 400.0));
        assert_eq!(top, "Emissão: right side\n1234");
        assert_eq!(layout.text_in(&Rect::new(0.0, 400.0, 600.0, 800.0)), "bottom");
    }

    #[test]
    fn test_content_bounds() {
        let doc = doc_with_text(300.0, 300.0, &[(20.0, 250.0, 10.0, "ab"), (100.0, 100.0, 10.0, "cd")]);
        let layout = page_layout(&doc, first_page(&doc)).unwrap();
        let b = layout.content_bounds().unwrap();
        assert!((b.x0 - 20.0).abs() < 0.01);
        assert!((b.y0 - 40.0).abs() < 0.01);
        assert!((b.x1 - 110.0).abs() < 0.01);
        assert!((b.y1 - 202.5).abs() < 0.01);
    }

    #[test]
    fn test_parse_to_unicode() {
        let cmap = "
            begincmap
            2 beginbfchar
            <0003> <0020>
            <0024> <00C7>
            endbfchar
            1 beginbfrange
            <0041> <0043> <0061>
            endbfrange
            1 beginbfrange
            <0010> <0011> [<0058> <0059>]
            endbfrange
            endcmap";
        let map = parse_to_unicode(cmap);
        assert_eq!(map[&0x03], " ");
        assert_eq!(map[&0x24], "Ç");
        assert_eq!(map[&0x41], "a");
        assert_eq!(map[&0x43], "c");
        assert_eq!(map[&0x10], "X");
        assert_eq!(map[&0x11], "Y");
    }

    #[test]
    fn test_win_ansi_round_trip_for_accents() {
        for c in ['ã', 'Ç', '—', '€', 'a'] {
            assert_eq!(win_ansi_char(win_ansi_byte(c)), c);
        }
        assert_eq!(win_ansi_byte('✓'), b'?');
    }
}
