// src/compose/mod.rs

pub mod alt_format;
pub mod canvas;
pub mod cpf;
pub mod regular;
pub mod sources;

use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{info, info_span, warn};

use crate::config::LayoutConfig;
use crate::error::Result;
use crate::model::{Label, LabelKind, ProductLine};
use crate::ordering::order_products;
use canvas::{Canvas, Font, GREY, font_entries};
use sources::{SourcePage, SourceSet};

/// Output page family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    Regular,
    Cpf,
    AltFormat,
}

impl Format {
    pub fn for_kind(kind: LabelKind) -> Self {
        match kind {
            LabelKind::Cpf => Format::Cpf,
            LabelKind::AltFormat => Format::AltFormat,
            LabelKind::None | LabelKind::Pickup => Format::Regular,
        }
    }

    pub fn page_height(self, layout: &LayoutConfig) -> f32 {
        match self {
            Format::Regular => layout.page_height(),
            Format::Cpf | Format::AltFormat => layout.cpf_page_height(),
        }
    }

    fn footer_x(self, layout: &LayoutConfig) -> f32 {
        match self {
            Format::Regular => layout.margin_left + 2.0,
            Format::Cpf | Format::AltFormat => layout.page_width() - layout.margin_right - 15.0,
        }
    }

    /// File name prefix of this format's output PDF.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Format::Regular => "labels",
            Format::Cpf => "cpf",
            Format::AltFormat => "alt",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComposeStats {
    pub labels: usize,
    pub pages: usize,
    pub with_manifest: usize,
    pub without_manifest: usize,
}

/// Render `labels`, in the given order, into one PDF at `path`.
///
/// Source documents are imported into the output on first use and released
/// when this returns, whichever way it returns.
pub fn compose(
    labels: &[Label],
    format: Format,
    layout: &LayoutConfig,
    path: &Path,
) -> Result<ComposeStats> {
    let _span = info_span!("compose", file = %path.display(), ?format).entered();
    let mut composer = Composer::new(layout, format);
    for (i, label) in labels.iter().enumerate() {
        let number = i + 1;
        match format {
            Format::Regular => regular::render(&mut composer, label, number)?,
            Format::Cpf => cpf::render(&mut composer, label, number)?,
            Format::AltFormat => alt_format::render(&mut composer, label, number)?,
        }
        if label.manifest.is_empty() {
            composer.stats.without_manifest += 1;
        } else {
            composer.stats.with_manifest += 1;
        }
        composer.stats.labels += 1;
    }
    let stats = composer.save(path)?;
    info!(
        labels = stats.labels,
        pages = stats.pages,
        with_manifest = stats.with_manifest,
        without_manifest = stats.without_manifest,
        "PDF written"
    );
    Ok(stats)
}

/// Output document under construction plus the sources it draws from.
pub struct Composer<'a> {
    pub(crate) layout: &'a LayoutConfig,
    format: Format,
    doc: Document,
    pages_id: ObjectId,
    fonts: ObjectId,
    kids: Vec<Object>,
    sources: SourceSet,
    stats: ComposeStats,
}

impl<'a> Composer<'a> {
    fn new(layout: &'a LayoutConfig, format: Format) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(font_dict(Font::Regular));
        let bold = doc.add_object(font_dict(Font::Bold));
        let fonts = doc.add_object(font_entries(regular, bold));
        Self {
            layout,
            format,
            doc,
            pages_id,
            fonts,
            kids: Vec::new(),
            sources: SourceSet::new(),
            stats: ComposeStats::default(),
        }
    }

    pub(crate) fn page_size(&self) -> (f32, f32) {
        (self.layout.page_width(), self.format.page_height(self.layout))
    }

    /// Form XObject for the page a label was cut from.
    pub(crate) fn source(&mut self, label: &Label) -> Result<SourcePage> {
        self.sources.page(&mut self.doc, &label.source, label.page_index)
    }

    /// Stamp the running label number in the footer.
    pub(crate) fn footer(&self, canvas: &mut Canvas, number: usize) {
        let y = canvas.height() - self.layout.margin_bottom + 2.0;
        let x = self.format.footer_x(self.layout);
        canvas.text_grey(x, y, 6.0, Font::Regular, GREY, &format!("p.{number}"));
    }

    pub(crate) fn push(&mut self, canvas: Canvas) -> Result<()> {
        let (width, height) = (canvas.width(), canvas.height());
        let (content, xobjects) = canvas.finish()?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
        let mut resources = dictionary! { "Font" => self.fonts };
        if !xobjects.is_empty() {
            resources.set("XObject", xobjects);
        }
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => resources,
            "Contents" => content_id,
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    /// Pages holding manifest rows that did not fit under the label.
    pub(crate) fn continuation<T, D>(
        &mut self,
        label: &Label,
        number: usize,
        mut rest: &[ProductLine],
        table: T,
        decorate: D,
    ) -> Result<()>
    where
        T: Fn(&mut Canvas, f32, &[ProductLine]) -> usize,
        D: Fn(&mut Canvas),
    {
        let (width, height) = self.page_size();
        let layout = self.layout;
        while !rest.is_empty() {
            let mut canvas = Canvas::new(width, height);
            let top = layout.margin_top + 10.0;
            canvas.text(
                layout.margin_left + 2.0,
                top,
                layout.font_size + 1.0,
                Font::Bold,
                &format!("CONTINUATION — invoice: {}", display_invoice(label)),
            );
            decorate(&mut canvas);
            let drawn = table(&mut canvas, top + 6.0, rest);
            self.footer(&mut canvas, number);
            self.push(canvas)?;
            if drawn == 0 {
                warn!(invoice = %label.invoice_number, rows = rest.len(), "Manifest rows do not fit a page");
                break;
            }
            rest = &rest[drawn..];
        }
        Ok(())
    }

    fn save(&mut self, path: &Path) -> Result<ComposeStats> {
        let count = self.kids.len();
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => std::mem::take(&mut self.kids),
                "Count" => count as i64,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        // Drops the page trees and catalogs of imported sources.
        self.doc.prune_objects();
        write_atomic(&mut self.doc, path)?;
        self.stats.pages = count;
        Ok(self.stats.clone())
    }
}

fn font_dict(font: Font) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_font(),
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Save through a temporary file in the target directory, renamed on success.
pub fn write_atomic(doc: &mut Document, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        doc.save_to(&mut writer)?;
        writer.flush()?;
    }
    tmp.persist(path)?;
    Ok(())
}

/// Manifest lines in the order tables list them.
pub(crate) fn ordered_manifest(label: &Label) -> Vec<ProductLine> {
    let mut rows = label.manifest.clone();
    order_products(&mut rows);
    rows
}

/// Number printed on the page: the invoice, or the order for synthetic ids.
pub(crate) fn display_invoice(label: &Label) -> &str {
    if label.synthetic_id {
        label.order_number.as_deref().unwrap_or(&label.invoice_number)
    } else {
        &label.invoice_number
    }
}

/// Row text 50% larger than the base font for codes and quantities.
pub(crate) fn highlight_size(font_size: f32) -> f32 {
    (font_size * 1.5).round()
}
