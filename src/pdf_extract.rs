// src/pdf_extract.rs

use lopdf::{Document, ObjectId};
use std::panic;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::text_layout::{self, PageLayout, RegionText};

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we look for another text source.
const MIN_TEXT_CHARS: usize = 30;

/// An open input PDF. Pages, layouts and text live as long as the handle;
/// dropping it releases the parsed document.
pub struct SourcePdf {
    path: PathBuf,
    doc: Document,
    pages: Vec<ObjectId>,
    layouts: Vec<PageLayout>,
    texts: Vec<String>,
}

impl SourcePdf {
    /// Parse a PDF from disk and lay out every page.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let doc = Document::load_mem(&bytes)?;
        let mut pdf = Self::from_document(path, doc);

        let chars = pdf.meaningful_chars();
        if chars >= MIN_TEXT_CHARS {
            info!(pages = pdf.page_count(), chars, "Text layer read");
            return Ok(pdf);
        }

        if looks_like_scanned(&pdf.doc) {
            return Err(Error::NoTextLayer(pdf.file_name()));
        }

        // Positional walk came up short; ask pdf-extract for the plain text.
        match plain_text(&bytes) {
            Some(text) if meaningful(&text) > chars => {
                warn!(
                    chars = meaningful(&text),
                    "Positional text unavailable, using plain text for the first page"
                );
                pdf.use_plain_text(text);
                Ok(pdf)
            }
            _ if chars > 0 => Ok(pdf),
            _ => Err(Error::NoTextLayer(pdf.file_name())),
        }
    }

    /// Wrap an already parsed document.
    pub fn from_document(path: &Path, doc: Document) -> Self {
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let layouts: Vec<PageLayout> = pages
            .iter()
            .enumerate()
            .map(|(i, &id)| {
                text_layout::page_layout(&doc, id).unwrap_or_else(|e| {
                    warn!(page = i + 1, error = %e, "Page layout failed");
                    let mbox = text_layout::media_box(&doc, id);
                    PageLayout {
                        width: mbox[2] - mbox[0],
                        height: mbox[3] - mbox[1],
                        runs: Vec::new(),
                    }
                })
            })
            .collect();
        let texts = layouts.iter().map(RegionText::full_text).collect();
        Self {
            path: path.to_path_buf(),
            doc,
            pages,
            layouts,
            texts,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_id(&self, index: usize) -> Option<ObjectId> {
        self.pages.get(index).copied()
    }

    pub fn layout(&self, index: usize) -> Option<&PageLayout> {
        self.layouts.get(index)
    }

    /// Text of one page; empty past the last page.
    pub fn page_text(&self, index: usize) -> &str {
        self.texts.get(index).map(String::as_str).unwrap_or("")
    }

    /// Text of the first `n` pages joined by newlines.
    pub fn leading_text(&self, n: usize) -> String {
        self.texts
            .iter()
            .take(n)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replace the first page's text with plain text read without positions.
    /// That page keeps an empty layout, so drivers take it as one region.
    pub(crate) fn use_plain_text(&mut self, text: String) {
        if let Some(first) = self.texts.first_mut() {
            *first = text;
        }
    }

    fn meaningful_chars(&self) -> usize {
        self.texts.iter().map(|t| meaningful(t)).sum()
    }
}

impl Drop for SourcePdf {
    fn drop(&mut self) {
        debug!(file = %self.path.display(), "Source PDF released");
    }
}

fn meaningful(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Whole-document text from pdf-extract. The crate panics on some malformed
/// fonts, so the call is isolated.
fn plain_text(bytes: &[u8]) -> Option<String> {
    match panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            warn!(error = %e, "pdf-extract failed");
            None
        }
        Err(_) => {
            warn!("pdf-extract panicked");
            None
        }
    }
}

/// Heuristic: inspect the PDF object tree for signs that every page
/// is just a single image with no text operators.
///
/// A page with XObject images but no Font resources is almost certainly
/// a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false;
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let resources = text_layout::inherited_attr(doc, *object_id, b"Resources")
            .and_then(|r| r.as_dict().ok());
        let Some(resources) = resources else {
            continue;
        };

        let non_empty = |key: &[u8]| {
            resources
                .get(key)
                .ok()
                .and_then(|o| doc.dereference(o).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|d| !d.is_empty())
        };

        if non_empty(b"XObject") && !non_empty(b"Font") {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    // If ≥80% of pages are image-only, treat the whole PDF as scanned
    ratio >= 0.8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_layout::tests::{doc_with_pages, doc_with_text};
    use lopdf::{Object, Stream, dictionary};

    #[test]
    fn test_source_pages_and_text() {
        let doc = doc_with_pages(
            300.0,
            400.0,
            &[
                &[(10.0, 380.0, 10.0, "first page")],
                &[(10.0, 380.0, 10.0, "second page")],
            ],
        );
        let pdf = SourcePdf::from_document(Path::new("/in/Lote 1.pdf"), doc);
        assert_eq!(pdf.page_count(), 2);
        assert_eq!(pdf.page_text(0), "first page");
        assert_eq!(pdf.page_text(1), "second page");
        assert_eq!(pdf.page_text(7), "");
        assert_eq!(pdf.leading_text(3), "first page\nsecond page");
        assert_eq!(pdf.stem(), "Lote 1");
        assert_eq!(pdf.file_name(), "Lote 1.pdf");
        assert_eq!(pdf.layout(0).map(|l| l.width), Some(300.0));
    }

    #[test]
    fn test_open_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.pdf");
        let mut doc = doc_with_text(
            300.0,
            400.0,
            &[(10.0, 380.0, 10.0, "DANFE SIMPLIFICADO - ETIQUETA NF: 12345 REMETENTE Loja")],
        );
        doc.save(&path).unwrap();
        let pdf = SourcePdf::open(&path).unwrap();
        assert!(pdf.page_text(0).contains("NF: 12345"));
    }

    #[test]
    fn test_image_only_document_is_rejected() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "XObject", "Subtype" => "Image", "Width" => 1, "Height" => 1 },
            vec![0],
        ));
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"q 100 0 0 100 0 0 cm /Im0 Do Q".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        assert!(looks_like_scanned(&doc));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        doc.save(&path).unwrap();
        assert!(matches!(SourcePdf::open(&path), Err(Error::NoTextLayer(_))));
    }
}
