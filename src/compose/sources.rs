// src/compose/sources.rs

use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::text_layout::{inherited_attr, media_box};

/// A source page turned into a Form XObject inside the output document.
#[derive(Debug, Clone)]
pub struct SourcePage {
    pub name: String,
    pub form_id: ObjectId,
    pub media_box: [f32; 4],
}

/// Source documents imported into one output document.
///
/// Each file is loaded once, its objects renumbered into the output, and the
/// loaded handle dropped before `import` returns, so nothing stays open once
/// the set itself goes out of scope.
#[derive(Default)]
pub struct SourceSet {
    pages: HashMap<PathBuf, Vec<ObjectId>>,
    forms: HashMap<(PathBuf, usize), SourcePage>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Form XObject for one page of `path`, imported on first use.
    pub fn page(&mut self, out: &mut Document, path: &Path, index: usize) -> Result<SourcePage> {
        let key = (path.to_path_buf(), index);
        if let Some(page) = self.forms.get(&key) {
            return Ok(page.clone());
        }
        if !self.pages.contains_key(path) {
            let ids = import(out, path)?;
            self.pages.insert(path.to_path_buf(), ids);
        }
        let page_id = self
            .pages
            .get(path)
            .and_then(|ids| ids.get(index))
            .copied()
            .ok_or(Error::Pdf(lopdf::Error::PageNumberNotFound(index as u32 + 1)))?;

        let name = format!("P{}", self.forms.len() + 1);
        let page = SourcePage {
            name,
            form_id: page_form(out, page_id)?,
            media_box: media_box(out, page_id),
        };
        self.forms.insert(key, page.clone());
        Ok(page)
    }

    pub fn document_count(&self) -> usize {
        self.pages.len()
    }
}

/// Move every object of `path` into `out`; returns its page ids in order.
fn import(out: &mut Document, path: &Path) -> Result<Vec<ObjectId>> {
    let mut source = Document::load(path)?;
    source.renumber_objects_with(out.max_id + 1);
    let pages: Vec<ObjectId> = source.get_pages().into_values().collect();
    out.max_id = out.max_id.max(source.max_id);
    out.objects.extend(std::mem::take(&mut source.objects));
    debug!(file = %path.display(), pages = pages.len(), "Source imported");
    Ok(pages)
}

/// Wrap a page's content and resources in a Form XObject.
fn page_form(out: &mut Document, page_id: ObjectId) -> Result<ObjectId> {
    let [x0, y0, x1, y1] = media_box(out, page_id);
    let content = out.get_page_content(page_id)?;
    let resources = inherited_attr(out, page_id, b"Resources")
        .cloned()
        .unwrap_or_else(|| Object::Dictionary(Dictionary::new()));

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "BBox" => vec![x0.into(), y0.into(), x1.into(), y1.into()],
        "Resources" => resources,
    };
    let mut stream = Stream::new(dict, content);
    // Best effort: an uncompressible stream is stored as is.
    let _ = stream.compress();
    Ok(out.add_object(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_layout::tests::doc_with_pages;

    #[test]
    fn test_pages_are_imported_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lote.pdf");
        doc_with_pages(
            300.0,
            400.0,
            &[&[(10.0, 380.0, 8.0, "first")], &[(10.0, 380.0, 8.0, "second")]],
        )
        .save(&path)
        .unwrap();

        let mut out = Document::with_version("1.5");
        let mut sources = SourceSet::new();
        let a = sources.page(&mut out, &path, 0).unwrap();
        let b = sources.page(&mut out, &path, 1).unwrap();
        let again = sources.page(&mut out, &path, 0).unwrap();
        assert_eq!(sources.document_count(), 1);
        assert_eq!(a.form_id, again.form_id);
        assert_ne!(a.name, b.name);
        assert_eq!(a.media_box, [0.0, 0.0, 300.0, 400.0]);

        let form = out.get_object(b.form_id).unwrap().as_stream().unwrap();
        let bytes = form.decompressed_content().unwrap_or_else(|_| form.content.clone());
        let text = String::from_utf8_lossy(&bytes).into_owned();
        assert!(text.contains("(second)"));
    }

    #[test]
    fn test_missing_page_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.pdf");
        doc_with_pages(300.0, 400.0, &[&[(10.0, 380.0, 8.0, "only")]])
            .save(&path)
            .unwrap();
        let mut out = Document::with_version("1.5");
        assert!(SourceSet::new().page(&mut out, &path, 3).is_err());
    }
}
