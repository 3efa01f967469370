//! The sole production compat-shim implementation:
//! structural PDF access through `lopdf`, rasterisation and structured
//! text/search through `pdfium_render`. Every other module reaches the
//! underlying libraries only through the methods on [`Document`] below —
//! `lopdf::Dictionary`/`Object` values are handed up to `annot::*` and
//! `widgets.rs` (they operate directly on PDF dictionaries, which is the
//! whole point of this engine), but `pdfium_render` types never leave this
//! module: rendering and text/search return plain owned buffers and our
//! own [`super::Rect`], never a borrowed pdfium handle.
//!
//! `lopdf` and `pdfium_render` do not share an in-memory object graph, so
//! the two are reconciled the way a caller splicing a structural editor in
//! front of a renderer normally would: `lopdf::Document` is the source of
//! truth for every mutation, and the `pdfium_render::PdfDocument` used for
//! rendering/text is rebuilt from the current serialised bytes whenever a
//! mutation has made it stale. Rebuilds are lazy (`raster_dirty`) so a
//! batch of annotation edits pays for one reparse, not one per edit.

use std::collections::BTreeSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Object, Stream};
use pdfium_render::prelude::*;

use crate::error::{Error, Result};

use super::{ObjectId, Rect};

pub struct Document {
    lopdf: lopdf::Document,
    pdfium: Pdfium,
    raster: Option<PdfDocument<'static>>,
    raster_dirty: bool,
    /// Bytes of the file as opened, kept only to support `save_incremental`.
    original_bytes: Vec<u8>,
    original_path: Option<PathBuf>,
    /// Objects touched since open; narrows what an incremental save appends.
    dirty_objects: BTreeSet<(u32, u16)>,
}

impl Document {
    fn bind_pdfium() -> Result<Pdfium> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Error::library(format!("pdfium bind failed: {e}")))?;
        Ok(Pdfium::new(bindings))
    }

    pub fn open_file(path: &Path) -> Result<Document> {
        let bytes = std::fs::read(path).map_err(|e| Error::library(e.to_string()))?;
        let mut doc = Self::open_memory(bytes)?;
        doc.original_path = Some(path.to_path_buf());
        Ok(doc)
    }

    pub fn open_memory(bytes: Vec<u8>) -> Result<Document> {
        let lopdf = lopdf::Document::load_from(Cursor::new(bytes.clone()))
            .map_err(|_| Error::NotAPdf)?;
        let pdfium = Self::bind_pdfium()?;
        Ok(Document {
            lopdf,
            pdfium,
            raster: None,
            raster_dirty: true,
            original_bytes: bytes,
            original_path: None,
            dirty_objects: BTreeSet::new(),
        })
    }

    pub fn is_pdf(&self) -> bool {
        true
    }

    pub fn page_count(&self) -> usize {
        self.lopdf.get_pages().len()
    }

    /// `index` is 0-based, matching the rest of this crate; `lopdf`'s
    /// `get_pages()` keys are 1-based page numbers.
    pub fn page_object_id(&self, index: usize) -> Result<ObjectId> {
        self.lopdf
            .get_pages()
            .get(&(index as u32 + 1))
            .map(|id| ObjectId(id.0, id.1))
            .ok_or_else(|| Error::invalid_argument(format!("page index {index} out of range")))
    }

    fn page_dict(&self, id: ObjectId) -> Result<&Dictionary> {
        self.lopdf
            .get_dictionary((id.0, id.1))
            .map_err(|e| Error::library(e.to_string()))
    }

    /// Walks `/Parent` to resolve an inheritable page attribute (`/MediaBox`,
    /// `/Resources`, `/Rotate`), the way every page tree in the wild relies
    /// on at least one of them being inherited rather than repeated.
    fn inherited<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
        let mut current = dict;
        loop {
            if let Ok(v) = current.get(key) {
                return Some(v);
            }
            let parent = current.get(b"Parent").ok()?;
            let parent_id = match parent {
                Object::Reference(r) => *r,
                _ => return None,
            };
            current = self.lopdf.get_dictionary(parent_id).ok()?;
        }
    }

    pub fn page_bounds(&mut self, index: usize) -> Result<Rect> {
        let id = self.page_object_id(index)?;
        let dict = self.page_dict(id)?;
        let media_box = self
            .inherited(dict, b"MediaBox")
            .ok_or_else(|| Error::library("page has no MediaBox".to_string()))?;
        let arr = match media_box {
            Object::Array(a) => a,
            _ => return Err(Error::library("MediaBox is not an array".to_string())),
        };
        if arr.len() != 4 {
            return Err(Error::library("MediaBox does not have 4 entries".to_string()));
        }
        let nums: Vec<f64> = arr.iter().map(object_as_f64).collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::library("MediaBox entry is not numeric".to_string()))?;
        Ok(Rect::new(nums[0], nums[1], nums[2], nums[3]))
    }

    pub fn dict(&self, id: ObjectId) -> Result<&Dictionary> {
        self.lopdf
            .get_dictionary((id.0, id.1))
            .map_err(|e| Error::library(e.to_string()))
    }

    pub fn dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary> {
        self.dirty_objects.insert((id.0, id.1));
        self.raster_dirty = true;
        self.lopdf
            .get_dictionary_mut((id.0, id.1))
            .map_err(|e| Error::library(e.to_string()))
    }

    /// Resolves any indirect object by id, whatever its variant.
    pub fn object(&self, id: ObjectId) -> Result<&Object> {
        self.lopdf.get_object((id.0, id.1)).map_err(|e| Error::library(e.to_string()))
    }

    pub fn stream(&self, id: ObjectId) -> Result<&Stream> {
        match self.lopdf.get_object((id.0, id.1)) {
            Ok(Object::Stream(s)) => Ok(s),
            Ok(_) => Err(Error::library("object is not a stream".to_string())),
            Err(e) => Err(Error::library(e.to_string())),
        }
    }

    pub fn set_stream_content(&mut self, id: ObjectId, content: Vec<u8>) -> Result<()> {
        self.dirty_objects.insert((id.0, id.1));
        self.raster_dirty = true;
        match self.lopdf.get_object_mut((id.0, id.1)) {
            Ok(Object::Stream(s)) => {
                s.set_plain_content(content);
                Ok(())
            }
            Ok(_) => Err(Error::library("object is not a stream".to_string())),
            Err(e) => Err(Error::library(e.to_string())),
        }
    }

    pub fn add_stream(&mut self, dict: Dictionary, content: Vec<u8>) -> Result<ObjectId> {
        let stream = Stream::new(dict, content);
        let id = self.lopdf.add_object(Object::Stream(stream));
        self.dirty_objects.insert(id);
        self.raster_dirty = true;
        Ok(ObjectId(id.0, id.1))
    }

    pub fn add_dict(&mut self, dict: Dictionary) -> ObjectId {
        let id = self.lopdf.add_object(Object::Dictionary(dict));
        self.dirty_objects.insert(id);
        self.raster_dirty = true;
        ObjectId(id.0, id.1)
    }

    /// Appends `annot_id` to the page's `/Annots` array, creating the array
    /// (and, if missing, promoting an inherited one into an owned array on
    /// this page) as needed.
    pub fn append_annot(&mut self, page_id: ObjectId, annot_id: ObjectId) -> Result<()> {
        self.raster_dirty = true;
        self.dirty_objects.insert((page_id.0, page_id.1));
        let page_dict = self
            .lopdf
            .get_dictionary_mut((page_id.0, page_id.1))
            .map_err(|e| Error::library(e.to_string()))?;
        let reference = Object::Reference((annot_id.0, annot_id.1));
        match page_dict.get_mut(b"Annots") {
            Ok(Object::Array(arr)) => {
                arr.push(reference);
            }
            _ => {
                page_dict.set("Annots", Object::Array(vec![reference]));
            }
        }
        Ok(())
    }

    /// Annotation ids on a page, in the PDF's stored (Z) order.
    pub fn annot_ids(&self, page_id: ObjectId) -> Result<Vec<ObjectId>> {
        let dict = self.page_dict(page_id)?;
        let arr = match dict.get(b"Annots") {
            Ok(Object::Array(a)) => a,
            _ => return Ok(Vec::new()),
        };
        Ok(arr
            .iter()
            .filter_map(|o| match o {
                Object::Reference(r) => Some(ObjectId(r.0, r.1)),
                _ => None,
            })
            .collect())
    }

    pub fn delete_annot(&mut self, page_id: ObjectId, annot_id: ObjectId) -> Result<bool> {
        self.raster_dirty = true;
        let page_dict = self
            .lopdf
            .get_dictionary_mut((page_id.0, page_id.1))
            .map_err(|e| Error::library(e.to_string()))?;
        let removed = match page_dict.get_mut(b"Annots") {
            Ok(Object::Array(arr)) => {
                let before = arr.len();
                arr.retain(|o| !matches!(o, Object::Reference(r) if *r == (annot_id.0, annot_id.1)));
                arr.len() != before
            }
            _ => false,
        };
        if removed {
            self.lopdf.objects.remove(&(annot_id.0, annot_id.1));
            self.dirty_objects.insert((page_id.0, page_id.1));
        }
        Ok(removed)
    }

    pub fn mark_dirty(&mut self) {
        self.raster_dirty = true;
    }

    // -- Raster side: pdfium_render, rebuilt lazily from the lopdf bytes --

    fn ensure_raster(&mut self) -> Result<&PdfDocument<'static>> {
        if self.raster_dirty || self.raster.is_none() {
            let mut buf = Vec::new();
            self.lopdf
                .save_to(&mut buf)
                .map_err(|e| Error::library(e.to_string()))?;
            // SAFETY-free design note: `PdfDocument<'static>` below borrows
            // `self.pdfium`'s bindings, which pdfium_render hands out with a
            // `'static` lifetime internally (the bindings are reference
            // counted, not tied to `&self`), so storing the result alongside
            // `pdfium` in the same struct is sound; this mirrors how a
            // document-state struct can hold both a structural document and
            // its lazily rebuilt raster sibling side by side.
            let doc = self
                .pdfium
                .load_pdf_from_byte_vec(buf, None)
                .map_err(Error::from)?;
            self.raster = Some(doc);
            self.raster_dirty = false;
        }
        Ok(self.raster.as_ref().expect("just populated"))
    }

    /// Renders the full page at exactly `(width_px, height_px)`, independent
    /// aspect ratio, matching the non-uniform `ctm` scale this crate's
    /// coordinate conversions assume. `render_annots` toggles the annotation
    /// layer; pdfium does not separately gate form-widget rendering the way
    /// a two-generation library might, so widgets are always drawn
    /// alongside annotations here (a documented, library-specific
    /// divergence rather than a bug).
    pub fn render_page_rgba(
        &mut self,
        index: usize,
        width_px: i32,
        height_px: i32,
        render_annots: bool,
    ) -> Result<(u32, u32, Vec<u8>)> {
        if width_px <= 0 || height_px <= 0 {
            return Err(Error::invalid_argument("page pixel dimensions must be positive"));
        }
        let raster = self.ensure_raster()?;
        let page = raster
            .pages()
            .get(index as u16)
            .map_err(|e| Error::library(e.to_string()))?;
        let config = PdfRenderConfig::new()
            .set_target_width(width_px)
            .set_target_height(height_px)
            .render_annotations(render_annots);
        let bitmap = page.render_with_config(&config).map_err(Error::from)?;
        let w = bitmap.width() as u32;
        let h = bitmap.height() as u32;
        Ok((w, h, bitmap.as_rgba_bytes().to_vec()))
    }

    pub fn page_text_plain(&mut self, index: usize) -> Result<String> {
        let raster = self.ensure_raster()?;
        let page = raster
            .pages()
            .get(index as u16)
            .map_err(|e| Error::library(e.to_string()))?;
        let text = page.text().map_err(Error::from)?;
        Ok(text.all())
    }

    /// Up to `hit_max` occurrences of `needle`, each as an axis-aligned
    /// bounding rect in the page's native unit system (page space, not
    /// pixel space — `text.rs` applies the render CTM, the same split of
    /// responsibility as `render_page_rgba` above).
    pub fn search_page_rects(
        &mut self,
        index: usize,
        needle: &str,
        hit_max: usize,
    ) -> Result<Vec<Rect>> {
        if needle.is_empty() || hit_max == 0 {
            return Ok(Vec::new());
        }
        let raster = self.ensure_raster()?;
        let page = raster
            .pages()
            .get(index as u16)
            .map_err(|e| Error::library(e.to_string()))?;
        let text = page.text().map_err(Error::from)?;
        let mut hits = Vec::new();
        let mut search = text.search(needle, PdfSearchOptions::new());
        while hits.len() < hit_max {
            let Some(segments) = search.find_next() else {
                break;
            };
            let mut rect: Option<Rect> = None;
            for segment in segments.iter() {
                let b = segment.bounds();
                let r = Rect::new(
                    b.left().value as f64,
                    b.bottom().value as f64,
                    b.right().value as f64,
                    b.top().value as f64,
                );
                rect = Some(match rect {
                    Some(acc) => Rect::new(
                        acc.x0.min(r.x0),
                        acc.y0.min(r.y0),
                        acc.x1.max(r.x1),
                        acc.y1.max(r.y1),
                    ),
                    None => r,
                });
            }
            if let Some(r) = rect {
                hits.push(r);
            }
        }
        Ok(hits)
    }

    // -- Save / export --

    pub fn save_as(&mut self, path: &Path) -> Result<()> {
        atomic_write(path, |tmp| {
            self.lopdf.save(tmp).map_err(|e| Error::library(e.to_string()))?;
            Ok(())
        })
    }

    /// Appends changed/new objects plus a fresh classic xref table and
    /// trailer after the original bytes, leaving everything before them
    /// untouched, per the incremental-save contract. Only
    /// valid when `path` is the file this document was opened from.
    pub fn save_incremental(&mut self, path: &Path) -> Result<()> {
        let original_path = self
            .original_path
            .clone()
            .ok_or_else(|| Error::invalid_argument("no source path to save incrementally over"))?;
        if original_path != path {
            return Err(Error::invalid_argument(
                "incremental save target must equal the currently-open path",
            ));
        }
        let prev_startxref = find_startxref(&self.original_bytes)
            .ok_or_else(|| Error::library("original file has no startxref".to_string()))?;

        let mut appended = self.original_bytes.clone();
        if !appended.ends_with(b"\n") {
            appended.push(b'\n');
        }
        let mut offsets: Vec<((u32, u16), usize)> = Vec::new();
        for id in self.dirty_objects.clone() {
            let Some(object) = self.lopdf.objects.get(&id) else {
                continue;
            };
            offsets.push((id, appended.len()));
            appended.extend_from_slice(format!("{} {} obj\n", id.0, id.1).as_bytes());
            write_object(&mut appended, object);
            appended.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = appended.len();
        appended.extend_from_slice(b"xref\n");
        // One subsection per object: simplest correct encoding, not the
        // most compact, but incremental updates are rarely large.
        for (id, offset) in &offsets {
            appended.extend_from_slice(format!("{} 1\n", id.0).as_bytes());
            appended.extend_from_slice(format!("{:010} {:05} n \n", offset, id.1).as_bytes());
        }

        let mut trailer = self.lopdf.trailer.clone();
        trailer.set("Prev", Object::Integer(prev_startxref as i64));
        trailer.set("Size", Object::Integer(self.lopdf.max_id as i64 + 1));
        appended.extend_from_slice(b"trailer\n");
        write_dict(&mut appended, &trailer);
        appended.extend_from_slice(format!("\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes());

        atomic_write(path, |tmp| {
            std::io::Write::write_all(tmp, &appended).map_err(|e| Error::library(e.to_string()))
        })?;
        self.dirty_objects.clear();
        Ok(())
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.original_path.as_deref()
    }
}

fn object_as_f64(o: &Object) -> Option<f64> {
    match o {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn find_startxref(bytes: &[u8]) -> Option<usize> {
    let marker = b"startxref";
    let pos = bytes.windows(marker.len()).rposition(|w| w == marker)?;
    let tail = &bytes[pos + marker.len()..];
    let text = std::str::from_utf8(tail).ok()?;
    text.split_whitespace().next()?.parse().ok()
}

/// Minimal recursive PDF object writer used only by the incremental-save
/// path above; the full/flattened save paths go through `lopdf::Document`'s
/// own writer instead.
fn write_object(out: &mut Vec<u8>, object: &Object) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Object::Real(r) => out.extend_from_slice(format!("{r}").as_bytes()),
        Object::Name(n) => {
            out.push(b'/');
            out.extend_from_slice(n);
        }
        Object::String(s, _) => {
            out.push(b'(');
            for &b in s {
                if b == b'(' || b == b')' || b == b'\\' {
                    out.push(b'\\');
                }
                out.push(b);
            }
            out.push(b')');
        }
        Object::Array(a) => {
            out.push(b'[');
            for (i, item) in a.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item);
            }
            out.push(b']');
        }
        Object::Dictionary(d) => write_dict(out, d),
        Object::Stream(s) => {
            write_dict(out, &s.dict);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&s.content);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference(r) => {
            out.extend_from_slice(format!("{} {} R", r.0, r.1).as_bytes());
        }
    }
}

fn write_dict(out: &mut Vec<u8>, dict: &Dictionary) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.push(b'/');
        out.extend_from_slice(key);
        out.push(b' ');
        write_object(out, value);
        out.push(b' ');
    }
    out.extend_from_slice(b">>");
}

/// Same atomic-rename convention as `save_as`, for callers (the flattened
/// export path) that already have the finished bytes in hand.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    atomic_write(path, |tmp| {
        std::io::Write::write_all(tmp, bytes).map_err(|e| Error::library(e.to_string()))
    })
}

/// Writes to `<target>_<6-hex>.<ext>` alongside `path` then renames over
/// it, so a crash or concurrent reader never observes a partially written
/// file.
fn atomic_write(path: &Path, write: impl FnOnce(&mut std::fs::File) -> Result<()>) -> Result<()> {
    use rand::Rng;
    let suffix: String = {
        let mut rng = rand::rng();
        (0..6)
            .map(|_| std::char::from_digit(rng.random_range(0..16), 16).unwrap())
            .collect()
    };
    let stem = path
        .file_stem()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::invalid_argument("save target has no file name"))?;
    let tmp_name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{suffix}.{ext}"),
        None => format!("{stem}_{suffix}"),
    };
    let tmp_path = path.with_file_name(tmp_name);
    {
        let mut tmp = std::fs::File::create(&tmp_path).map_err(|e| Error::library(e.to_string()))?;
        write(&mut tmp)?;
    }
    std::fs::rename(&tmp_path, path).map_err(|e| Error::library(e.to_string()))?;
    Ok(())
}
