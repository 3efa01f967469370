//! `pp_core`: a PDF annotation and patch-rendering engine.
//!
//! [`Context`] is the crate's single public entry point — each operation a
//! caller can perform (open, render, search, mutate annotations and
//! widgets, save) is a `Context` method rather than a free function taking
//! an explicit handle, since Rust ownership makes that handle implicit.
//! Locking is literal: one `Mutex<ContextInner>` guards every open document
//! and its page cache, so two renders against the same context serialize
//! while renders against two different `Context`s run independently. The
//! one deliberate exception is alerts: their rendezvous lives *outside* the
//! context mutex, so [`Context::alerts_channel`] only holds the lock long
//! enough to clone a handle, never across a `raise`/`wait_for_request`/
//! `respond` call.

pub mod alerts;
pub mod annot;
pub mod backend;
pub mod cache;
pub mod cookie;
pub mod error;
pub mod export;
pub mod recents;
pub mod render;
pub mod text;
pub mod widgets;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

pub use alerts::{AlertChannel, AlertKind, AlertRequest, AlertResponse};
pub use annot::freetext_style::{Alignment, StyleFlags};
pub use annot::list::AnnotEntry;
pub use annot::Color;
pub use backend::{AnnotKind, ObjectId, Point, Rect};
pub use cookie::Cookie;
pub use error::{Error, Result};
pub use widgets::{WidgetEntry, WidgetKind};

/// Opaque per-document handle returned by [`Context::open`] /
/// [`Context::open_memory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocHandle(u64);

struct DocumentState {
    doc: backend::Document,
    cache: cache::PageCache,
    focused_widget: Option<ObjectId>,
    alerts: AlertChannel,
}

struct ContextInner {
    documents: HashMap<u64, DocumentState>,
    next_handle: u64,
}

/// The engine context. Owns its mutex and every document
/// opened through it; dropping a `Context` drops every still-open
/// document with it, matching `close`'s best-effort release semantics.
pub struct Context {
    inner: Mutex<ContextInner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Context {
        Context { inner: Mutex::new(ContextInner { documents: HashMap::new(), next_handle: 1 }) }
    }

    fn insert(&self, doc: backend::Document) -> DocHandle {
        let mut inner = self.inner.lock().unwrap();
        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner.documents.insert(
            handle,
            DocumentState {
                doc,
                cache: cache::PageCache::new(),
                focused_widget: None,
                alerts: AlertChannel::new(),
            },
        );
        DocHandle(handle)
    }

    fn with_doc<R>(
        &self,
        handle: DocHandle,
        f: impl FnOnce(&mut backend::Document, &mut cache::PageCache, &mut Option<ObjectId>) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner
            .documents
            .get_mut(&handle.0)
            .ok_or_else(|| Error::invalid_argument("unknown document handle"))?;
        f(&mut state.doc, &mut state.cache, &mut state.focused_widget)
    }

    // -- Lifecycle --

    pub fn open(&self, path: &Path) -> Result<DocHandle> {
        let doc = backend::Document::open_file(path)?;
        Ok(self.insert(doc))
    }

    pub fn open_memory(&self, bytes: Vec<u8>) -> Result<DocHandle> {
        let doc = backend::Document::open_memory(bytes)?;
        Ok(self.insert(doc))
    }

    /// Best-effort: closing an unknown handle is not an error.
    pub fn close(&self, handle: DocHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.documents.remove(&handle.0);
    }

    pub fn count_pages(&self, handle: DocHandle) -> Result<usize> {
        self.with_doc(handle, |doc, _, _| Ok(doc.page_count()))
    }

    /// Page size in the document's native unit system.
    pub fn page_size(&self, handle: DocHandle, page_index: usize) -> Result<(f64, f64)> {
        self.with_doc(handle, |doc, _, _| {
            let bounds = doc.page_bounds(page_index)?;
            Ok((bounds.width(), bounds.height()))
        })
    }

    // -- Render --

    #[allow(clippy::too_many_arguments)]
    pub fn render_page_rgba(
        &self,
        handle: DocHandle,
        page_index: usize,
        page_w: i32,
        page_h: i32,
        out: &mut [u8],
        stride: usize,
        cookie: Option<&Cookie>,
        render_annots: bool,
    ) -> Result<()> {
        self.with_doc(handle, |doc, cache, _| {
            render::render_page_rgba(doc, cache, page_index, page_w, page_h, out, stride, cookie, render_annots)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render_patch_rgba(
        &self,
        handle: DocHandle,
        page_index: usize,
        page_w: i32,
        page_h: i32,
        patch_x: i32,
        patch_y: i32,
        patch_w: i32,
        patch_h: i32,
        out: &mut [u8],
        stride: usize,
        cookie: Option<&Cookie>,
        render_annots: bool,
    ) -> Result<()> {
        self.with_doc(handle, |doc, cache, _| {
            render::render_patch_rgba(
                doc, cache, page_index, page_w, page_h, patch_x, patch_y, patch_w, patch_h, out, stride, cookie,
                render_annots,
            )
        })
    }

    // -- Text and search --

    pub fn page_text_utf8(&self, handle: DocHandle, page_index: usize) -> Result<String> {
        self.with_doc(handle, |doc, _, _| text::page_text_utf8(doc, page_index))
    }

    pub fn page_text_html(&self, handle: DocHandle, page_index: usize) -> Result<String> {
        self.with_doc(handle, |doc, _, _| text::page_text_html(doc, page_index))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn search_page(
        &self,
        handle: DocHandle,
        page_index: usize,
        needle: &str,
        hit_max: usize,
        page_w_px: i32,
        page_h_px: i32,
        cookie: Option<&Cookie>,
    ) -> Result<Vec<Rect>> {
        self.with_doc(handle, |doc, _, _| {
            text::search_page(doc, page_index, needle, hit_max, page_w_px, page_h_px, cookie)
        })
    }

    // -- Annotation creation --

    #[allow(clippy::too_many_arguments)]
    pub fn pdf_add_ink_annot(
        &self,
        handle: DocHandle,
        page_index: usize,
        page_w_px: f64,
        page_h_px: f64,
        arc_lengths: &[usize],
        points: &[Point],
        color: Color,
        thickness: f64,
    ) -> Result<ObjectId> {
        self.with_doc(handle, |doc, cache, _| {
            let id = annot::ink::add_ink_annot(
                doc, page_index, page_w_px, page_h_px, arc_lengths, points, color, thickness,
            )?;
            cache.invalidate_display_list(page_index);
            Ok(id)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn pdf_add_annot(
        &self,
        handle: DocHandle,
        page_index: usize,
        page_w_px: f64,
        page_h_px: f64,
        kind: AnnotKind,
        points: &[Point],
        color: Color,
        opacity: f64,
        contents: Option<&str>,
    ) -> Result<ObjectId> {
        self.with_doc(handle, |doc, cache, _| {
            let id = annot::markup::add_annot(
                doc, page_index, page_w_px, page_h_px, kind, points, color, opacity, contents,
            )?;
            cache.invalidate_display_list(page_index);
            Ok(id)
        })
    }

    // -- Annotation enumeration and editing --

    pub fn pdf_list_annots(
        &self,
        handle: DocHandle,
        page_index: usize,
        page_w_px: f64,
        page_h_px: f64,
    ) -> Result<Vec<AnnotEntry>> {
        self.with_doc(handle, |doc, cache, _| {
            let (bounds, _) = cache.ensure(page_index, || doc.page_bounds(page_index))?;
            annot::list::list_annots_with_bounds(doc, page_index, bounds, page_w_px, page_h_px)
        })
    }

    pub fn pdf_delete_annot_by_object_id(
        &self,
        handle: DocHandle,
        page_index: usize,
        object_id: ObjectId,
    ) -> Result<bool> {
        self.with_doc(handle, |doc, cache, _| {
            annot::list::delete_annot_by_id(doc, cache, page_index, object_id)
        })
    }

    pub fn pdf_update_annot_contents_by_object_id(
        &self,
        handle: DocHandle,
        page_index: usize,
        object_id: ObjectId,
        contents: &str,
    ) -> Result<()> {
        self.with_doc(handle, |doc, cache, _| {
            annot::list::update_contents_by_id(doc, cache, page_index, object_id, contents)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn pdf_update_annot_rect_by_object_id(
        &self,
        handle: DocHandle,
        page_index: usize,
        object_id: ObjectId,
        page_w_px: f64,
        page_h_px: f64,
        pixel_rect: Rect,
    ) -> Result<()> {
        self.with_doc(handle, |doc, cache, _| {
            let (bounds, _) = cache.ensure(page_index, || doc.page_bounds(page_index))?;
            annot::list::update_rect_by_id(doc, cache, page_index, object_id, bounds, page_w_px, page_h_px, pixel_rect)
        })
    }

    // -- FreeText style --

    pub fn pdf_update_freetext_font(&self, handle: DocHandle, object_id: ObjectId, font_full: &str) -> Result<()> {
        self.with_doc(handle, |doc, _, _| annot::freetext_style::update_font(doc, object_id, font_full))
    }

    pub fn pdf_update_freetext_size(&self, handle: DocHandle, object_id: ObjectId, size: f64) -> Result<()> {
        self.with_doc(handle, |doc, _, _| annot::freetext_style::update_size(doc, object_id, size))
    }

    pub fn pdf_update_freetext_color(&self, handle: DocHandle, object_id: ObjectId, color: Color) -> Result<()> {
        self.with_doc(handle, |doc, _, _| annot::freetext_style::update_color(doc, object_id, color))
    }

    pub fn pdf_update_freetext_alignment(&self, handle: DocHandle, object_id: ObjectId, align: Alignment) -> Result<()> {
        self.with_doc(handle, |doc, _, _| annot::freetext_style::update_alignment(doc, object_id, align))
    }

    pub fn pdf_update_freetext_style_flags(&self, handle: DocHandle, object_id: ObjectId, flags: StyleFlags) -> Result<()> {
        self.with_doc(handle, |doc, _, _| annot::freetext_style::update_style_flags(doc, object_id, flags))
    }

    pub fn pdf_update_freetext_paragraph(
        &self,
        handle: DocHandle,
        object_id: ObjectId,
        line_height: f64,
        text_indent: f64,
    ) -> Result<()> {
        self.with_doc(handle, |doc, _, _| {
            annot::freetext_style::update_paragraph(doc, object_id, line_height, text_indent)
        })
    }

    pub fn pdf_update_freetext_rotation(&self, handle: DocHandle, object_id: ObjectId, degrees: f64) -> Result<()> {
        self.with_doc(handle, |doc, _, _| annot::freetext_style::update_rotation(doc, object_id, degrees))
    }

    pub fn pdf_update_freetext_locked(
        &self,
        handle: DocHandle,
        object_id: ObjectId,
        locked: bool,
        locked_contents: bool,
    ) -> Result<()> {
        self.with_doc(handle, |doc, _, _| {
            annot::freetext_style::update_locked(doc, object_id, locked, locked_contents)
        })
    }

    // -- Widgets --

    pub fn pdf_list_widgets(
        &self,
        handle: DocHandle,
        page_index: usize,
        page_w_px: f64,
        page_h_px: f64,
    ) -> Result<Vec<WidgetEntry>> {
        self.with_doc(handle, |doc, cache, _| {
            let (bounds, _) = cache.ensure(page_index, || doc.page_bounds(page_index))?;
            widgets::list_widgets(doc, page_index, bounds, page_w_px, page_h_px)
        })
    }

    /// Returns whether the click changed a widget's value; the hit widget
    /// (if any) becomes the context's focused widget, replacing whatever was
    /// focused before.
    #[allow(clippy::too_many_arguments)]
    pub fn pdf_widget_click(
        &self,
        handle: DocHandle,
        page_index: usize,
        page_w_px: f64,
        page_h_px: f64,
        point: Point,
    ) -> Result<bool> {
        self.with_doc(handle, |doc, cache, focused| {
            let (bounds, _) = cache.ensure(page_index, || doc.page_bounds(page_index))?;
            let (changed, hit) = widgets::click(doc, cache, page_index, bounds, page_w_px, page_h_px, point)?;
            *focused = hit.or(*focused);
            Ok(changed)
        })
    }

    pub fn pdf_widget_read_text(&self, handle: DocHandle, widget_id: ObjectId) -> Result<String> {
        self.with_doc(handle, |doc, _, _| widgets::read_text_field(doc, widget_id))
    }

    pub fn pdf_widget_write_text(
        &self,
        handle: DocHandle,
        page_index: usize,
        widget_id: ObjectId,
        value: &str,
    ) -> Result<()> {
        self.with_doc(handle, |doc, cache, _| widgets::write_text_field(doc, cache, page_index, widget_id, value))
    }

    pub fn pdf_widget_choice_options(&self, handle: DocHandle, widget_id: ObjectId) -> Result<Vec<String>> {
        self.with_doc(handle, |doc, _, _| widgets::choice_options(doc, widget_id))
    }

    pub fn pdf_widget_choice_selected(&self, handle: DocHandle, widget_id: ObjectId) -> Result<Vec<String>> {
        self.with_doc(handle, |doc, _, _| widgets::choice_selected(doc, widget_id))
    }

    pub fn pdf_widget_choice_set_selected(
        &self,
        handle: DocHandle,
        page_index: usize,
        widget_id: ObjectId,
        values: &[&str],
    ) -> Result<()> {
        self.with_doc(handle, |doc, cache, _| {
            widgets::choice_set_selected(doc, cache, page_index, widget_id, values)
        })
    }

    // -- Alerts: rendezvous lives outside the context mutex --

    /// Clones a handle to this document's alert channel. Hold onto it and
    /// call `raise`/`wait_for_request`/`respond` directly — doing so
    /// through `Context` would serialize the two sides of the rendezvous
    /// behind the same mutex and deadlock.
    pub fn alerts_channel(&self, handle: DocHandle) -> Result<AlertChannel> {
        let inner = self.inner.lock().unwrap();
        inner
            .documents
            .get(&handle.0)
            .map(|s| s.alerts.clone())
            .ok_or_else(|| Error::invalid_argument("unknown document handle"))
    }

    // -- Save / export --

    pub fn pdf_save_as(&self, handle: DocHandle, path: &Path) -> Result<()> {
        self.with_doc(handle, |doc, _, _| doc.save_as(path))
    }

    pub fn pdf_export_incremental(&self, handle: DocHandle, path: &Path) -> Result<()> {
        self.with_doc(handle, |doc, _, _| doc.save_incremental(path))
    }

    pub fn pdf_export_flattened(&self, handle: DocHandle, path: &Path, dpi: Option<f64>) -> Result<()> {
        self.with_doc(handle, |doc, _, _| export::export_flattened(doc, path, dpi))
    }

    // -- Recent-files --

    pub fn record_recent(&self, entry: recents::RecentEntry) -> Result<Vec<recents::RecentEntry>> {
        recents::record(&recents::recents_path()?, entry)
    }

    pub fn load_recents(&self) -> Result<Vec<recents::RecentEntry>> {
        recents::load(&recents::recents_path()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_handle_is_invalid_argument() {
        let ctx = Context::new();
        let err = ctx.count_pages(DocHandle(9999)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn close_of_unknown_handle_is_best_effort() {
        let ctx = Context::new();
        ctx.close(DocHandle(9999));
    }
}
