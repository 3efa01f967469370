//! Annotation enumeration and identity-based editing.

use lopdf::Object;

use crate::annot::{self, appearance_patch};
use crate::backend::{AnnotKind, Document, ObjectId, Point, Rect};
use crate::cache::PageCache;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotEntry {
    pub kind: AnnotKind,
    pub bounds: Rect,
    pub object_id: ObjectId,
    pub contents: Option<String>,
    pub arcs: Option<Vec<Vec<Point>>>,
}

fn get_contents(dict: &lopdf::Dictionary) -> Option<String> {
    match dict.get(b"Contents").ok()? {
        Object::String(bytes, _) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

fn get_ink_arcs(dict: &lopdf::Dictionary, bounds: Rect, page_w_px: f64, page_h_px: f64) -> Option<Vec<Vec<Point>>> {
    let arr = match dict.get(b"InkList").ok()? {
        Object::Array(a) => a,
        _ => return None,
    };
    let mut arcs = Vec::with_capacity(arr.len());
    for arc in arr {
        let Object::Array(flat) = arc else { continue };
        let mut points = Vec::with_capacity(flat.len() / 2);
        let mut it = flat.iter();
        while let (Some(x), Some(y)) = (it.next(), it.next()) {
            let xf = match x {
                Object::Real(r) => *r as f64,
                Object::Integer(i) => *i as f64,
                _ => continue,
            };
            let yf = match y {
                Object::Real(r) => *r as f64,
                Object::Integer(i) => *i as f64,
                _ => continue,
            };
            points.push(annot::pdf_to_pixel(bounds, page_w_px, page_h_px, Point::new(xf, yf)));
        }
        arcs.push(points);
    }
    Some(arcs)
}

/// Lists every annotation on a page in the stored (Z) order. `bounds` is
/// supplied by the caller (usually read from `PageCache`) since resolving
/// it here would require `&mut Document` just to warm the raster side,
/// which enumeration never touches.
pub fn list_annots_with_bounds(
    doc: &Document,
    page_index: usize,
    bounds: Rect,
    page_w_px: f64,
    page_h_px: f64,
) -> Result<Vec<AnnotEntry>> {
    let page_id = doc.page_object_id(page_index)?;
    let ids = doc.annot_ids(page_id)?;
    let mut entries = Vec::with_capacity(ids.len());
    for id in ids {
        let Ok(dict) = doc.dict(id) else { continue };
        let subtype = match dict.get(b"Subtype") {
            Ok(Object::Name(n)) => AnnotKind::from_pdf_subtype(n),
            _ => AnnotKind::Other,
        };
        let rect = match annot::get_rect(dict) {
            Some(r) => r,
            None => continue,
        };
        let p0 = annot::pdf_to_pixel(bounds, page_w_px, page_h_px, Point::new(rect.x0, rect.y0));
        let p1 = annot::pdf_to_pixel(bounds, page_w_px, page_h_px, Point::new(rect.x1, rect.y1));
        let pixel_bounds = Rect::new(p0.x, p0.y, p1.x, p1.y);
        let contents = match subtype {
            AnnotKind::Text | AnnotKind::FreeText => get_contents(dict),
            _ => None,
        };
        let arcs = match subtype {
            AnnotKind::Ink => get_ink_arcs(dict, bounds, page_w_px, page_h_px),
            _ => None,
        };
        entries.push(AnnotEntry { kind: subtype, bounds: pixel_bounds, object_id: id, contents, arcs });
    }
    Ok(entries)
}

pub fn delete_annot_by_id(
    doc: &mut Document,
    cache: &mut PageCache,
    page_index: usize,
    object_id: ObjectId,
) -> Result<bool> {
    let page_id = doc.page_object_id(page_index)?;
    let removed = doc.delete_annot(page_id, object_id)?;
    if removed {
        cache.invalidate_display_list(page_index);
    }
    Ok(removed)
}

/// If the annotation is FREE_TEXT, `/RC` is deleted first so `/DA + /DS`
/// drives the regenerated appearance, then `/AP` is deleted, `/Contents`
/// is written, and the appearance patcher runs.
pub fn update_contents_by_id(
    doc: &mut Document,
    cache: &mut PageCache,
    page_index: usize,
    object_id: ObjectId,
    contents: &str,
) -> Result<()> {
    let is_free_text = matches!(
        doc.dict(object_id)?.get(b"Subtype"),
        Ok(Object::Name(n)) if n == b"FreeText"
    );
    let dict = doc.dict_mut(object_id)?;
    if is_free_text {
        dict.remove(b"RC");
        dict.remove(b"AP");
    }
    dict.set("Contents", annot::pdf_string(contents));
    if is_free_text {
        appearance_patch::patch_free_text(doc, object_id)?;
    }
    cache.invalidate_display_list(page_index);
    Ok(())
}

/// Converts the pixel-space rect to PDF space, deletes `/AP`, writes
/// `/Rect`, and (for FreeText) re-patches. FreeText border metadata is
/// untouched, so it survives a move/resize.
pub fn update_rect_by_id(
    doc: &mut Document,
    cache: &mut PageCache,
    page_index: usize,
    object_id: ObjectId,
    bounds: Rect,
    page_w_px: f64,
    page_h_px: f64,
    pixel_rect: Rect,
) -> Result<()> {
    let p0 = annot::pixel_to_pdf(bounds, page_w_px, page_h_px, Point::new(pixel_rect.x0, pixel_rect.y0));
    let p1 = annot::pixel_to_pdf(bounds, page_w_px, page_h_px, Point::new(pixel_rect.x1, pixel_rect.y1));
    let pdf_rect = Rect::new(p0.x, p0.y, p1.x, p1.y);

    let is_free_text = matches!(
        doc.dict(object_id)?.get(b"Subtype"),
        Ok(Object::Name(n)) if n == b"FreeText"
    );
    let dict = doc.dict_mut(object_id)?;
    dict.remove(b"AP");
    annot::set_rect(dict, pdf_rect);
    if is_free_text {
        appearance_patch::patch_free_text(doc, object_id)?;
    }
    cache.invalidate_display_list(page_index);
    Ok(())
}
