//! Annotation core contracts shared by every annotation-creating module:
//! colour/opacity writers, `/QuadPoints` construction,
//! and the page→PDF coordinate conversion every creation routine needs.

pub mod appearance_patch;
pub mod freetext_style;
pub mod ink;
pub mod list;
pub mod markup;

use lopdf::{Dictionary, Object};

use crate::backend::{Document, Matrix, ObjectId, Point, Rect};
use crate::error::Result;

/// RGB in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub fn new(r: f64, g: f64, b: f64) -> Color {
        Color { r: r.clamp(0.0, 1.0), g: g.clamp(0.0, 1.0), b: b.clamp(0.0, 1.0) }
    }

    pub fn to_array(self) -> Object {
        Object::Array(vec![
            Object::Real(self.r as f32),
            Object::Real(self.g as f32),
            Object::Real(self.b as f32),
        ])
    }

    pub fn from_array(o: &Object) -> Option<Color> {
        let arr = match o {
            Object::Array(a) if a.len() == 3 => a,
            _ => return None,
        };
        let f = |x: &Object| match x {
            Object::Real(r) => Some(*r as f64),
            Object::Integer(i) => Some(*i as f64),
            _ => None,
        };
        Some(Color::new(f(&arr[0])?, f(&arr[1])?, f(&arr[2])?))
    }
}

/// Writes `/C` (colour) on an annotation dictionary.
pub fn set_color(dict: &mut Dictionary, color: Color) {
    dict.set("C", color.to_array());
}

/// Writes `/IC` (interior/fill colour) on an annotation dictionary.
pub fn set_interior_color(dict: &mut Dictionary, color: Color) {
    dict.set("IC", color.to_array());
}

/// Writes `/CA` and `/ca`: both set iff
/// `0 <= opacity < 1`; values outside `[0, 1]` are clamped; `opacity >= 1`
/// deletes both entries (fully opaque is the PDF default, no need to state
/// it).
pub fn set_opacity(dict: &mut Dictionary, opacity: f64) {
    let clamped = opacity.clamp(0.0, 1.0);
    if clamped >= 1.0 {
        dict.remove(b"CA");
        dict.remove(b"ca");
    } else {
        dict.set("CA", Object::Real(clamped as f32));
        dict.set("ca", Object::Real(clamped as f32));
    }
}

/// A literal PDF string object holding UTF-8-as-bytes text. This crate
/// does not transcode to PDFDocEncoding/UTF-16 for `/Contents`-shaped
/// strings, matching this crate's text handling elsewhere.
pub fn pdf_string(s: &str) -> Object {
    Object::String(s.as_bytes().to_vec(), lopdf::StringFormat::Literal)
}

/// Writes `/Rect`, always normalised.
pub fn set_rect(dict: &mut Dictionary, rect: Rect) {
    dict.set(
        "Rect",
        Object::Array(vec![
            Object::Real(rect.x0 as f32),
            Object::Real(rect.y0 as f32),
            Object::Real(rect.x1 as f32),
            Object::Real(rect.y1 as f32),
        ]),
    );
}

pub fn get_rect(dict: &Dictionary) -> Option<Rect> {
    let arr = match dict.get(b"Rect").ok()? {
        Object::Array(a) if a.len() == 4 => a,
        _ => return None,
    };
    let f = |o: &Object| match o {
        Object::Real(r) => Some(*r as f64),
        Object::Integer(i) => Some(*i as f64),
        _ => None,
    };
    Some(Rect::new(f(&arr[0])?, f(&arr[1])?, f(&arr[2])?, f(&arr[3])?))
}

/// Writes `/QuadPoints` from a flat list of points already in PDF space,
/// four points (UL, UR, LL, LR) per quad, flattened `x, y` pairs — the
/// literal PDF `/QuadPoints` array layout.
pub fn set_quad_points(dict: &mut Dictionary, quads: &[Point]) {
    let mut arr = Vec::with_capacity(quads.len() * 2);
    for p in quads {
        arr.push(Object::Real(p.x as f32));
        arr.push(Object::Real(p.y as f32));
    }
    dict.set("QuadPoints", Object::Array(arr));
}

/// `pixel -> page -> pdf`: a scale
/// `(pageW/page_w, pageH/page_h)` pre-translated by `(-bounds.x0,
/// -bounds.y0)`, inverted for the pixel-to-page direction, followed by the
/// page's own page-space-to-PDF-space transform. This crate's PDF page
/// space and PDF space coincide (no library-level page transform beyond
/// the identity — `lopdf` stores `/Rect` etc. directly in page-default
/// user space), so the "page -> pdf" leg is the identity; the function is
/// still named for the three-space model this conversion describes, should
/// a future page-transform source (e.g. `/Rotate`) need to be folded in.
pub fn pixel_to_pdf(bounds: Rect, page_w_px: f64, page_h_px: f64, p: Point) -> Point {
    let sx = bounds.width() / page_w_px.max(f64::MIN_POSITIVE);
    let sy = bounds.height() / page_h_px.max(f64::MIN_POSITIVE);
    // Pixel space is y-down; PDF page space is y-up.
    Point::new(bounds.x0 + p.x * sx, bounds.y0 + (page_h_px - p.y) * sy)
}

pub fn pdf_to_pixel(bounds: Rect, page_w_px: f64, page_h_px: f64, p: Point) -> Point {
    let sx = page_w_px / bounds.width().max(f64::MIN_POSITIVE);
    let sy = page_h_px / bounds.height().max(f64::MIN_POSITIVE);
    Point::new((p.x - bounds.x0) * sx, page_h_px - (p.y - bounds.y0) * sy)
}

/// Shared tail of every annotation-creation routine (the steps minus the
/// per-type dictionary edits already applied by the
/// caller): links the new object onto the page, drops the page's cached
/// display list, and returns its stable id.
pub fn finish_new_annot(
    doc: &mut Document,
    page_id: ObjectId,
    annot_id: ObjectId,
) -> Result<ObjectId> {
    doc.append_annot(page_id, annot_id)?;
    Ok(annot_id)
}

/// Identity matrix helper used by a couple of callers building content
/// streams without any additional transform.
pub fn identity() -> Matrix {
    Matrix::IDENTITY
}
