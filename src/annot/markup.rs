//! Markup, sticky-note, caret and FreeText creation:
//! the `add_annot(page, pageW, pageH, annot_type, points, colour, opacity,
//! contents)` entry point, dispatching on annotation kind.

use lopdf::{Dictionary, Object};

use crate::annot::{self, Color};
use crate::backend::{AnnotKind, Document, ObjectId, Point, Rect};
use crate::error::{Error, Result};

#[allow(clippy::too_many_arguments)]
pub fn add_annot(
    doc: &mut Document,
    page_index: usize,
    page_w_px: f64,
    page_h_px: f64,
    kind: AnnotKind,
    points: &[Point],
    color: Color,
    opacity: f64,
    contents: Option<&str>,
) -> Result<ObjectId> {
    match kind {
        AnnotKind::Highlight | AnnotKind::Underline | AnnotKind::StrikeOut => {
            add_quad_markup(doc, page_index, page_w_px, page_h_px, kind, points, color, opacity)
        }
        AnnotKind::Text => add_sticky_note(doc, page_index, page_w_px, page_h_px, points, color, opacity, contents),
        AnnotKind::Caret => add_caret(doc, page_index, page_w_px, page_h_px, points, color, opacity, contents),
        AnnotKind::FreeText => add_free_text(doc, page_index, page_w_px, page_h_px, points, color, opacity, contents),
        _ => Err(Error::invalid_argument("annot kind is not creatable through add_annot")),
    }
}

fn add_quad_markup(
    doc: &mut Document,
    page_index: usize,
    page_w_px: f64,
    page_h_px: f64,
    kind: AnnotKind,
    points: &[Point],
    color: Color,
    opacity: f64,
) -> Result<ObjectId> {
    if points.len() < 4 {
        return Err(Error::invalid_argument("quad markup annotations need at least 4 points"));
    }
    let mut ordered = points.to_vec();
    if kind == AnnotKind::Highlight {
        // Historical UI-emission-order quirk: swap the 3rd and 4th point of
        // every quad, highlight only.
        for quad in ordered.chunks_mut(4) {
            if quad.len() == 4 {
                quad.swap(2, 3);
            }
        }
    }
    let page_id = doc.page_object_id(page_index)?;
    let bounds = doc.page_bounds(page_index)?;
    let pdf_points: Vec<Point> =
        ordered.iter().map(|p| annot::pixel_to_pdf(bounds, page_w_px, page_h_px, *p)).collect();
    let rect = Rect::from_points(pdf_points.iter().copied())
        .ok_or_else(|| Error::invalid_argument("no points supplied"))?;

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Annot".to_vec()));
    dict.set("Subtype", Object::Name(kind.pdf_subtype().as_bytes().to_vec()));
    annot::set_rect(&mut dict, rect);
    annot::set_quad_points(&mut dict, &pdf_points);
    annot::set_color(&mut dict, color);
    annot::set_opacity(&mut dict, opacity);

    let annot_id = doc.add_dict(dict);
    annot::finish_new_annot(doc, page_id, annot_id)
}

fn add_sticky_note(
    doc: &mut Document,
    page_index: usize,
    page_w_px: f64,
    page_h_px: f64,
    points: &[Point],
    color: Color,
    opacity: f64,
    contents: Option<&str>,
) -> Result<ObjectId> {
    if points.len() != 2 {
        return Err(Error::invalid_argument("sticky notes need exactly two corner points"));
    }
    let page_id = doc.page_object_id(page_index)?;
    let bounds = doc.page_bounds(page_index)?;
    let p0 = annot::pixel_to_pdf(bounds, page_w_px, page_h_px, points[0]);
    let p1 = annot::pixel_to_pdf(bounds, page_w_px, page_h_px, points[1]);
    let rect = Rect::new(p0.x, p0.y, p1.x, p1.y);

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Annot".to_vec()));
    dict.set("Subtype", Object::Name(b"Text".to_vec()));
    annot::set_rect(&mut dict, rect);
    dict.set("Contents", annot::pdf_string(contents.unwrap_or("")));
    annot::set_color(&mut dict, color);
    annot::set_opacity(&mut dict, opacity);

    let annot_id = doc.add_dict(dict);
    annot::finish_new_annot(doc, page_id, annot_id)
}

fn add_caret(
    doc: &mut Document,
    page_index: usize,
    page_w_px: f64,
    page_h_px: f64,
    points: &[Point],
    color: Color,
    opacity: f64,
    contents: Option<&str>,
) -> Result<ObjectId> {
    if points.is_empty() {
        return Err(Error::invalid_argument("caret annotations need at least one point"));
    }
    let page_id = doc.page_object_id(page_index)?;
    let bounds = doc.page_bounds(page_index)?;
    let pdf_points: Vec<Point> =
        points.iter().map(|p| annot::pixel_to_pdf(bounds, page_w_px, page_h_px, *p)).collect();
    let union = Rect::from_points(pdf_points).expect("non-empty above");
    let rect = union.pad_to_min(6.0, 10.0);

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Annot".to_vec()));
    dict.set("Subtype", Object::Name(b"Caret".to_vec()));
    annot::set_rect(&mut dict, rect);
    dict.set("Contents", annot::pdf_string(contents.unwrap_or("")));
    annot::set_color(&mut dict, color);
    annot::set_opacity(&mut dict, opacity);

    let annot_id = doc.add_dict(dict);
    annot::finish_new_annot(doc, page_id, annot_id)
}

fn add_free_text(
    doc: &mut Document,
    page_index: usize,
    page_w_px: f64,
    page_h_px: f64,
    points: &[Point],
    color: Color,
    opacity: f64,
    contents: Option<&str>,
) -> Result<ObjectId> {
    if points.is_empty() {
        return Err(Error::invalid_argument("FreeText annotations need at least one point"));
    }
    let page_id = doc.page_object_id(page_index)?;
    let bounds = doc.page_bounds(page_index)?;
    let pdf_points: Vec<Point> =
        points.iter().map(|p| annot::pixel_to_pdf(bounds, page_w_px, page_h_px, *p)).collect();
    let union = Rect::from_points(pdf_points).expect("non-empty above");
    let rect = union.pad_to_min(16.0, 12.0);

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Annot".to_vec()));
    dict.set("Subtype", Object::Name(b"FreeText".to_vec()));
    annot::set_rect(&mut dict, rect);
    dict.set("Contents", annot::pdf_string(contents.unwrap_or("")));
    // Plain /DA built directly, not through any helper that would also
    // touch /DS or /RC: a freshly-created FreeText has no rich text to
    // preserve yet.
    let da = format!("/Helv 12 Tf {} {} {} rg", color.r, color.g, color.b);
    dict.set("DA", annot::pdf_string(&da));
    annot::set_color(&mut dict, color);
    annot::set_opacity(&mut dict, opacity);
    let mut bs = Dictionary::new();
    bs.set("W", Object::Real(0.0));
    dict.set("BS", Object::Dictionary(bs));
    dict.set("OPDUserResized", Object::Boolean(false));

    let annot_id = doc.add_dict(dict);
    annot::finish_new_annot(doc, page_id, annot_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlight_swap_is_localized_per_quad() {
        let mut pts = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(10.0, 10.0),
            Point::new(11.0, 10.0),
            Point::new(10.0, 11.0),
            Point::new(11.0, 11.0),
        ];
        for quad in pts.chunks_mut(4) {
            quad.swap(2, 3);
        }
        assert_eq!(pts[2], Point::new(1.0, 1.0));
        assert_eq!(pts[3], Point::new(0.0, 1.0));
        assert_eq!(pts[6], Point::new(11.0, 11.0));
        assert_eq!(pts[7], Point::new(10.0, 11.0));
    }
}
