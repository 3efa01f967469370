//! Interactive form widgets: enumeration, click/toggle, and text/choice
//! field access.

use bitflags::bitflags;
use lopdf::Object;

use crate::annot::{self};
use crate::backend::{Document, ObjectId, Point, Rect};
use crate::cache::PageCache;
use crate::error::{Error, Result};

bitflags! {
    /// `/Ff` field-flag bits this module cares about (PDF spec table 226/227).
    struct FieldFlags: u32 {
        const RADIO   = 1 << 15;
        const PUSH    = 1 << 16;
        const COMBO   = 1 << 17;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Button,
    Checkbox,
    RadioButton,
    TextField,
    ListBox,
    ComboBox,
    Signature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidgetEntry {
    pub kind: WidgetKind,
    pub bounds: Rect,
    pub object_id: ObjectId,
    pub field_name: Option<String>,
}

fn field_flags(dict: &lopdf::Dictionary) -> FieldFlags {
    match dict.get(b"Ff") {
        Ok(Object::Integer(f)) => FieldFlags::from_bits_truncate(*f as u32),
        _ => FieldFlags::empty(),
    }
}

fn field_type(dict: &lopdf::Dictionary) -> Option<Vec<u8>> {
    match dict.get(b"FT") {
        Ok(Object::Name(n)) => Some(n.clone()),
        _ => None,
    }
}

fn classify(dict: &lopdf::Dictionary) -> WidgetKind {
    let flags = field_flags(dict);
    match field_type(dict).as_deref() {
        Some(b"Btn") => {
            if flags.contains(FieldFlags::PUSH) {
                WidgetKind::Button
            } else if flags.contains(FieldFlags::RADIO) {
                WidgetKind::RadioButton
            } else {
                WidgetKind::Checkbox
            }
        }
        Some(b"Tx") => WidgetKind::TextField,
        Some(b"Ch") => {
            if flags.contains(FieldFlags::COMBO) {
                WidgetKind::ComboBox
            } else {
                WidgetKind::ListBox
            }
        }
        Some(b"Sig") => WidgetKind::Signature,
        _ => WidgetKind::TextField,
    }
}

fn field_name(dict: &lopdf::Dictionary) -> Option<String> {
    match dict.get(b"T") {
        Ok(Object::String(bytes, _)) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

pub fn list_widgets(
    doc: &Document,
    page_index: usize,
    bounds: Rect,
    page_w_px: f64,
    page_h_px: f64,
) -> Result<Vec<WidgetEntry>> {
    let page_id = doc.page_object_id(page_index)?;
    let ids = doc.annot_ids(page_id)?;
    let mut entries = Vec::new();
    for id in ids {
        let Ok(dict) = doc.dict(id) else { continue };
        if !matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Widget") {
            continue;
        }
        let Some(rect) = annot::get_rect(dict) else { continue };
        let p0 = annot::pdf_to_pixel(bounds, page_w_px, page_h_px, Point::new(rect.x0, rect.y0));
        let p1 = annot::pdf_to_pixel(bounds, page_w_px, page_h_px, Point::new(rect.x1, rect.y1));
        entries.push(WidgetEntry {
            kind: classify(dict),
            bounds: Rect::new(p0.x, p0.y, p1.x, p1.y),
            object_id: id,
            field_name: field_name(dict),
        });
    }
    Ok(entries)
}

fn contains(r: Rect, p: Point) -> bool {
    p.x >= r.x0 && p.x <= r.x1 && p.y >= r.y0 && p.y <= r.y1
}

/// Finds the first widget containing `point` (pixel space). On a checkbox
/// or radio button, toggles its `/AS` appearance state between `/Off` and
/// its "on" state (the first state name in `/AP/N` that isn't `Off`).
/// Returns `(changed, widget_id)`; `changed` is `1` iff the value flipped.
pub fn click(
    doc: &mut Document,
    cache: &mut PageCache,
    page_index: usize,
    bounds: Rect,
    page_w_px: f64,
    page_h_px: f64,
    point: Point,
) -> Result<(bool, Option<ObjectId>)> {
    let entries = list_widgets(doc, page_index, bounds, page_w_px, page_h_px)?;
    let Some(hit) = entries.iter().find(|w| contains(w.bounds, point)) else {
        return Ok((false, None));
    };
    let changed = match hit.kind {
        WidgetKind::Checkbox | WidgetKind::RadioButton => toggle(doc, hit.object_id)?,
        _ => false,
    };
    if changed {
        cache.invalidate_display_list(page_index);
    }
    Ok((changed, Some(hit.object_id)))
}

fn on_state_name(dict: &lopdf::Dictionary) -> Option<Vec<u8>> {
    let Ok(Object::Dictionary(ap)) = dict.get(b"AP") else { return None };
    let Ok(Object::Dictionary(n)) = ap.get(b"N") else { return None };
    n.iter().map(|(k, _)| k.clone()).find(|k| k != b"Off")
}

fn toggle(doc: &mut Document, widget_id: ObjectId) -> Result<bool> {
    let on_name = on_state_name(doc.dict(widget_id)?);
    let dict = doc.dict_mut(widget_id)?;
    let currently_on = !matches!(dict.get(b"AS"), Ok(Object::Name(n)) if n == b"Off");
    let next: Vec<u8> = if currently_on { b"Off".to_vec() } else { on_name.unwrap_or_else(|| b"Yes".to_vec()) };
    dict.set("AS", Object::Name(next));
    Ok(true)
}

/// Never returns `NULL`/absent: an unset value reads as the empty string.
pub fn read_text_field(doc: &Document, widget_id: ObjectId) -> Result<String> {
    let dict = doc.dict(widget_id)?;
    Ok(match dict.get(b"V") {
        Ok(Object::String(bytes, _)) => String::from_utf8_lossy(bytes).to_string(),
        _ => String::new(),
    })
}

pub fn write_text_field(
    doc: &mut Document,
    cache: &mut PageCache,
    page_index: usize,
    widget_id: ObjectId,
    value: &str,
) -> Result<()> {
    let dict = doc.dict_mut(widget_id)?;
    if !matches!(field_type(dict).as_deref(), Some(b"Tx")) {
        return Err(Error::invalid_argument("widget is not a text field"));
    }
    dict.set("V", annot::pdf_string(value));
    cache.invalidate_display_list(page_index);
    Ok(())
}

fn string_or_pair_value(o: &Object) -> Option<String> {
    match o {
        Object::String(bytes, _) => String::from_utf8(bytes.clone()).ok(),
        Object::Array(pair) if pair.len() == 2 => match &pair[0] {
            Object::String(bytes, _) => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        },
        _ => None,
    }
}

pub fn choice_options(doc: &Document, widget_id: ObjectId) -> Result<Vec<String>> {
    let dict = doc.dict(widget_id)?;
    let Ok(Object::Array(opts)) = dict.get(b"Opt") else { return Ok(Vec::new()) };
    Ok(opts.iter().filter_map(string_or_pair_value).collect())
}

pub fn choice_selected(doc: &Document, widget_id: ObjectId) -> Result<Vec<String>> {
    let dict = doc.dict(widget_id)?;
    match dict.get(b"V") {
        Ok(Object::String(bytes, _)) => Ok(vec![String::from_utf8_lossy(bytes).to_string()]),
        Ok(Object::Array(values)) => Ok(values
            .iter()
            .filter_map(|o| match o {
                Object::String(bytes, _) => String::from_utf8(bytes.clone()).ok(),
                _ => None,
            })
            .collect()),
        _ => Ok(Vec::new()),
    }
}

pub fn choice_set_selected(
    doc: &mut Document,
    cache: &mut PageCache,
    page_index: usize,
    widget_id: ObjectId,
    values: &[&str],
) -> Result<()> {
    let dict = doc.dict_mut(widget_id)?;
    if !matches!(field_type(dict).as_deref(), Some(b"Ch")) {
        return Err(Error::invalid_argument("widget is not a choice field"));
    }
    let value = match values {
        [one] => annot::pdf_string(one),
        many => Object::Array(many.iter().map(|v| annot::pdf_string(v)).collect()),
    };
    dict.set("V", value);
    cache.invalidate_display_list(page_index);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_inclusive_of_edges() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(contains(r, Point::new(0.0, 0.0)));
        assert!(contains(r, Point::new(10.0, 10.0)));
        assert!(!contains(r, Point::new(10.1, 5.0)));
    }
}
