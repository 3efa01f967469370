//! The FreeText appearance patcher — the most delicate component in the
//! crate. The underlying rendering library paints the
//! text but not `/IC` (interior fill) nor this engine's private border
//! metadata; this module post-processes the already-generated `/AP`
//! stream to prepend a rect painter, idempotently.

use lopdf::{Dictionary, Object};
use tracing::warn;

use crate::annot::{self, Color};
use crate::backend::{Document, ObjectId, Rect};
use crate::error::Result;

const MARKER: &str = "%OPD_AP_PATCH";
const LEGACY_MARKER: &str = "%OPD_BG_FILL";
const BEZIER_K: f64 = 0.5522847498;

struct PatchInputs {
    fill: Option<Color>,
    border_width: f64,
    border_dashed: bool,
    border_radius: f64,
    border_color: Option<Color>,
    bbox: Rect,
    opacity_gstate: bool,
}

/// Runs the patcher on `annot_id`, a FreeText annotation. Any failure is
/// swallowed: the library-generated `/AP`
/// is left exactly as it was, and a warning is logged. The mutation that
/// called this is never rolled back on account of a patch failure.
pub fn patch_free_text(doc: &mut Document, annot_id: ObjectId) -> Result<()> {
    if let Err(e) = try_patch(doc, annot_id) {
        warn!(error = %e, "FreeText appearance patch failed; leaving generated /AP unchanged");
    }
    Ok(())
}

fn try_patch(doc: &mut Document, annot_id: ObjectId) -> Result<()> {
    let dict = doc.dict(annot_id)?;
    if !matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"FreeText") {
        return Err(crate::error::Error::invalid_argument("not a FreeText annotation"));
    }
    let annot_rect = annot::get_rect(dict);
    let fill = dict.get(b"IC").ok().and_then(Color::from_array);
    let border_width = dict
        .get(b"OPDBorderWidth")
        .ok()
        .and_then(|o| match o {
            Object::Real(r) => Some(*r as f64),
            Object::Integer(i) => Some(*i as f64),
            _ => None,
        })
        .unwrap_or(0.0)
        .clamp(0.0, 24.0);
    let border_dashed = matches!(dict.get(b"OPDBorderDashed"), Ok(Object::Boolean(true)));
    let border_radius = dict
        .get(b"OPDBorderRadius")
        .ok()
        .and_then(|o| match o {
            Object::Real(r) => Some(*r as f64),
            Object::Integer(i) => Some(*i as f64),
            _ => None,
        })
        .unwrap_or(0.0)
        .clamp(0.0, 48.0);
    let border_color = if border_width > 0.01 {
        dict.get(b"C").ok().and_then(Color::from_array)
    } else {
        None
    };

    let ap = dict.get(b"AP").ok().and_then(|o| match o {
        Object::Dictionary(d) => Some(d.clone()),
        _ => None,
    });
    let Some(ap) = ap else {
        return Err(crate::error::Error::invalid_argument("annotation has no /AP"));
    };
    let stream_id = resolve_normal_appearance_id(doc, &ap, dict)?;

    let stream = doc.stream(stream_id)?;
    let bbox = stream_bbox(&stream.dict).or(annot_rect).ok_or_else(|| {
        crate::error::Error::invalid_argument("no /BBox or /Rect to patch against")
    })?;
    if bbox.width() <= 0.5 || bbox.height() <= 0.5 {
        return Err(crate::error::Error::invalid_argument("appearance bbox too small to patch"));
    }
    let opacity_gstate = has_opacity_gstate(&stream.dict, doc)?;

    let inputs = PatchInputs { fill, border_width, border_dashed, border_radius, border_color, bbox, opacity_gstate };
    let prefix = build_prefix(&inputs);

    let original = stream.content.clone();
    let body = strip_existing_prefix(&original);
    let mut patched = Vec::with_capacity(prefix.len() + body.len());
    patched.extend_from_slice(prefix.as_bytes());
    patched.extend_from_slice(body);
    doc.set_stream_content(stream_id, patched)
}

fn resolve_normal_appearance_id(doc: &Document, ap: &Dictionary, annot_dict: &Dictionary) -> Result<ObjectId> {
    let n = ap.get(b"N").map_err(|e| crate::error::Error::library(e.to_string()))?;
    match n {
        Object::Reference(r) => {
            let id = ObjectId(r.0, r.1);
            match doc.object(id)? {
                Object::Stream(_) => Ok(id),
                Object::Dictionary(states) => pick_state(states, annot_dict),
                _ => Err(crate::error::Error::invalid_argument("/N does not resolve to a stream")),
            }
        }
        Object::Dictionary(states) => pick_state(states, annot_dict),
        _ => Err(crate::error::Error::invalid_argument("/N is neither a reference nor a dict-of-states")),
    }
}

fn pick_state(states: &Dictionary, annot_dict: &Dictionary) -> Result<ObjectId> {
    let name = match annot_dict.get(b"AS") {
        Ok(Object::Name(n)) => Some(n.clone()),
        _ => None,
    };
    let chosen = if let Some(name) = name {
        states.get(&name).ok()
    } else {
        states.iter().next().map(|(_, v)| v)
    };
    match chosen {
        Some(Object::Reference(r)) => Ok(ObjectId(r.0, r.1)),
        _ => Err(crate::error::Error::invalid_argument("dict-of-states has no usable entry")),
    }
}

fn stream_bbox(stream_dict: &Dictionary) -> Option<Rect> {
    let arr = match stream_dict.get(b"BBox").ok()? {
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

fn has_opacity_gstate(stream_dict: &Dictionary, doc: &Document) -> Result<bool> {
    let Ok(Object::Dictionary(resources)) = stream_dict.get(b"Resources") else {
        return Ok(false);
    };
    let Ok(ext_gstate) = resources.get(b"ExtGState") else {
        return Ok(false);
    };
    let dict = match ext_gstate {
        Object::Dictionary(d) => d.clone(),
        Object::Reference(r) => match doc.object(ObjectId(r.0, r.1))? {
            Object::Dictionary(d) => d.clone(),
            _ => return Ok(false),
        },
        _ => return Ok(false),
    };
    Ok(dict.has(b"H"))
}

fn build_prefix(inputs: &PatchInputs) -> String {
    let mut out = String::new();
    out.push_str("q\n");
    out.push_str(MARKER);
    out.push('\n');
    if inputs.opacity_gstate {
        out.push_str("/H gs\n");
    }
    if let Some(fill) = inputs.fill {
        out.push_str(&format!("{} {} {} rg\n", fill.r, fill.g, fill.b));
    }
    let has_border = inputs.border_width > 0.01 && inputs.border_color.is_some();
    if has_border {
        let c = inputs.border_color.unwrap();
        out.push_str(&format!("{} {} {} RG\n", c.r, c.g, c.b));
        out.push_str(&format!("{} w\n", inputs.border_width));
        if inputs.border_dashed {
            let on = (inputs.border_width * 3.0).max(1.0);
            let off = (inputs.border_width * 2.0).max(1.0);
            out.push_str(&format!("[{on} {off}] 0 d\n"));
        } else {
            out.push_str("[] 0 d\n");
        }
    }

    let inset = if has_border { inputs.border_width / 2.0 } else { 0.0 };
    let (x0, y0, x1, y1) = {
        let bx0 = inputs.bbox.x0 + inset;
        let by0 = inputs.bbox.y0 + inset;
        let bx1 = inputs.bbox.x1 - inset;
        let by1 = inputs.bbox.y1 - inset;
        if bx0 >= bx1 || by0 >= by1 {
            (inputs.bbox.x0, inputs.bbox.y0, inputs.bbox.x1, inputs.bbox.y1)
        } else {
            (bx0, by0, bx1, by1)
        }
    };
    let w = x1 - x0;
    let h = y1 - y0;
    let r = inputs.border_radius.min(w.min(h) / 2.0).max(0.0);

    if r <= 0.01 {
        out.push_str(&format!("{x0} {y0} {w} {h} re\n"));
    } else {
        let c = BEZIER_K * r;
        out.push_str(&format!("{} {} m\n", x0 + r, y0));
        out.push_str(&format!("{} {} l\n", x1 - r, y0));
        out.push_str(&format!("{} {} {} {} {} {} c\n", x1 - r + c, y0, x1, y0 + r - c, x1, y0 + r));
        out.push_str(&format!("{} {} l\n", x1, y1 - r));
        out.push_str(&format!("{} {} {} {} {} {} c\n", x1, y1 - r + c, x1 - r + c, y1, x1 - r, y1));
        out.push_str(&format!("{} {} l\n", x0 + r, y1));
        out.push_str(&format!("{} {} {} {} {} {} c\n", x0 + r - c, y1, x0, y1 - r + c, x0, y1 - r));
        out.push_str(&format!("{} {} l\n", x0, y0 + r));
        out.push_str(&format!("{} {} {} {} {} {} c\n", x0, y0 + r - c, x0 + r - c, y0, x0 + r, y0));
        out.push_str("h\n");
    }

    let paint = match (inputs.fill.is_some(), has_border) {
        (true, true) => "B",
        (true, false) => "f",
        (false, true) => "S",
        (false, false) => "n",
    };
    out.push_str(paint);
    out.push('\n');
    out.push_str("Q\n");
    out
}

/// Strips a prior patch prefix if the stream already begins with one of
/// the recognised markers within the first 64 bytes, returning everything
/// after the first `\nQ\n` that follows the marker. Returns the whole
/// input unchanged (no prior patch) otherwise.
fn strip_existing_prefix(content: &[u8]) -> &[u8] {
    let head = &content[..content.len().min(64)];
    let head_str = String::from_utf8_lossy(head);
    let marker_pos = head_str.find(MARKER).or_else(|| head_str.find(LEGACY_MARKER));
    let Some(marker_pos) = marker_pos else {
        return content;
    };
    let search_from = marker_pos;
    let needle = b"\nQ\n";
    if let Some(rel) = content[search_from..].windows(needle.len()).position(|w| w == needle) {
        &content[search_from + rel + needle.len()..]
    } else {
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_prior_patch_prefix() {
        let original = b"q\n%OPD_AP_PATCH\n1 0 0 rg\n0 0 10 10 re\nf\nQ\nBT (hi) Tj ET\n";
        let stripped = strip_existing_prefix(original);
        assert_eq!(stripped, b"BT (hi) Tj ET\n");
    }

    #[test]
    fn accepts_legacy_marker() {
        let original = b"q\n%OPD_BG_FILL\n1 0 0 rg\n0 0 10 10 re\nf\nQ\nBT ET\n";
        let stripped = strip_existing_prefix(original);
        assert_eq!(stripped, b"BT ET\n");
    }

    #[test]
    fn leaves_unpatched_stream_untouched() {
        let original = b"BT (hi) Tj ET\n";
        assert_eq!(strip_existing_prefix(original), original.as_slice());
    }

    #[test]
    fn prefix_is_idempotent_marker_count() {
        let inputs = PatchInputs {
            fill: Some(Color::new(1.0, 0.9, 0.5)),
            border_width: 2.0,
            border_dashed: true,
            border_radius: 6.0,
            border_color: Some(Color::new(0.0, 0.0, 1.0)),
            bbox: Rect::new(0.0, 0.0, 220.0, 80.0),
            opacity_gstate: false,
        };
        let prefix = build_prefix(&inputs);
        assert_eq!(prefix.matches(MARKER).count(), 1);
        assert!(prefix.starts_with("q\n%OPD_AP_PATCH\n"));
        assert!(prefix.trim_end().ends_with('Q'));
    }

    #[test]
    fn no_fill_no_border_paints_nothing_but_stays_well_formed() {
        let inputs = PatchInputs {
            fill: None,
            border_width: 0.0,
            border_dashed: false,
            border_radius: 0.0,
            border_color: None,
            bbox: Rect::new(0.0, 0.0, 10.0, 10.0),
            opacity_gstate: false,
        };
        let prefix = build_prefix(&inputs);
        assert!(prefix.contains("\nn\n"));
    }
}
