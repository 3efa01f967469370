//! FreeText style, paragraph and rich-text ownership, plus a border-style
//! capture-on-load step for annotations created before this crate had
//! private border keys.

use bitflags::bitflags;
use lopdf::{Dictionary, Object};

use crate::annot::{self, Color};
use crate::backend::{Document, ObjectId};
use crate::error::{Error, Result};

bitflags! {
    /// FreeText style flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StyleFlags: u8 {
        const BOLD          = 0b0001;
        const ITALIC        = 0b0010;
        const UNDERLINE     = 0b0100;
        const STRIKETHROUGH = 0b1000;
    }
}

/// PDF annotation `/F` flag bits this module touches.
mod annot_flags {
    pub const LOCKED: i64 = 1 << 7; // PDF_ANNOT_IS_LOCKED (bit 8, 1-indexed)
    pub const LOCKED_CONTENTS: i64 = 1 << 9; // PDF_ANNOT_IS_LOCKED_CONTENTS (bit 10)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefaultAppearance {
    pub font: String,
    pub size: f64,
    pub color: Color,
}

impl Default for DefaultAppearance {
    fn default() -> Self {
        DefaultAppearance { font: "Helv".to_string(), size: 12.0, color: Color::new(0.0, 0.0, 0.0) }
    }
}

/// Parses `/DA`, accepting `/<FONT> <SIZE> Tf <R> <G> <B> rg` and
/// `/<FONT> <SIZE> Tf <GREY> g`. Falls back to the documented defaults on
/// any parse failure rather than erroring, since `/DA` is cosmetic.
pub fn parse_da(da: &str) -> DefaultAppearance {
    let tokens: Vec<&str> = da.split_whitespace().collect();
    let mut result = DefaultAppearance::default();
    let Some(tf_idx) = tokens.iter().position(|t| *t == "Tf") else {
        return result;
    };
    if tf_idx < 2 {
        return result;
    }
    if let Some(font) = tokens[tf_idx - 2].strip_prefix('/') {
        result.font = font.to_string();
    }
    if let Ok(size) = tokens[tf_idx - 1].parse::<f64>() {
        result.size = size;
    }
    if let Some(rg_idx) = tokens.iter().position(|t| *t == "rg") {
        if rg_idx >= 3 {
            let nums: Option<Vec<f64>> =
                tokens[rg_idx - 3..rg_idx].iter().map(|t| t.parse::<f64>().ok()).collect();
            if let Some(n) = nums {
                result.color = Color::new(n[0], n[1], n[2]);
            }
        }
    } else if let Some(g_idx) = tokens.iter().position(|t| *t == "g") {
        if g_idx >= 1 {
            if let Ok(grey) = tokens[g_idx - 1].parse::<f64>() {
                result.color = Color::new(grey, grey, grey);
            }
        }
    }
    result
}

pub fn format_da(da: &DefaultAppearance) -> String {
    format!("/{} {} Tf {} {} {} rg", da.font, da.size, da.color.r, da.color.g, da.color.b)
}

fn font_key_to_full_name(key: &str) -> &'static str {
    match key {
        "Helv" => "Helvetica",
        "TiRo" => "Times-Roman",
        "Cour" => "Courier",
        "Symb" => "Symbol",
        "ZaDb" => "ZapfDingbats",
        _ => "Helvetica",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

impl Alignment {
    fn as_str(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }

    fn from_quadding(q: i64) -> Alignment {
        match q {
            1 => Alignment::Center,
            2 => Alignment::Right,
            _ => Alignment::Left,
        }
    }

    fn to_quadding(self) -> i64 {
        match self {
            Alignment::Left => 0,
            Alignment::Center => 1,
            Alignment::Right => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RichStyle {
    pub font_full: String,
    pub size: f64,
    pub line_height: f64,
    pub text_indent: f64,
    pub color: Color,
    pub align: Alignment,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
}

const DS_MARKER: &str = "-opd:1";

/// Builds `/DS`'s CSS-like string. Owned (carries the marker)
/// iff the caller asks for it, which in practice is always true here: this
/// crate only ever writes a `/DS` it owns.
pub fn format_ds(style: &RichStyle) -> String {
    let decoration = match (style.underline, style.strikethrough) {
        (true, true) => "underline line-through",
        (true, false) => "underline",
        (false, true) => "line-through",
        (false, false) => "none",
    };
    format!(
        "{DS_MARKER};font-family:{};font-size:{}pt;line-height:{};text-indent:{}pt;color:#{:02X}{:02X}{:02X};text-align:{};font-weight:{};font-style:{};text-decoration:{};",
        style.font_full,
        style.size,
        style.line_height,
        style.text_indent,
        (style.color.r * 255.0).round() as u8,
        (style.color.g * 255.0).round() as u8,
        (style.color.b * 255.0).round() as u8,
        style.align.as_str(),
        if style.bold { "bold" } else { "normal" },
        if style.italic { "italic" } else { "normal" },
        decoration,
    )
}

pub fn ds_is_owned(ds: &str) -> bool {
    ds.contains(DS_MARKER)
}

fn get_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

fn get_f64(dict: &Dictionary, key: &[u8]) -> Option<f64> {
    match dict.get(key).ok()? {
        Object::Real(r) => Some(*r as f64),
        Object::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

fn get_bool(dict: &Dictionary, key: &[u8]) -> Option<bool> {
    match dict.get(key).ok()? {
        Object::Boolean(b) => Some(*b),
        _ => None,
    }
}

/// When a FreeText annotation that predates this engine's private border
/// keys is loaded (no `OPDBorderWidth` yet) but already carries a standard
/// `/BS` or legacy `/Border` width, copy that width (and dash state) into
/// `OPDBorderWidth`/`OPDBorderDashed` once, so the first style edit on a
/// foreign FreeText doesn't silently drop its visible border. Called at
/// the top of every style mutation below, before the merge-and-rewrite.
pub fn capture_border_style_if_missing(dict: &mut Dictionary) {
    if dict.has(b"OPDBorderWidth") {
        return;
    }
    let mut width = None;
    let mut dashed = false;
    if let Ok(Object::Dictionary(bs)) = dict.get(b"BS") {
        width = get_f64(bs, b"W");
        if let Ok(Object::Name(style)) = bs.get(b"S") {
            dashed = style.as_slice() == b"D";
        }
    }
    if width.is_none() {
        if let Ok(Object::Array(border)) = dict.get(b"Border") {
            if border.len() >= 3 {
                width = match &border[2] {
                    Object::Real(r) => Some(*r as f64),
                    Object::Integer(i) => Some(*i as f64),
                    _ => None,
                };
            }
        }
    }
    if let Some(w) = width {
        dict.set("OPDBorderWidth", Object::Real(w.clamp(0.0, 24.0) as f32));
        dict.set("OPDBorderDashed", Object::Boolean(dashed));
    }
}

/// Forces `/BS/W` to 0 and zeroes the legacy `/Border` width entry, so the
/// underlying library doesn't double-stroke a border the appearance
/// patcher already paints.
fn suppress_border_generation(dict: &mut Dictionary) {
    if let Ok(Object::Dictionary(bs)) = dict.get_mut(b"BS") {
        bs.set("W", Object::Real(0.0));
    } else {
        let mut bs = Dictionary::new();
        bs.set("W", Object::Real(0.0));
        dict.set("BS", Object::Dictionary(bs));
    }
    if let Ok(Object::Array(border)) = dict.get_mut(b"Border") {
        if border.len() >= 3 {
            border[2] = Object::Real(0.0);
        }
    }
}

/// Reads `/DA`, `/Q`, and (if present) `/DS` into a merged `RichStyle`,
/// using defaults for anything absent.
fn read_current_style(dict: &Dictionary) -> RichStyle {
    let da = get_string(dict, b"DA").map(|s| parse_da(&s)).unwrap_or_default();
    let quadding = match dict.get(b"Q") {
        Ok(Object::Integer(q)) => *q,
        _ => 0,
    };
    let mut style = RichStyle {
        font_full: font_key_to_full_name(&da.font).to_string(),
        size: da.size,
        line_height: 1.2,
        text_indent: 0.0,
        color: da.color,
        align: Alignment::from_quadding(quadding),
        bold: false,
        italic: false,
        underline: false,
        strikethrough: false,
    };
    if let Some(ds) = get_string(dict, b"DS") {
        if ds_is_owned(&ds) {
            for field in ds.split(';') {
                let Some((k, v)) = field.split_once(':') else { continue };
                match k {
                    "font-family" => style.font_full = v.to_string(),
                    "font-size" => style.size = v.trim_end_matches("pt").parse().unwrap_or(style.size),
                    "line-height" => style.line_height = v.parse().unwrap_or(style.line_height),
                    "text-indent" => {
                        style.text_indent = v.trim_end_matches("pt").parse().unwrap_or(style.text_indent)
                    }
                    "color" => {
                        if let Some(hex) = v.strip_prefix('#') {
                            if hex.len() == 6 {
                                let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0);
                                let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0);
                                let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0);
                                style.color =
                                    Color::new(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
                            }
                        }
                    }
                    "text-align" => {
                        style.align = match v {
                            "center" => Alignment::Center,
                            "right" => Alignment::Right,
                            _ => Alignment::Left,
                        }
                    }
                    "font-weight" => style.bold = v == "bold",
                    "font-style" => style.italic = v == "italic",
                    "text-decoration" => {
                        style.underline = v.contains("underline");
                        style.strikethrough = v.contains("line-through");
                    }
                    _ => {}
                }
            }
        }
    }
    style
}

fn font_full_to_key(full: &str) -> &str {
    match full {
        "Helvetica" => "Helv",
        "Times-Roman" => "TiRo",
        "Courier" => "Cour",
        "Symbol" => "Symb",
        "ZapfDingbats" => "ZaDb",
        _ => "Helv",
    }
}

/// The shared body of every style-mutating entry point below: capture a
/// missing border, read/merge/rewrite `/DA` (and `/DS` too, but only when
/// `/DS` was already owned by this engine), force `/AP` regeneration,
/// suppress double-border generation, and re-run the appearance patcher.
/// `edit` receives the current merged style and returns the style to
/// commit.
fn mutate_style(
    doc: &mut Document,
    annot_id: ObjectId,
    edit: impl FnOnce(RichStyle) -> RichStyle,
) -> Result<()> {
    let dict = doc.dict_mut(annot_id)?;
    if !matches!(dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"FreeText") {
        return Err(Error::invalid_argument("not a FreeText annotation"));
    }
    capture_border_style_if_missing(dict);
    let ds_owned = get_string(dict, b"DS").is_some_and(|ds| ds_is_owned(&ds));
    let existing_rc = dict.get(b"RC").ok().cloned();
    let current = read_current_style(dict);
    let next = edit(current);

    let da = DefaultAppearance {
        font: font_full_to_key(&next.font_full).to_string(),
        size: next.size,
        color: next.color,
    };
    dict.set("DA", annot::pdf_string(&format_da(&da)));
    dict.set("Q", Object::Integer(next.align.to_quadding()));
    // Only rewrite /DS if this engine already owned it; a /DS absent or
    // owned by a foreign rich-text generator must not be overridden by a
    // bare style edit (it would override /DA/Q in that generator's own
    // appearance builder).
    if ds_owned {
        dict.set("DS", annot::pdf_string(&format_ds(&next)));
    }
    if let Some(rc) = existing_rc {
        dict.set("RC", rc);
    }
    suppress_border_generation(dict);
    dict.remove(b"AP");

    crate::annot::appearance_patch::patch_free_text(doc, annot_id)
}

pub fn update_font(doc: &mut Document, annot_id: ObjectId, font_full: &str) -> Result<()> {
    let font = font_full.to_string();
    mutate_style(doc, annot_id, |mut s| {
        s.font_full = font;
        s
    })
}

pub fn update_size(doc: &mut Document, annot_id: ObjectId, size: f64) -> Result<()> {
    mutate_style(doc, annot_id, |mut s| {
        s.size = size;
        s
    })
}

pub fn update_color(doc: &mut Document, annot_id: ObjectId, color: Color) -> Result<()> {
    mutate_style(doc, annot_id, |mut s| {
        s.color = color;
        s
    })
}

pub fn update_alignment(doc: &mut Document, annot_id: ObjectId, align: Alignment) -> Result<()> {
    mutate_style(doc, annot_id, |mut s| {
        s.align = align;
        s
    })
}

pub fn update_style_flags(doc: &mut Document, annot_id: ObjectId, flags: StyleFlags) -> Result<()> {
    mutate_style(doc, annot_id, |mut s| {
        s.bold = flags.contains(StyleFlags::BOLD);
        s.italic = flags.contains(StyleFlags::ITALIC);
        s.underline = flags.contains(StyleFlags::UNDERLINE);
        s.strikethrough = flags.contains(StyleFlags::STRIKETHROUGH);
        s
    })
}

pub fn update_paragraph(
    doc: &mut Document,
    annot_id: ObjectId,
    line_height: f64,
    text_indent: f64,
) -> Result<()> {
    mutate_style(doc, annot_id, |mut s| {
        s.line_height = line_height;
        s.text_indent = text_indent;
        s
    })
}

/// Written as the private key `/Rotate`, normalised to `[0, 360)`.
pub fn update_rotation(doc: &mut Document, annot_id: ObjectId, degrees: f64) -> Result<()> {
    let normalized = degrees.rem_euclid(360.0);
    let dict = doc.dict_mut(annot_id)?;
    dict.set("Rotate", Object::Real(normalized as f32));
    doc.mark_dirty();
    Ok(())
}

/// Sets or clears `/F`'s `IS_LOCKED` and `IS_LOCKED_CONTENTS` bits.
pub fn update_locked(doc: &mut Document, annot_id: ObjectId, locked: bool, locked_contents: bool) -> Result<()> {
    let dict = doc.dict_mut(annot_id)?;
    let mut flags = match dict.get(b"F") {
        Ok(Object::Integer(f)) => *f,
        _ => 0,
    };
    flags = if locked { flags | annot_flags::LOCKED } else { flags & !annot_flags::LOCKED };
    flags = if locked_contents {
        flags | annot_flags::LOCKED_CONTENTS
    } else {
        flags & !annot_flags::LOCKED_CONTENTS
    };
    dict.set("F", Object::Integer(flags));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rgb_da() {
        let da = parse_da("/Helv 14 Tf 1 0 0 rg");
        assert_eq!(da.font, "Helv");
        assert_eq!(da.size, 14.0);
        assert_eq!(da.color, Color::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn parses_grey_da() {
        let da = parse_da("/TiRo 10 Tf 0.5 g");
        assert_eq!(da.font, "TiRo");
        assert_eq!(da.color, Color::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn malformed_da_falls_back_to_defaults() {
        let da = parse_da("garbage");
        assert_eq!(da, DefaultAppearance::default());
    }

    #[test]
    fn ds_round_trips_through_format_and_marker_check() {
        let style = RichStyle {
            font_full: "Helvetica".to_string(),
            size: 12.0,
            line_height: 1.2,
            text_indent: 0.0,
            color: Color::new(0.0, 0.0, 0.0),
            align: Alignment::Left,
            bold: false,
            italic: false,
            underline: false,
            strikethrough: false,
        };
        let ds = format_ds(&style);
        assert!(ds_is_owned(&ds));
        assert!(ds.starts_with("-opd:1;"));
    }

    #[test]
    fn font_key_round_trips_known_fonts() {
        for key in ["Helv", "TiRo", "Cour", "Symb", "ZaDb"] {
            let full = font_key_to_full_name(key);
            assert_eq!(font_full_to_key(full), key);
        }
    }
}
