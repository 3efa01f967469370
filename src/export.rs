//! Flattened PDF export: renders every source page to a pixmap at the
//! requested DPI, wraps each as a single-image page in a fresh PDF, and
//! writes it out. The result carries no annotations or form widgets — it
//! is a purely visual flattening.

use image::{DynamicImage, RgbaImage};
use pdf_writer::{Content, Finish, Name, Pdf, Rect as PwRect, Ref};

use crate::backend::Document;
use crate::error::{Error, Result};

const DEFAULT_DPI: f64 = 150.0;

/// Pixels-per-point at `dpi` (72 points per inch, the PDF user-space unit).
fn px_per_point(dpi: f64) -> f64 {
    dpi / 72.0
}

/// Renders every page of `doc` at `dpi` (defaulting to 150) and writes a
/// fresh, annotation-free, widget-free PDF to `path` via the same
/// atomic-rename convention `save_as` uses.
pub fn export_flattened(doc: &mut Document, path: &std::path::Path, dpi: Option<f64>) -> Result<()> {
    let dpi = dpi.unwrap_or(DEFAULT_DPI);
    if dpi <= 0.0 {
        return Err(Error::invalid_argument("dpi must be positive"));
    }
    let scale = px_per_point(dpi);
    let page_count = doc.page_count();

    let mut pdf = Pdf::new();
    let mut id_pool = (1..).map(Ref::new);
    let catalog_id = id_pool.next().unwrap();
    let page_tree_id = id_pool.next().unwrap();

    let mut page_ids = Vec::with_capacity(page_count);
    let mut content_ids = Vec::with_capacity(page_count);
    let mut image_ids = Vec::with_capacity(page_count);
    for _ in 0..page_count {
        page_ids.push(id_pool.next().unwrap());
        content_ids.push(id_pool.next().unwrap());
        image_ids.push(id_pool.next().unwrap());
    }

    pdf.catalog(catalog_id).pages(page_tree_id);
    pdf.pages(page_tree_id).kids(page_ids.iter().copied()).count(page_count as i32);

    for index in 0..page_count {
        let bounds = doc.page_bounds(index)?;
        let width_pt = bounds.width();
        let height_pt = bounds.height();
        let width_px = (width_pt * scale).round().max(1.0) as i32;
        let height_px = (height_pt * scale).round().max(1.0) as i32;

        let (w, h, rgba) = doc.render_page_rgba(index, width_px, height_px, false)?;
        let rgb = wrap_as_rgb(w, h, rgba)?;

        let page_id = page_ids[index];
        let content_id = content_ids[index];
        let image_id = image_ids[index];
        let image_name = Name(b"Im0");

        let mut page = pdf.page(page_id);
        page.media_box(PwRect::new(0.0, 0.0, width_pt as f32, height_pt as f32));
        page.parent(page_tree_id);
        page.contents(content_id);
        page.resources().x_objects().pair(image_name, image_id);
        page.finish();

        let mut content = Content::new();
        content.save_state();
        content.transform([width_pt as f32, 0.0, 0.0, height_pt as f32, 0.0, 0.0]);
        content.x_object(image_name);
        content.restore_state();
        pdf.stream(content_id, &content.finish());

        // Raw DeviceRGB, no /Filter: simplest encoding that needs no extra
        // codec dependency beyond what is already wired for this path.
        let mut image = pdf.image_xobject(image_id, &rgb);
        image.width(w as i32);
        image.height(h as i32);
        image.color_space().device_rgb();
        image.bits_per_component(8);
        image.finish();
    }

    let bytes = pdf.finish();
    crate::backend::atomic_write_bytes(path, &bytes)
}

/// Wraps a rendered page as an image: hands pdfium's RGBA buffer to the
/// `image` crate and drops back to RGB8, since a flattened page has an
/// opaque white background already painted in by `render_page_rgba` and
/// PDF image XObjects need an explicit `/SMask` for alpha this export never
/// produces.
fn wrap_as_rgb(w: u32, h: u32, rgba: Vec<u8>) -> Result<Vec<u8>> {
    let buffer = RgbaImage::from_raw(w, h, rgba)
        .ok_or_else(|| Error::library("rendered buffer size does not match its own dimensions"))?;
    Ok(DynamicImage::ImageRgba8(buffer).to_rgb8().into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_as_rgb_drops_alpha_channel() {
        let rgba = vec![10u8, 20, 30, 255, 40, 50, 60, 128];
        let rgb = wrap_as_rgb(2, 1, rgba).unwrap();
        assert_eq!(rgb, vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn px_per_point_matches_72_dpi_baseline() {
        assert!((px_per_point(72.0) - 1.0).abs() < 1e-9);
        assert!((px_per_point(150.0) - 150.0 / 72.0).abs() < 1e-9);
    }
}
