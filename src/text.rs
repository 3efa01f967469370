//! Structured text extraction and search.

use crate::backend::{Document, Matrix, Rect};
use crate::cookie::Cookie;
use crate::error::Result;

/// Builds the CTM used by both `render.rs` and this module: page space to
/// pixel space, `scale(pageW/page_w, pageH/page_h)` pre-translated by
/// `(-bounds.x0, -bounds.y0)`. Pixel space is y-down while
/// PDF page space is y-up, so the vertical axis is additionally flipped.
fn page_to_pixel_ctm(bounds: Rect, page_w_px: f64, page_h_px: f64) -> Matrix {
    let sx = page_w_px / bounds.width().max(f64::MIN_POSITIVE);
    let sy = page_h_px / bounds.height().max(f64::MIN_POSITIVE);
    let flip = Matrix { a: 1.0, b: 0.0, c: 0.0, d: -1.0, e: 0.0, f: page_h_px };
    flip.concat(&Matrix::scale(sx, sy)).concat(&Matrix::translate(-bounds.x0, -bounds.y0))
}

fn rect_to_pixel(r: Rect, ctm: &Matrix) -> Rect {
    let p0 = ctm.apply(crate::backend::Point::new(r.x0, r.y0));
    let p1 = ctm.apply(crate::backend::Point::new(r.x1, r.y1));
    Rect::new(p0.x, p0.y, p1.x, p1.y)
}

/// Plain UTF-8 text of a page.
pub fn page_text_utf8(doc: &mut Document, page_index: usize) -> Result<String> {
    doc.page_text_plain(page_index)
}

/// Wraps the page's text in header/trailer tags, one `<p>` block per line,
/// a simplified structured-text-to-HTML shape (full
/// block/line geometry is not exposed by this crate's text backend; see
/// `backend/native.rs`'s module doc for the underlying library split).
pub fn page_text_html(doc: &mut Document, page_index: usize) -> Result<String> {
    let plain = doc.page_text_plain(page_index)?;
    let mut html = String::from("<html>\n<body>\n");
    for line in plain.lines() {
        html.push_str("<p>");
        html.push_str(&escape_html(line));
        html.push_str("</p>\n");
    }
    html.push_str("</body>\n</html>\n");
    Ok(html)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Finds up to `hit_max` occurrences of `needle`, returning pixel-space
/// rects at the same `(page_w_px, page_h_px)` used for rendering, so a hit
/// overlaps the glyph run on the rendered image at the same scale. Polls `cookie` between pages is not meaningful
/// here (one page at a time is searched by the caller via `page_index`);
/// within-page cancellation is checked before and after the underlying
/// library call.
pub fn search_page(
    doc: &mut Document,
    page_index: usize,
    needle: &str,
    hit_max: usize,
    page_w_px: i32,
    page_h_px: i32,
    cookie: Option<&Cookie>,
) -> Result<Vec<Rect>> {
    if cookie.is_some_and(Cookie::aborted) {
        return Err(crate::error::Error::Aborted);
    }
    let bounds = doc.page_bounds(page_index)?;
    let rects = doc.search_page_rects(page_index, needle, hit_max)?;
    if cookie.is_some_and(Cookie::aborted) {
        return Err(crate::error::Error::Aborted);
    }
    let ctm = page_to_pixel_ctm(bounds, page_w_px as f64, page_h_px as f64);
    Ok(rects.into_iter().map(|r| rect_to_pixel(r, &ctm)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Point;

    #[test]
    fn identity_bounds_maps_origin_to_top_left_after_flip() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 200.0);
        let ctm = page_to_pixel_ctm(bounds, 100.0, 200.0);
        // PDF-space bottom-left (0,0) lands at pixel-space bottom-left (0, pageH).
        let p = ctm.apply(Point::new(0.0, 0.0));
        assert!((p.x - 0.0).abs() < 1e-6);
        assert!((p.y - 200.0).abs() < 1e-6);
        // PDF-space top-left (0, pageH) lands at pixel-space top-left (0, 0).
        let p = ctm.apply(Point::new(0.0, 200.0));
        assert!((p.x - 0.0).abs() < 1e-6);
        assert!((p.y - 0.0).abs() < 1e-6);
    }

    #[test]
    fn non_uniform_scale_is_applied_per_axis() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 100.0);
        let ctm = page_to_pixel_ctm(bounds, 200.0, 50.0);
        let p = ctm.apply(Point::new(100.0, 0.0));
        assert!((p.x - 200.0).abs() < 1e-6);
    }
}
