//! Patch and full-page rendering.

use tracing::{debug, trace};

use crate::backend::Document;
use crate::cache::PageCache;
use crate::cookie::Cookie;
use crate::error::{Error, Result};

/// Clears `buf` to opaque white honouring `stride`, the way
/// `render_patch_rgba` clears the wrapped pixmap before drawing.
fn clear_white(buf: &mut [u8], rows: i32, row_pixels: i32, stride: usize) {
    for row in 0..rows as usize {
        let start = row * stride;
        let end = start + row_pixels as usize * 4;
        if end > buf.len() {
            break;
        }
        buf[start..end].fill(0xFF);
    }
}

/// Renders page `index` at `(page_w, page_h)` pixels, honouring
/// `render_annots`, and copies the `(x, y, w, h)` patch into `out`, a
/// caller-owned buffer with the given `stride` (bytes per row, a multiple
/// of 4). Returns `Ok(())` on success; any abort or failure returns an
/// `Error` which the caller maps to the documented 0/false.
#[allow(clippy::too_many_arguments)]
pub fn render_patch_rgba(
    doc: &mut Document,
    cache: &mut PageCache,
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
    if page_w <= 0 || page_h <= 0 || patch_h <= 0 || stride == 0 || stride % 4 != 0 {
        return Err(Error::invalid_argument(
            "page dimensions and stride must be positive and stride must be a multiple of 4",
        ));
    }
    let row_pixels = (stride / 4) as i32;
    if patch_w != row_pixels {
        // patch_w is otherwise unused (row width derives from stride); this
        // implementation rejects a mismatch instead of silently ignoring
        // patch_w.
        return Err(Error::invalid_argument("patch_w must equal stride / 4"));
    }

    trace!(page_index, page_w, page_h, "render_patch_rgba start");
    if cookie.is_some_and(Cookie::aborted) {
        debug!(page_index, "render_patch_rgba aborted before start");
        return Err(Error::Aborted);
    }

    // Touch the cache so page bounds are warm and MRU order reflects this
    // access, even though the actual raster comes from the whole-document
    // pdfium side (see cache.rs's module doc for why there is no separate
    // page handle to keep alive here).
    cache.ensure(page_index, || doc.page_bounds(page_index))?;

    if cookie.is_some_and(Cookie::aborted) {
        return Err(Error::Aborted);
    }

    let (full_w, full_h, pixels) = doc.render_page_rgba(page_index, page_w, page_h, render_annots)?;
    cache.mark_display_list_ready(page_index);

    if cookie.is_some_and(Cookie::aborted) {
        return Err(Error::Aborted);
    }

    clear_white(out, patch_h, row_pixels, stride);

    let full_w = full_w as i32;
    let full_h = full_h as i32;
    for row in 0..patch_h {
        let src_y = patch_y + row;
        if src_y < 0 || src_y >= full_h {
            continue;
        }
        let dst_row_start = row as usize * stride;
        for col in 0..row_pixels {
            let src_x = patch_x + col;
            if src_x < 0 || src_x >= full_w {
                continue;
            }
            let src_idx = (src_y as usize * full_w as usize + src_x as usize) * 4;
            let dst_idx = dst_row_start + col as usize * 4;
            if src_idx + 4 > pixels.len() || dst_idx + 4 > out.len() {
                continue;
            }
            out[dst_idx..dst_idx + 4].copy_from_slice(&pixels[src_idx..src_idx + 4]);
        }
    }

    if cookie.is_some_and(Cookie::aborted) {
        return Err(Error::Aborted);
    }

    trace!(page_index, "render_patch_rgba done");
    Ok(())
}

/// Full-page convenience wrapper: `render_patch_rgba` over `(0, 0, pageW,
/// pageH)`. Guarantees patch and whole-page rendering agree by
/// construction, since both paths go through the same `render_page_rgba`
/// call underneath.
pub fn render_page_rgba(
    doc: &mut Document,
    cache: &mut PageCache,
    page_index: usize,
    page_w: i32,
    page_h: i32,
    out: &mut [u8],
    stride: usize,
    cookie: Option<&Cookie>,
    render_annots: bool,
) -> Result<()> {
    render_patch_rgba(
        doc, cache, page_index, page_w, page_h, 0, 0, stride as i32 / 4, page_h, out, stride,
        cookie, render_annots,
    )
}
