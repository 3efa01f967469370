//! Per-document fixed-size MRU page cache.
//!
//! A display-list replay device (build once, redraw from the recording on
//! every later access) is the obvious amortisation for repeated zoom/scroll
//! renders, but `pdfium_render` has no public record/replay device —
//! `render.rs` always draws straight from the (lazily rebuilt,
//! whole-document) raster side of `backend::Document`. What is worth
//! amortising here instead is page bounds and MRU bookkeeping.
//! `display_list_ready` stands in for the display list itself: it records
//! whether this page has already been drawn once since the cache (or the
//! underlying raster document) was last invalidated, so callers can still
//! observe the "first render on a page is a cold build, later renders
//! reuse it" shape even though there is no separate replayable object to
//! point at.

use super::backend::Rect;

const SLOTS: usize = 3;

#[derive(Debug, Clone)]
struct Slot {
    page_index: Option<usize>,
    last_used: u64,
    bounds: Rect,
    display_list_ready: bool,
}

impl Slot {
    fn empty() -> Slot {
        Slot { page_index: None, last_used: 0, bounds: Rect::new(0.0, 0.0, 0.0, 0.0), display_list_ready: false }
    }
}

/// Fixed `N = 3` MRU cache of page bounds, keyed by page index.
pub struct PageCache {
    slots: [Slot; SLOTS],
    use_counter: u64,
}

impl PageCache {
    pub fn new() -> PageCache {
        PageCache { slots: [Slot::empty(), Slot::empty(), Slot::empty()], use_counter: 0 }
    }

    fn find_index(&self, page_index: usize) -> Option<usize> {
        self.slots.iter().position(|s| s.page_index == Some(page_index))
    }

    fn choose_slot(&self) -> usize {
        // Smallest last_used wins; empty slots have last_used == 0 and an
        // empty page_index, so they are picked first naturally.
        let mut best = 0;
        for i in 1..SLOTS {
            if self.slots[i].page_index.is_none() {
                return i;
            }
            if self.slots[i].last_used < self.slots[best].last_used {
                best = i;
            }
        }
        best
    }

    /// Ensures `page_index` is resident, loading its bounds via `load` on a
    /// miss, and bumps its MRU counter. Returns the cached bounds and
    /// whether a display list is considered ready for this page.
    pub fn ensure(
        &mut self,
        page_index: usize,
        load: impl FnOnce() -> crate::error::Result<Rect>,
    ) -> crate::error::Result<(Rect, bool)> {
        let idx = match self.find_index(page_index) {
            Some(i) => i,
            None => {
                let bounds = load()?;
                let i = self.choose_slot();
                self.slots[i] = Slot {
                    page_index: Some(page_index),
                    last_used: 0,
                    bounds,
                    display_list_ready: false,
                };
                i
            }
        };
        self.use_counter += 1;
        self.slots[idx].last_used = self.use_counter;
        Ok((self.slots[idx].bounds, self.slots[idx].display_list_ready))
    }

    /// Marks the page's display list built, so a later `ensure` reports
    /// `display_list_ready = true`.
    pub fn mark_display_list_ready(&mut self, page_index: usize) {
        if let Some(i) = self.find_index(page_index) {
            self.slots[i].display_list_ready = true;
        }
    }

    /// Drops slot `i`'s display list without evicting the page bounds,
    /// because an annotation mutation on that page invalidated the
    /// rendering, not the geometry.
    pub fn invalidate_display_list(&mut self, page_index: usize) {
        if let Some(i) = self.find_index(page_index) {
            self.slots[i].display_list_ready = false;
        }
    }

    /// Drops every slot and resets the MRU counter (e.g. on re-layout).
    pub fn clear(&mut self) {
        self.slots = [Slot::empty(), Slot::empty(), Slot::empty()];
        self.use_counter = 0;
    }
}

impl Default for PageCache {
    fn default() -> Self {
        PageCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x: f64) -> Rect {
        Rect::new(0.0, 0.0, x, x)
    }

    #[test]
    fn miss_then_hit_does_not_reload() {
        let mut cache = PageCache::new();
        let mut loads = 0;
        cache.ensure(0, || { loads += 1; Ok(r(1.0)) }).unwrap();
        cache.ensure(0, || { loads += 1; Ok(r(1.0)) }).unwrap();
        assert_eq!(loads, 1);
    }

    #[test]
    fn fourth_distinct_page_evicts_least_recently_used() {
        let mut cache = PageCache::new();
        for i in 0..3 {
            cache.ensure(i, || Ok(r(1.0))).unwrap();
        }
        // touch page 0 again so it is the most-recently-used of the three
        cache.ensure(0, || Ok(r(1.0))).unwrap();
        // page 1 is now the LRU slot and should be evicted for page 3
        let mut loads_for_page1 = 0;
        cache.ensure(3, || Ok(r(2.0))).unwrap();
        cache.ensure(1, || { loads_for_page1 += 1; Ok(r(1.0)) }).unwrap();
        assert_eq!(loads_for_page1, 1, "page 1 should have been evicted and reloaded");
    }

    #[test]
    fn display_list_flag_round_trips() {
        let mut cache = PageCache::new();
        cache.ensure(0, || Ok(r(1.0))).unwrap();
        let (_, ready) = cache.ensure(0, || Ok(r(1.0))).unwrap();
        assert!(!ready);
        cache.mark_display_list_ready(0);
        let (_, ready) = cache.ensure(0, || Ok(r(1.0))).unwrap();
        assert!(ready);
        cache.invalidate_display_list(0);
        let (_, ready) = cache.ensure(0, || Ok(r(1.0))).unwrap();
        assert!(!ready);
    }

    #[test]
    fn clear_resets_everything() {
        let mut cache = PageCache::new();
        cache.ensure(0, || Ok(r(1.0))).unwrap();
        cache.mark_display_list_ready(0);
        cache.clear();
        let mut loads = 0;
        cache.ensure(0, || { loads += 1; Ok(r(1.0)) }).unwrap();
        assert_eq!(loads, 1);
    }
}
