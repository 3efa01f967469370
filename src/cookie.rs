//! Cooperative cancellation.
//!
//! A `Cookie` is deliberately not owned by any `Context`/`Document` — it is
//! created independently and may outlive both, because a platform's UI
//! thread may swap the underlying document out from under a background
//! render thread that still holds one. In this crate that just means
//! `Cookie` has no borrow on anything else; `Arc` gives it an independent,
//! freely-clonable lifetime regardless of which document or context
//! created it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    abort: AtomicBool,
    progress: AtomicU64,
}

/// Cheaply cloned; every clone shares the same abort flag and progress
/// counter, matching the "shared between submitter and worker" contract.
#[derive(Debug, Clone, Default)]
pub struct Cookie {
    inner: Arc<Inner>,
}

impl Cookie {
    pub fn new() -> Cookie {
        Cookie { inner: Arc::new(Inner::default()) }
    }

    pub fn abort(&self) {
        self.inner.abort.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.inner.abort.store(false, Ordering::SeqCst);
        self.inner.progress.store(0, Ordering::SeqCst);
    }

    pub fn aborted(&self) -> bool {
        self.inner.abort.load(Ordering::SeqCst)
    }

    pub fn bump_progress(&self) -> u64 {
        self.inner.progress.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn progress(&self) -> u64 {
        self.inner.progress.load(Ordering::SeqCst)
    }
}

/// The FFI-shaped `cookie_aborted` query surface: an absent cookie reads as
/// "already cancelled" rather than "never cancels", matching
/// `cookie_aborted(NULL) == 1`. This is the caller-facing observer query
/// only; work in progress (render, search, alert rendezvous) treats an
/// absent cookie as "no cancellation requested" instead, via
/// `cookie.is_some_and(Cookie::aborted)`.
pub fn aborted(cookie: Option<&Cookie>) -> bool {
    match cookie {
        Some(c) => c.aborted(),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cookie_is_not_aborted() {
        let c = Cookie::new();
        assert!(!c.aborted());
    }

    #[test]
    fn none_cookie_reads_as_aborted() {
        assert!(aborted(None));
    }

    #[test]
    fn abort_is_observed_through_clone() {
        let c = Cookie::new();
        let c2 = c.clone();
        c.abort();
        assert!(c2.aborted());
    }

    #[test]
    fn reset_clears_abort_and_progress() {
        let c = Cookie::new();
        c.abort();
        c.bump_progress();
        c.reset();
        assert!(!c.aborted());
        assert_eq!(c.progress(), 0);
    }

    #[test]
    fn survives_drop_of_everything_else() {
        let c = Cookie::new();
        {
            let _doc_shaped_owner = Some(c.clone());
        }
        c.abort();
        assert!(c.aborted());
    }
}
