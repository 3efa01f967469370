//! Two-thread alert rendezvous.
//!
//! The core thread (wherever `alert()` is called from) and the UI thread
//! (wherever the host's dialog runs) rarely share a call stack, so the
//! handoff is two small state machines guarded by their own lock: one for
//! "a request is waiting to be shown", one for "a response is waiting to
//! be collected". A single `Mutex<Option<T>>` + `Condvar` pair per
//! direction is enough; nothing here is on a hot path.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::cookie::Cookie;
use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Info,
    Warning,
    Error,
    OkCancel,
    YesNo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRequest {
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertResponse {
    Ok,
    Cancel,
    Yes,
    No,
    Dismissed,
}

struct Shared {
    alert_lock: Mutex<Option<AlertRequest>>,
    alert_cond: Condvar,
    fin_lock: Mutex<Option<AlertResponse>>,
    fin_cond: Condvar,
}

/// A cloneable handle to one alert rendezvous. All clones refer to the
/// same underlying request/response slots.
#[derive(Clone)]
pub struct AlertChannel {
    shared: Arc<Shared>,
}

impl Default for AlertChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertChannel {
    pub fn new() -> Self {
        AlertChannel {
            shared: Arc::new(Shared {
                alert_lock: Mutex::new(None),
                alert_cond: Condvar::new(),
                fin_lock: Mutex::new(None),
                fin_cond: Condvar::new(),
            }),
        }
    }

    /// Called from the thread that wants the alert shown. Publishes
    /// `request`, wakes anyone blocked in [`Self::wait_for_request`], then
    /// blocks until [`Self::respond`] is called or `cookie` is aborted.
    /// Only one request may be outstanding on a channel at a time; a
    /// second caller overwrites the first's still-pending request.
    pub fn raise(&self, request: AlertRequest, cookie: Option<&Cookie>) -> Result<AlertResponse> {
        {
            let mut pending = self.shared.alert_lock.lock().unwrap();
            *pending = Some(request);
            self.shared.alert_cond.notify_one();
        }

        let mut fin = self.shared.fin_lock.lock().unwrap();
        loop {
            if let Some(response) = fin.take() {
                return Ok(response);
            }
            if cookie.is_some_and(Cookie::aborted) {
                return Err(Error::Aborted);
            }
            let (guard, _timeout) = self.shared.fin_cond.wait_timeout(fin, POLL_INTERVAL).unwrap();
            fin = guard;
        }
    }

    /// Called from the UI thread. Blocks up to `timeout` for a request to
    /// appear, taking it so a concurrent caller doesn't see it twice.
    pub fn wait_for_request(&self, timeout: Duration) -> Option<AlertRequest> {
        let mut pending = self.shared.alert_lock.lock().unwrap();
        loop {
            if let Some(request) = pending.take() {
                return Some(request);
            }
            let (guard, result) = self.shared.alert_cond.wait_timeout(pending, timeout).unwrap();
            pending = guard;
            if result.timed_out() {
                return None;
            }
        }
    }

    /// Called from the UI thread once the user has dismissed the dialog.
    /// Wakes the (possibly already-gone, if aborted) caller of `raise`.
    pub fn respond(&self, response: AlertResponse) {
        let mut fin = self.shared.fin_lock.lock().unwrap();
        *fin = Some(response);
        self.shared.fin_cond.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn round_trip_between_two_threads() {
        let channel = AlertChannel::new();
        let core = channel.clone();
        let handle = thread::spawn(move || {
            core.raise(
                AlertRequest {
                    kind: AlertKind::OkCancel,
                    title: "Close".into(),
                    message: "Discard unsaved changes?".into(),
                },
                None,
            )
        });

        let request = channel
            .wait_for_request(Duration::from_secs(5))
            .expect("request should arrive");
        assert_eq!(request.kind, AlertKind::OkCancel);
        channel.respond(AlertResponse::Ok);

        let response = handle.join().unwrap().unwrap();
        assert_eq!(response, AlertResponse::Ok);
    }

    #[test]
    fn wait_for_request_times_out_when_idle() {
        let channel = AlertChannel::new();
        assert!(channel.wait_for_request(Duration::from_millis(50)).is_none());
    }

    #[test]
    fn raise_is_aborted_by_cookie() {
        let channel = AlertChannel::new();
        let cookie = Cookie::new();
        cookie.abort();
        let result = channel.raise(
            AlertRequest {
                kind: AlertKind::Info,
                title: "t".into(),
                message: "m".into(),
            },
            Some(&cookie),
        );
        assert!(matches!(result, Err(Error::Aborted)));
    }
}
