//! In-flight fetch bookkeeping (spec §3.1 "LoaderEntry", §9 Design Notes — attempt
//! counters live here rather than on [`crate::request::Request`] so a `Request`
//! stays immutable across every attempt of its own fetch).

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::request::Request;
use crate::util::cancel::CancelHandle;

/// Tracks one fetch's mutable execution state while it is in the loader's
/// in-flight table.
pub struct LoaderEntry {
    pub request: Request,
    pub cancel: CancelHandle,
    pub attempt: u32,
    pub redirects_followed: u32,
    pub started_at: Instant,
    /// Bytes received so far for the current attempt of a `largeData` transfer,
    /// mirrored here (rather than only inside the transport) so
    /// [`crate::loader::Loader::cancel_with_resume_data`] can hand them back to the
    /// caller even though the transport itself has already been torn down by the
    /// time cancellation is observed (spec §4.3 "cancel_with_resume_data").
    pub partial_bytes: Arc<Mutex<Vec<u8>>>,
}

impl LoaderEntry {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            cancel: CancelHandle::new(),
            attempt: 0,
            redirects_followed: 0,
            started_at: Instant::now(),
            partial_bytes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}
