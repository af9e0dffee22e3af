//! Throttled stub delivery (spec §4.6: speed-limited streaming).
//!
//! Splits a body into chunks sized so that, delivered one per `SLOT_SECONDS`, the
//! stream as a whole matches the requested `bytes_per_second`. Because
//! `bytes_per_second * SLOT_SECONDS` is rarely a whole number, leftover fractional
//! bytes accumulate across slots and get folded into a later chunk instead of
//! being silently dropped or rounded away.

use std::time::Duration;

use bytes::Bytes;

const SLOT_SECONDS: f64 = 0.25;

/// Splits `body` into `(chunk, delay_before_chunk)` pairs suitable for feeding
/// into an `async_stream` that sleeps `delay_before_chunk` then yields `chunk`.
pub fn plan_throttled_chunks(body: &Bytes, bytes_per_second: u64) -> Vec<(Bytes, Duration)> {
    if body.is_empty() || bytes_per_second == 0 {
        return vec![(body.clone(), Duration::ZERO)];
    }

    let per_slot = bytes_per_second as f64 * SLOT_SECONDS;
    let mut chunks = Vec::new();
    let mut carried_fraction = 0.0f64;
    let mut offset = 0usize;

    while offset < body.len() {
        let target = per_slot + carried_fraction;
        let mut chunk_len = target.floor() as usize;
        carried_fraction = target - chunk_len as f64;
        chunk_len = chunk_len.max(1).min(body.len() - offset);

        let chunk = body.slice(offset..offset + chunk_len);
        chunks.push((chunk, Duration::from_secs_f64(SLOT_SECONDS)));
        offset += chunk_len;
    }

    if let Some(first) = chunks.first_mut() {
        first.1 = Duration::ZERO;
    }

    chunks
}
