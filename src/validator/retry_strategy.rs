//! Retry delay strategies (spec §3.1 "RetryStrategy", §4.4).

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;

/// How long to wait before the next attempt, given the attempt number that just
/// failed (1-indexed: the first attempt is `1`).
#[derive(Clone)]
pub enum RetryStrategy {
    /// Retry right away.
    Immediate,
    /// Always wait a fixed duration.
    Delayed(Duration),
    /// `base.powi(attempt - 1)` seconds, clamped to `max_retries` so the delay
    /// never grows once the pipeline is about to give up anyway (open question in
    /// spec §9, resolved here: clamp `attempt` to `max_retries` before exponentiating).
    Exponential { base: f64, max_retries: u32 },
    /// The classic Fibonacci sequence `[0, 1, 1, 2, 3, 5, 8, ...]` indexed by
    /// `attempt`; `Fibonacci(0)` (i.e. before any attempt has failed) is `0`
    /// seconds, per spec §9's open question.
    Fibonacci,
    /// A caller-supplied function from attempt number to delay.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
    /// An alt-request (e.g. a token refresh) has already completed by the time
    /// this strategy is returned; `headers` carries whatever the alt-request's
    /// catcher extracted from it (e.g. a refreshed `Authorization` value) so the
    /// loader can apply it to the retried original request before resending
    /// (spec §4.4, GLOSSARY "Alt-request").
    AfterRequest { delay: Duration, headers: HeaderMap },
    /// Wait for the current in-flight task to fully complete (including its own
    /// body streaming) before retrying.
    AfterTask { delay: Duration },
}

impl RetryStrategy {
    /// Computes the delay for the attempt that just failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::Immediate => Duration::ZERO,
            RetryStrategy::Delayed(d) => *d,
            RetryStrategy::Exponential { base, max_retries } => {
                let clamped = attempt.min(*max_retries).max(1);
                let seconds = base.powi(clamped as i32 - 1);
                Duration::from_secs_f64(seconds.max(0.0))
            }
            RetryStrategy::Fibonacci => Duration::from_secs(fibonacci(attempt)),
            RetryStrategy::Custom(f) => f(attempt),
            RetryStrategy::AfterRequest { delay, .. } => *delay,
            RetryStrategy::AfterTask { delay } => *delay,
        }
    }

    /// Headers an `AfterRequest` strategy wants merged onto the retried request's
    /// headers before the next attempt, if any (spec §4.4).
    pub fn headers_to_apply(&self) -> Option<&HeaderMap> {
        match self {
            RetryStrategy::AfterRequest { headers, .. } => Some(headers),
            _ => None,
        }
    }
}

fn fibonacci(n: u32) -> u64 {
    if n == 0 {
        return 0;
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 1..n {
        let next = a + b;
        a = b;
        b = next;
    }
    b
}
