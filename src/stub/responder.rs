//! Stub responses and providers (spec §3.1 "StubResponse", §4.6 "delivery modes",
//! "providers").

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;

use crate::loader::wire::WireRequest;

/// How a [`StubResponse`] should be handed back to the caller (spec §4.6
/// "Delivery modes").
#[derive(Debug, Clone, Copy)]
pub enum ResponseTime {
    /// Resolve as soon as the stubber is polled.
    Immediate,
    /// Resolve after a fixed delay, simulating network latency.
    Delayed(Duration),
    /// Stream the body in throttled chunks at a target rate, simulating a slow
    /// connection (spec §4.6's ~0.25s cumulative-fractional-accumulator algorithm,
    /// see [`crate::stub::delivery`]).
    Speed { bytes_per_second: u64 },
}

/// A canned response the stub registry hands back for a matched request.
#[derive(Debug, Clone)]
pub struct StubResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub response_time: ResponseTime,
}

impl StubResponse {
    pub fn new(status: u16, body: impl Into<Bytes>, response_time: ResponseTime) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            response_time,
        }
    }

    pub fn json(status: u16, value: serde_json::Value, response_time: ResponseTime) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let body = serde_json::to_vec(&value).unwrap_or_default();
        Self {
            status,
            headers,
            body: Bytes::from(body),
            response_time,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// Supplies the [`StubResponse`] for a matched request, given the request itself
/// (spec §4.6 "providers": static/dynamic/echo).
#[async_trait]
pub trait StubResponseProvider: Send + Sync {
    async fn respond(&self, wire: &WireRequest, body: &[u8]) -> StubResponse;
}

/// Always returns the same canned response.
pub struct StaticProvider(pub StubResponse);

#[async_trait]
impl StubResponseProvider for StaticProvider {
    async fn respond(&self, _wire: &WireRequest, _body: &[u8]) -> StubResponse {
        self.0.clone()
    }
}

/// Computes the response from a caller-supplied closure, given the matched
/// request.
pub struct DynamicProvider(pub Arc<dyn Fn(&WireRequest, &[u8]) -> StubResponse + Send + Sync>);

#[async_trait]
impl StubResponseProvider for DynamicProvider {
    async fn respond(&self, wire: &WireRequest, body: &[u8]) -> StubResponse {
        (self.0)(wire, body)
    }
}

/// Reflects the request body back as the response body with `status`, useful for
/// round-trip tests of the body encoders.
pub struct EchoProvider {
    pub status: u16,
    pub response_time: ResponseTime,
}

#[async_trait]
impl StubResponseProvider for EchoProvider {
    async fn respond(&self, wire: &WireRequest, body: &[u8]) -> StubResponse {
        let mut response = StubResponse::new(self.status, body.to_vec(), self.response_time);
        if let Some(content_type) = wire.headers.get(reqwest::header::CONTENT_TYPE) {
            response.headers.insert(reqwest::header::CONTENT_TYPE, content_type.clone());
        }
        response
    }
}
