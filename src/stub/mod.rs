//! The request stubber (spec §3.1 "StubRegistry", §4.6 "Request Stubber").
//!
//! [`StubTransport`] implements [`crate::loader::transport::Transport`] itself, so
//! installing it on a [`crate::client::ClientBuilder`] intercepts every fetch with
//! no changes anywhere else in the pipeline — composition, redirects and the
//! validator chain all run exactly as they would against a real network.

pub mod delivery;
pub mod matcher;
pub mod responder;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::HeaderMap;

use crate::error::HttpError;
use crate::loader::transport::{Transport, TransportDelegate, TransportOutcome};
use crate::loader::wire::WireRequest;
use crate::response::{Progress, ProgressOperation};
use crate::util::cancel::CancelHandle;
use matcher::Matcher;
use responder::{ResponseTime, StubResponse, StubResponseProvider};

/// A registered stub: every [`Matcher`] must match (AND) before `responder` is
/// consulted (spec §4.6 "AND-matchers").
pub struct StubRule {
    pub matchers: Vec<Matcher>,
    pub responder: Arc<dyn StubResponseProvider>,
}

/// A rule that marks matching requests as deliberately un-stubbed, so they fall
/// through to the registry's fallback transport (spec §4.6 "IgnoreRule").
pub struct IgnoreRule {
    pub matchers: Vec<Matcher>,
}

/// Holds every registered [`StubRule`]/[`IgnoreRule`] and resolves which applies
/// to a given request (spec §3.1 "StubRegistry", §4.6 "interception algorithm":
/// rules are tried in registration order, first match wins).
#[derive(Default)]
pub struct StubRegistry {
    rules: RwLock<Vec<StubRule>>,
    ignores: RwLock<Vec<IgnoreRule>>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single-matcher stub returning a fixed response.
    pub fn register(&self, matcher: Matcher, response: StubResponse) {
        self.register_rule(StubRule {
            matchers: vec![matcher],
            responder: Arc::new(responder::StaticProvider(response)),
        });
    }

    pub fn register_rule(&self, rule: StubRule) {
        self.rules.write().expect("stub registry lock poisoned").push(rule);
    }

    pub fn ignore(&self, matcher: Matcher) {
        self.ignore_rule(IgnoreRule {
            matchers: vec![matcher],
        });
    }

    pub fn ignore_rule(&self, rule: IgnoreRule) {
        self.ignores.write().expect("stub registry lock poisoned").push(rule);
    }

    /// `true` if `wire` matches a registered [`IgnoreRule`] — ignore rules take
    /// precedence over stub rules, even if a stub rule would also match.
    fn is_ignored(&self, wire: &WireRequest, body: &[u8]) -> bool {
        let ignores = self.ignores.read().expect("stub registry lock poisoned");
        ignores
            .iter()
            .any(|rule| rule.matchers.iter().all(|m| m.matches(wire, body)))
    }
}

/// A [`Transport`] that answers fetches from a [`StubRegistry`] instead of the
/// network, optionally falling through to a real transport for ignored requests.
pub struct StubTransport {
    registry: Arc<StubRegistry>,
    fallback: Option<Arc<dyn Transport>>,
}

impl StubTransport {
    pub fn new(registry: Arc<StubRegistry>) -> Self {
        Self {
            registry,
            fallback: None,
        }
    }

    pub fn with_fallback(registry: Arc<StubRegistry>, fallback: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            fallback: Some(fallback),
        }
    }

    async fn deliver(
        &self,
        wire: &WireRequest,
        response: StubResponse,
        delegate: Arc<dyn TransportDelegate>,
        cancel: CancelHandle,
    ) -> Result<TransportOutcome, HttpError> {
        match response.response_time {
            ResponseTime::Immediate => {}
            ResponseTime::Delayed(duration) => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(HttpError::Cancelled),
                    _ = tokio::time::sleep(duration) => {}
                }
            }
            ResponseTime::Speed { bytes_per_second } => {
                let plan = delivery::plan_throttled_chunks(&response.body, bytes_per_second);
                let mut delivered = 0u64;
                let total = response.body.len() as u64;
                for (chunk, delay) in &plan {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(HttpError::Cancelled),
                        _ = tokio::time::sleep(*delay) => {}
                    }
                    delivered += chunk.len() as u64;
                    delegate.did_receive_data(chunk).await;
                    delegate
                        .download_did_write(Progress {
                            operation: ProgressOperation::Download,
                            current_bytes: delivered,
                            expected_bytes: Some(total),
                        })
                        .await;
                }
            }
        }

        Ok(TransportOutcome {
            status: response.status,
            headers: response.headers,
            body: response.body,
            file: None,
            url: wire.url.to_string(),
            metrics: crate::response::Metrics::default(),
        })
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn execute(
        &self,
        wire: &WireRequest,
        delegate: Arc<dyn TransportDelegate>,
        cancel: CancelHandle,
    ) -> Result<TransportOutcome, HttpError> {
        let body = match &wire.body {
            crate::request::body::SerializedBody::Bytes(bytes) => bytes.to_vec(),
            crate::request::body::SerializedBody::Stream(factory) => {
                let mut stream = (factory)();
                let mut collected = Vec::new();
                while let Some(chunk) = stream.next().await {
                    collected.extend_from_slice(&chunk.map_err(|e| HttpError::Network {
                        message: e.to_string(),
                        source: Some(Box::new(e)),
                    })?);
                }
                collected
            }
        };

        if self.registry.is_ignored(wire, &body) {
            return match &self.fallback {
                Some(transport) => transport.execute(wire, delegate, cancel).await,
                None => Err(HttpError::MatchStubNotFound {
                    method: wire.method.to_string(),
                    url: wire.url.to_string(),
                }),
            };
        }

        let responder = {
            let rules = self.registry.rules.read().expect("stub registry lock poisoned");
            let matched_rule = rules
                .iter()
                .find(|rule| rule.matchers.iter().all(|m| m.matches(wire, &body)));
            match matched_rule {
                Some(rule) => rule.responder.clone(),
                None => {
                    return Err(HttpError::MatchStubNotFound {
                        method: wire.method.to_string(),
                        url: wire.url.to_string(),
                    })
                }
            }
        };

        let response = responder.respond(wire, &body).await;
        self.deliver(wire, response, delegate, cancel).await
    }
}

#[allow(dead_code)]
fn _assert_header_map_type(_: HeaderMap) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::transport::NullDelegate;

    fn test_wire(url: &str) -> WireRequest {
        WireRequest {
            method: reqwest::Method::GET,
            url: reqwest::Url::parse(url).unwrap(),
            headers: HeaderMap::new(),
            body: crate::request::body::SerializedBody::Bytes(bytes::Bytes::new()),
            timeout: None,
            task_kind: crate::loader::wire::TaskKind::Data,
            security: None,
            partial_data: None,
        }
    }

    #[tokio::test]
    async fn matched_rule_returns_its_stub_response() {
        let registry = Arc::new(StubRegistry::new());
        registry.register(
            Matcher::url_exact("https://example.com/ping"),
            StubResponse::new(200, "pong", ResponseTime::Immediate),
        );
        let transport = StubTransport::new(registry);
        let wire = test_wire("https://example.com/ping");
        let outcome = transport
            .execute(&wire, Arc::new(NullDelegate), CancelHandle::new())
            .await
            .unwrap();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, bytes::Bytes::from_static(b"pong"));
    }

    #[tokio::test]
    async fn unmatched_request_returns_match_stub_not_found() {
        let registry = Arc::new(StubRegistry::new());
        let transport = StubTransport::new(registry);
        let wire = test_wire("https://example.com/other");
        let result = transport
            .execute(&wire, Arc::new(NullDelegate), CancelHandle::new())
            .await;
        assert!(matches!(result, Err(HttpError::MatchStubNotFound { .. })));
    }

    #[tokio::test]
    async fn ignored_request_without_fallback_errors() {
        let registry = Arc::new(StubRegistry::new());
        registry.register(
            Matcher::url_exact("https://example.com/ping"),
            StubResponse::new(200, "pong", ResponseTime::Immediate),
        );
        registry.ignore(Matcher::url_exact("https://example.com/ping"));
        let transport = StubTransport::new(registry);
        let wire = test_wire("https://example.com/ping");
        let result = transport
            .execute(&wire, Arc::new(NullDelegate), CancelHandle::new())
            .await;
        assert!(matches!(result, Err(HttpError::MatchStubNotFound { .. })));
    }

    #[tokio::test]
    async fn and_matchers_all_must_match() {
        let registry = Arc::new(StubRegistry::new());
        registry.register_rule(StubRule {
            matchers: vec![
                Matcher::url_exact("https://example.com/ping"),
                Matcher::method(reqwest::Method::POST),
            ],
            responder: Arc::new(responder::StaticProvider(StubResponse::new(
                201,
                "created",
                ResponseTime::Immediate,
            ))),
        });
        let transport = StubTransport::new(registry);

        let get_wire = test_wire("https://example.com/ping");
        let result = transport
            .execute(&get_wire, Arc::new(NullDelegate), CancelHandle::new())
            .await;
        assert!(result.is_err());
    }
}
