//! Silent-auth-refresh validator (spec §4.4 "alt-request" pattern, GLOSSARY
//! "Alt-request"): on a 401/403, fetches a caller-supplied refresh request (e.g. a
//! token refresh) out-of-band, then asks the pipeline to retry the original
//! request. The refresh request is always spawned via
//! [`Request::as_alt_request`](crate::request::Request::as_alt_request), so it can
//! never itself trigger another refresh — this is what keeps the pattern from
//! recursing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::error::HttpError;
use crate::loader::Loader;
use crate::request::Request;
use crate::response::Response;
use crate::validator::retry_strategy::RetryStrategy;
use crate::validator::{Validator, ValidatorResult};

/// Builds the alt-request to run when a challenge is observed (e.g. "POST
/// /oauth/refresh" with the current refresh token).
pub type AltRequestBuilder = Arc<dyn Fn() -> Request + Send + Sync>;

/// Extracts whatever headers the retried original request needs from the
/// completed alt-request and its response (e.g. reading a new access token out of
/// the refresh response and rendering it as a fresh `Authorization` header). This
/// is the "catcher" spec §4.4 describes: without it, a refreshed credential has
/// nowhere to go once the alt-request completes.
pub type AltResponseCatcher = Arc<dyn Fn(&Request, &Response) -> HeaderMap + Send + Sync>;

pub struct AuthRefreshValidator {
    loader: Arc<Loader>,
    build_alt_request: AltRequestBuilder,
    catcher: Option<AltResponseCatcher>,
    trigger_statuses: HashSet<u16>,
    max_alt_requests: u32,
    delay: Duration,
    alt_requests_attempted: AtomicU32,
}

impl AuthRefreshValidator {
    pub fn new(loader: Arc<Loader>, build_alt_request: AltRequestBuilder) -> Self {
        Self {
            loader,
            build_alt_request,
            catcher: None,
            trigger_statuses: [401, 403].into_iter().collect(),
            max_alt_requests: 1,
            delay: Duration::ZERO,
            alt_requests_attempted: AtomicU32::new(0),
        }
    }

    pub fn max_alt_requests(mut self, max: u32) -> Self {
        self.max_alt_requests = max;
        self
    }

    /// Installs the catcher that turns the completed alt-request's response into
    /// headers for the retried original request (spec §4.4).
    pub fn catcher(mut self, catcher: AltResponseCatcher) -> Self {
        self.catcher = Some(catcher);
        self
    }

    /// Delay to wait after the alt-request completes before retrying the original
    /// request. Defaults to zero.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Validator for AuthRefreshValidator {
    async fn validate(&self, response: &Response, _request: &Request, _attempt: u32) -> ValidatorResult {
        if !self.trigger_statuses.contains(&response.status) {
            return ValidatorResult::NextValidator;
        }

        let attempted = self.alt_requests_attempted.fetch_add(1, Ordering::SeqCst);
        if attempted >= self.max_alt_requests {
            return ValidatorResult::FailChain(HttpError::InvalidResponse {
                message: "auth refresh already attempted".into(),
                status: Some(response.status),
            });
        }

        let alt_request = (self.build_alt_request)().as_alt_request();
        match self.loader.fetch(alt_request.clone()).await {
            Ok(alt_response) => {
                let headers = match &self.catcher {
                    Some(catcher) => catcher(&alt_request, &alt_response),
                    None => HeaderMap::new(),
                };
                ValidatorResult::Retry(RetryStrategy::AfterRequest {
                    delay: self.delay,
                    headers,
                })
            }
            Err(err) => ValidatorResult::FailChain(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientBuilder;
    use crate::response::Metrics;

    fn response(status: u16) -> Response {
        Response {
            status,
            headers: HeaderMap::new(),
            body: bytes::Bytes::new(),
            url: "https://example.com".into(),
            metrics: Metrics::default(),
            attempts: 0,
            file: None,
            user_info: Default::default(),
        }
    }

    #[tokio::test]
    async fn ignores_non_challenge_statuses() {
        let client = ClientBuilder::new().base_url("https://example.com").build();
        let loader = client.loader_handle();
        let validator = AuthRefreshValidator::new(loader, Arc::new(|| Request::get("/refresh").build()));
        let request = Request::get("/x").build();
        let result = validator.validate(&response(200), &request, 1).await;
        assert!(matches!(result, ValidatorResult::NextValidator));
    }

    #[tokio::test]
    async fn caps_alt_requests_at_configured_max() {
        let client = ClientBuilder::new().base_url("http://127.0.0.1:1").build();
        let loader = client.loader_handle();
        let validator = AuthRefreshValidator::new(loader, Arc::new(|| Request::get("/refresh").build()))
            .max_alt_requests(1);
        let request = Request::get("/x").build();

        let _ = validator.validate(&response(401), &request, 1).await;
        let second = validator.validate(&response(401), &request, 1).await;
        assert!(matches!(second, ValidatorResult::FailChain(_)));
    }

    #[tokio::test]
    async fn successful_alt_request_retries_with_catcher_headers() {
        use crate::stub::matcher::Matcher;
        use crate::stub::responder::{ResponseTime, StubResponse};
        use crate::stub::{StubRegistry, StubTransport};

        let registry = Arc::new(StubRegistry::new());
        registry.register(
            Matcher::url_exact("https://example.com/refresh"),
            StubResponse::json(200, serde_json::json!({"token": "fresh-token"}), ResponseTime::Immediate),
        );
        let transport = Arc::new(StubTransport::new(registry));
        let client = ClientBuilder::new()
            .base_url("https://example.com")
            .transport(transport)
            .build();
        let loader = client.loader_handle();

        let validator = AuthRefreshValidator::new(loader, Arc::new(|| Request::get("/refresh").build())).catcher(
            Arc::new(|_alt_request, alt_response| {
                let token: serde_json::Value = alt_response.decode().unwrap();
                let mut headers = HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    format!("Bearer {}", token["token"].as_str().unwrap()).parse().unwrap(),
                );
                headers
            }),
        );

        let request = Request::get("/x").build();
        let result = validator.validate(&response(401), &request, 1).await;
        match result {
            ValidatorResult::Retry(strategy) => {
                let headers = strategy.headers_to_apply().expect("AfterRequest carries headers");
                assert_eq!(
                    headers.get(reqwest::header::AUTHORIZATION).unwrap(),
                    "Bearer fresh-token"
                );
            }
            _ => panic!("expected a retry"),
        }
    }
}
