//! The default validator (spec §4.4): retries transport-category failures and a
//! configurable set of "retryable" status codes, rejects empty bodies where a
//! body was required, and otherwise accepts.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;
use crate::validator::retry_strategy::RetryStrategy;
use crate::validator::{Validator, ValidatorResult};

/// Accepts any 2xx/3xx response, retries a configurable set of status codes with a
/// given [`RetryStrategy`], and fails the chain on anything else.
pub struct DefaultValidator {
    pub retryable_statuses: HashSet<u16>,
    pub retry_strategy: RetryStrategy,
    pub require_non_empty_body: bool,
}

impl DefaultValidator {
    /// The conventional retryable set: request timeout, rate limited, and the
    /// transient 5xx family.
    pub fn new(retry_strategy: RetryStrategy) -> Self {
        Self {
            retryable_statuses: [408, 425, 429, 500, 502, 503, 504].into_iter().collect(),
            retry_strategy,
            require_non_empty_body: false,
        }
    }

    pub fn require_non_empty_body(mut self, require: bool) -> Self {
        self.require_non_empty_body = require;
        self
    }
}

#[async_trait]
impl Validator for DefaultValidator {
    async fn validate(&self, response: &Response, _request: &Request, _attempt: u32) -> ValidatorResult {
        if self.retryable_statuses.contains(&response.status) {
            return ValidatorResult::Retry(self.retry_strategy.clone());
        }
        if !(200..400).contains(&response.status) {
            return ValidatorResult::FailChain(HttpError::InvalidResponse {
                message: format!("unexpected status {}", response.status),
                status: Some(response.status),
            });
        }
        if self.require_non_empty_body && response.body.is_empty() && response.file.is_none() {
            return ValidatorResult::FailChain(HttpError::EmptyResponse);
        }
        ValidatorResult::NextValidator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Metrics;
    use reqwest::header::HeaderMap;

    fn response(status: u16, body: &str) -> Response {
        Response {
            status,
            headers: HeaderMap::new(),
            body: bytes::Bytes::from(body.to_string()),
            file: None,
            url: "https://example.com".into(),
            metrics: Metrics::default(),
            attempts: 0,
            user_info: Default::default(),
        }
    }

    #[tokio::test]
    async fn retries_503() {
        let validator = DefaultValidator::new(RetryStrategy::Immediate);
        let request = Request::get("/x").build();
        let result = validator.validate(&response(503, ""), &request, 1).await;
        assert!(matches!(result, ValidatorResult::Retry(_)));
    }

    #[tokio::test]
    async fn fails_chain_on_404() {
        let validator = DefaultValidator::new(RetryStrategy::Immediate);
        let request = Request::get("/x").build();
        let result = validator.validate(&response(404, ""), &request, 1).await;
        assert!(matches!(result, ValidatorResult::FailChain(HttpError::InvalidResponse { status: Some(404), .. })));
    }

    #[tokio::test]
    async fn accepts_200_with_body() {
        let validator = DefaultValidator::new(RetryStrategy::Immediate);
        let request = Request::get("/x").build();
        let result = validator.validate(&response(200, "ok"), &request, 1).await;
        assert!(matches!(result, ValidatorResult::NextValidator));
    }

    #[tokio::test]
    async fn rejects_empty_body_when_required() {
        let validator = DefaultValidator::new(RetryStrategy::Immediate).require_non_empty_body(true);
        let request = Request::get("/x").build();
        let result = validator.validate(&response(200, ""), &request, 1).await;
        assert!(matches!(result, ValidatorResult::FailChain(HttpError::EmptyResponse)));
    }

    #[tokio::test]
    async fn file_backed_response_is_not_treated_as_empty() {
        let validator = DefaultValidator::new(RetryStrategy::Immediate).require_non_empty_body(true);
        let request = Request::get("/x").build();
        let mut downloaded = response(200, "");
        downloaded.file = Some("/tmp/wirekit-downloads/example".into());
        let result = validator.validate(&downloaded, &request, 1).await;
        assert!(matches!(result, ValidatorResult::NextValidator));
    }
}
