//! The validator & retry pipeline (spec §3.1 "Validator"/"ValidatorResult", §4.4).
//!
//! A [`Client`](crate::client::Client) holds an ordered chain of [`Validator`]s.
//! After each transport attempt the loader runs the chain front-to-back; any
//! validator can accept the response, replace it, ask for a retry, or fail the
//! whole chain outright. Alt-requests (spec GLOSSARY) never re-enter this pipeline
//! recursively — [`Request::as_alt_request`](crate::request::Request::as_alt_request)
//! zeroes `max_retries`, so an alt-request that itself fails simply fails, it does
//! not spawn another alt-request.

pub mod auth_refresh_validator;
pub mod default_validator;
pub mod retry_strategy;

use async_trait::async_trait;

use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;
use retry_strategy::RetryStrategy;

/// What a single validator decided about a response (spec §3.1 "ValidatorResult").
pub enum ValidatorResult {
    /// Move to the next validator in the chain unchanged.
    NextValidator,
    /// Move to the next validator, but with this (possibly transformed) response.
    NextValidatorWithResponse(Response),
    /// Stop the chain and retry the fetch using the given strategy.
    Retry(RetryStrategy),
    /// Stop the chain immediately with a terminal error.
    FailChain(HttpError),
}

/// One stage of the retry pipeline (spec §4.4).
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, response: &Response, request: &Request, attempt: u32) -> ValidatorResult;
}

/// The outcome of running the full chain once.
pub enum PipelineOutcome {
    Accept(Response),
    Retry(RetryStrategy),
    Fail(HttpError),
}

/// Runs `response` through `validators` in order (spec §4.4 pseudocode).
///
/// The first validator to return [`ValidatorResult::Retry`] or
/// [`ValidatorResult::FailChain`] stops the chain immediately; a response that
/// reaches the end of the chain without either is accepted.
pub async fn validate_all(
    validators: &[std::sync::Arc<dyn Validator>],
    mut response: Response,
    request: &Request,
    attempt: u32,
) -> PipelineOutcome {
    for validator in validators {
        match validator.validate(&response, request, attempt).await {
            ValidatorResult::NextValidator => continue,
            ValidatorResult::NextValidatorWithResponse(next) => response = next,
            ValidatorResult::Retry(strategy) => return PipelineOutcome::Retry(strategy),
            ValidatorResult::FailChain(err) => return PipelineOutcome::Fail(err),
        }
    }
    PipelineOutcome::Accept(response)
}

/// Decides whether a retry requested by the pipeline should actually happen, given
/// how many attempts have already been made (spec §4.4 "handle_retry"). Alt-requests
/// never retry, regardless of what the chain asks for.
pub fn handle_retry(
    strategy: &RetryStrategy,
    request: &Request,
    attempt: u32,
) -> Result<std::time::Duration, HttpError> {
    if request.is_alt_request {
        return Err(HttpError::MaxRetryAttemptsReached { attempts: attempt });
    }
    if attempt > request.max_retries {
        return Err(HttpError::MaxRetryAttemptsReached { attempts: attempt });
    }
    Ok(strategy.delay_for_attempt(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Metrics;
    use reqwest::header::HeaderMap;
    use std::sync::Arc;

    fn sample_response(status: u16) -> Response {
        Response {
            status,
            headers: HeaderMap::new(),
            body: bytes::Bytes::new(),
            file: None,
            url: "https://example.com".into(),
            metrics: Metrics::default(),
            attempts: 0,
            user_info: Default::default(),
        }
    }

    struct AlwaysNext;
    #[async_trait]
    impl Validator for AlwaysNext {
        async fn validate(&self, _r: &Response, _req: &Request, _attempt: u32) -> ValidatorResult {
            ValidatorResult::NextValidator
        }
    }

    struct AlwaysRetry;
    #[async_trait]
    impl Validator for AlwaysRetry {
        async fn validate(&self, _r: &Response, _req: &Request, _attempt: u32) -> ValidatorResult {
            ValidatorResult::Retry(RetryStrategy::Immediate)
        }
    }

    #[tokio::test]
    async fn empty_chain_accepts_response_unchanged() {
        let request = Request::get("/x").build();
        let outcome = validate_all(&[], sample_response(200), &request, 1).await;
        assert!(matches!(outcome, PipelineOutcome::Accept(r) if r.status == 200));
    }

    #[tokio::test]
    async fn a_validator_requesting_retry_stops_the_chain() {
        let validators: Vec<Arc<dyn Validator>> = vec![Arc::new(AlwaysRetry), Arc::new(AlwaysNext)];
        let request = Request::get("/x").build();
        let outcome = validate_all(&validators, sample_response(500), &request, 1).await;
        assert!(matches!(outcome, PipelineOutcome::Retry(_)));
    }

    #[test]
    fn handle_retry_rejects_alt_requests_regardless_of_strategy() {
        let request = Request::get("/x").max_retries(5).build().as_alt_request();
        let result = handle_retry(&RetryStrategy::Immediate, &request, 0);
        assert!(matches!(result, Err(HttpError::MaxRetryAttemptsReached { .. })));
    }

    #[test]
    fn handle_retry_allows_max_retries_plus_one_total_attempts() {
        // max_retries=2 means 3 total attempts are allowed: the original plus two
        // retries (spec §8 "current_attempt at termination is in [0, max_retries+1]").
        let request = Request::get("/x").max_retries(2).build();
        assert!(handle_retry(&RetryStrategy::Immediate, &request, 1).is_ok());
        assert!(handle_retry(&RetryStrategy::Immediate, &request, 2).is_ok());
        assert!(handle_retry(&RetryStrategy::Immediate, &request, 3).is_err());
    }
}
