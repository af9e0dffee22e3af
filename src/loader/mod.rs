//! The async data loader (spec §3.1 "LoaderEntry", §4.3 "Async Data Loader").
//!
//! `Loader` owns the in-flight table, drives one fetch through compose → transport
//! → redirect-resolution → validate/retry, and is the collaborator
//! [`crate::client::Client`] delegates every fetch to. A `Loader` is the unit that
//! actually needs `Arc` sharing (alt-requests spawned by
//! [`crate::validator::auth_refresh_validator::AuthRefreshValidator`] hold a
//! cloned `Arc<Loader>`), so `Client` itself is a thin, cheaply-cloneable facade
//! around `Arc<Loader>`.

pub mod cookie;
pub mod entry;
pub mod redirect;
pub mod security;
pub mod transport;
pub mod wire;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Url;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;
use crate::validator::{validate_all, PipelineOutcome, Validator};
use cookie::CookieStorage;
use entry::LoaderEntry;
use redirect::{resolve_redirect, FollowRedirectsMode, RedirectDisposition};
use security::SecurityPolicy;
use transport::{AccumulatingDelegate, NullDelegate, Transport, TransportDelegate, TransportOutcome};
use wire::TaskKind;

/// The engine behind [`crate::client::Client`]. See the module docs.
pub struct Loader {
    pub(crate) base_url: Option<Url>,
    pub(crate) default_headers: HeaderMap,
    pub(crate) default_timeout: Option<Duration>,
    pub(crate) default_security: Option<Arc<dyn SecurityPolicy>>,
    pub(crate) default_redirect_mode: FollowRedirectsMode,
    pub(crate) validators: Vec<Arc<dyn Validator>>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cookie_jar: Arc<dyn CookieStorage>,
    in_flight: RwLock<HashMap<String, LoaderEntry>>,
}

impl Loader {
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn default_security(&self) -> Option<Arc<dyn SecurityPolicy>> {
        self.default_security.clone()
    }

    /// Runs one request through to a final, accepted [`Response`] or a terminal
    /// [`HttpError`] — following redirects, retrying per the validator chain, and
    /// tracking the attempt in the in-flight table so [`Loader::cancel`] can reach
    /// it (spec §4.3).
    pub async fn fetch(&self, request: Request) -> Result<Response, HttpError> {
        let fingerprint = request.fingerprint.clone();
        {
            let mut table = self.in_flight.write().await;
            table.insert(fingerprint.clone(), LoaderEntry::new(request.clone()));
        }

        let result = self.fetch_inner(&fingerprint).await;

        self.in_flight.write().await.remove(&fingerprint);
        result
    }

    /// Requests cancellation of an in-flight fetch by request fingerprint. A no-op
    /// if the fetch already completed or was never registered.
    pub async fn cancel(&self, fingerprint: &str) {
        if let Some(entry) = self.in_flight.read().await.get(fingerprint) {
            entry.cancel.cancel();
        }
    }

    /// Cancels an in-flight `largeData` fetch and hands back whatever bytes had
    /// already been received for the current attempt (spec §4.3
    /// "cancel_with_resume_data"). `callback` runs with an empty `Vec` if the
    /// fetch was never registered or nothing had arrived yet; the bytes can be
    /// handed to [`crate::request::RequestBuilder::partial_data`] to resume later.
    pub async fn cancel_with_resume_data<F>(&self, fingerprint: &str, callback: F)
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        let partial = {
            let table = self.in_flight.read().await;
            match table.get(fingerprint) {
                Some(entry) => {
                    entry.cancel.cancel();
                    entry
                        .partial_bytes
                        .lock()
                        .expect("resume buffer mutex poisoned")
                        .clone()
                }
                None => Vec::new(),
            }
        };
        callback(partial);
    }

    async fn fetch_inner(&self, fingerprint: &str) -> Result<Response, HttpError> {
        loop {
            let (current_request, cancel, attempt, redirects_followed, partial_bytes) = {
                let mut table = self.in_flight.write().await;
                let entry = table
                    .get_mut(fingerprint)
                    .expect("fetch_inner called without a registered in-flight entry");
                entry.attempt += 1;
                (
                    entry.request.clone(),
                    entry.cancel.clone(),
                    entry.attempt,
                    entry.redirects_followed,
                    entry.partial_bytes.clone(),
                )
            };

            let wire = wire::compose(self, &current_request)?;
            let host = wire.url.host_str().unwrap_or("").to_string();
            let cookies = self.cookie_jar.cookies_for(&host).await;

            let mut wire = wire;
            if !cookies.is_empty() {
                if let Ok(value) = reqwest::header::HeaderValue::from_str(&cookies.join("; ")) {
                    wire.headers.insert(reqwest::header::COOKIE, value);
                }
            }

            debug!(attempt, url = %wire.url, "dispatching fetch attempt");

            let delegate: Arc<dyn TransportDelegate> =
                if matches!(wire.task_kind, TaskKind::Download | TaskKind::DownloadResume) {
                    partial_bytes.lock().expect("resume buffer mutex poisoned").clear();
                    Arc::new(AccumulatingDelegate::new(partial_bytes.clone()))
                } else {
                    Arc::new(NullDelegate)
                };

            let outcome = self.transport.execute(&wire, delegate, cancel).await;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) if err.is_transport_retryable() && attempt < current_request.max_retries => {
                    warn!(attempt, error = %err, "transport error, retrying");
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    continue;
                }
                Err(err) => return Err(err),
            };

            self.store_cookies(&host, &outcome).await;

            if let Some(redirected) = self
                .follow_redirect_if_needed(fingerprint, &current_request, &outcome, redirects_followed)
                .await?
            {
                if redirected {
                    continue;
                }
            }

            let response = Response {
                status: outcome.status,
                headers: outcome.headers,
                body: outcome.body,
                file: outcome.file,
                url: outcome.url,
                metrics: outcome.metrics,
                attempts: attempt,
                user_info: current_request.user_info.clone(),
            };

            match validate_all(&self.validators, response, &current_request, attempt).await {
                PipelineOutcome::Accept(response) => return Ok(response),
                PipelineOutcome::Fail(err) => return Err(err),
                PipelineOutcome::Retry(strategy) => {
                    let delay = crate::validator::handle_retry(&strategy, &current_request, attempt)?;
                    if let Some(headers) = strategy.headers_to_apply() {
                        let mut table = self.in_flight.write().await;
                        if let Some(entry) = table.get_mut(fingerprint) {
                            crate::util::headers::apply_extra_headers(&mut entry.request.headers, headers);
                        }
                    }
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
        }
    }

    async fn store_cookies(&self, host: &str, outcome: &TransportOutcome) {
        let set_cookie: Vec<String> = outcome
            .headers
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
            .collect();
        if !set_cookie.is_empty() {
            self.cookie_jar.store(host, &set_cookie).await;
        }
    }

    /// Returns `Ok(Some(true))` if a redirect was followed and the caller should
    /// retry the loop immediately with the updated in-flight entry.
    async fn follow_redirect_if_needed(
        &self,
        fingerprint: &str,
        current_request: &Request,
        outcome: &TransportOutcome,
        redirects_followed: u32,
    ) -> Result<Option<bool>, HttpError> {
        if !(300..400).contains(&outcome.status) {
            return Ok(None);
        }
        let mode = current_request
            .redirect_mode
            .unwrap_or(self.default_redirect_mode);
        let disposition = resolve_redirect(mode, outcome.status, redirects_followed);
        if matches!(disposition, RedirectDisposition::DoNotFollow) {
            return Ok(None);
        }

        let location = outcome
            .headers
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| HttpError::InvalidResponse {
                message: "redirect response missing Location header".into(),
                status: Some(outcome.status),
            })?;

        let mut table = self.in_flight.write().await;
        let entry = table
            .get_mut(fingerprint)
            .expect("fetch_inner called without a registered in-flight entry");
        entry.request.url = location.to_string();
        entry.request.query.clear();
        if matches!(disposition, RedirectDisposition::FollowAsGet) {
            entry.request.method = reqwest::Method::GET;
            entry.request.body = crate::request::body::BodyDescriptor::Empty;
        }
        entry.redirects_followed += 1;
        Ok(Some(true))
    }
}

/// Constructs a [`Loader`]; used only by [`crate::client::ClientBuilder`].
pub(crate) struct LoaderConfig {
    pub base_url: Option<Url>,
    pub default_headers: HeaderMap,
    pub default_timeout: Option<Duration>,
    pub default_security: Option<Arc<dyn SecurityPolicy>>,
    pub default_redirect_mode: FollowRedirectsMode,
    pub validators: Vec<Arc<dyn Validator>>,
    pub transport: Arc<dyn Transport>,
    pub cookie_jar: Arc<dyn CookieStorage>,
}

impl Loader {
    pub(crate) fn from_config(config: LoaderConfig) -> Self {
        Self {
            base_url: config.base_url,
            default_headers: config.default_headers,
            default_timeout: config.default_timeout,
            default_security: config.default_security,
            default_redirect_mode: config.default_redirect_mode,
            validators: config.validators,
            transport: config.transport,
            cookie_jar: config.cookie_jar,
            in_flight: RwLock::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientBuilder;
    use crate::stub::responder::{ResponseTime, StubResponse};
    use crate::stub::{StubRegistry, StubTransport};
    use crate::stub::matcher::Matcher;

    #[tokio::test]
    async fn fetch_returns_stubbed_response() {
        let registry = Arc::new(StubRegistry::new());
        registry.register(
            Matcher::url_exact("https://example.com/ping"),
            StubResponse::json(200, serde_json::json!({"ok": true}), ResponseTime::Immediate),
        );
        let transport = Arc::new(StubTransport::new(registry));

        let client = ClientBuilder::new()
            .base_url("https://example.com")
            .transport(transport)
            .build();

        let request = Request::get("/ping").build();
        let response = client.fetch(request).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn cancel_before_completion_yields_cancelled_error() {
        let client = ClientBuilder::new().base_url("http://127.0.0.1:1").build();
        let request = Request::get("/slow").build();
        let fingerprint = request.fingerprint.clone();

        let loader = client.loader_handle();
        let cancel_task = {
            let loader = loader.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                loader.cancel(&fingerprint).await;
            })
        };

        let result = loader.fetch(request).await;
        cancel_task.await.unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancel_with_resume_data_hands_back_partial_download_bytes() {
        use crate::request::TransferMode;

        let registry = Arc::new(StubRegistry::new());
        registry.register(
            Matcher::url_exact("https://example.com/file"),
            StubResponse::new(
                200,
                vec![7u8; 5_000],
                ResponseTime::Speed { bytes_per_second: 1_000 },
            ),
        );
        let transport = Arc::new(StubTransport::new(registry));
        let client = ClientBuilder::new()
            .base_url("https://example.com")
            .transport(transport)
            .build();

        let request = Request::get("/file").transfer_mode(TransferMode::Download).build();
        let fingerprint = request.fingerprint.clone();
        let loader = client.loader_handle();

        let (tx, rx) = tokio::sync::oneshot::channel();
        let cancel_task = {
            let loader = loader.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                loader
                    .cancel_with_resume_data(&fingerprint, move |bytes| {
                        let _ = tx.send(bytes);
                    })
                    .await;
            })
        };

        let result = loader.fetch(request).await;
        cancel_task.await.unwrap();
        assert!(result.is_err());

        let partial = rx.await.unwrap();
        assert!(!partial.is_empty());
        assert!(partial.len() < 5_000);
    }
}
