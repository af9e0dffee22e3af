//! The public entry point (spec §3.1 "Client", §4.1, §9 "Global shared client").
//!
//! `Client` is a thin, cheaply-cloneable facade around `Arc<Loader>` — all of the
//! actual composition/transport/retry work lives in [`crate::loader::Loader`].
//! Constructed via [`ClientBuilder`], the same shape as the teacher's
//! `HttpConfigBuilder`: chained setters returning `Self`, a `build()` applying
//! defaults.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::header::HeaderMap;
use reqwest::Url;

use crate::error::HttpError;
use crate::loader::cookie::{CookieStorage, InMemoryCookieJar};
use crate::loader::redirect::FollowRedirectsMode;
use crate::loader::security::SecurityPolicy;
use crate::loader::transport::{ReqwestTransport, Transport};
use crate::loader::{Loader, LoaderConfig};
use crate::request::Request;
use crate::response::Response;
use crate::validator::default_validator::DefaultValidator;
use crate::validator::retry_strategy::RetryStrategy;
use crate::validator::Validator;

/// A configured, reusable HTTP client (spec §3.1 "Client").
#[derive(Clone)]
pub struct Client(Arc<Loader>);

impl Client {
    /// Submits `request` and drives it to completion through the loader (compose,
    /// transport, redirects, validate/retry).
    pub async fn fetch(&self, request: Request) -> Result<Response, HttpError> {
        self.0.fetch(request).await
    }

    /// Cancels an in-flight fetch by the fingerprint of the [`Request`] that
    /// started it.
    pub async fn cancel(&self, fingerprint: &str) {
        self.0.cancel(fingerprint).await;
    }

    /// Cancels an in-flight `largeData` fetch, handing `callback` whatever bytes
    /// had already arrived for the current attempt (spec §4.3
    /// "cancel_with_resume_data"). Pass the bytes to
    /// [`crate::request::RequestBuilder::partial_data`] to resume later.
    pub async fn cancel_with_resume_data<F>(&self, fingerprint: &str, callback: F)
    where
        F: FnOnce(Vec<u8>) + Send + 'static,
    {
        self.0.cancel_with_resume_data(fingerprint, callback).await;
    }

    /// Returns the underlying `Arc<Loader>`, needed to wire up validators (like
    /// [`crate::validator::auth_refresh_validator::AuthRefreshValidator`]) that
    /// must themselves drive fetches.
    pub fn loader_handle(&self) -> Arc<Loader> {
        self.0.clone()
    }
}

impl Deref for Client {
    type Target = Loader;

    fn deref(&self) -> &Loader {
        &self.0
    }
}

static SHARED: OnceCell<Client> = OnceCell::new();

impl Client {
    /// A process-wide default client, lazily constructed on first use (spec §9
    /// "Global shared client"). Prefer an explicitly constructed `Client` where
    /// the caller can plumb it through; this exists for the common case where one
    /// ambient client is genuinely enough.
    pub fn shared() -> Client {
        SHARED.get_or_init(|| ClientBuilder::new().build()).clone()
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    default_timeout: Option<Duration>,
    default_security: Option<Arc<dyn SecurityPolicy>>,
    default_redirect_mode: FollowRedirectsMode,
    validators: Vec<Arc<dyn Validator>>,
    transport: Option<Arc<dyn Transport>>,
    cookie_jar: Option<Arc<dyn CookieStorage>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            default_timeout: Some(Duration::from_secs(60)),
            default_security: None,
            default_redirect_mode: FollowRedirectsMode::default(),
            validators: Vec::new(),
            transport: None,
            cookie_jar: None,
        }
    }

    pub fn base_url(mut self, url: impl AsRef<str>) -> Self {
        self.base_url = Url::parse(url.as_ref()).ok();
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn default_security(mut self, security: Arc<dyn SecurityPolicy>) -> Self {
        self.default_security = Some(security);
        self
    }

    pub fn default_redirect_mode(mut self, mode: FollowRedirectsMode) -> Self {
        self.default_redirect_mode = mode;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn validators(mut self, validators: Vec<Arc<dyn Validator>>) -> Self {
        self.validators = validators;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cookie_jar(mut self, jar: Arc<dyn CookieStorage>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// Builds the client. If no validators were configured, installs a single
    /// [`DefaultValidator`] with exponential backoff, matching the teacher's
    /// pattern of a sensible zero-config default.
    pub fn build(self) -> Client {
        let validators = if self.validators.is_empty() {
            vec![Arc::new(DefaultValidator::new(RetryStrategy::Exponential {
                base: 2.0,
                max_retries: 5,
            })) as Arc<dyn Validator>]
        } else {
            self.validators
        };

        let loader = Loader::from_config(LoaderConfig {
            base_url: self.base_url,
            default_headers: self.default_headers,
            default_timeout: self.default_timeout,
            default_security: self.default_security,
            default_redirect_mode: self.default_redirect_mode,
            validators,
            transport: self.transport.unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
            cookie_jar: self.cookie_jar.unwrap_or_else(|| Arc::new(InMemoryCookieJar::new())),
        });

        Client(Arc::new(loader))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
