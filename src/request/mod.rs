//! Declarative requests (spec §3.1, §4.1).
//!
//! A [`Request`] is immutable once submitted to a [`crate::client::Client`]. Attempt
//! counters and other execution-time state live in the loader's `LoaderEntry`
//! instead of on this struct, so a `Request` can be safely shared (`Arc`) across
//! retries, alt-requests and redirects without interior mutability.

pub mod body;

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Method;
use uuid::Uuid;

use crate::loader::redirect::FollowRedirectsMode;
use crate::loader::security::SecurityPolicy;
use body::BodyDescriptor;
use std::sync::Arc;

/// How a request's body and response are expected to be transferred (spec §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// A normal request/response exchange with the body held in memory.
    #[default]
    Default,
    /// The request body is streamed from a caller-provided factory.
    UploadStream,
    /// The response body is streamed to a destination as it arrives.
    Download,
    /// A download that resumes from `partial_data` via a `Range` header.
    DownloadResume,
}

/// Scheduling priority hint passed through to the transport, when supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Low,
    #[default]
    Default,
    High,
}

/// A hook that can rewrite a composed [`crate::loader::wire::WireRequest`]
/// immediately before it is handed to the transport (spec §4.1 "modifier hook").
pub type UrlRequestModifier =
    Arc<dyn Fn(&mut crate::loader::wire::WireRequest) -> Result<(), crate::error::HttpError> + Send + Sync>;

/// A declarative, immutable HTTP request (spec §3.1).
#[derive(Clone)]
pub struct Request {
    /// Stable identity used for in-flight tracking and logging; generated once at
    /// construction and never mutated.
    pub fingerprint: String,
    pub method: Method,
    /// Either an absolute URL, or a path to be joined against the client's base URL
    /// (spec §4.1 "URL assembly").
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: BodyDescriptor,
    pub transfer_mode: TransferMode,
    /// Overrides the client's default timeout for this request only.
    pub timeout: Option<Duration>,
    /// Overrides the client's default cache policy for this request only.
    pub cache_policy: Option<reqwest::header::HeaderValue>,
    pub priority: Priority,
    /// Overrides the client's default redirect policy for this request only.
    pub redirect_mode: Option<FollowRedirectsMode>,
    pub max_retries: u32,
    /// `true` for alt-requests spawned by a validator (e.g. silent token refresh).
    /// Alt-requests never themselves trigger further retries (spec §4.4).
    pub is_alt_request: bool,
    /// Previously downloaded bytes to resume from, for `TransferMode::DownloadResume`.
    pub partial_data: Option<Vec<u8>>,
    /// Overrides the client's default security policy for this request only.
    pub security: Option<Arc<dyn SecurityPolicy>>,
    pub url_request_modifier: Option<UrlRequestModifier>,
    /// Caller-attached metadata, not sent over the wire; carried through to
    /// [`crate::response::Response`] for correlation.
    pub user_info: HashMap<String, serde_json::Value>,
}

impl Request {
    /// Starts building a `GET` request.
    pub fn get(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::GET, url)
    }

    /// Starts building a `POST` request.
    pub fn post(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::POST, url)
    }

    /// Starts building a `PUT` request.
    pub fn put(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::PUT, url)
    }

    /// Starts building a `PATCH` request.
    pub fn patch(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::PATCH, url)
    }

    /// Starts building a `DELETE` request.
    pub fn delete(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::DELETE, url)
    }

    pub fn builder(method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// Clones this request as an alt-request (spec §4.4's silent-auth-refresh
    /// pattern): a fresh fingerprint, `is_alt_request` set, retries zeroed out so it
    /// can never itself be retried.
    pub fn as_alt_request(&self) -> Request {
        let mut alt = self.clone();
        alt.fingerprint = Uuid::new_v4().to_string();
        alt.is_alt_request = true;
        alt.max_retries = 0;
        alt
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("fingerprint", &self.fingerprint)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("transfer_mode", &self.transfer_mode)
            .field("is_alt_request", &self.is_alt_request)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Builder for [`Request`] (spec §11 supplement — the spec describes `Request`'s
/// fields and invariants but, like every comparable teacher type, it is built
/// through a builder rather than a public struct literal).
pub struct RequestBuilder {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: BodyDescriptor,
    transfer_mode: TransferMode,
    timeout: Option<Duration>,
    cache_policy: Option<reqwest::header::HeaderValue>,
    priority: Priority,
    redirect_mode: Option<FollowRedirectsMode>,
    max_retries: u32,
    partial_data: Option<Vec<u8>>,
    security: Option<Arc<dyn SecurityPolicy>>,
    url_request_modifier: Option<UrlRequestModifier>,
    user_info: HashMap<String, serde_json::Value>,
}

impl RequestBuilder {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: BodyDescriptor::Empty,
            transfer_mode: TransferMode::default(),
            timeout: None,
            cache_policy: None,
            priority: Priority::default(),
            redirect_mode: None,
            max_retries: 0,
            partial_data: None,
            security: None,
            url_request_modifier: None,
            user_info: HashMap::new(),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
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

    pub fn body(mut self, body: BodyDescriptor) -> Self {
        self.body = body;
        self
    }

    pub fn transfer_mode(mut self, mode: TransferMode) -> Self {
        self.transfer_mode = mode;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn redirect_mode(mut self, mode: FollowRedirectsMode) -> Self {
        self.redirect_mode = Some(mode);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn partial_data(mut self, bytes: Vec<u8>) -> Self {
        self.partial_data = Some(bytes);
        self.transfer_mode = TransferMode::DownloadResume;
        self
    }

    pub fn security(mut self, policy: Arc<dyn SecurityPolicy>) -> Self {
        self.security = Some(policy);
        self
    }

    pub fn url_request_modifier(mut self, modifier: UrlRequestModifier) -> Self {
        self.url_request_modifier = Some(modifier);
        self
    }

    pub fn user_info(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.user_info.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Request {
        Request {
            fingerprint: Uuid::new_v4().to_string(),
            method: self.method,
            url: self.url,
            query: self.query,
            headers: self.headers,
            body: self.body,
            transfer_mode: self.transfer_mode,
            timeout: self.timeout,
            cache_policy: self.cache_policy,
            priority: self.priority,
            redirect_mode: self.redirect_mode,
            max_retries: self.max_retries,
            is_alt_request: false,
            partial_data: self.partial_data,
            security: self.security,
            url_request_modifier: self.url_request_modifier,
            user_info: self.user_info,
        }
    }
}
