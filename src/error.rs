//! Error taxonomy.
//!
//! A single `HttpError` enum is used across composition, transport, validation and
//! stubbing. Each variant optionally carries a status code and an underlying cause,
//! matching the wire/observable taxonomy in the system specification.

use std::fmt;

/// The error taxonomy shared by every subsystem in this crate.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request and client together did not yield a usable absolute URL.
    #[error("invalid URL: {message}")]
    InvalidUrl { message: String },

    /// A multipart part referenced a file that could not be read or opened.
    #[error("multipart: invalid file part: {message}")]
    MultipartInvalidFile { message: String },

    /// A multipart text part could not be encoded as UTF-8.
    #[error("multipart: failed string encoding")]
    MultipartFailedStringEncoding,

    /// Reading a multipart streamed part failed mid-transfer.
    #[error("multipart: stream read failed")]
    MultipartStreamReadFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `serde_json` failed to encode a body.
    #[error("JSON encoding failed: {message}")]
    JsonEncodingFailed { message: String },

    /// Percent-encoding / form assembly failed.
    #[error("URL encoding failed: {message}")]
    UrlEncodingFailed { message: String },

    /// A generic transport-level failure (DNS, TCP, TLS handshake, etc.) that is
    /// not better classified as [`HttpError::MissingConnection`].
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The transport could not establish a connection at all (host unreachable,
    /// connection refused, DNS failure) as opposed to a connection that failed
    /// mid-flight.
    #[error("missing connection: {message}")]
    MissingConnection { message: String },

    /// The transport returned a response the pipeline could not make sense of.
    #[error("invalid response{}", status_suffix(*.status))]
    InvalidResponse {
        message: String,
        status: Option<u16>,
    },

    /// Composing the wire request failed (body serialization error, modifier hook
    /// threw, etc.).
    #[error("failed building wire request: {message}")]
    FailedBuildingWireRequest { message: String },

    /// `Response::decode::<T>()` failed.
    #[error("object decode failed: {message}")]
    ObjectDecodeFailed { message: String },

    /// The default validator observed an empty body where one was required.
    #[error("empty response")]
    EmptyResponse,

    /// A retry strategy exhausted `max_retries`.
    #[error("max retry attempts reached ({attempts} attempts)")]
    MaxRetryAttemptsReached { attempts: u32 },

    /// The transport/session became invalid while requests were in flight.
    #[error("session error: {message}")]
    SessionError { message: String },

    /// The fetch was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,

    /// An invariant the crate itself is responsible for was violated.
    #[error("internal error: {message}")]
    Internal { message: String },

    /// The stubber could not find any matching rule for an intercepted request.
    #[error("no stub registered for {method} {url}")]
    MatchStubNotFound { method: String, url: String },
}

fn status_suffix(status: Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {code})"),
        None => String::new(),
    }
}

impl HttpError {
    /// Whether the default validator should consider this error retryable on its own
    /// (status-code-driven retries are a validator concern, not this taxonomy's).
    pub fn is_transport_retryable(&self) -> bool {
        matches!(
            self,
            HttpError::Network { .. } | HttpError::MissingConnection { .. }
        )
    }

    /// Optional HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::InvalidResponse { status, .. } => *status,
            _ => None,
        }
    }

    /// A short, non-debug description safe to surface to end users.
    pub fn user_facing_summary(&self) -> String {
        match self {
            HttpError::InvalidUrl { .. } => "the request URL is invalid".to_string(),
            HttpError::Network { .. } | HttpError::MissingConnection { .. } => {
                "a network error occurred".to_string()
            }
            HttpError::InvalidResponse { status: Some(s), .. } => {
                format!("the server returned an unexpected response ({s})")
            }
            HttpError::InvalidResponse { status: None, .. } => {
                "the server returned an unexpected response".to_string()
            }
            HttpError::EmptyResponse => "the server returned no data".to_string(),
            HttpError::MaxRetryAttemptsReached { .. } => {
                "the request failed after multiple attempts".to_string()
            }
            HttpError::Cancelled => "the request was cancelled".to_string(),
            HttpError::ObjectDecodeFailed { .. } => {
                "the response could not be decoded".to_string()
            }
            HttpError::MatchStubNotFound { .. } => "no stub matched this request".to_string(),
            _ => "the request could not be completed".to_string(),
        }
    }

    pub(crate) fn network(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        HttpError::Network {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

/// Classifies a low-level `reqwest` transport failure into the wire taxonomy,
/// distinguishing "never connected" from "connection failed mid-flight".
pub fn classify_transport_error(err: reqwest::Error) -> HttpError {
    if err.is_connect() {
        HttpError::MissingConnection {
            message: err.to_string(),
        }
    } else if err.is_timeout() {
        HttpError::Network {
            message: format!("timed out: {err}"),
            source: Some(Box::new(err)),
        }
    } else {
        HttpError::Network {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Well-known transport error categories the default validator treats as
/// immediately retryable, mirroring spec §4.4's retryable-transport-error list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    TimedOut,
    CannotFindHost,
    CannotConnectToHost,
    NetworkConnectionLost,
    DnsLookupFailed,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::TimedOut => "timedOut",
            TransportErrorKind::CannotFindHost => "cannotFindHost",
            TransportErrorKind::CannotConnectToHost => "cannotConnectToHost",
            TransportErrorKind::NetworkConnectionLost => "networkConnectionLost",
            TransportErrorKind::DnsLookupFailed => "dnsLookupFailed",
            TransportErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

impl TransportErrorKind {
    pub fn is_immediately_retryable(self) -> bool {
        !matches!(self, TransportErrorKind::Other)
    }

    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportErrorKind::TimedOut
        } else if err.is_connect() {
            // reqwest does not expose DNS-vs-refused distinctly; treat both as
            // "cannot connect", the coarser but still-retryable category.
            TransportErrorKind::CannotConnectToHost
        } else {
            TransportErrorKind::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_summary_never_leaks_debug_internals() {
        let err = HttpError::InvalidResponse {
            message: "boom: secret-token-xyz".into(),
            status: Some(502),
        };
        let summary = err.user_facing_summary();
        assert!(!summary.contains("secret-token-xyz"));
        assert!(summary.contains("502"));
    }

    #[test]
    fn max_retry_attempts_reached_is_not_transport_retryable() {
        let err = HttpError::MaxRetryAttemptsReached { attempts: 3 };
        assert!(!err.is_transport_retryable());
    }

    #[test]
    fn missing_connection_is_transport_retryable() {
        let err = HttpError::MissingConnection {
            message: "refused".into(),
        };
        assert!(err.is_transport_retryable());
    }
}
