//! Responses, metrics, progress and decoding (spec §3.1 "Response"/"Metrics"/
//! "Progress", §4.5 "Response & Decoding").

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::error::HttpError;

/// Timing for one completed fetch, staged the way the underlying transport stages
/// a connection (spec §3.1 "Metrics"). Each stage is `None` if the transport never
/// reached it (e.g. `secure_connect` on a plaintext connection, or every stage on a
/// response served entirely from a stub).
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub domain_lookup: Option<Duration>,
    pub connect: Option<Duration>,
    pub secure_connect: Option<Duration>,
    pub request: Option<Duration>,
    pub response: Option<Duration>,
    pub total: Duration,
    pub redirect_count: u32,
}

/// The kind of operation a [`Progress`] update describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOperation {
    Upload,
    Download,
}

/// A single progress update (spec §3.1 "Progress").
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub operation: ProgressOperation,
    pub current_bytes: u64,
    /// `None` when the transport never reported a `Content-Length` (e.g. chunked
    /// transfer-encoding) — `percentage` is then always `None` too.
    pub expected_bytes: Option<u64>,
}

impl Progress {
    pub fn percentage(&self) -> Option<f64> {
        self.expected_bytes.and_then(|expected| {
            if expected == 0 {
                None
            } else {
                Some((self.current_bytes as f64 / expected as f64) * 100.0)
            }
        })
    }
}

/// The result of one completed fetch, after the validator/retry pipeline has
/// accepted it (spec §3.1 "Response").
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    /// In-memory body for ordinary requests; empty for a `largeData` transfer that
    /// wrote its body to disk instead (see [`Response::file`]). The two are
    /// mutually exclusive (spec §3.1 "Response": "optional bytes OR local file URL
    /// for largeData").
    pub body: Bytes,
    /// Populated instead of `body` when the request used
    /// [`crate::request::TransferMode::Download`] or
    /// [`crate::request::TransferMode::DownloadResume`] and the transport
    /// successfully moved the downloaded bytes to a stable path.
    pub file: Option<PathBuf>,
    pub url: String,
    pub metrics: Metrics,
    /// How many times this fetch was retried before this response was accepted.
    pub attempts: u32,
    /// Carried over from the originating [`crate::request::Request::user_info`].
    pub user_info: std::collections::HashMap<String, serde_json::Value>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON into `T` (spec §4.5 "JSON-decodable").
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| HttpError::ObjectDecodeFailed {
            message: e.to_string(),
        })
    }

    /// Decodes the body with a caller-supplied closure (spec §4.5 "custom-decode").
    pub fn decode_with<T>(&self, f: impl FnOnce(&Bytes) -> Result<T, HttpError>) -> Result<T, HttpError> {
        f(&self.body)
    }

    /// The body as a UTF-8 string.
    pub fn text(&self) -> Result<String, HttpError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| HttpError::ObjectDecodeFailed {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response(status: u16, body: &str) -> Response {
        Response {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
            file: None,
            url: "https://example.com".into(),
            metrics: Metrics::default(),
            attempts: 0,
            user_info: Default::default(),
        }
    }

    #[test]
    fn is_success_checks_2xx_range() {
        assert!(sample_response(200, "").is_success());
        assert!(sample_response(299, "").is_success());
        assert!(!sample_response(300, "").is_success());
        assert!(!sample_response(404, "").is_success());
    }

    #[test]
    fn decode_parses_json_body() {
        #[derive(serde::Deserialize, PartialEq, Debug)]
        struct Widget {
            name: String,
        }
        let response = sample_response(200, r#"{"name":"bolt"}"#);
        let widget: Widget = response.decode().unwrap();
        assert_eq!(widget, Widget { name: "bolt".into() });
    }

    #[test]
    fn decode_surfaces_object_decode_failed_on_bad_json() {
        let response = sample_response(200, "not json");
        let result: Result<serde_json::Value, _> = response.decode();
        assert!(matches!(result, Err(HttpError::ObjectDecodeFailed { .. })));
    }

    #[test]
    fn progress_percentage_is_none_without_expected_bytes() {
        let progress = Progress {
            operation: ProgressOperation::Download,
            current_bytes: 512,
            expected_bytes: None,
        };
        assert_eq!(progress.percentage(), None);
    }

    #[test]
    fn progress_percentage_computes_when_expected_known() {
        let progress = Progress {
            operation: ProgressOperation::Download,
            current_bytes: 50,
            expected_bytes: Some(200),
        };
        assert_eq!(progress.percentage(), Some(25.0));
    }
}
