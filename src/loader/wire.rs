//! Wire request composition (spec §3.1 "WireRequest", §4.1 "Client & Request
//! Composer").
//!
//! A [`WireRequest`] is the fully-resolved, ready-to-send form of a
//! [`crate::request::Request`]: URL assembled against the client's base URL,
//! headers merged by precedence, overrides resolved, body realized, and the
//! modifier hook applied. Composition happens once per attempt so a retried
//! request is recomposed from the same immutable `Request`, not mutated in place.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Method;
use reqwest::Url;

use crate::error::HttpError;
use crate::loader::Loader;
use crate::request::body::SerializedBody;
use crate::request::{Request, TransferMode};
use crate::util::headers::merge_headers;

/// Which shape of transfer the loader should drive for this wire request
/// (spec §4.1 "task-kind selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Data,
    UploadStream,
    Download,
    DownloadResume,
}

/// The fully composed request, ready to hand to a [`crate::loader::transport::Transport`].
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: SerializedBody,
    pub timeout: Option<Duration>,
    pub task_kind: TaskKind,
    pub security: Option<std::sync::Arc<dyn crate::loader::security::SecurityPolicy>>,
    pub partial_data: Option<Vec<u8>>,
}

fn task_kind_for(mode: TransferMode) -> TaskKind {
    match mode {
        TransferMode::Default => TaskKind::Data,
        TransferMode::UploadStream => TaskKind::UploadStream,
        TransferMode::Download => TaskKind::Download,
        TransferMode::DownloadResume => TaskKind::DownloadResume,
    }
}

/// Joins `raw_path` onto `base`'s own path, inserting exactly one `/` between them
/// iff neither side already supplies one (spec §4.1 "URL assembly"). This is
/// deliberately not `Url::join`: RFC-3986 reference resolution treats a base
/// without a trailing slash as a *file*, and drops its last path segment — which
/// would silently turn `https://api.example.com/v1` + `widgets/1` into
/// `https://api.example.com/widgets/1`, losing `/v1` entirely.
fn join_base_and_path(base: &Url, raw_path: &str) -> Url {
    let (path_part, query_part) = match raw_path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (raw_path, None),
    };

    let mut joined = base.clone();
    let base_path = joined.path();
    let new_path = match (base_path.ends_with('/'), path_part.starts_with('/')) {
        (true, true) => format!("{base_path}{}", &path_part[1..]),
        (false, false) => format!("{base_path}/{path_part}"),
        _ => format!("{base_path}{path_part}"),
    };
    joined.set_path(&new_path);
    if let Some(query) = query_part {
        joined.set_query(Some(query));
    }
    joined
}

/// Assembles the final URL: `request.url` as-is if already absolute, otherwise
/// joined against the client's base URL, then the request's query pairs appended
/// (spec §4.1 "URL assembly").
fn assemble_url(loader: &Loader, request: &Request) -> Result<Url, HttpError> {
    let mut url = if let Ok(absolute) = Url::parse(&request.url) {
        absolute
    } else {
        let base = loader.base_url().ok_or_else(|| HttpError::InvalidUrl {
            message: format!(
                "'{}' is not absolute and the client has no base URL configured",
                request.url
            ),
        })?;
        join_base_and_path(base, &request.url)
    };
    if !request.query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &request.query {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

/// Composes a [`WireRequest`] from a loader's defaults and a request (spec §4.1).
///
/// Header precedence, lowest to highest: client default headers, the body
/// encoder's own headers (e.g. `Content-Type`), the request's explicit headers.
pub fn compose(loader: &Loader, request: &Request) -> Result<WireRequest, HttpError> {
    let url = assemble_url(loader, request)?;

    let (body, body_headers) = request.body.serialize()?;

    let mut headers = loader.default_headers().clone();
    headers = merge_headers(headers, &body_headers);
    headers = merge_headers(headers, &request.headers);

    let timeout = request.timeout.or_else(|| loader.default_timeout());
    let security = request
        .security
        .clone()
        .or_else(|| loader.default_security());

    let mut wire = WireRequest {
        method: request.method.clone(),
        url,
        headers,
        body,
        timeout,
        task_kind: task_kind_for(request.transfer_mode),
        security,
        partial_data: request.partial_data.clone(),
    };

    if let Some(modifier) = &request.url_request_modifier {
        modifier(&mut wire)?;
    }

    Ok(wire)
}
