//! The transport contract (spec §6 "Transport") and its default `reqwest`-backed
//! implementation (spec §11 supplement).
//!
//! `Transport` is the seam the host application can replace entirely — the crate
//! itself never speaks TCP/TLS/HTTP framing (spec's Non-goals). A transport drives
//! one fetch to completion, reporting back through [`TransportDelegate`] the same
//! way a platform URL-loading system reports through a delegate: progressively, as
//! data and events arrive, rather than only at the very end (spec §4.3,
//! grounded on the isahc `RequestHandler` "collect into a single completion"
//! pattern).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::{classify_transport_error, HttpError};
use crate::loader::wire::{TaskKind, WireRequest};
use crate::response::{Metrics, Progress, ProgressOperation};
use crate::util::cancel::CancelHandle;

/// Callbacks a [`Transport`] reports through while driving one fetch. Every method
/// has a no-op default so implementers only override what they need, mirroring how
/// sparse most real delegate implementations are.
#[async_trait]
pub trait TransportDelegate: Send + Sync {
    async fn did_send_body_data(&self, _bytes_sent: u64, _total: Option<u64>) {}
    async fn did_receive_data(&self, _chunk: &Bytes) {}
    async fn download_did_write(&self, _progress: Progress) {}
    /// Called with the proposed redirect status/location before the loader
    /// decides whether to follow it (spec §4.3 "Redirects").
    async fn will_perform_redirection(&self, _status: u16, _location: &str) {}
    async fn did_finish_collecting_metrics(&self, _metrics: &Metrics) {}
    /// The underlying connection/session became unusable independent of any one
    /// request (spec §4.3 "Session invalidation").
    async fn did_become_invalid_with_error(&self, _error: &HttpError) {}
}

/// A no-op delegate, useful for tests and for transports driven without progress
/// reporting.
pub struct NullDelegate;

#[async_trait]
impl TransportDelegate for NullDelegate {}

/// Mirrors every received chunk into a shared buffer, so
/// [`crate::loader::Loader::cancel_with_resume_data`] can hand back whatever bytes
/// arrived before cancellation (spec §4.3 "cancel_with_resume_data"). The loader
/// installs this delegate instead of [`NullDelegate`] for `largeData` transfers.
pub struct AccumulatingDelegate {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl AccumulatingDelegate {
    pub fn new(buffer: Arc<Mutex<Vec<u8>>>) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl TransportDelegate for AccumulatingDelegate {
    async fn did_receive_data(&self, chunk: &Bytes) {
        self.buffer
            .lock()
            .expect("resume buffer mutex poisoned")
            .extend_from_slice(chunk);
    }
}

/// The outcome of one transport-level attempt, before the validator pipeline has
/// had a chance to inspect it.
pub struct TransportOutcome {
    pub status: u16,
    pub headers: HeaderMap,
    /// In-memory body for `data`/`upload-stream` tasks; empty for `download`/
    /// `download-resume` tasks, which populate `file` instead (spec §3.1
    /// "Response": "optional bytes OR local file URL (for largeData)").
    pub body: Bytes,
    pub file: Option<PathBuf>,
    pub url: String,
    pub metrics: Metrics,
}

/// A pluggable collaborator that actually moves bytes over the network (spec §6).
/// The crate ships [`ReqwestTransport`] as its one default implementation; host
/// applications may substitute their own (e.g. to route through a proxy layer or a
/// platform networking stack).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        wire: &WireRequest,
        delegate: Arc<dyn TransportDelegate>,
        cancel: CancelHandle,
    ) -> Result<TransportOutcome, HttpError>;
}

/// The default [`Transport`], backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Where `download`/`download-resume` tasks write their bodies. Per-platform temp
/// directory policy is an external-collaborator concern (spec §1); `std::env::temp_dir`
/// is the smallest reasonable default.
fn downloads_dir() -> PathBuf {
    std::env::temp_dir().join("wirekit-downloads")
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        wire: &WireRequest,
        delegate: Arc<dyn TransportDelegate>,
        cancel: CancelHandle,
    ) -> Result<TransportOutcome, HttpError> {
        let started = std::time::Instant::now();
        let is_download = matches!(wire.task_kind, TaskKind::Download | TaskKind::DownloadResume);

        let mut builder = self
            .client
            .request(wire.method.clone(), wire.url.clone())
            .headers(wire.headers.clone());
        if let Some(timeout) = wire.timeout {
            builder = builder.timeout(timeout);
        }
        if wire.task_kind == TaskKind::DownloadResume {
            if let Some(partial) = &wire.partial_data {
                builder = builder.header(reqwest::header::RANGE, format!("bytes={}-", partial.len()));
            }
        }
        builder = match &wire.body {
            crate::request::body::SerializedBody::Bytes(bytes) => {
                if !bytes.is_empty() {
                    let total = bytes.len() as u64;
                    delegate.did_send_body_data(total, Some(total)).await;
                }
                builder.body(bytes.clone())
            }
            crate::request::body::SerializedBody::Stream(factory) => {
                let stream = (factory)();
                builder.body(reqwest::Body::wrap_stream(stream))
            }
        };

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(HttpError::Cancelled),
            result = builder.send() => result.map_err(classify_transport_error)?,
        };

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let expected_bytes = response.content_length();

        let (body, file) = if is_download {
            let path = self
                .stream_to_file(wire, response, &delegate, &cancel, expected_bytes)
                .await?;
            (Bytes::new(), path)
        } else {
            let bytes = stream_to_memory(response, &delegate, &cancel, expected_bytes).await?;
            (bytes, None)
        };

        let metrics = Metrics {
            domain_lookup: None,
            connect: None,
            secure_connect: None,
            request: None,
            response: Some(started.elapsed()),
            total: started.elapsed(),
            redirect_count: 0,
        };
        delegate.did_finish_collecting_metrics(&metrics).await;

        Ok(TransportOutcome {
            status,
            headers,
            body,
            file,
            url,
            metrics,
        })
    }
}

impl ReqwestTransport {
    /// Streams `response`'s body into a stable, UUID-named file under
    /// [`downloads_dir`] (spec §4.3 "Byte accumulation": "the temporary file is
    /// moved to a stable path derived from a random UUID filename"). Returns
    /// `None` (body-less response, no synthesized error) if the final move fails,
    /// per spec §4.3's explicit "no error is synthesized here".
    async fn stream_to_file(
        &self,
        wire: &WireRequest,
        response: reqwest::Response,
        delegate: &Arc<dyn TransportDelegate>,
        cancel: &CancelHandle,
        expected_bytes: Option<u64>,
    ) -> Result<Option<PathBuf>, HttpError> {
        let dir = downloads_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| HttpError::Internal {
                message: format!("failed creating downloads directory: {e}"),
            })?;

        let temp_path = dir.join(format!("{}.part", uuid::Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| HttpError::Internal {
                message: format!("failed creating temp download file: {e}"),
            })?;

        let mut written = 0u64;
        if wire.task_kind == TaskKind::DownloadResume {
            if let Some(partial) = &wire.partial_data {
                file.write_all(partial).await.map_err(|e| HttpError::Internal {
                    message: format!("failed writing resumed bytes: {e}"),
                })?;
                written = partial.len() as u64;
            }
        }

        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(HttpError::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    delegate.did_receive_data(&chunk).await;
                    file.write_all(&chunk).await.map_err(|e| HttpError::Internal {
                        message: format!("failed writing downloaded chunk: {e}"),
                    })?;
                    written += chunk.len() as u64;
                    delegate
                        .download_did_write(Progress {
                            operation: ProgressOperation::Download,
                            current_bytes: written,
                            expected_bytes,
                        })
                        .await;
                }
                Some(Err(e)) => return Err(classify_transport_error(e)),
                None => break,
            }
        }
        file.flush().await.ok();
        drop(file);

        let final_path = dir.join(uuid::Uuid::new_v4().to_string());
        match tokio::fs::rename(&temp_path, &final_path).await {
            Ok(()) => Ok(Some(final_path)),
            Err(e) => {
                warn!(error = %e, "failed moving downloaded file to its stable path");
                Ok(None)
            }
        }
    }
}

async fn stream_to_memory(
    response: reqwest::Response,
    delegate: &Arc<dyn TransportDelegate>,
    cancel: &CancelHandle,
    expected_bytes: Option<u64>,
) -> Result<Bytes, HttpError> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(HttpError::Cancelled),
            next = stream.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                delegate.did_receive_data(&chunk).await;
                body.extend_from_slice(&chunk);
                delegate
                    .download_did_write(Progress {
                        operation: ProgressOperation::Download,
                        current_bytes: body.len() as u64,
                        expected_bytes,
                    })
                    .await;
            }
            Some(Err(e)) => return Err(classify_transport_error(e)),
            None => break,
        }
    }
    Ok(Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientBuilder;
    use crate::request::{Request, TransferMode};

    #[tokio::test]
    async fn reqwest_transport_reports_error_on_connection_failure() {
        let client = ClientBuilder::new().build();
        let request = Request::get("http://127.0.0.1:1").build();
        let wire = crate::loader::wire::compose(&client, &request).unwrap();
        let transport = ReqwestTransport::new();
        let result = transport
            .execute(&wire, Arc::new(NullDelegate), CancelHandle::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancelled_before_send_returns_cancelled_error() {
        let client = ClientBuilder::new().build();
        let request = Request::get("http://127.0.0.1:1").build();
        let wire = crate::loader::wire::compose(&client, &request).unwrap();
        let transport = ReqwestTransport::new();
        let cancel = CancelHandle::new();
        cancel.cancel();
        let result = transport
            .execute(&wire, Arc::new(NullDelegate), cancel)
            .await;
        assert!(matches!(result, Err(HttpError::Cancelled)));
    }

    #[tokio::test]
    async fn cancelled_download_before_send_returns_cancelled_error() {
        let client = ClientBuilder::new().build();
        let request = Request::get("http://127.0.0.1:1")
            .transfer_mode(TransferMode::Download)
            .build();
        let wire = crate::loader::wire::compose(&client, &request).unwrap();
        let transport = ReqwestTransport::new();
        let cancel = CancelHandle::new();
        cancel.cancel();
        let result = transport
            .execute(&wire, Arc::new(NullDelegate), cancel)
            .await;
        assert!(matches!(result, Err(HttpError::Cancelled)));
    }

    #[tokio::test]
    async fn accumulating_delegate_collects_chunks_in_order() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let delegate = AccumulatingDelegate::new(buffer.clone());
        delegate.did_receive_data(&Bytes::from_static(b"hello ")).await;
        delegate.did_receive_data(&Bytes::from_static(b"world")).await;
        assert_eq!(buffer.lock().unwrap().as_slice(), b"hello world");
    }
}
