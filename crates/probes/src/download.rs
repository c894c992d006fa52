//! HTTP download probe with cooperative cancellation

use crate::common::ProbeError;
use crate::files::{FileManager, FileSink};
use crate::monitor::{CancellationMonitor, MonitorHandle};
use crate::redirect::{RedirectResolver, RedirectStep};
use netkeeper_core::config::DownloadConfig;
use netkeeper_core::time::{elapsed_between, TimeSource};
use netkeeper_core::{IdentityToken, TaskId, TaskStore, USER_AGENT};

use futures_util::TryStreamExt;
use reqwest::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION};
use reqwest::{redirect, Client, Response};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Everything observed during one download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadResult {
    /// The final response was received
    pub connect_success: bool,
    /// The body was read to the end
    pub transfer_success: bool,
    pub file_exists: bool,
    pub delete_success: bool,
    /// Last validity published by the cancellation monitor
    pub valid: bool,
    /// Last stopped flag published by the cancellation monitor
    pub stopped: bool,
    /// Status code of every response in the redirect chain, in order
    pub http_codes: Vec<u16>,
    pub http_messages: Vec<String>,
    /// Notes on redirects that could not be followed
    pub diagnostics: Vec<String>,
    pub file_name: Option<String>,
    /// URL of the final request
    pub url: String,
    pub bytes_transferred: u64,
    pub duration: Duration,
    pub error: Option<ProbeError>,
}

impl DownloadResult {
    fn started(url: &str) -> Self {
        Self {
            connect_success: false,
            transfer_success: false,
            file_exists: false,
            delete_success: false,
            valid: true,
            stopped: false,
            http_codes: Vec::new(),
            http_messages: Vec::new(),
            diagnostics: Vec::new(),
            file_name: None,
            url: url.to_string(),
            bytes_transferred: 0,
            duration: Duration::ZERO,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.connect_success && self.transfer_success && self.error.is_none()
    }

    /// The transfer ended because the task was stopped, deleted or
    /// rescheduled, or because the caller interrupted it
    pub fn is_cancelled(&self) -> bool {
        !self.transfer_success
            && (!self.valid || self.stopped || self.error == Some(ProbeError::Interrupted))
    }
}

/// How the copy loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyEnd {
    Exhausted,
    Aborted,
}

/// Streams one URL to a file while a monitor watches the owning task
#[derive(Clone)]
pub struct DownloadProbe {
    config: DownloadConfig,
    client: Client,
    store: Arc<dyn TaskStore>,
    files: Arc<dyn FileManager>,
    time: Arc<dyn TimeSource>,
}

impl std::fmt::Debug for DownloadProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadProbe")
            .field("config", &self.config)
            .field("files", &self.files)
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}

impl DownloadProbe {
    pub fn new(
        config: DownloadConfig,
        store: Arc<dyn TaskStore>,
        files: Arc<dyn FileManager>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .redirect(redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProbeError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            store,
            files,
            time,
        })
    }

    /// Download `url` on behalf of task `task_id` scheduled with `identity`
    pub async fn run(
        &self,
        task_id: TaskId,
        identity: IdentityToken,
        url: &str,
        cancel: CancellationToken,
    ) -> DownloadResult {
        info!("Download probe for task {}: {}", task_id, url);
        let start = self.time.now();
        let mut result = DownloadResult::started(url);

        match self.connect(url, &mut result).await {
            Ok((response, name)) => {
                self.transfer(response, &name, task_id, identity, cancel, &mut result)
                    .await
            }
            Err(e) => {
                debug!("Download of {} failed before transfer: {}", url, e);
                result.error = Some(e);
            }
        }

        result.duration = elapsed_between(start, self.time.now());
        info!(
            "Download probe for task {} finished: transfer={} valid={} stopped={} bytes={}",
            task_id, result.transfer_success, result.valid, result.stopped, result.bytes_transferred
        );
        result
    }

    /// Request the URL, walk redirects, and pick the destination name
    async fn connect(
        &self,
        url: &str,
        result: &mut DownloadResult,
    ) -> Result<(Response, String), ProbeError> {
        let mut current = Url::parse(url).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;
        let mut redirects =
            RedirectResolver::new(self.config.follow_redirects, self.config.max_redirects);

        let response = loop {
            trace!("GET {}", current);
            let response = self
                .client
                .get(current.clone())
                .send()
                .await
                .map_err(request_error)?;

            let status = response.status();
            result.http_codes.push(status.as_u16());
            result.http_messages.push(reason_phrase(&response));

            match redirects.next(&current, status, response.headers().get(LOCATION)) {
                RedirectStep::Follow(next) => {
                    debug!("{} redirected ({}) to {}", current, status.as_u16(), next);
                    current = next;
                }
                RedirectStep::Final => break response,
                RedirectStep::Rejected(note) => {
                    warn!("Not following redirect from {}: {}", current, note);
                    result.diagnostics.push(note);
                    break response;
                }
            }
        };

        result.connect_success = true;
        result.url = current.to_string();

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Http(format!(
                "{} {}",
                status.as_u16(),
                reason_phrase(&response)
            )));
        }

        let disposition = header_text(&response, CONTENT_DISPOSITION);
        let content_type = header_text(&response, CONTENT_TYPE);
        let name = self
            .files
            .resolve_file_name(&current, disposition.as_deref(), content_type.as_deref())
            .await
            .ok_or(ProbeError::FileName)?;
        result.file_name = Some(name.clone());

        Ok((response, name))
    }

    /// Stream the body to `name`, then release everything and check the file
    async fn transfer(
        &self,
        response: Response,
        name: &str,
        task_id: TaskId,
        identity: IdentityToken,
        cancel: CancellationToken,
        result: &mut DownloadResult,
    ) {
        let mut sink = match self.files.create(name).await {
            Ok(sink) => sink,
            Err(e) => {
                result.error = Some(e);
                return;
            }
        };

        let monitor = CancellationMonitor::new(
            Arc::clone(&self.store),
            task_id,
            identity,
            self.config.poll_interval,
        )
        .start(cancel.clone());

        let copied = copy_chunks(
            response,
            &mut sink,
            &monitor,
            &cancel,
            self.config.chunk_size.max(1),
            &mut result.bytes_transferred,
        )
        .await;

        let closed = close(&mut sink).await;
        drop(sink);
        let (valid, stopped) = monitor.stop().await;
        result.valid = valid;
        result.stopped = stopped;

        match &copied {
            Ok(CopyEnd::Exhausted) => {}
            Ok(CopyEnd::Aborted) => debug!(
                "Transfer for task {} aborted after {} bytes",
                task_id, result.bytes_transferred
            ),
            Err(e) => warn!("Transfer for task {} failed: {}", task_id, e),
        }
        let (transferred, error) = settle(copied, closed, cancel.is_cancelled());
        result.transfer_success = transferred;
        result.error = error;

        result.file_exists = self.files.exists(name).await;
        if self.config.delete_after_download && result.file_exists {
            match self.files.delete(name).await {
                Ok(deleted) => result.delete_success = deleted,
                Err(e) => {
                    warn!("Could not delete {}: {}", name, e);
                    if result.error.is_none() {
                        result.error = Some(e);
                    }
                }
            }
        }
    }
}

/// Fold the copy and close results into the transfer flag and the error.
/// A copy error wins over a close error; an interrupt wins over both
/// on an aborted copy.
fn settle(
    copied: Result<CopyEnd, ProbeError>,
    closed: Result<(), ProbeError>,
    interrupted: bool,
) -> (bool, Option<ProbeError>) {
    match (copied, closed) {
        (Ok(CopyEnd::Exhausted), Ok(())) => (true, None),
        (Ok(CopyEnd::Exhausted), Err(e)) => (false, Some(e)),
        (Ok(CopyEnd::Aborted), _) if interrupted => (false, Some(ProbeError::Interrupted)),
        (Ok(CopyEnd::Aborted), closed) => (false, closed.err()),
        (Err(e), _) => (false, Some(e)),
    }
}

/// Copy the body in `chunk_size` pieces, checking the monitor before each read.
/// A pending read gives way as soon as `cancel` fires.
async fn copy_chunks(
    response: Response,
    sink: &mut FileSink,
    monitor: &MonitorHandle,
    cancel: &CancellationToken,
    chunk_size: usize,
    transferred: &mut u64,
) -> Result<CopyEnd, ProbeError> {
    let stream = response.bytes_stream().map_err(body_error);
    let mut reader = StreamReader::new(stream);
    let mut buffer = vec![0u8; chunk_size];

    loop {
        if !monitor.is_valid() {
            return Ok(CopyEnd::Aborted);
        }

        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(CopyEnd::Aborted),
            read = reader.read(&mut buffer) => read?,
        };
        if read == 0 {
            return Ok(CopyEnd::Exhausted);
        }

        sink.write_all(&buffer[..read])
            .await
            .map_err(|e| ProbeError::FileSystem(e.to_string()))?;
        *transferred += read as u64;
    }
}

/// Flush and close the sink
async fn close(sink: &mut FileSink) -> Result<(), ProbeError> {
    sink.flush()
        .await
        .map_err(|e| ProbeError::FileSystem(e.to_string()))?;
    sink.shutdown()
        .await
        .map_err(|e| ProbeError::FileSystem(e.to_string()))
}

/// The phrase the server sent, or the canonical one for the status
fn reason_phrase(response: &Response) -> String {
    match response.extensions().get::<hyper::ext::ReasonPhrase>() {
        Some(reason) => String::from_utf8_lossy(reason.as_bytes()).into_owned(),
        None => response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string(),
    }
}

fn header_text(response: &Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn request_error(error: reqwest::Error) -> ProbeError {
    if error.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Http(error.to_string())
    }
}

fn body_error(error: reqwest::Error) -> io::Error {
    let kind = if error.is_timeout() {
        io::ErrorKind::TimedOut
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::LocalFileManager;
    use netkeeper_core::{InMemoryTaskStore, SystemTimeSource};
    use tempfile::TempDir;

    fn probe(dir: &TempDir) -> DownloadProbe {
        DownloadProbe::new(
            DownloadConfig {
                directory: dir.path().to_path_buf(),
                ..DownloadConfig::default()
            },
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(LocalFileManager::new(dir.path())),
            Arc::new(SystemTimeSource),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_connecting() {
        let dir = TempDir::new().unwrap();
        let result = probe(&dir)
            .run(1, 1, "not a url", CancellationToken::new())
            .await;

        assert!(!result.connect_success);
        assert!(!result.transfer_success);
        assert!(result.http_codes.is_empty());
        assert!(matches!(result.error, Some(ProbeError::InvalidUrl(_))));
        assert!(!result.is_cancelled());
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let dir = TempDir::new().unwrap();
        let url = format!("http://127.0.0.1:{}/file.bin", port);
        let result = probe(&dir).run(1, 1, &url, CancellationToken::new()).await;

        assert!(!result.connect_success);
        assert!(result.file_name.is_none());
        assert!(matches!(result.error, Some(ProbeError::Http(_))));
    }

    #[test]
    fn test_settle_outcomes() {
        assert_eq!(settle(Ok(CopyEnd::Exhausted), Ok(()), false), (true, None));

        let close_failed = Err(ProbeError::FileSystem("disk full".to_string()));
        assert_eq!(
            settle(Ok(CopyEnd::Exhausted), close_failed.clone(), false),
            (false, Some(ProbeError::FileSystem("disk full".to_string())))
        );
        assert_eq!(
            settle(Ok(CopyEnd::Aborted), close_failed.clone(), false),
            (false, Some(ProbeError::FileSystem("disk full".to_string())))
        );
        assert_eq!(
            settle(Ok(CopyEnd::Aborted), close_failed.clone(), true),
            (false, Some(ProbeError::Interrupted))
        );
        assert_eq!(settle(Ok(CopyEnd::Aborted), Ok(()), false), (false, None));
        assert_eq!(
            settle(Err(ProbeError::Timeout), close_failed, true),
            (false, Some(ProbeError::Timeout))
        );
    }

    #[test]
    fn test_result_classification() {
        let mut result = DownloadResult::started("http://example.com/");
        assert!(!result.is_success());
        assert!(!result.is_cancelled());

        result.connect_success = true;
        result.transfer_success = true;
        assert!(result.is_success());

        result.transfer_success = false;
        result.valid = false;
        result.stopped = true;
        assert!(result.is_cancelled());
    }
}
