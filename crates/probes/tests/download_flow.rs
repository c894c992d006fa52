//! Download probe against a local HTTP server

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream;
use netkeeper_core::config::DownloadConfig;
use netkeeper_core::{InMemoryTaskStore, SystemTimeSource, TaskRecord};
use netkeeper_probes::{DownloadProbe, LocalFileManager, ProbeError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const TASK_ID: i64 = 1;
const IDENTITY: i32 = 42;
const PAYLOAD_LEN: usize = 64 * 1024;

/// Body that trickles out 1 KiB every 20 ms for several seconds
fn slow_body() -> Body {
    let chunks = stream::unfold(0u32, |sent| async move {
        if sent >= 250 {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Some((Ok::<_, std::io::Error>(vec![b's'; 1024]), sent + 1))
    });
    Body::from_stream(chunks)
}

async fn serve() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let absolute = format!("http://{}/file.bin", addr);

    let app = Router::new()
        .route(
            "/start",
            get(|| async { (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/hop")]) }),
        )
        .route(
            "/hop",
            get(move || async move { (StatusCode::FOUND, [(header::LOCATION, absolute)]) }),
        )
        .route(
            "/file.bin",
            get(|| async {
                (
                    [(header::CONTENT_DISPOSITION, "attachment; filename=\"payload.bin\"")],
                    vec![b'p'; PAYLOAD_LEN],
                )
            }),
        )
        .route("/broken", get(|| async { StatusCode::FOUND }))
        .route(
            "/loop",
            get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/loop")]) }),
        )
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .route("/slow", get(|| async { slow_body().into_response() }));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A hand-written HTTP/1.1 server that answers every request with `response`.
/// With `hold_open`, the connection is left open afterwards instead of closed.
async fn serve_raw(response: &'static [u8], hold_open: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 2048];
                let _ = socket.read(&mut request).await;
                socket.write_all(response).await.unwrap();
                socket.flush().await.unwrap();
                if hold_open {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
            });
        }
    });
    addr
}

const TRUNCATED: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\nContent-Type: application/octet-stream\r\n\r\nabcdef";

struct Harness {
    addr: SocketAddr,
    dir: TempDir,
    store: Arc<InMemoryTaskStore>,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        store.insert(TaskRecord::new(TASK_ID, IDENTITY, true)).unwrap();
        Self {
            addr: serve().await,
            dir: TempDir::new().unwrap(),
            store,
        }
    }

    fn config(&self) -> DownloadConfig {
        DownloadConfig {
            poll_interval: Duration::from_millis(20),
            chunk_size: 512,
            directory: self.dir.path().to_path_buf(),
            ..DownloadConfig::default()
        }
    }

    fn probe(&self, config: DownloadConfig) -> DownloadProbe {
        DownloadProbe::new(
            config,
            self.store.clone(),
            Arc::new(LocalFileManager::new(self.dir.path())),
            Arc::new(SystemTimeSource),
        )
        .unwrap()
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

#[tokio::test]
async fn test_redirect_chain_is_recorded() {
    let harness = Harness::new().await;
    let probe = harness.probe(harness.config());

    let result = probe
        .run(TASK_ID, IDENTITY, &harness.url("/start"), CancellationToken::new())
        .await;

    assert_eq!(result.http_codes, vec![301, 302, 200]);
    assert_eq!(result.http_messages, vec!["Moved Permanently", "Found", "OK"]);
    assert!(result.diagnostics.is_empty());
    assert!(result.url.ends_with("/file.bin"));
    assert!(result.connect_success);
    assert!(result.transfer_success);
    assert!(result.is_success());
    assert_eq!(result.file_name.as_deref(), Some("payload.bin"));
    assert_eq!(result.bytes_transferred, PAYLOAD_LEN as u64);
    assert!(result.file_exists);
    assert!(result.delete_success);
    assert!(result.valid);
    assert!(!result.stopped);
    assert!(!harness.dir.path().join("payload.bin").exists());
}

#[tokio::test]
async fn test_file_is_kept_when_configured() {
    let harness = Harness::new().await;
    let probe = harness.probe(DownloadConfig {
        delete_after_download: false,
        ..harness.config()
    });

    let result = probe
        .run(TASK_ID, IDENTITY, &harness.url("/file.bin"), CancellationToken::new())
        .await;

    assert!(result.transfer_success);
    assert!(result.file_exists);
    assert!(!result.delete_success);
    let content = tokio_test::assert_ok!(std::fs::read(harness.dir.path().join("payload.bin")));
    assert_eq!(content.len(), PAYLOAD_LEN);
}

#[tokio::test]
async fn test_missing_location_ends_chain_with_diagnostic() {
    let harness = Harness::new().await;
    let probe = harness.probe(harness.config());

    let result = probe
        .run(TASK_ID, IDENTITY, &harness.url("/broken"), CancellationToken::new())
        .await;

    assert_eq!(result.http_codes, vec![302]);
    assert_eq!(result.diagnostics.len(), 1);
    assert!(result.connect_success);
    assert!(!result.transfer_success);
    assert!(result.file_name.is_none());
    assert_eq!(result.error, Some(ProbeError::Http("302 Found".to_string())));
}

#[tokio::test]
async fn test_redirect_limit() {
    let harness = Harness::new().await;
    let probe = harness.probe(DownloadConfig {
        max_redirects: 3,
        ..harness.config()
    });

    let result = probe
        .run(TASK_ID, IDENTITY, &harness.url("/loop"), CancellationToken::new())
        .await;

    assert_eq!(result.http_codes, vec![302; 4]);
    assert_eq!(result.diagnostics.len(), 1);
    assert!(result.diagnostics[0].contains("limit"));
    assert!(!result.transfer_success);
}

#[tokio::test]
async fn test_redirects_disabled() {
    let harness = Harness::new().await;
    let probe = harness.probe(DownloadConfig {
        follow_redirects: false,
        ..harness.config()
    });

    let result = probe
        .run(TASK_ID, IDENTITY, &harness.url("/start"), CancellationToken::new())
        .await;

    assert_eq!(result.http_codes, vec![301]);
    assert!(result.diagnostics.is_empty());
    assert!(result.connect_success);
    assert!(!result.transfer_success);
}

#[tokio::test]
async fn test_non_success_status() {
    let harness = Harness::new().await;
    let probe = harness.probe(harness.config());

    let result = probe
        .run(TASK_ID, IDENTITY, &harness.url("/missing"), CancellationToken::new())
        .await;

    assert_eq!(result.http_codes, vec![404]);
    assert_eq!(result.http_messages, vec!["Not Found"]);
    assert!(result.connect_success);
    assert!(!result.transfer_success);
    assert!(!result.file_exists);
    assert!(matches!(result.error, Some(ProbeError::Http(_))));
}

#[tokio::test]
async fn test_stop_during_transfer() {
    let harness = Harness::new().await;
    let probe = harness.probe(harness.config());
    let url = harness.url("/slow");

    let (result, _) = tokio::join!(
        probe.run(TASK_ID, IDENTITY, &url, CancellationToken::new()),
        async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            harness.store.set_running(TASK_ID, false).unwrap();
        }
    );

    assert!(result.connect_success);
    assert!(!result.transfer_success);
    assert!(!result.valid);
    assert!(result.stopped);
    assert!(result.is_cancelled());
    assert!(result.error.is_none());
    assert!(result.bytes_transferred < 250 * 1024);
    // the partial file is still cleaned up
    assert!(result.file_exists);
    assert!(result.delete_success);
}

#[tokio::test]
async fn test_reschedule_during_transfer() {
    let harness = Harness::new().await;
    let probe = harness.probe(harness.config());
    let url = harness.url("/slow");

    let (result, _) = tokio::join!(
        probe.run(TASK_ID, IDENTITY, &url, CancellationToken::new()),
        async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            harness.store.set_identity(TASK_ID, IDENTITY + 1).unwrap();
        }
    );

    assert!(!result.transfer_success);
    assert!(!result.valid);
    assert!(!result.stopped);
    assert!(result.is_cancelled());
}

#[tokio::test]
async fn test_delete_during_transfer() {
    let harness = Harness::new().await;
    let probe = harness.probe(harness.config());
    let url = harness.url("/slow");

    let (result, _) = tokio::join!(
        probe.run(TASK_ID, IDENTITY, &url, CancellationToken::new()),
        async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            harness.store.remove(TASK_ID).unwrap();
        }
    );

    assert!(!result.transfer_success);
    assert!(!result.valid);
    assert!(!result.stopped);
}

#[tokio::test]
async fn test_caller_interrupt() {
    let harness = Harness::new().await;
    let probe = harness.probe(harness.config());
    let url = harness.url("/slow");
    let cancel = CancellationToken::new();

    let (result, _) = tokio::join!(probe.run(TASK_ID, IDENTITY, &url, cancel.clone()), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    assert!(!result.transfer_success);
    assert_eq!(result.error, Some(ProbeError::Interrupted));
    // the task itself is still scheduled and running
    assert!(result.valid);
    assert!(!result.stopped);
    assert!(result.is_cancelled());
}

#[tokio::test]
async fn test_body_error_mid_transfer_still_cleans_up() {
    let harness = Harness::new().await;
    let probe = harness.probe(harness.config());
    let addr = serve_raw(TRUNCATED, false).await;
    let url = format!("http://{}/cut.bin", addr);

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        probe.run(TASK_ID, IDENTITY, &url, CancellationToken::new()),
    )
    .await
    .expect("download returns after a body error");

    assert!(result.connect_success);
    assert!(!result.transfer_success);
    assert!(matches!(result.error, Some(ProbeError::IoError(_))));
    assert_eq!(result.bytes_transferred, 6);
    assert_eq!(result.file_name.as_deref(), Some("cut.bin"));
    assert!(result.file_exists);
    assert!(result.delete_success);
    assert!(result.valid);
    assert!(!harness.dir.path().join("cut.bin").exists());
}

#[tokio::test]
async fn test_interrupt_during_stalled_read() {
    let harness = Harness::new().await;
    let config = DownloadConfig {
        read_timeout: Duration::from_secs(30),
        ..harness.config()
    };
    let probe = harness.probe(config);
    let addr = serve_raw(TRUNCATED, true).await;
    let url = format!("http://{}/stalled.bin", addr);
    let cancel = CancellationToken::new();

    let (result, _) = tokio::join!(
        tokio::time::timeout(
            Duration::from_secs(5),
            probe.run(TASK_ID, IDENTITY, &url, cancel.clone())
        ),
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        }
    );
    let result = result.expect("interrupt ends a stalled read");

    assert!(!result.transfer_success);
    assert_eq!(result.error, Some(ProbeError::Interrupted));
    assert_eq!(result.bytes_transferred, 6);
    assert!(result.is_cancelled());
    assert!(result.delete_success);
}

#[tokio::test]
async fn test_reason_phrase_from_server() {
    let harness = Harness::new().await;
    let probe = harness.probe(harness.config());
    let addr = serve_raw(
        b"HTTP/1.1 404 Nope Gone\r\nContent-Length: 0\r\n\r\n",
        false,
    )
    .await;
    let url = format!("http://{}/gone", addr);

    let result = probe
        .run(TASK_ID, IDENTITY, &url, CancellationToken::new())
        .await;

    assert_eq!(result.http_codes, vec![404]);
    assert_eq!(result.http_messages, vec!["Nope Gone"]);
    assert_eq!(result.error, Some(ProbeError::Http("404 Nope Gone".to_string())));
}
