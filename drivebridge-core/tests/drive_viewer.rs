//! Integration tests for the presentation adapter.

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{Harness, account, grant};
use drivebridge_core::{
    AccessToken, ByteStream, DriveEntry, DriveResource, DriveViewer, ResourceError, TargetFormat, ViewError,
    ViewState, resource::collect_bytes,
};

/// Drive double: answers `Unauthorized` for the first `rejections` calls.
struct MockDrive {
    rejections: AtomicUsize,
    list_calls: AtomicUsize,
    convert_calls: AtomicUsize,
    tokens_seen: Mutex<VecDeque<String>>,
}

impl MockDrive {
    fn rejecting(rejections: usize) -> Self {
        Self {
            rejections: AtomicUsize::new(rejections),
            list_calls: AtomicUsize::new(0),
            convert_calls: AtomicUsize::new(0),
            tokens_seen: Mutex::new(VecDeque::new()),
        }
    }

    fn check(&self, token: &AccessToken) -> Result<(), ResourceError> {
        self.tokens_seen.lock().push_back(token.value.expose().to_string());
        let remaining = self.rejections.load(Ordering::SeqCst);
        if remaining > 0 {
            self.rejections.store(remaining - 1, Ordering::SeqCst);
            return Err(ResourceError::Unauthorized);
        }
        Ok(())
    }
}

#[async_trait]
impl DriveResource for MockDrive {
    async fn list_entries(&self, token: &AccessToken) -> Result<Vec<DriveEntry>, ResourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check(token)?;
        Ok(vec![DriveEntry {
            id: "item-1".to_string(),
            name: "plan.docx".to_string(),
            size: Some(42),
            folder: false,
            web_url: None,
        }])
    }

    async fn convert(&self, token: &AccessToken, id: &str, _format: TargetFormat) -> Result<ByteStream, ResourceError> {
        self.convert_calls.fetch_add(1, Ordering::SeqCst);
        self.check(token)?;
        let chunks: Vec<Result<Bytes, ResourceError>> = vec![Ok(Bytes::from("%PDF-")), Ok(Bytes::from(id.to_string()))];
        Ok(Box::pin(tokio_stream::iter(chunks)))
    }
}

fn viewer(harness: &Harness, drive: Arc<MockDrive>) -> DriveViewer {
    DriveViewer::new(Arc::new(harness.engine()), drive)
}

#[tokio::test]
async fn test_load_lists_entries() {
    let harness = Harness::host_frame();
    harness.backend.succeed_with(grant("backend-token"));
    let drive = Arc::new(MockDrive::rejecting(0));
    let viewer = viewer(&harness, drive.clone());

    let state = viewer.load().await;

    match state {
        ViewState::Ready(entries) => assert_eq!(entries[0].name, "plan.docx"),
        other => panic!("expected Ready, got {:?}", other),
    }
    assert_eq!(drive.tokens_seen.lock().front().map(String::as_str), Some("backend-token"));
}

#[tokio::test]
async fn test_unauthorized_triggers_exactly_one_reauthentication() {
    let harness = Harness::standalone().with_cached_account(account());
    harness.silent.succeed_with(grant("silent-token"));
    let drive = Arc::new(MockDrive::rejecting(1));
    let viewer = viewer(&harness, drive.clone());

    let state = viewer.load().await;

    assert!(matches!(state, ViewState::Ready(_)));
    assert_eq!(harness.silent.calls(), 2);
    assert_eq!(drive.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_repeated_unauthorized_is_surfaced_not_looped() {
    let harness = Harness::standalone().with_cached_account(account());
    harness.silent.succeed_with(grant("silent-token"));
    let drive = Arc::new(MockDrive::rejecting(usize::MAX));
    let viewer = viewer(&harness, drive.clone());

    let result = viewer.entries().await;

    assert!(matches!(result, Err(ViewError::Resource(ResourceError::Unauthorized))));
    assert_eq!(harness.silent.calls(), 2);
    assert_eq!(drive.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_pending_redirect_is_shown_as_awaiting() {
    let harness = Harness::standalone();
    let drive = Arc::new(MockDrive::rejecting(0));
    let viewer = viewer(&harness, drive.clone());

    let state = viewer.load().await;

    match state {
        ViewState::AwaitingRedirect(url) => assert!(url.starts_with("https://login.example.com")),
        other => panic!("expected AwaitingRedirect, got {:?}", other),
    }
    assert_eq!(drive.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_terminal_failure_is_shown() {
    let harness = Harness::host_frame();
    let viewer = viewer(&harness, Arc::new(MockDrive::rejecting(0)));

    match viewer.load().await {
        ViewState::Failed(message) => assert!(message.contains("all token acquisition strategies exhausted")),
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_convert_streams_content_after_reauthentication() {
    let harness = Harness::standalone().with_cached_account(account());
    harness.silent.succeed_with(grant("silent-token"));
    let drive = Arc::new(MockDrive::rejecting(1));
    let viewer = viewer(&harness, drive.clone());

    let stream = viewer.convert("item-1", TargetFormat::Pdf).await.unwrap();
    let bytes = collect_bytes(stream).await.unwrap();

    assert_eq!(bytes, b"%PDF-item-1");
    assert_eq!(drive.convert_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_debug_log_records_fallbacks() {
    let harness = Harness::host_frame().with_cached_account(account());
    harness.silent.succeed_with(grant("silent-token"));
    let viewer = viewer(&harness, Arc::new(MockDrive::rejecting(0)));

    viewer.load().await;
    let log = viewer.debug_log();

    assert!(log.iter().any(|line| line.contains("backend_exchange: exchange rejected")));
    assert!(log.iter().any(|line| line.contains("silent: success")));
    assert!(log.iter().any(|line| line.contains("Loaded 1 entries")));
    assert!(!log.iter().any(|line| line.contains("silent-token")));
}
