//! Integration tests for the command dispatch bridge

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use viewtrace_core::{
    Error, InitConfig, PlayerInstance, RecordingFactory, Result, SaveOptions, SaveResult,
    SinkCall, TagMap, TagValue, ViewHandle,
};
use viewtrace_bridge::{BridgeConfig, CommandRouter, PlayerView, ViewRegistry};

#[derive(Debug)]
struct FakePlayer;
impl PlayerInstance for FakePlayer {}

#[derive(Debug, Clone, PartialEq)]
enum ViewCall {
    Paused(bool),
    Seek(f64, f64),
    Volume(f32),
    Fullscreen(bool),
    License(Vec<u8>, String),
    LicenseError(String, String),
}

struct MockView {
    player: Option<Arc<dyn PlayerInstance>>,
    calls: Mutex<Vec<ViewCall>>,
    position: f64,
    hang: bool,
}

impl MockView {
    fn new() -> Self {
        Self {
            player: None,
            calls: Mutex::new(Vec::new()),
            position: 42.5,
            hang: false,
        }
    }

    fn with_player(player: Arc<dyn PlayerInstance>) -> Self {
        let mut view = Self::new();
        view.player = Some(player);
        view
    }

    fn hanging() -> Self {
        let mut view = Self::new();
        view.hang = true;
        view
    }

    fn calls(&self) -> Vec<ViewCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: ViewCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlayerView for MockView {
    fn player(&self) -> Option<Arc<dyn PlayerInstance>> {
        self.player.clone()
    }

    async fn set_paused(&self, paused: bool) {
        self.record(ViewCall::Paused(paused));
    }

    async fn seek(&self, position: f64, tolerance: f64) {
        self.record(ViewCall::Seek(position, tolerance));
    }

    async fn set_volume(&self, volume: f32) {
        self.record(ViewCall::Volume(volume));
    }

    async fn set_fullscreen(&self, fullscreen: bool) {
        self.record(ViewCall::Fullscreen(fullscreen));
    }

    async fn current_position(&self) -> Result<f64> {
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(self.position)
    }

    async fn save(&self, options: SaveOptions) -> Result<SaveResult> {
        let uri = options
            .path
            .unwrap_or_else(|| "file:///tmp/saved.mp4".to_owned());
        Ok(SaveResult { uri })
    }

    async fn set_license_result(&self, license: Bytes, license_url: String) {
        self.record(ViewCall::License(license.to_vec(), license_url));
    }

    async fn set_license_error(&self, error: String, license_url: String) {
        self.record(ViewCall::LicenseError(error, license_url));
    }
}

struct Harness {
    registry: Arc<ViewRegistry>,
    factory: Arc<RecordingFactory>,
    router: CommandRouter,
}

fn harness(config: BridgeConfig) -> Harness {
    let registry = Arc::new(ViewRegistry::new());
    let factory = Arc::new(RecordingFactory::new());
    let router = CommandRouter::new(registry.clone(), factory.clone(), config);
    Harness {
        registry,
        factory,
        router,
    }
}

fn init_config(customer_key: &str) -> InitConfig {
    InitConfig {
        customer_key: customer_key.to_owned(),
        gateway_url: None,
        player_name: Some("viewtrace".to_owned()),
        tags: TagMap::new(),
        debug: false,
    }
}

/// Awaiting a position query flushes the worker: commands are FIFO, so by
/// the time the reply lands every earlier command has executed.
async fn flush(router: &CommandRouter, handle: ViewHandle) {
    router
        .current_position(handle)
        .await
        .expect("flush barrier query failed");
}

// =============================================================================
// Dispatch mechanics
// =============================================================================

#[tokio::test]
async fn test_commands_execute_in_submission_order() {
    let h = harness(BridgeConfig::default());
    let view = Arc::new(MockView::new());
    let as_view: Arc<dyn PlayerView> = view.clone();
    let handle = ViewHandle(1);
    h.registry.register(handle, &as_view);

    h.router.set_paused(handle, true).unwrap();
    h.router.seek(handle, 10.0, 0.5).unwrap();
    h.router.set_volume(handle, 0.25).unwrap();
    h.router.set_fullscreen(handle, true).unwrap();
    flush(&h.router, handle).await;

    assert_eq!(
        view.calls(),
        vec![
            ViewCall::Paused(true),
            ViewCall::Seek(10.0, 0.5),
            ViewCall::Volume(0.25),
            ViewCall::Fullscreen(true),
        ]
    );
}

#[tokio::test]
async fn test_commands_against_stale_handles_are_swallowed() {
    let h = harness(BridgeConfig::default());
    let stale = ViewHandle(404);

    // None of these may error or panic; the views simply do not exist.
    h.router.set_paused(stale, true).unwrap();
    h.router.seek(stale, 5.0, 0.0).unwrap();
    h.router.set_fullscreen(stale, false).unwrap();

    // A live view on another handle is untouched.
    let view = Arc::new(MockView::new());
    let as_view: Arc<dyn PlayerView> = view.clone();
    let handle = ViewHandle(1);
    h.registry.register(handle, &as_view);
    flush(&h.router, handle).await;

    assert!(view.calls().is_empty());
}

#[tokio::test]
async fn test_position_query_rejects_on_stale_handle() {
    let h = harness(BridgeConfig::default());

    let err = h.router.current_position(ViewHandle(404)).await.unwrap_err();
    assert!(matches!(err, Error::StaleHandle { handle } if handle == ViewHandle(404)));
}

#[tokio::test]
async fn test_position_query_returns_view_position() {
    let h = harness(BridgeConfig::default());
    let view: Arc<dyn PlayerView> = Arc::new(MockView::new());
    let handle = ViewHandle(1);
    h.registry.register(handle, &view);

    let position = h.router.current_position(handle).await.unwrap();
    assert_eq!(position, 42.5);
}

#[tokio::test]
async fn test_position_query_times_out_instead_of_hanging() {
    let h = harness(BridgeConfig {
        response_timeout_ms: 50,
    });
    let view: Arc<dyn PlayerView> = Arc::new(MockView::hanging());
    let handle = ViewHandle(1);
    h.registry.register(handle, &view);

    let err = h.router.current_position(handle).await.unwrap_err();
    assert!(matches!(err, Error::ResponseTimeout));
}

#[tokio::test]
async fn test_save_round_trip() {
    let h = harness(BridgeConfig::default());
    let view: Arc<dyn PlayerView> = Arc::new(MockView::new());
    let handle = ViewHandle(1);
    h.registry.register(handle, &view);

    let result = h
        .router
        .save(
            handle,
            SaveOptions {
                path: Some("file:///tmp/clip.mp4".to_owned()),
            },
        )
        .await
        .unwrap();
    assert_eq!(result.uri, "file:///tmp/clip.mp4");
}

#[tokio::test]
async fn test_dispatch_on_view_passes_absent_sentinel() {
    let h = harness(BridgeConfig::default());
    let (tx, rx) = oneshot::channel();

    h.router
        .dispatch_on_view(ViewHandle(404), move |view| {
            let _ = tx.send(view.is_none());
        })
        .unwrap();

    assert!(rx.await.unwrap());
}

#[tokio::test]
async fn test_license_bytes_reach_the_view_decoded() {
    let h = harness(BridgeConfig::default());
    let view = Arc::new(MockView::new());
    let as_view: Arc<dyn PlayerView> = view.clone();
    let handle = ViewHandle(1);
    h.registry.register(handle, &as_view);

    let payload = b"opaque-license-blob";
    let encoded = BASE64.encode(payload);
    h.router
        .set_license_result(handle, &encoded, "https://drm.example.com/widevine")
        .unwrap();
    flush(&h.router, handle).await;

    assert_eq!(
        view.calls(),
        vec![ViewCall::License(
            payload.to_vec(),
            "https://drm.example.com/widevine".to_owned()
        )]
    );
}

// =============================================================================
// Analytics routing
// =============================================================================

#[tokio::test]
async fn test_full_session_through_the_router() {
    let h = harness(BridgeConfig::default());
    let player: Arc<dyn PlayerInstance> = Arc::new(FakePlayer);
    let view: Arc<dyn PlayerView> = Arc::new(MockView::with_player(player));
    let handle = ViewHandle(1);
    h.registry.register(handle, &view);

    let mut config = init_config("CK1");
    config
        .tags
        .insert("app".to_owned(), TagValue::from("x"));
    h.router.init(handle, config).unwrap();
    h.router
        .playback_requested(handle, "movie1", false, TagMap::new())
        .unwrap();
    h.router
        .set_playback_data(handle, "http://s", "viewer1", TagMap::new())
        .unwrap();
    h.router.set_seek_start(handle, 1_000).unwrap();
    h.router.set_seek_end(handle, 2_000).unwrap();
    h.router.report_playback_ended(handle).unwrap();
    flush(&h.router, handle).await;

    assert_eq!(h.factory.created(), 1);

    let calls = h.factory.sink().calls();
    assert!(matches!(calls[0], SinkCall::PlaybackRequested(_)));
    assert!(matches!(calls[1], SinkCall::ContentInfo(_)));
    // The init bound the view's player, so content info attaches it.
    assert_eq!(calls[2], SinkCall::PlayerAttached);
    assert!(matches!(calls[3], SinkCall::Metric { .. }));
    assert!(matches!(calls[4], SinkCall::Metric { .. }));
    assert_eq!(calls[5], SinkCall::SessionEnded);
    assert_eq!(calls[6], SinkCall::SessionTorndown);
    assert_eq!(calls.len(), 7);
}

#[tokio::test]
async fn test_attaching_a_new_views_player_closes_the_old_session() {
    let h = harness(BridgeConfig::default());

    let first_player: Arc<dyn PlayerInstance> = Arc::new(FakePlayer);
    let first: Arc<dyn PlayerView> = Arc::new(MockView::with_player(first_player));
    let first_handle = ViewHandle(1);
    h.registry.register(first_handle, &first);

    let second_player: Arc<dyn PlayerInstance> = Arc::new(FakePlayer);
    let second: Arc<dyn PlayerView> = Arc::new(MockView::with_player(second_player));
    let second_handle = ViewHandle(2);
    h.registry.register(second_handle, &second);

    h.router.init(first_handle, init_config("CK1")).unwrap();
    h.router
        .playback_requested(first_handle, "movie1", false, TagMap::new())
        .unwrap();
    h.router.attach_player(second_handle).unwrap();
    flush(&h.router, first_handle).await;

    let ends = h
        .factory
        .sink()
        .calls()
        .iter()
        .filter(|c| **c == SinkCall::SessionEnded)
        .count();
    assert_eq!(ends, 1);
}

#[tokio::test]
async fn test_detach_after_view_teardown_closes_the_session() {
    let h = harness(BridgeConfig::default());
    let player: Arc<dyn PlayerInstance> = Arc::new(FakePlayer);
    let view: Arc<dyn PlayerView> = Arc::new(MockView::with_player(player));
    let handle = ViewHandle(1);
    h.registry.register(handle, &view);

    h.router.init(handle, init_config("CK1")).unwrap();
    h.router
        .playback_requested(handle, "movie1", false, TagMap::new())
        .unwrap();

    // Flush before tearing the view down so init ran against a live view.
    flush(&h.router, handle).await;
    h.registry.unregister(handle);
    drop(view);

    h.router.detach_player(handle).unwrap();

    // The barrier view is gone too, so settle by polling the sink.
    for _ in 0..100 {
        if h.factory
            .sink()
            .calls()
            .contains(&SinkCall::SessionEnded)
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.factory.sink().calls().contains(&SinkCall::SessionEnded));
}
