//! End-to-end bridge demo
//!
//! Wires a demo player view into the command bridge, drives a full playback
//! session from the "UI" side, and prints the sink calls the session
//! produced.
//!
//! Run with: cargo run -p viewtrace-bridge --example bridge_demo

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use viewtrace_bridge::{BridgeConfig, CommandRouter, PlayerView, ViewRegistry};
use viewtrace_core::{
    InitConfig, PlayerInstance, RecordingFactory, SaveOptions, SaveResult, TagMap, TagValue,
    ViewHandle,
};

#[derive(Debug)]
struct DemoPlayer;
impl PlayerInstance for DemoPlayer {}

struct DemoView {
    player: Arc<dyn PlayerInstance>,
}

impl DemoView {
    fn new() -> Self {
        Self {
            player: Arc::new(DemoPlayer),
        }
    }
}

#[async_trait]
impl PlayerView for DemoView {
    fn player(&self) -> Option<Arc<dyn PlayerInstance>> {
        Some(self.player.clone())
    }

    async fn set_paused(&self, paused: bool) {
        println!("view: paused = {paused}");
    }

    async fn seek(&self, position: f64, tolerance: f64) {
        println!("view: seek to {position}s (tolerance {tolerance}s)");
    }

    async fn set_volume(&self, volume: f32) {
        println!("view: volume = {volume}");
    }

    async fn set_fullscreen(&self, fullscreen: bool) {
        println!("view: fullscreen = {fullscreen}");
    }

    async fn current_position(&self) -> viewtrace_core::Result<f64> {
        Ok(127.3)
    }

    async fn save(&self, _options: SaveOptions) -> viewtrace_core::Result<SaveResult> {
        Ok(SaveResult {
            uri: "file:///tmp/demo.mp4".to_owned(),
        })
    }

    async fn set_license_result(&self, license: Bytes, license_url: String) {
        println!("view: license ({} bytes) from {license_url}", license.len());
    }

    async fn set_license_error(&self, error: String, license_url: String) {
        println!("view: license error '{error}' from {license_url}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let registry = Arc::new(ViewRegistry::new());
    let factory = Arc::new(RecordingFactory::new());
    let router = CommandRouter::new(registry.clone(), factory.clone(), BridgeConfig::default());

    let view: Arc<dyn PlayerView> = Arc::new(DemoView::new());
    let handle = ViewHandle(1);
    registry.register(handle, &view);

    let mut tags = TagMap::new();
    tags.insert("app".to_owned(), TagValue::from("bridge-demo"));
    router.init(
        handle,
        InitConfig {
            customer_key: "DEMO-KEY".to_owned(),
            gateway_url: None,
            player_name: Some("viewtrace-demo".to_owned()),
            tags,
            debug: true,
        },
    )?;

    router.playback_requested(handle, "big-buck-bunny", false, TagMap::new())?;
    router.set_playback_data(
        handle,
        "https://cdn.example.com/bbb/master.m3u8",
        "viewer-1",
        TagMap::new(),
    )?;

    router.set_paused(handle, false)?;
    router.seek(handle, 120.0, 0.5)?;
    router.set_seek_start(handle, 30_000)?;
    router.set_seek_end(handle, 120_000)?;

    let position = router.current_position(handle).await?;
    println!("current position: {position}s");

    router.report_playback_ended(handle)?;

    // One more query so every queued command has drained before we read the
    // recorded calls.
    router.current_position(handle).await?;

    println!("\nsink calls:");
    for call in factory.sink().calls() {
        println!("  {call:?}");
    }

    Ok(())
}
