//! Analytics sink boundary
//!
//! The session state machine reports through the [`AnalyticsSink`]
//! capability and never sees the backend's wire protocol. Failures from a
//! sink are best-effort: callers log and move on, they never propagate a
//! sink error as a command failure.

use crate::error::{Error, Result};
use crate::types::{ErrorSeverity, MetricKind, SinkLogLevel, TagMap};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

/// Opaque playback engine capability.
///
/// The core attaches and detaches instances from the sink and reads nothing
/// else; identity is `Arc` pointer identity.
pub trait PlayerInstance: Send + Sync + fmt::Debug {}

/// External analytics backend for playback session events
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn report_playback_requested(&self, tags: &TagMap) -> Result<()>;
    async fn set_content_info(&self, tags: &TagMap) -> Result<()>;
    async fn report_playback_error(&self, message: &str, severity: ErrorSeverity) -> Result<()>;
    async fn report_playback_metric(&self, kind: MetricKind, value: i64) -> Result<()>;
    async fn attach_player(&self, player: Arc<dyn PlayerInstance>) -> Result<()>;
    async fn end_session(&self) -> Result<()>;
    async fn teardown_session(&self) -> Result<()>;
}

/// Settings handed to a [`SinkFactory`] when the session initializes
#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub customer_key: String,
    pub gateway_url: Option<Url>,
    pub log_level: SinkLogLevel,
}

/// Creates the sink client once per process, on the first successful init
pub trait SinkFactory: Send + Sync {
    fn create(&self, settings: &SinkSettings) -> Result<Arc<dyn AnalyticsSink>>;
}

/// Wire payload posted by the beacon sink
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BeaconEvent {
    event: &'static str,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<TagMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<ErrorSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metric: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<i64>,
}

impl BeaconEvent {
    fn named(event: &'static str) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
            tags: None,
            message: None,
            severity: None,
            metric: None,
            value: None,
        }
    }
}

/// HTTP beacon sink
///
/// Events are queued onto a channel and drained by a background forwarder so
/// reporting never blocks the confinement task on network I/O. Posts are
/// fire-and-forget; a failed beacon is logged and dropped, never retried.
pub struct BeaconSink {
    event_tx: mpsc::Sender<BeaconEvent>,
}

impl BeaconSink {
    /// Queue capacity before reports start being rejected
    const CHANNEL_CAPACITY: usize = 1000;

    pub fn new(settings: &SinkSettings, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        let endpoint = settings.gateway_url.clone();
        let log_level = settings.log_level;
        let (event_tx, mut event_rx) = mpsc::channel::<BeaconEvent>(Self::CHANNEL_CAPACITY);

        // Background forwarder owns the HTTP client
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if log_level == SinkLogLevel::Debug {
                    let payload = serde_json::to_string(&event).unwrap_or_default();
                    debug!(event = event.event, %payload, "beacon event");
                }
                match &endpoint {
                    Some(url) => {
                        if let Err(err) = client.post(url.clone()).json(&event).send().await {
                            debug!(%err, event = event.event, "beacon post failed");
                        }
                    }
                    None => {
                        debug!(event = event.event, "no gateway configured, event dropped");
                    }
                }
            }
        });

        Ok(Self { event_tx })
    }

    async fn enqueue(&self, event: BeaconEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| Error::Sink("beacon forwarder is gone".to_owned()))
    }
}

#[async_trait]
impl AnalyticsSink for BeaconSink {
    async fn report_playback_requested(&self, tags: &TagMap) -> Result<()> {
        let mut event = BeaconEvent::named("playback_requested");
        event.tags = Some(tags.clone());
        self.enqueue(event).await
    }

    async fn set_content_info(&self, tags: &TagMap) -> Result<()> {
        let mut event = BeaconEvent::named("content_info");
        event.tags = Some(tags.clone());
        self.enqueue(event).await
    }

    async fn report_playback_error(&self, message: &str, severity: ErrorSeverity) -> Result<()> {
        let mut event = BeaconEvent::named("playback_error");
        event.message = Some(message.to_owned());
        event.severity = Some(severity);
        self.enqueue(event).await
    }

    async fn report_playback_metric(&self, kind: MetricKind, value: i64) -> Result<()> {
        let mut event = BeaconEvent::named("playback_metric");
        event.metric = Some(kind.wire_name());
        event.value = Some(value);
        self.enqueue(event).await
    }

    async fn attach_player(&self, player: Arc<dyn PlayerInstance>) -> Result<()> {
        debug!(?player, "player attached to beacon sink");
        self.enqueue(BeaconEvent::named("player_attached")).await
    }

    async fn end_session(&self) -> Result<()> {
        self.enqueue(BeaconEvent::named("playback_ended")).await
    }

    async fn teardown_session(&self) -> Result<()> {
        self.enqueue(BeaconEvent::named("session_teardown")).await
    }
}

/// Factory producing [`BeaconSink`] clients
#[derive(Debug, Clone)]
pub struct BeaconFactory {
    request_timeout: Duration,
}

impl BeaconFactory {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for BeaconFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl SinkFactory for BeaconFactory {
    fn create(&self, settings: &SinkSettings) -> Result<Arc<dyn AnalyticsSink>> {
        Ok(Arc::new(BeaconSink::new(settings, self.request_timeout)?))
    }
}

/// One recorded sink invocation
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    PlaybackRequested(TagMap),
    ContentInfo(TagMap),
    PlaybackError {
        message: String,
        severity: ErrorSeverity,
    },
    Metric {
        kind: MetricKind,
        value: i64,
    },
    PlayerAttached,
    SessionEnded,
    SessionTorndown,
}

/// In-memory sink that records every call in order.
///
/// Used by the test suites to pin call sequences, and handy as a diagnostics
/// sink in embedder smoke tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered snapshot of every recorded call
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.calls
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clear();
    }

    fn record(&self, call: SinkCall) {
        self.calls
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(call);
    }
}

#[async_trait]
impl AnalyticsSink for RecordingSink {
    async fn report_playback_requested(&self, tags: &TagMap) -> Result<()> {
        self.record(SinkCall::PlaybackRequested(tags.clone()));
        Ok(())
    }

    async fn set_content_info(&self, tags: &TagMap) -> Result<()> {
        self.record(SinkCall::ContentInfo(tags.clone()));
        Ok(())
    }

    async fn report_playback_error(&self, message: &str, severity: ErrorSeverity) -> Result<()> {
        self.record(SinkCall::PlaybackError {
            message: message.to_owned(),
            severity,
        });
        Ok(())
    }

    async fn report_playback_metric(&self, kind: MetricKind, value: i64) -> Result<()> {
        self.record(SinkCall::Metric { kind, value });
        Ok(())
    }

    async fn attach_player(&self, _player: Arc<dyn PlayerInstance>) -> Result<()> {
        self.record(SinkCall::PlayerAttached);
        Ok(())
    }

    async fn end_session(&self) -> Result<()> {
        self.record(SinkCall::SessionEnded);
        Ok(())
    }

    async fn teardown_session(&self) -> Result<()> {
        self.record(SinkCall::SessionTorndown);
        Ok(())
    }
}

/// Factory handing out one shared [`RecordingSink`]
#[derive(Debug, Default)]
pub struct RecordingFactory {
    sink: Arc<RecordingSink>,
    created: AtomicUsize,
    last_settings: Mutex<Option<SinkSettings>>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> Arc<RecordingSink> {
        Arc::clone(&self.sink)
    }

    /// Number of times the session asked for a sink client
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Settings from the most recent create call
    pub fn last_settings(&self) -> Option<SinkSettings> {
        self.last_settings
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
}

impl SinkFactory for RecordingFactory {
    fn create(&self, settings: &SinkSettings) -> Result<Arc<dyn AnalyticsSink>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        *self
            .last_settings
            .lock()
            .unwrap_or_else(|err| err.into_inner()) = Some(settings.clone());
        Ok(self.sink())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_sink_preserves_order() {
        let sink = RecordingSink::new();
        sink.report_playback_requested(&TagMap::new()).await.unwrap();
        sink.report_playback_metric(MetricKind::SeekStarted, 10)
            .await
            .unwrap();
        sink.end_session().await.unwrap();

        let calls = sink.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], SinkCall::PlaybackRequested(TagMap::new()));
        assert_eq!(
            calls[1],
            SinkCall::Metric {
                kind: MetricKind::SeekStarted,
                value: 10
            }
        );
        assert_eq!(calls[2], SinkCall::SessionEnded);
    }

    #[tokio::test]
    async fn test_recording_factory_counts_creates() {
        let factory = RecordingFactory::new();
        let settings = SinkSettings {
            customer_key: "CK1".to_owned(),
            gateway_url: None,
            log_level: SinkLogLevel::None,
        };

        factory.create(&settings).unwrap();
        factory.create(&settings).unwrap();

        assert_eq!(factory.created(), 2);
        assert_eq!(factory.last_settings().unwrap().customer_key, "CK1");
    }

    #[tokio::test]
    async fn test_beacon_sink_without_gateway_accepts_events() {
        let settings = SinkSettings {
            customer_key: "CK1".to_owned(),
            gateway_url: None,
            log_level: SinkLogLevel::Debug,
        };
        let sink = BeaconSink::new(&settings, Duration::from_secs(1)).unwrap();

        // No endpoint configured; events are drained and dropped, reporting
        // still succeeds.
        sink.report_playback_requested(&TagMap::new()).await.unwrap();
        sink.end_session().await.unwrap();
    }
}
