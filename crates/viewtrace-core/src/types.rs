//! Core types for Viewtrace

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;

/// Opaque handle addressing a player view owned by the host UI layer.
///
/// Callers never hold the view directly; every command carries a handle that
/// the dispatch bridge resolves to a live instance, or to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewHandle(pub i64);

impl std::fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ViewHandle {
    fn from(tag: i64) -> Self {
        Self(tag)
    }
}

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar metadata value carried in session tags.
///
/// The sink wire format only understands strings, numbers, and booleans, so
/// the store never holds anything richer. Liveness flags in particular are
/// reported as `0`/`1` numbers, not booleans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagValue::Str(s) => write!(f, "{s}"),
            TagValue::Num(n) => write!(f, "{n}"),
            TagValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Str(value.to_owned())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Str(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Num(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Num(value as f64)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::Num(value as f64)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

/// Session metadata map. Uniqueness by key is the only structural invariant;
/// iteration order is never observable.
pub type TagMap = HashMap<String, TagValue>;

/// Well-known tag keys understood by the analytics backend.
pub mod keys {
    pub const PLAYER_NAME: &str = "playerName";
    pub const ASSET_NAME: &str = "assetName";
    pub const IS_LIVE: &str = "isLive";
    pub const VIEWER_ID: &str = "viewerId";
    pub const STREAM_URL: &str = "streamUrl";
}

/// Lifecycle state of the analytics session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No sink client exists yet; every reporting command is dropped.
    Uninitialized,
    /// Sink client created, baseline tags seeded, no playback session active.
    Initialized,
    /// A playback session has been requested and is being reported.
    Requested,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Initialized => write!(f, "initialized"),
            SessionState::Requested => write!(f, "requested"),
        }
    }
}

/// Severity attached to a playback error report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Warning,
    Fatal,
}

/// Playback metric kinds forwarded to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    SeekStarted,
    SeekEnded,
}

impl MetricKind {
    /// Stable wire name used by beacon payloads
    pub fn wire_name(&self) -> &'static str {
        match self {
            MetricKind::SeekStarted => "playback_seek_started",
            MetricKind::SeekEnded => "playback_seek_ended",
        }
    }
}

/// Log level requested from the sink client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkLogLevel {
    None,
    Debug,
}

impl SinkLogLevel {
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug {
            SinkLogLevel::Debug
        } else {
            SinkLogLevel::None
        }
    }
}

/// Arguments for initializing the analytics session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfig {
    /// Customer key identifying the analytics account
    pub customer_key: String,
    /// Optional gateway endpoint; the sink falls back to its default when absent
    #[serde(default)]
    pub gateway_url: Option<Url>,
    /// Player name reported as a baseline tag
    #[serde(default)]
    pub player_name: Option<String>,
    /// Baseline tags (customer and player identity, static metadata)
    #[serde(default)]
    pub tags: TagMap,
    /// Enables verbose sink logging
    #[serde(default)]
    pub debug: bool,
}

/// Options for the async save command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOptions {
    /// Destination path hint; the view picks a location when absent
    #[serde(default)]
    pub path: Option<String>,
}

/// Result of a completed save command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    /// URI of the saved media
    pub uri: String,
}
