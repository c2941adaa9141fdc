//! Player view capability
//!
//! The surface the dispatch bridge drives on a resolved view. Implementors
//! wrap whatever the host UI layer calls a "video view"; the bridge never
//! couples to decode or render APIs.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use viewtrace_core::{PlayerInstance, Result, SaveOptions, SaveResult};

/// A live player view resolved from a [`ViewHandle`](viewtrace_core::ViewHandle)
#[async_trait]
pub trait PlayerView: Send + Sync {
    /// Playback engine currently owned by this view, if one was created
    fn player(&self) -> Option<Arc<dyn PlayerInstance>>;

    async fn set_paused(&self, paused: bool);

    /// Seek to `position` seconds with the given tolerance
    async fn seek(&self, position: f64, tolerance: f64);

    async fn set_volume(&self, volume: f32);

    async fn set_fullscreen(&self, fullscreen: bool);

    /// Current playback position in seconds
    async fn current_position(&self) -> Result<f64>;

    /// Persist the currently loaded media
    async fn save(&self, options: SaveOptions) -> Result<SaveResult>;

    /// Hand a fetched DRM license to the view. The payload is opaque to the
    /// bridge; negotiation happened elsewhere.
    async fn set_license_result(&self, license: Bytes, license_url: String);

    /// Tell the view that license acquisition failed
    async fn set_license_error(&self, error: String, license_url: String);
}
