//! Command dispatch router
//!
//! Accepts named commands from arbitrary threads, marshals them onto a
//! single confinement task, resolves the view handle there, and either
//! drives the resolved view or forwards the command to the analytics
//! session. Commands that arrive after a view was torn down are expected,
//! not exceptional: they are logged and dropped, never raised back to the
//! caller. Only the explicitly result-bearing commands (position query,
//! save) complete a reply, exactly once, with a result or an error.

use crate::registry::ResolveView;
use crate::view::PlayerView;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, warn};
use viewtrace_core::{
    AnalyticsSession, Error, InitConfig, Result, SaveOptions, SaveResult, SinkFactory, TagMap,
    ViewHandle,
};

/// Bridge tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Bounded wait for result-bearing commands, in milliseconds
    pub response_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 5_000,
        }
    }
}

impl BridgeConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Unit of work run against a resolved view, or against the absent-view
/// sentinel when resolution fails
pub type ViewOp = Box<dyn FnOnce(Option<Arc<dyn PlayerView>>) + Send>;

/// One dispatched command.
///
/// The enum makes the session's trigger table an explicit, matchable
/// function from (state, trigger) to side effects instead of inline
/// conditionals spread over the command surface.
enum Command {
    Init {
        handle: ViewHandle,
        config: InitConfig,
    },
    PlaybackRequested {
        handle: ViewHandle,
        asset_name: String,
        is_live: bool,
        tags: TagMap,
    },
    SetPlaybackData {
        handle: ViewHandle,
        stream_url: String,
        viewer_id: String,
        tags: TagMap,
    },
    ReportWarning {
        handle: ViewHandle,
        message: String,
    },
    ReportError {
        handle: ViewHandle,
        message: String,
        tags: TagMap,
    },
    SeekStart {
        handle: ViewHandle,
        position: i64,
    },
    SeekEnd {
        handle: ViewHandle,
        position: i64,
    },
    PlaybackEnded {
        handle: ViewHandle,
    },
    Cleanup {
        handle: ViewHandle,
    },
    AttachPlayer {
        handle: ViewHandle,
    },
    DetachPlayer {
        handle: ViewHandle,
    },
    SetPaused {
        handle: ViewHandle,
        paused: bool,
    },
    Seek {
        handle: ViewHandle,
        position: f64,
        tolerance: f64,
    },
    SetVolume {
        handle: ViewHandle,
        volume: f32,
    },
    SetFullscreen {
        handle: ViewHandle,
        fullscreen: bool,
    },
    SetLicenseResult {
        handle: ViewHandle,
        license: Bytes,
        license_url: String,
    },
    SetLicenseError {
        handle: ViewHandle,
        error: String,
        license_url: String,
    },
    CurrentPosition {
        handle: ViewHandle,
        reply: oneshot::Sender<Result<f64>>,
    },
    Save {
        handle: ViewHandle,
        options: SaveOptions,
        reply: oneshot::Sender<Result<SaveResult>>,
    },
    Perform {
        handle: ViewHandle,
        op: ViewOp,
    },
}

/// Thread-safe command surface for an embedded player.
///
/// `new` spawns the confinement task that owns the [`AnalyticsSession`];
/// every public method validates its arguments synchronously and enqueues.
/// Submission order is preserved, so operations against the same handle
/// execute FIFO. Construction requires a running tokio runtime.
pub struct CommandRouter {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandRouter {
    pub fn new(
        resolver: Arc<dyn ResolveView>,
        sink_factory: Arc<dyn SinkFactory>,
        config: BridgeConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            session: AnalyticsSession::new(sink_factory),
            resolver,
            response_timeout: config.response_timeout(),
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| Error::ChannelClosed)
    }

    /// Initialize analytics. Binds the view's player when the view already
    /// has one.
    pub fn init(&self, handle: ViewHandle, config: InitConfig) -> Result<()> {
        if config.customer_key.trim().is_empty() {
            return Err(Error::invalid_argument("customer key must not be empty"));
        }
        self.submit(Command::Init { handle, config })
    }

    pub fn playback_requested(
        &self,
        handle: ViewHandle,
        asset_name: impl Into<String>,
        is_live: bool,
        tags: TagMap,
    ) -> Result<()> {
        self.submit(Command::PlaybackRequested {
            handle,
            asset_name: asset_name.into(),
            is_live,
            tags,
        })
    }

    pub fn set_playback_data(
        &self,
        handle: ViewHandle,
        stream_url: impl Into<String>,
        viewer_id: impl Into<String>,
        tags: TagMap,
    ) -> Result<()> {
        self.submit(Command::SetPlaybackData {
            handle,
            stream_url: stream_url.into(),
            viewer_id: viewer_id.into(),
            tags,
        })
    }

    pub fn report_warning(&self, handle: ViewHandle, message: impl Into<String>) -> Result<()> {
        self.submit(Command::ReportWarning {
            handle,
            message: message.into(),
        })
    }

    pub fn report_error(
        &self,
        handle: ViewHandle,
        message: impl Into<String>,
        tags: TagMap,
    ) -> Result<()> {
        self.submit(Command::ReportError {
            handle,
            message: message.into(),
            tags,
        })
    }

    pub fn set_seek_start(&self, handle: ViewHandle, position: i64) -> Result<()> {
        if position < 0 {
            return Err(Error::invalid_argument("seek position must not be negative"));
        }
        self.submit(Command::SeekStart { handle, position })
    }

    pub fn set_seek_end(&self, handle: ViewHandle, position: i64) -> Result<()> {
        if position < 0 {
            return Err(Error::invalid_argument("seek position must not be negative"));
        }
        self.submit(Command::SeekEnd { handle, position })
    }

    pub fn report_playback_ended(&self, handle: ViewHandle) -> Result<()> {
        self.submit(Command::PlaybackEnded { handle })
    }

    pub fn cleanup(&self, handle: ViewHandle) -> Result<()> {
        self.submit(Command::Cleanup { handle })
    }

    /// Bind the resolved view's player to the analytics session
    pub fn attach_player(&self, handle: ViewHandle) -> Result<()> {
        self.submit(Command::AttachPlayer { handle })
    }

    /// Unbind the resolved view's player, closing its session
    pub fn detach_player(&self, handle: ViewHandle) -> Result<()> {
        self.submit(Command::DetachPlayer { handle })
    }

    pub fn set_paused(&self, handle: ViewHandle, paused: bool) -> Result<()> {
        self.submit(Command::SetPaused { handle, paused })
    }

    pub fn seek(&self, handle: ViewHandle, position: f64, tolerance: f64) -> Result<()> {
        if !position.is_finite() || position < 0.0 {
            return Err(Error::invalid_argument(format!(
                "seek position must be a non-negative number, got {position}"
            )));
        }
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::invalid_argument(format!(
                "seek tolerance must be a non-negative number, got {tolerance}"
            )));
        }
        self.submit(Command::Seek {
            handle,
            position,
            tolerance,
        })
    }

    pub fn set_volume(&self, handle: ViewHandle, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(Error::invalid_argument(format!(
                "volume must be within 0.0..=1.0, got {volume}"
            )));
        }
        self.submit(Command::SetVolume { handle, volume })
    }

    pub fn set_fullscreen(&self, handle: ViewHandle, fullscreen: bool) -> Result<()> {
        self.submit(Command::SetFullscreen { handle, fullscreen })
    }

    /// Forward a fetched DRM license to the view. The payload arrives
    /// base64-encoded and is decoded before enqueue so malformed input is a
    /// synchronous usage error.
    pub fn set_license_result(
        &self,
        handle: ViewHandle,
        license_b64: &str,
        license_url: impl Into<String>,
    ) -> Result<()> {
        let license = BASE64
            .decode(license_b64)
            .map_err(|err| Error::invalid_argument(format!("license payload is not valid base64: {err}")))?;
        self.submit(Command::SetLicenseResult {
            handle,
            license: Bytes::from(license),
            license_url: license_url.into(),
        })
    }

    pub fn set_license_error(
        &self,
        handle: ViewHandle,
        error: impl Into<String>,
        license_url: impl Into<String>,
    ) -> Result<()> {
        self.submit(Command::SetLicenseError {
            handle,
            error: error.into(),
            license_url: license_url.into(),
        })
    }

    /// Current playback position of the view behind `handle`.
    ///
    /// Completes exactly once: with the position, with
    /// [`Error::StaleHandle`] when the handle does not resolve, or with
    /// [`Error::ResponseTimeout`] when the view does not answer within the
    /// configured bound.
    pub async fn current_position(&self, handle: ViewHandle) -> Result<f64> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(Command::CurrentPosition {
            handle,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Persist the media loaded in the view behind `handle`
    pub async fn save(&self, handle: ViewHandle, options: SaveOptions) -> Result<SaveResult> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(Command::Save {
            handle,
            options,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Run `op` on the confinement task with the resolved view, or with
    /// `None` when the handle is stale
    pub fn dispatch_on_view<F>(&self, handle: ViewHandle, op: F) -> Result<()>
    where
        F: FnOnce(Option<Arc<dyn PlayerView>>) + Send + 'static,
    {
        self.submit(Command::Perform {
            handle,
            op: Box::new(op),
        })
    }
}

/// Confinement task state: owns the session, resolves handles, executes
/// commands in submission order
struct Worker {
    session: AnalyticsSession,
    resolver: Arc<dyn ResolveView>,
    response_timeout: Duration,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.route(command).await;
        }
        debug!("command channel closed, dispatch worker exiting");
    }

    /// Resolve a handle for a view-forwarding command, logging the stale
    /// case that gets the command dropped
    fn resolve_view(&self, handle: ViewHandle, command: &'static str) -> Option<Arc<dyn PlayerView>> {
        let view = self.resolver.resolve(handle);
        if view.is_none() {
            debug!(%handle, command, "handle did not resolve to a live view, dropping command");
        }
        view
    }

    async fn route(&mut self, command: Command) {
        match command {
            Command::Init { handle, config } => {
                // The view may not exist yet; analytics still initializes.
                let view = self.resolver.resolve(handle);
                if let Err(err) = self.session.init(config).await {
                    warn!(%err, %handle, "analytics init rejected");
                }
                if let Some(player) = view.as_ref().and_then(|v| v.player()) {
                    self.session.bind_player(&player).await;
                }
            }
            Command::PlaybackRequested {
                handle,
                asset_name,
                is_live,
                tags,
            } => {
                debug!(%handle, asset = %asset_name, "dispatching playback-requested");
                self.session
                    .playback_requested(&asset_name, is_live, tags)
                    .await;
            }
            Command::SetPlaybackData {
                handle,
                stream_url,
                viewer_id,
                tags,
            } => {
                debug!(%handle, "dispatching playback data");
                self.session
                    .set_playback_data(&stream_url, &viewer_id, tags)
                    .await;
            }
            Command::ReportWarning { handle, message } => {
                debug!(%handle, "dispatching warning report");
                self.session.report_warning(&message).await;
            }
            Command::ReportError {
                handle,
                message,
                tags,
            } => {
                debug!(%handle, "dispatching error report");
                self.session.report_error(&message, tags).await;
            }
            Command::SeekStart { handle, position } => {
                debug!(%handle, position, "dispatching seek-start metric");
                self.session.set_seek_start(position).await;
            }
            Command::SeekEnd { handle, position } => {
                debug!(%handle, position, "dispatching seek-end metric");
                self.session.set_seek_end(position).await;
            }
            Command::PlaybackEnded { handle } => {
                debug!(%handle, "dispatching playback-ended");
                self.session.playback_ended().await;
            }
            Command::Cleanup { handle } => {
                debug!(%handle, "dispatching cleanup");
                self.session.cleanup().await;
            }
            Command::AttachPlayer { handle } => {
                if let Some(view) = self.resolve_view(handle, "attach_player") {
                    match view.player() {
                        Some(player) => self.session.bind_player(&player).await,
                        None => debug!(%handle, "view has no player to attach yet"),
                    }
                }
            }
            Command::DetachPlayer { handle } => {
                match self
                    .resolve_view(handle, "detach_player")
                    .and_then(|view| view.player())
                {
                    Some(player) => self.session.unbind_player(&player).await,
                    // View or player already gone; close the session if the
                    // binding died with it.
                    None => self.session.release_dead_binding().await,
                }
            }
            Command::SetPaused { handle, paused } => {
                if let Some(view) = self.resolve_view(handle, "set_paused") {
                    view.set_paused(paused).await;
                }
            }
            Command::Seek {
                handle,
                position,
                tolerance,
            } => {
                if let Some(view) = self.resolve_view(handle, "seek") {
                    view.seek(position, tolerance).await;
                }
            }
            Command::SetVolume { handle, volume } => {
                if let Some(view) = self.resolve_view(handle, "set_volume") {
                    view.set_volume(volume).await;
                }
            }
            Command::SetFullscreen { handle, fullscreen } => {
                if let Some(view) = self.resolve_view(handle, "set_fullscreen") {
                    view.set_fullscreen(fullscreen).await;
                }
            }
            Command::SetLicenseResult {
                handle,
                license,
                license_url,
            } => {
                if let Some(view) = self.resolve_view(handle, "set_license_result") {
                    view.set_license_result(license, license_url).await;
                }
            }
            Command::SetLicenseError {
                handle,
                error,
                license_url,
            } => {
                if let Some(view) = self.resolve_view(handle, "set_license_error") {
                    view.set_license_error(error, license_url).await;
                }
            }
            Command::CurrentPosition { handle, reply } => {
                match self.resolve_view(handle, "current_position") {
                    None => {
                        let _ = reply.send(Err(Error::StaleHandle { handle }));
                    }
                    Some(view) => {
                        // Queried off the confinement task so a slow view
                        // cannot stall the command stream.
                        let bound = self.response_timeout;
                        tokio::spawn(async move {
                            let result = match timeout(bound, view.current_position()).await {
                                Ok(result) => result,
                                Err(_) => Err(Error::ResponseTimeout),
                            };
                            let _ = reply.send(result);
                        });
                    }
                }
            }
            Command::Save {
                handle,
                options,
                reply,
            } => match self.resolve_view(handle, "save") {
                None => {
                    let _ = reply.send(Err(Error::StaleHandle { handle }));
                }
                Some(view) => {
                    let bound = self.response_timeout;
                    tokio::spawn(async move {
                        let result = match timeout(bound, view.save(options)).await {
                            Ok(result) => result,
                            Err(_) => Err(Error::ResponseTimeout),
                        };
                        let _ = reply.send(result);
                    });
                }
            },
            Command::Perform { handle, op } => {
                let view = self.resolver.resolve(handle);
                if view.is_none() {
                    debug!(%handle, "handle did not resolve, running op with absent view");
                }
                op(view);
            }
        }
    }
}
