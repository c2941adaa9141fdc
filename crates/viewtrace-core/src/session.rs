//! Analytics session state machine
//!
//! Owns the playback-session lifecycle and decides which reports reach the
//! analytics sink:
//! - idempotent initialization that creates the sink client once
//! - implicit cleanup when a new playback session preempts an active one
//! - tag merging across the baseline and session layers
//! - a non-owning binding to the externally-owned player instance
//!
//! Every method assumes single-threaded access; the dispatch bridge
//! serializes all mutations onto one confinement task, so no internal
//! locking is needed here.

use crate::error::{Error, Result};
use crate::sink::{AnalyticsSink, PlayerInstance, SinkFactory, SinkSettings};
use crate::tags::TagStore;
use crate::types::{
    keys, ErrorSeverity, InitConfig, MetricKind, SessionId, SessionState, SinkLogLevel, TagMap,
};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Playback analytics session
///
/// Long-lived, one per process. Created `Uninitialized`; becomes
/// `Initialized` on the first successful [`init`](Self::init) and moves
/// between `Initialized` and `Requested` as playback sessions come and go.
/// Never destroyed except at process teardown; [`reset`](Self::reset) exists
/// for test isolation.
pub struct AnalyticsSession {
    /// Current lifecycle state
    state: SessionState,
    /// Baseline and session tag layers
    tags: TagStore,
    /// Sink client, created once on init
    sink: Option<Arc<dyn AnalyticsSink>>,
    /// Creates the sink client when the session initializes
    factory: Arc<dyn SinkFactory>,
    /// Non-owning reference to the currently bound player
    bound_player: Option<Weak<dyn PlayerInstance>>,
    /// Identifier of the current playback session
    session_id: SessionId,
}

impl AnalyticsSession {
    pub fn new(factory: Arc<dyn SinkFactory>) -> Self {
        Self {
            state: SessionState::Uninitialized,
            tags: TagStore::new(),
            sink: None,
            factory,
            bound_player: None,
            session_id: SessionId::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn session_tags(&self) -> &TagMap {
        self.tags.session()
    }

    pub fn baseline_tags(&self) -> &TagMap {
        self.tags.baseline()
    }

    /// Initialize the session and create the sink client.
    ///
    /// Idempotent: repeat calls while already initialized are no-ops and the
    /// sink is never created twice. Baseline tags are `tags` plus the player
    /// name, and the session layer starts as a copy of them.
    pub async fn init(&mut self, config: InitConfig) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            debug!(state = %self.state, "analytics already initialized, ignoring repeat init");
            return Ok(());
        }

        if config.customer_key.trim().is_empty() {
            return Err(Error::invalid_argument("customer key must not be empty"));
        }

        let settings = SinkSettings {
            customer_key: config.customer_key,
            gateway_url: config.gateway_url,
            log_level: SinkLogLevel::from_debug_flag(config.debug),
        };
        let sink = match self.factory.create(&settings) {
            Ok(sink) => sink,
            Err(err) => {
                // Best-effort: a missing sink means missed reports, never a
                // failed command. Later calls keep no-oping until a retry
                // of init succeeds.
                warn!(%err, "failed to create analytics sink");
                return Ok(());
            }
        };
        self.sink = Some(sink);

        let mut baseline = config.tags;
        if let Some(player_name) = config.player_name {
            baseline.insert(keys::PLAYER_NAME.to_owned(), player_name.into());
        }
        self.tags.seed_baseline(baseline);

        self.state = SessionState::Initialized;
        info!(log_level = ?settings.log_level, "analytics session initialized");
        Ok(())
    }

    /// Report that playback of a new asset was requested.
    ///
    /// An active session is implicitly cleaned up first, so the sink always
    /// sees `end_session` before the new `report_playback_requested`.
    pub async fn playback_requested(&mut self, asset_name: &str, is_live: bool, tags: TagMap) {
        if self.state == SessionState::Uninitialized {
            warn!(asset = asset_name, "playback requested before init, dropping");
            return;
        }

        if self.state == SessionState::Requested {
            self.cleanup().await;
        }

        self.tags
            .insert(keys::IS_LIVE, if is_live { 1i64 } else { 0i64 });
        self.tags.insert(keys::ASSET_NAME, asset_name);
        self.tags.merge(tags);
        self.session_id = SessionId::new();

        let snapshot = self.tags.snapshot();
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.report_playback_requested(&snapshot).await {
                warn!(%err, "sink rejected playback-requested report");
            }
        }

        self.state = SessionState::Requested;
        info!(
            session_id = %self.session_id,
            asset = asset_name,
            is_live,
            "playback session requested"
        );
    }

    /// Merge stream metadata into the session and push it to the sink.
    ///
    /// The bound player is attached to the sink only while a playback
    /// session is active.
    pub async fn set_playback_data(&mut self, stream_url: &str, viewer_id: &str, tags: TagMap) {
        if self.state == SessionState::Uninitialized {
            warn!("playback data before init, dropping");
            return;
        }

        self.tags.insert(keys::VIEWER_ID, viewer_id);
        self.tags.insert(keys::STREAM_URL, stream_url);
        self.tags.merge(tags);

        let player = if self.state == SessionState::Requested {
            self.bound_player()
        } else {
            None
        };

        let snapshot = self.tags.snapshot();
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.set_content_info(&snapshot).await {
                warn!(%err, "sink rejected content info");
            }
            if let Some(player) = player {
                if let Err(err) = sink.attach_player(player).await {
                    warn!(%err, "sink rejected player attach");
                }
            }
        }
    }

    /// Report a non-fatal playback warning. Dropped outside an active
    /// session.
    pub async fn report_warning(&mut self, message: &str) {
        if self.state != SessionState::Requested {
            debug!(message, "warning outside active session, dropping");
            return;
        }
        if let Some(sink) = &self.sink {
            if let Err(err) = sink
                .report_playback_error(message, ErrorSeverity::Warning)
                .await
            {
                warn!(%err, "sink rejected warning report");
            }
        }
    }

    /// Report a fatal playback error.
    ///
    /// Tags are merged into the session layer whenever the session is
    /// initialized, even with no playback session active; the sink emission
    /// itself only happens while `Requested`.
    pub async fn report_error(&mut self, message: &str, tags: TagMap) {
        if self.state == SessionState::Uninitialized {
            warn!(message, "error report before init, dropping");
            return;
        }

        self.tags.merge(tags);

        if self.state != SessionState::Requested {
            debug!(message, "error outside active session, tags recorded only");
            return;
        }

        let snapshot = self.tags.snapshot();
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.set_content_info(&snapshot).await {
                warn!(%err, "sink rejected content info");
            }
            if let Err(err) = sink
                .report_playback_error(message, ErrorSeverity::Fatal)
                .await
            {
                warn!(%err, "sink rejected error report");
            }
        }
    }

    /// Report the position at which a seek started
    pub async fn set_seek_start(&mut self, position: i64) {
        self.report_metric(MetricKind::SeekStarted, position).await;
    }

    /// Report the position at which a seek landed
    pub async fn set_seek_end(&mut self, position: i64) {
        self.report_metric(MetricKind::SeekEnded, position).await;
    }

    async fn report_metric(&mut self, kind: MetricKind, value: i64) {
        if self.state != SessionState::Requested {
            debug!(?kind, value, "seek metric outside active session, dropping");
            return;
        }
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.report_playback_metric(kind, value).await {
                warn!(%err, ?kind, "sink rejected playback metric");
            }
        }
    }

    /// Report the end of the current playback session
    pub async fn playback_ended(&mut self) {
        self.cleanup().await;
    }

    /// Close the active playback session, if any.
    ///
    /// Emits `end_session` then `teardown_session`, and re-seeds the session
    /// tags from the baseline. A no-op unless a session is active.
    pub async fn cleanup(&mut self) {
        if self.state != SessionState::Requested {
            debug!(state = %self.state, "no active playback session to clean up");
            return;
        }

        if let Some(sink) = &self.sink {
            if let Err(err) = sink.end_session().await {
                warn!(%err, "sink rejected session end");
            }
            if let Err(err) = sink.teardown_session().await {
                warn!(%err, "sink rejected session teardown");
            }
        }

        self.tags.reset_to_baseline();
        self.state = SessionState::Initialized;
        info!(session_id = %self.session_id, "playback session ended");
    }

    /// Bind a player instance without taking ownership.
    ///
    /// A different player replacing the current one closes the previous
    /// session first; player identity changes are the only reliable signal
    /// that the previous media item is done. Re-binding the same player is
    /// idempotent.
    pub async fn bind_player(&mut self, player: &Arc<dyn PlayerInstance>) {
        let incoming = Arc::downgrade(player);
        let already_bound = matches!(
            &self.bound_player,
            Some(current) if Weak::ptr_eq(current, &incoming)
        );
        if already_bound {
            debug!("player already bound to analytics session");
            return;
        }
        if self.bound_player.is_some() {
            self.cleanup().await;
        }
        self.bound_player = Some(incoming);
        debug!("player bound to analytics session");
    }

    /// Unbind `player` if it is the current binding; otherwise a no-op
    /// (the binding was already replaced).
    pub async fn unbind_player(&mut self, player: &Arc<dyn PlayerInstance>) {
        let incoming = Arc::downgrade(player);
        let is_current = matches!(
            &self.bound_player,
            Some(current) if Weak::ptr_eq(current, &incoming)
        );
        if !is_current {
            debug!("unbind for a player that is not bound, ignoring");
            return;
        }
        self.cleanup().await;
        self.bound_player = None;
        debug!("player unbound from analytics session");
    }

    /// Drop the binding if the player behind it no longer exists.
    ///
    /// The binding is non-owning, so the view layer may tear the player down
    /// without telling us; every use checks liveness instead of assuming it.
    pub async fn release_dead_binding(&mut self) {
        let dead = matches!(
            &self.bound_player,
            Some(weak) if weak.upgrade().is_none()
        );
        if dead {
            self.cleanup().await;
            self.bound_player = None;
            debug!("released binding to a dropped player");
        }
    }

    /// The bound player, if it is still alive
    pub fn bound_player(&self) -> Option<Arc<dyn PlayerInstance>> {
        self.bound_player.as_ref().and_then(Weak::upgrade)
    }

    /// Reset to the pristine uninitialized state.
    ///
    /// Test-isolation hook: the session is process-wide and never torn down
    /// in production, so suites reset it between cases instead of relying on
    /// process restart.
    pub fn reset(&mut self) {
        self.state = SessionState::Uninitialized;
        self.tags = TagStore::new();
        self.sink = None;
        self.bound_player = None;
        self.session_id = SessionId::new();
    }
}
