//! Viewtrace Core - Playback Analytics Session Management
//!
//! This crate provides the core functionality for reporting playback
//! analytics from an embeddable media player:
//! - Session state machine mirroring the player's real playback lifecycle
//! - Two-layer tag store (baseline and per-session metadata)
//! - Analytics sink boundary with an HTTP beacon implementation
//! - Non-owning player binding with liveness checks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Viewtrace Core                       │
//! ├─────────────────────────────────────────────────────────┤
//! │                                                         │
//! │  ┌──────────────┐        ┌───────────────────┐          │
//! │  │   Tag Store  │◄───────┤     Analytics     │          │
//! │  │  (baseline / │        │      Session      │          │
//! │  │   session)   │        │  (state machine)  │          │
//! │  └──────────────┘        └─────────┬─────────┘          │
//! │                                    │                    │
//! │                     ┌──────────────┴─────────────┐      │
//! │                     │                            │      │
//! │              ┌──────┴──────┐             ┌───────┴────┐ │
//! │              │  Analytics  │             │   Player   │ │
//! │              │    Sink     │             │  Binding   │ │
//! │              │ (boundary)  │             │   (weak)   │ │
//! │              └─────────────┘             └────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! All mutations of the session are expected to arrive on a single
//! confinement task; `viewtrace-bridge` provides the dispatch layer that
//! enforces this for commands originating on arbitrary threads.

pub mod error;
pub mod session;
pub mod sink;
pub mod tags;
pub mod types;

pub use error::{Error, Result};
pub use session::AnalyticsSession;
pub use sink::{
    AnalyticsSink, BeaconFactory, BeaconSink, PlayerInstance, RecordingFactory, RecordingSink,
    SinkCall, SinkFactory, SinkSettings,
};
pub use tags::TagStore;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
