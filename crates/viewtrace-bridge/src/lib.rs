//! Viewtrace Bridge - Command Dispatch for Embedded Player Views
//!
//! This crate feeds the analytics session in `viewtrace-core`:
//! - A thread-safe command surface callable from timers, network callbacks,
//!   and UI gestures
//! - A single confinement task that owns the session and executes commands
//!   in submission order
//! - View-handle resolution with a swallow-and-report policy for handles
//!   that no longer resolve
//! - Bounded waits for the result-bearing commands (position query, save)
//!
//! ```text
//! caller threads ──► CommandRouter ──► mpsc ──► confinement task
//!                                                  │
//!                                    resolve(handle)│
//!                                                  ▼
//!                                     PlayerView / AnalyticsSession
//! ```

pub mod registry;
pub mod router;
pub mod view;

pub use registry::{ResolveView, ViewRegistry};
pub use router::{BridgeConfig, CommandRouter, ViewOp};
pub use view::PlayerView;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
