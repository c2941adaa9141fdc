//! View handle resolution
//!
//! The resolution table itself is owned by the host UI framework; the bridge
//! only consumes a resolve operation. [`ViewRegistry`] is a weak-reference
//! in-memory implementation for embedders that have no registry of their
//! own, and for tests.

use crate::view::PlayerView;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use tracing::debug;
use viewtrace_core::ViewHandle;

/// Resolves an opaque handle to a live player view.
///
/// Must be safe to call from the bridge's confinement task. Returning `None`
/// covers every expected failure: stale handle, wrong view kind, torn-down
/// registry.
pub trait ResolveView: Send + Sync {
    fn resolve(&self, handle: ViewHandle) -> Option<Arc<dyn PlayerView>>;
}

/// In-memory handle-to-view table holding weak references.
///
/// Views stay owned by the host layer; dropping a view there makes its
/// handle resolve to `None` here without any unregistration race.
#[derive(Default)]
pub struct ViewRegistry {
    views: RwLock<HashMap<ViewHandle, Weak<dyn PlayerView>>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: ViewHandle, view: &Arc<dyn PlayerView>) {
        self.views
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .insert(handle, Arc::downgrade(view));
        debug!(%handle, "view registered");
    }

    pub fn unregister(&self, handle: ViewHandle) {
        self.views
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .remove(&handle);
        debug!(%handle, "view unregistered");
    }
}

impl ResolveView for ViewRegistry {
    fn resolve(&self, handle: ViewHandle) -> Option<Arc<dyn PlayerView>> {
        self.views
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(&handle)
            .and_then(Weak::upgrade)
    }
}
