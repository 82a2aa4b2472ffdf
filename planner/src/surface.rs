//! The embedded rendering surface and its observable load state.
//!
//! The surface itself is an external collaborator (a browser-like widget that
//! runs the map page). This module defines the contract the pipeline relies on
//! and the load-state property the surface publishes through.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use image::RgbaImage;

/// Load progress of the surface's current document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceLoadState {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl SurfaceLoadState {
    pub fn is_succeeded(self) -> bool {
        self == Self::Succeeded
    }

    /// `Succeeded` or `Failed`.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// A browser-like widget confined to the UI thread.
///
/// Every method except [`MapSurface::load_state`] must be called on the UI
/// thread. The surface is the only writer of its load state.
pub trait MapSurface: Send + Sync {
    /// Starts loading `url`; progress is published through the load state.
    fn load(&self, url: &str);

    fn reload(&self);

    /// Replaces the document with inline HTML. An empty string clears it.
    fn load_content(&self, html: &str);

    fn execute_script(&self, script: &str);

    /// Renders the current document into a bitmap without changing it.
    fn snapshot(&self) -> RgbaImage;

    fn load_state(&self) -> &LoadStateProperty;
}

type Listener = Box<dyn FnOnce(SurfaceLoadState) + Send>;

struct PendingListener {
    id: u64,
    filter: fn(SurfaceLoadState) -> bool,
    listener: Listener,
}

struct PropertyState {
    value: SurfaceLoadState,
    next_id: u64,
    listeners: Vec<PendingListener>,
}

/// Observable load state with single-use subscriptions.
///
/// Listeners are registered with a filter and fire at most once: the first
/// matching change removes them from the registry before they run, so nothing
/// accumulates across repeated loads. Listeners run on the thread that
/// publishes the change, outside the internal lock.
///
/// Clones share the same state and listener registry.
#[derive(Clone)]
pub struct LoadStateProperty {
    inner: Arc<Mutex<PropertyState>>,
}

impl Default for LoadStateProperty {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadStateProperty {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PropertyState {
                value: SurfaceLoadState::Idle,
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn get(&self) -> SurfaceLoadState {
        lock(&self.inner).value
    }

    /// Publishes a new state. Only the owning surface calls this.
    pub fn set(&self, value: SurfaceLoadState) {
        let fired = {
            let mut state = lock(&self.inner);
            if state.value == value {
                return;
            }
            state.value = value;
            let (fired, kept) = std::mem::take(&mut state.listeners)
                .into_iter()
                .partition::<Vec<_>, _>(|pending| (pending.filter)(value));
            state.listeners = kept;
            fired
        };

        for pending in fired {
            (pending.listener)(value);
        }
    }

    /// Runs `listener` on the next change to a state accepted by `filter`.
    pub fn subscribe_once(
        &self,
        filter: fn(SurfaceLoadState) -> bool,
        listener: impl FnOnce(SurfaceLoadState) + Send + 'static,
    ) -> Subscription {
        let mut state = lock(&self.inner);
        self.register(&mut state, filter, Box::new(listener))
    }

    /// Like [`subscribe_once`](Self::subscribe_once), but fires immediately on
    /// the calling thread when the current state is already accepted. The check
    /// and the registration happen under one lock, so no change can slip in
    /// between them.
    pub fn when(
        &self,
        filter: fn(SurfaceLoadState) -> bool,
        listener: impl FnOnce(SurfaceLoadState) + Send + 'static,
    ) -> Subscription {
        let mut state = lock(&self.inner);
        let current = state.value;
        if filter(current) {
            drop(state);
            listener(current);
            return Subscription::fired();
        }
        self.register(&mut state, filter, Box::new(listener))
    }

    /// Number of listeners still waiting to fire.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }

    fn register(
        &self,
        state: &mut PropertyState,
        filter: fn(SurfaceLoadState) -> bool,
        listener: Listener,
    ) -> Subscription {
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push(PendingListener {
            id,
            filter,
            listener,
        });
        Subscription {
            id,
            property: Arc::downgrade(&self.inner),
        }
    }
}

/// Handle to a pending single-use listener.
///
/// Dropping the handle leaves the listener registered; call
/// [`cancel`](Subscription::cancel) to detach it before it fires.
#[must_use = "dropping a Subscription does not detach the listener"]
pub struct Subscription {
    id: u64,
    property: Weak<Mutex<PropertyState>>,
}

impl Subscription {
    fn fired() -> Self {
        Self {
            id: u64::MAX,
            property: Weak::new(),
        }
    }

    /// Whether the listener is still registered.
    pub fn is_pending(&self) -> bool {
        self.property.upgrade().is_some_and(|inner| {
            let state = lock(&inner);
            state.listeners.iter().any(|pending| pending.id == self.id)
        })
    }

    /// Detaches the listener. Returns `false` if it already fired.
    pub fn cancel(self) -> bool {
        let Some(inner) = self.property.upgrade() else {
            return false;
        };
        let mut state = lock(&inner);
        let before = state.listeners.len();
        state.listeners.retain(|pending| pending.id != self.id);
        state.listeners.len() != before
    }
}

fn lock(inner: &Mutex<PropertyState>) -> MutexGuard<'_, PropertyState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
