use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};
use sr_engine::{NativeContext, NativeModel};

/// The native model and its execution context.
///
/// Fields drop in declaration order, so the context is always released
/// before the model it was created from.
pub struct NativeResources {
    pub context: Box<dyn NativeContext>,
    pub model: Box<dyn NativeModel>,
}

/// One loaded model plus execution context, shared between the registry and
/// every in-flight call.
///
/// The three control flags are independent atomics:
/// - `cancel_requested`: liveness hint polled by the decode loop, relaxed.
/// - `poisoned`: one-way latch set by unload, acquire/release.
/// - `running`: true for exactly one inference call, owned by [`LifetimeGuard`].
///
/// [`LifetimeGuard`]: crate::guard::LifetimeGuard
pub struct Session {
    resources: Mutex<Option<NativeResources>>,
    n_ctx: u32,
    n_threads: u32,
    cancel_requested: AtomicBool,
    poisoned: AtomicBool,
    running: AtomicBool,
    abandoned: AtomicBool,
}

impl Session {
    pub fn new(resources: NativeResources, n_ctx: u32, n_threads: u32) -> Self {
        Self {
            resources: Mutex::new(Some(resources)),
            n_ctx,
            n_threads,
            cancel_requested: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
            running: AtomicBool::new(false),
            abandoned: AtomicBool::new(false),
        }
    }

    pub fn n_ctx(&self) -> u32 {
        self.n_ctx
    }

    pub fn n_threads(&self) -> u32 {
        self.n_threads
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub fn clear_cancel(&self) {
        self.cancel_requested.store(false, Ordering::Relaxed);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Relaxed)
    }

    pub(crate) fn cancel_flag(&self) -> &AtomicBool {
        &self.cancel_requested
    }

    /// Latch the poisoned flag. Never cleared.
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::Release);
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn running_flag(&self) -> &AtomicBool {
        &self.running
    }

    /// Whether the native resources are still held by this session.
    ///
    /// Reports `true` while a call holds them.
    pub fn has_resources(&self) -> bool {
        match self.resources.try_lock() {
            Some(res) => res.is_some(),
            None => true,
        }
    }

    /// Exclusive access to the native resources, without blocking.
    pub(crate) fn try_lock_resources(&self) -> Option<MutexGuard<'_, Option<NativeResources>>> {
        self.resources.try_lock()
    }

    /// Take the resources out if nobody is using them.
    ///
    /// `Err(())` means the lock is held by an in-flight call.
    pub(crate) fn try_take_resources(&self) -> Result<Option<NativeResources>, ()> {
        self.resources.try_lock().map(|mut res| res.take()).ok_or(())
    }

    /// Teardown gave up on this session: its native resources must never be
    /// freed, even when the last reference drops.
    pub(crate) fn abandon(&self) {
        self.abandoned.store(true, Ordering::Release);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !*self.abandoned.get_mut() {
            return;
        }
        if let Some(resources) = self.resources.get_mut().take() {
            tracing::warn!("dropping abandoned session, leaking its native resources");
            std::mem::forget(resources);
        }
    }
}
