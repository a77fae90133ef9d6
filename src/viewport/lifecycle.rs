// Open/close lifecycle for the overlay: a small phase machine driven by the
// consumer's `visible` flag and the rendered layer's transition-end signal,
// plus the scroll-lock guard held while any viewer is open.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Lifecycle phase of the overlay layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Side effects the phase machine asks its owner to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    AcquireScrollLock,
    ReleaseScrollLock,
    /// Reset the transform record so the next open starts clean.
    ResetTransform,
}

/// Phase machine over {Closed, Opening, Open, Closing}. The machine only
/// decides; the owner executes the returned effects in order.
#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
    scroll_locked: bool,
    /// Scroll lock is skipped entirely inside a consumer-supplied container.
    custom_container: bool,
}

impl Lifecycle {
    pub fn new(custom_container: bool) -> Self {
        Self {
            phase: Phase::Closed,
            scroll_locked: false,
            custom_container,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Drive the machine from the target `visible` flag. Opening is
    /// immediate; the visual enter transition runs in the rendered layer
    /// and reports back via `transition_finished`.
    pub fn set_visible(&mut self, visible: bool) -> Vec<Effect> {
        let mut effects = Vec::new();
        if visible {
            match self.phase {
                Phase::Closed | Phase::Closing => {
                    // A pending close is cancelled here; the lock was
                    // already released on close, so re-acquire exactly once.
                    self.phase = Phase::Opening;
                    if !self.custom_container && !self.scroll_locked {
                        self.scroll_locked = true;
                        effects.push(Effect::AcquireScrollLock);
                    }
                    self.phase = Phase::Open;
                }
                Phase::Opening | Phase::Open => {}
            }
        } else {
            match self.phase {
                Phase::Open | Phase::Opening => {
                    self.phase = Phase::Closing;
                    effects.push(Effect::ResetTransform);
                    if self.scroll_locked {
                        self.scroll_locked = false;
                        effects.push(Effect::ReleaseScrollLock);
                    }
                }
                Phase::Closed | Phase::Closing => {}
            }
        }
        effects
    }

    /// Transition-end callback from the rendered layer. Completes a close
    /// only when the target flag is still false.
    pub fn transition_finished(&mut self, target_visible: bool) {
        if self.phase == Phase::Closing && !target_visible {
            self.phase = Phase::Closed;
        }
    }

    /// Teardown: release anything still held.
    pub fn dispose(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.scroll_locked {
            self.scroll_locked = false;
            effects.push(Effect::ReleaseScrollLock);
        }
        self.phase = Phase::Closed;
        effects
    }
}

/// Process-wide scroll-lock refcount. Several viewer instances may be open
/// at once; only the 0->1 and 1->0 edges touch the scrolled surface.
static SCROLL_LOCK_COUNT: Lazy<Arc<Mutex<usize>>> = Lazy::new(|| Arc::new(Mutex::new(0)));

/// RAII guard over the shared scroll lock. The lock hook runs when this
/// guard is the first holder, the unlock hook when the last holder drops.
pub struct ScrollLockGuard {
    count: Arc<Mutex<usize>>,
    unlock: Option<Box<dyn FnOnce()>>,
}

impl ScrollLockGuard {
    pub fn acquire(lock: impl FnOnce(), unlock: impl FnOnce() + 'static) -> Self {
        Self::acquire_on(SCROLL_LOCK_COUNT.clone(), lock, unlock)
    }

    /// Acquire against an explicit counter; the public entry point uses the
    /// process-wide one.
    pub fn acquire_on(
        count: Arc<Mutex<usize>>,
        lock: impl FnOnce(),
        unlock: impl FnOnce() + 'static,
    ) -> Self {
        {
            let mut held = count.lock();
            if *held == 0 {
                lock();
            }
            *held += 1;
        }
        Self {
            count,
            unlock: Some(Box::new(unlock)),
        }
    }
}

impl Drop for ScrollLockGuard {
    fn drop(&mut self) {
        let mut held = self.count.lock();
        *held = held.saturating_sub(1);
        if *held == 0 {
            if let Some(unlock) = self.unlock.take() {
                unlock();
            }
        }
    }
}
