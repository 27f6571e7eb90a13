//! Client-control primitives used by the lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};

/// Platform hooks the lifecycle drives during install and activate.
pub trait Registration: Send + Sync {
    fn supports_navigation_preload(&self) -> bool;

    fn enable_navigation_preload(&self);

    fn navigation_preload_enabled(&self) -> bool;

    /// Activate as soon as install finishes instead of waiting for the
    /// previous version's clients to go away.
    fn skip_waiting(&self);

    /// Take control of every open client immediately.
    fn claim_clients(&self);

    fn controls_clients(&self) -> bool;
}

/// In-process registration backed by atomics.
#[derive(Debug)]
pub struct LocalRegistration {
    preload_supported: bool,
    preload_enabled: AtomicBool,
    skip_waiting: AtomicBool,
    claimed: AtomicBool,
}

impl LocalRegistration {
    pub fn new(preload_supported: bool) -> Self {
        Self {
            preload_supported,
            preload_enabled: AtomicBool::new(false),
            skip_waiting: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
        }
    }

    pub fn is_skip_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }
}

impl Default for LocalRegistration {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Registration for LocalRegistration {
    fn supports_navigation_preload(&self) -> bool {
        self.preload_supported
    }

    fn enable_navigation_preload(&self) {
        if self.preload_supported {
            self.preload_enabled.store(true, Ordering::Release);
        }
    }

    fn navigation_preload_enabled(&self) -> bool {
        self.preload_enabled.load(Ordering::Acquire)
    }

    fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    fn claim_clients(&self) {
        self.claimed.store(true, Ordering::Release);
    }

    fn controls_clients(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}
