use std::sync::atomic::{AtomicBool, Ordering};

/// Host environment queried before a transport is used.
///
/// `medium_available` answers "can this transport be used right now" (network
/// interface up, adapter switched on, ...). `notify_unavailable` is the hook the
/// hosting application uses to tell the user why a device could not be prepared.
pub trait Environment: Send + Sync {
    fn medium_available(&self) -> bool;

    fn notify_unavailable(&self, _device: &str) {}
}

/// Environment that always reports the medium as available.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAvailable;

impl Environment for AlwaysAvailable {
    fn medium_available(&self) -> bool {
        true
    }
}

/// Switchable environment, useful for hosts that track connectivity changes.
#[derive(Debug)]
pub struct FlagEnvironment {
    available: AtomicBool,
    notified: AtomicBool,
}

impl FlagEnvironment {
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
            notified: AtomicBool::new(false),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// True once `notify_unavailable` has been called at least once.
    pub fn was_notified(&self) -> bool {
        self.notified.load(Ordering::SeqCst)
    }
}

impl Environment for FlagEnvironment {
    fn medium_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn notify_unavailable(&self, device: &str) {
        tracing::info!(device, "transport medium unavailable");
        self.notified.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_environment_toggles() {
        let env = FlagEnvironment::new(false);
        assert!(!env.medium_available());
        env.set_available(true);
        assert!(env.medium_available());
        assert!(!env.was_notified());
        env.notify_unavailable("kitchen");
        assert!(env.was_notified());
    }
}
