use std::collections::HashSet;
use std::sync::{OnceLock, RwLock};

fn registry() -> &'static RwLock<HashSet<String>> {
    static FAILPOINTS: OnceLock<RwLock<HashSet<String>>> = OnceLock::new();
    FAILPOINTS.get_or_init(|| RwLock::new(HashSet::new()))
}

/// Arm a named fail point.
pub fn arm(name: &str) {
    registry().write().unwrap().insert(name.to_string());
    tracing::debug!(name, "armed fail point");
}

/// Disarm one fail point.
pub fn clear(name: &str) {
    registry().write().unwrap().remove(name);
}

/// Disarm every fail point.
pub fn clear_all() {
    registry().write().unwrap().clear();
}

pub fn is_armed(name: &str) -> bool {
    registry().read().unwrap().contains(name)
}

/// Serialises tests that touch the process-wide registry.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<std::sync::Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| std::sync::Mutex::new(()))
        .lock()
        .unwrap()
}
