//! Named fail-point hooks for tests.
//!
//! Production code marks interesting suspension points with
//! [`trigger`]; outside of tests every call is a cheap hash lookup miss.
//! A test installs a hook to pause, fail or observe the marked point.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

type Hook = Arc<dyn Fn() + Send + Sync>;

static HOOKS: Lazy<Mutex<HashMap<String, Hook>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Run the hook registered under `name`, if any.
pub fn trigger(name: &str) {
    let hook = HOOKS.lock().get(name).cloned();
    if let Some(hook) = hook {
        hook();
    }
}

/// Install a hook. Replaces any existing hook with the same name.
pub fn set_hook(name: &str, hook: impl Fn() + Send + Sync + 'static) {
    HOOKS.lock().insert(name.to_string(), Arc::new(hook));
}

/// Remove a hook installed by a test.
pub fn remove_hook(name: &str) {
    HOOKS.lock().remove(name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_trigger_without_hook_is_noop() {
        trigger("nothing_registered_here");
    }

    #[test]
    fn test_hook_fires_and_can_be_removed() {
        static FIRED: AtomicUsize = AtomicUsize::new(0);
        set_hook("test_point", || {
            FIRED.fetch_add(1, Ordering::SeqCst);
        });
        trigger("test_point");
        trigger("test_point");
        assert_eq!(FIRED.load(Ordering::SeqCst), 2);

        remove_hook("test_point");
        trigger("test_point");
        assert_eq!(FIRED.load(Ordering::SeqCst), 2);
    }
}
