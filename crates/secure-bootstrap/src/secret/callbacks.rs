//! Per-secret update callbacks.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::SystemTime,
};

use common::SecretError;
use tracing::debug;

/// Invoked with the name of the secret that changed.
pub type SecretUpdatedCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Registration name that catches updates with no exact-name callback.
pub const WILDCARD_SECRET_NAME: &str = "*";

/// Callback table plus the provider's last-updated timestamp.
///
/// Callbacks are cloned out of the table and run with no lock held, so a
/// callback may read secrets or (de)register other callbacks.
pub struct CallbackRegistry {
    callbacks: Mutex<HashMap<String, SecretUpdatedCallback>>,
    last_updated: Mutex<SystemTime>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(HashMap::new()),
            last_updated: Mutex::new(SystemTime::now()),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, SecretUpdatedCallback>> {
        self.callbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `callback` for `secret_name`.
    ///
    /// # Errors
    ///
    /// [`SecretError::DuplicateCallback`] if that exact name already has one.
    pub fn register(
        &self,
        secret_name: &str,
        callback: SecretUpdatedCallback,
    ) -> Result<(), SecretError> {
        let mut table = self.table();
        if table.contains_key(secret_name) {
            return Err(SecretError::DuplicateCallback(secret_name.to_owned()));
        }
        table.insert(secret_name.to_owned(), callback);
        Ok(())
    }

    /// Remove the callback for `secret_name`. No-op when none is registered.
    pub fn deregister(&self, secret_name: &str) {
        self.table().remove(secret_name);
    }

    /// Stamp the update time and run the exact-name callback, falling back to
    /// the wildcard one. Exactly one callback runs, or none.
    pub fn dispatch(&self, secret_name: &str) {
        self.touch();

        let callback = {
            let table = self.table();
            table
                .get(secret_name)
                .or_else(|| table.get(WILDCARD_SECRET_NAME))
                .cloned()
        };

        match callback {
            Some(cb) => cb(secret_name),
            None => debug!(secret_name, "no update callback registered"),
        }
    }

    fn touch(&self) {
        *self
            .last_updated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = SystemTime::now();
    }

    pub fn last_updated(&self) -> SystemTime {
        *self
            .last_updated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (SecretUpdatedCallback, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: SecretUpdatedCallback = Arc::new(move |name: &str| {
            sink.lock().unwrap().push(name.to_owned());
        });
        (cb, seen)
    }

    #[test]
    fn exact_name_beats_wildcard() {
        let registry = CallbackRegistry::new();
        let (exact, exact_seen) = recorder();
        let (wild, wild_seen) = recorder();
        registry.register("mqtt", exact).unwrap();
        registry.register(WILDCARD_SECRET_NAME, wild).unwrap();

        registry.dispatch("mqtt");
        registry.dispatch("db");

        assert_eq!(*exact_seen.lock().unwrap(), vec!["mqtt".to_string()]);
        assert_eq!(*wild_seen.lock().unwrap(), vec!["db".to_string()]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = CallbackRegistry::new();
        let (a, _) = recorder();
        let (b, _) = recorder();
        registry.register("mqtt", a).unwrap();

        let err = registry.register("mqtt", b).unwrap_err();
        assert_eq!(err, SecretError::DuplicateCallback("mqtt".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn deregister_allows_reregistration() {
        let registry = CallbackRegistry::new();
        let (a, _) = recorder();
        let (b, b_seen) = recorder();
        registry.register("mqtt", a).unwrap();
        registry.deregister("mqtt");
        registry.deregister("never-registered");
        registry.register("mqtt", b).unwrap();

        registry.dispatch("mqtt");
        assert_eq!(b_seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn dispatch_without_callbacks_still_stamps() {
        let registry = CallbackRegistry::new();
        let before = registry.last_updated();
        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.dispatch("anything");
        assert!(registry.last_updated() > before);
    }

    #[test]
    fn callback_may_touch_the_registry() {
        let registry = Arc::new(CallbackRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let inner = Arc::clone(&registry);
        let counter = Arc::clone(&calls);
        let cb: SecretUpdatedCallback = Arc::new(move |name: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            inner.deregister(name);
        });
        registry.register("once", cb).unwrap();

        registry.dispatch("once");
        registry.dispatch("once");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 0);
    }
}
