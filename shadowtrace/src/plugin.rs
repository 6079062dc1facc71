use std::fmt;
use std::sync::Arc;

type HookFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// A pair of opaque callbacks fired around every instrumented call.
///
/// Enter callbacks run in registration order, exit callbacks in reverse
/// registration order, both before address resolution and while the global
/// mutex is held. A panicking callback is caught and logged; it never aborts
/// the hook. Callbacks may call back into the tracer (the mutex is
/// recursive).
#[derive(Clone)]
pub struct Plugin {
    name: Option<String>,
    enter: HookFn,
    exit: HookFn,
}

impl Plugin {
    pub fn new<E, X>(enter: E, exit: X) -> Self
    where
        E: Fn(u64, u64) + Send + Sync + 'static,
        X: Fn(u64, u64) + Send + Sync + 'static,
    {
        Self {
            name: None,
            enter: Arc::new(enter),
            exit: Arc::new(exit),
        }
    }

    pub fn named<E, X>(name: impl Into<String>, enter: E, exit: X) -> Self
    where
        E: Fn(u64, u64) + Send + Sync + 'static,
        X: Fn(u64, u64) + Send + Sync + 'static,
    {
        Self {
            name: Some(name.into()),
            enter: Arc::new(enter),
            exit: Arc::new(exit),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn enter(&self, this_fn: u64, call_site: u64) {
        (self.enter)(this_fn, call_site);
    }

    pub fn exit(&self, this_fn: u64, call_site: u64) {
        (self.exit)(this_fn, call_site);
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_callbacks_receive_raw_addresses() {
        let seen = Arc::new(AtomicU64::new(0));
        let on_enter = {
            let seen = seen.clone();
            move |this_fn: u64, _site: u64| seen.store(this_fn, Ordering::SeqCst)
        };
        let plugin = Plugin::named("probe", on_enter, |_, _| {});

        assert_eq!(plugin.name(), Some("probe"));
        plugin.enter(0x4010, 0x4044);
        assert_eq!(seen.load(Ordering::SeqCst), 0x4010);
        plugin.exit(0x4010, 0x4044);
    }
}
