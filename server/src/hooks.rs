//! Application hook points.
//!
//! Two extension surfaces: [`NodeHooks`] covers node lifecycle and remote
//! applies, [`KeyHook`] attaches per-key-prefix processing to remotely
//! received rows. Both are pure extension points; the cache core has no
//! knowledge of what the hooks do.

use protocol_mesh::Row;

/// Lifecycle hooks with no-op defaults.
///
/// A hook implementation owns whatever context it needs; cleanup happens in
/// its `Drop` impl when the node is torn down.
pub trait NodeHooks: Send + Sync {
    /// Called before each bulk expiry sweep.
    fn sweep(&self, _now: u32) {}

    /// Called once the storage engine has been opened.
    fn opened(&self) {}

    /// Called before the node tears the engine down.
    fn closing(&self) {}

    /// Called when a remote `PUT`/`REMOVE` is about to be applied locally.
    /// Returning `false` vetoes the apply.
    fn remote_apply(&self, _row: &Row) -> bool {
        true
    }
}

/// The no-op hook set.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl NodeHooks for NoHooks {}

/// Per-prefix processing for remotely applied rows.
pub trait KeyHook: Send + Sync {
    /// Called after a remotely received row matching the registered prefix
    /// has been applied. `row.command` tells apart `PUT` and `REMOVE`.
    fn applied(&self, row: &Row);
}

impl<F> KeyHook for F
where
    F: Fn(&Row) + Send + Sync,
{
    fn applied(&self, row: &Row) {
        self(row)
    }
}

struct HookEntry {
    prefix: Vec<u8>,
    hook: Box<dyn KeyHook>,
}

/// Ordered prefix-dispatch table for [`KeyHook`]s.
///
/// Prefixes need not be disjoint; every matching entry fires, in
/// registration order.
#[derive(Default)]
pub struct KeyHookRegistry {
    entries: Vec<HookEntry>,
}

impl KeyHookRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook for keys starting with `prefix`.
    pub fn register(&mut self, prefix: impl Into<Vec<u8>>, hook: Box<dyn KeyHook>) {
        self.entries.push(HookEntry {
            prefix: prefix.into(),
            hook,
        });
    }

    /// Invoke every hook whose prefix matches the row's key.
    pub fn dispatch(&self, row: &Row) {
        for entry in &self.entries {
            if row.key.starts_with(&entry.prefix) {
                entry.hook.applied(row);
            }
        }
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn put_row(key: &[u8]) -> Row {
        Row::new(key, b"v", 0, 60).unwrap()
    }

    #[test]
    fn test_dispatch_matches_prefix() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();

        let mut registry = KeyHookRegistry::new();
        registry.register(
            "grey:",
            Box::new(move |_row: &Row| {
                seen.fetch_add(1, Ordering::SeqCst);
            }),
        );

        registry.dispatch(&put_row(b"grey:192.0.2.1"));
        registry.dispatch(&put_row(b"list:192.0.2.1"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_overlapping_prefixes_fire_in_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut registry = KeyHookRegistry::new();
        for tag in ["broad", "narrow"] {
            let order = order.clone();
            let prefix = if tag == "broad" { "grey:" } else { "grey:192" };
            registry.register(
                prefix,
                Box::new(move |_row: &Row| {
                    order.lock().push(tag);
                }),
            );
        }

        registry.dispatch(&put_row(b"grey:192.0.2.1"));
        assert_eq!(*order.lock(), vec!["broad", "narrow"]);
    }

    #[test]
    fn test_default_node_hooks_accept() {
        let hooks = NoHooks;
        assert!(hooks.remote_apply(&put_row(b"k")));
    }
}
