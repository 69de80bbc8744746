//! The cache node: context object, public API, and lifecycle.
//!
//! One mutex guards everything mutable — the storage engine, the
//! active-host table, and the key-hook list. Application callers, the
//! replication receive loops, and the expiry sweeper all serialize through
//! it. Locally originated mutations are broadcast to peers after the lock
//! is released; remotely received mutations are applied under the same lock
//! and are never re-broadcast.

use crate::config::Config;
use crate::gc::GarbageCollector;
use crate::hooks::{KeyHook, KeyHookRegistry, NodeHooks};
use crate::hosts::HostTable;
use crate::metrics;
use crate::replication::{PlaneState, Replicator};
use cache_store::{Store, StoreConfig, StoreError};
use parking_lot::Mutex;
use protocol_mesh::{Command, FrameError, Row, Secret};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Errors surfaced by the node's public API and lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Storage engine failure.
    #[error("storage: {0}")]
    Store(#[from] StoreError),

    /// Key or value out of bounds.
    #[error("frame: {0}")]
    Frame(#[from] FrameError),

    /// Socket setup failure while starting a replication plane.
    #[error("network: {0}")]
    Network(#[from] std::io::Error),
}

/// Current unix time, clamped into the row timestamp width.
pub(crate) fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .min(u32::MAX as u64) as u32
}

pub(crate) struct NodeState {
    pub(crate) store: Store,
    pub(crate) hosts: HostTable,
    pub(crate) key_hooks: KeyHookRegistry,
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<NodeState>,
    pub(crate) secret: Secret,
    pub(crate) hooks: Box<dyn NodeHooks>,
    pub(crate) rate_limit: u32,
}

impl Shared {
    /// Apply a mutation received from a peer. Called only by the receive
    /// loops; nothing on this path ever sends a frame back out.
    pub(crate) fn apply_remote(&self, mut row: Row, src: IpAddr, now: u32) {
        let mut state = self.state.lock();

        let rate = state.hosts.update(src, now);
        if self.rate_limit > 0 && rate > self.rate_limit {
            metrics::FRAMES_RATE_DROPPED.increment();
            debug!(%src, rate, limit = self.rate_limit, "source over rate limit, frame dropped");
            return;
        }

        if !self.hooks.remote_apply(&row) {
            metrics::REMOTE_VETOED.increment();
            return;
        }

        let result = match row.command {
            Command::Put => {
                // In transit the digest field carried the auth tag.
                row.refresh_digest();
                metrics::REMOTE_PUTS.increment();
                state.store.put(&row)
            }
            Command::Remove => {
                metrics::REMOTE_REMOVES.increment();
                state.store.delete(&row.key).map(|_| ())
            }
            Command::Other => return,
        };

        match result {
            Ok(()) => state.key_hooks.dispatch(&row),
            Err(e) => warn!(%src, error = %e, "remote apply failed"),
        }
    }
}

/// A replicated, persistent cache node.
///
/// Construction opens the store and fires the `opened` hook; [`start`]
/// spawns the expiry sweeper and any configured replication planes;
/// [`stop`] (also run on drop) joins them and fires the `closing` hook
/// exactly once.
///
/// [`start`]: CacheNode::start
/// [`stop`]: CacheNode::stop
pub struct CacheNode {
    shared: Arc<Shared>,
    store_config: StoreConfig,
    replication: Replicator,
    gc: GarbageCollector,
    stopped: AtomicBool,
}

impl CacheNode {
    /// Open the store and assemble a node from `config`.
    pub fn new(config: &Config, hooks: Box<dyn NodeHooks>) -> Result<Self, NodeError> {
        let store = Store::open(&config.store)?;
        let secret = Secret::new(
            config
                .replication
                .secret
                .as_deref()
                .unwrap_or_default()
                .as_bytes(),
        );

        let shared = Arc::new(Shared {
            state: Mutex::new(NodeState {
                store,
                hosts: HostTable::new(config.rate.limit),
                key_hooks: KeyHookRegistry::new(),
            }),
            secret,
            hooks,
            rate_limit: config.rate.limit,
        });
        shared.hooks.opened();

        let replication = Replicator::new(shared.clone(), &config.replication)?;
        let gc = GarbageCollector::new(shared.clone(), config.gc.interval());

        Ok(CacheNode {
            shared,
            store_config: config.store.clone(),
            replication,
            gc,
            stopped: AtomicBool::new(false),
        })
    }

    /// Spawn the expiry sweeper and any configured replication planes.
    pub fn start(&self) -> Result<(), NodeError> {
        self.replication.start()?;
        self.gc.start();
        Ok(())
    }

    /// Stop background threads and fire the `closing` hook. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.replication.stop();
        self.gc.stop();
        self.shared.hooks.closing();
    }

    /// Reset the node after process duplication.
    ///
    /// A duplicated process inherits this object's memory but none of its
    /// threads, and shares the parent's storage handle. The duplicate must
    /// call this before using the node: it reopens the store and discards
    /// stale thread bookkeeping, after which the duplicate decides for
    /// itself whether to [`start`](CacheNode::start) its own sweeper and
    /// listeners. Only meaningful while the node is quiescent (nothing
    /// holding the node lock at duplication time).
    pub fn reinitialize(&self) -> Result<(), NodeError> {
        self.replication.forget_threads();
        self.gc.forget_thread();
        let mut state = self.shared.state.lock();
        state.store = Store::open(&self.store_config)?;
        drop(state);
        self.stopped.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Look up a key in the local store.
    ///
    /// Expired rows remain visible until the next sweep; reads stay a
    /// single point lookup.
    pub fn get(&self, key: &[u8]) -> Result<Option<Row>, NodeError> {
        metrics::GETS.increment();
        let state = self.shared.state.lock();
        let row = state.store.get(key)?;
        if row.is_some() {
            metrics::HITS.increment();
        } else {
            metrics::MISSES.increment();
        }
        Ok(row)
    }

    /// Insert or refresh a row, then broadcast it to peers.
    ///
    /// A repeat put of the same key keeps the original creation time and
    /// increments the hit count. Returns the stored row.
    pub fn put(&self, key: &[u8], value: &[u8], ttl_secs: u32) -> Result<Row, NodeError> {
        let now = unix_now();
        let mut row = Row::new(key, value, now, now.saturating_add(ttl_secs))?;

        {
            let state = self.shared.state.lock();
            if let Some(prev) = state.store.get(key)? {
                row.created = prev.created;
                row.hits = prev.hits.saturating_add(1);
            }
            state.store.put(&row)?;
        }
        metrics::PUTS.increment();

        self.replication.send(&row);
        Ok(row)
    }

    /// Delete a key locally, then broadcast the removal to peers.
    ///
    /// The removal is broadcast even when the key was not present locally;
    /// a peer may still hold the row (the local copy may simply have
    /// expired first). Returns whether a local row existed.
    pub fn remove(&self, key: &[u8]) -> Result<bool, NodeError> {
        let existed = {
            let state = self.shared.state.lock();
            state.store.delete(key)?
        };
        metrics::REMOVES.increment();

        match Row::new(key, b"", unix_now(), 0) {
            Ok(mut tombstone) => {
                tombstone.command = Command::Remove;
                self.replication.send(&tombstone);
            }
            Err(e) => debug!(error = %e, "removal not broadcast"),
        }
        Ok(existed)
    }

    /// Sweep rows whose expiry is at or before `now`, firing the `sweep`
    /// hook first. Returns the number of rows removed.
    pub fn sweep(&self, now: u32) -> Result<usize, NodeError> {
        self.shared.hooks.sweep(now);
        let state = self.shared.state.lock();
        let swept = state.store.expire_before(now)?;
        metrics::GC_SWEEPS.increment();
        metrics::GC_ROWS_EXPIRED.add(swept as u64);
        Ok(swept)
    }

    /// Delete every row in the local store. Not broadcast.
    pub fn truncate(&self) -> Result<(), NodeError> {
        let state = self.shared.state.lock();
        state.store.truncate()?;
        Ok(())
    }

    /// Attach a key hook fired for every remotely applied row whose key
    /// starts with `prefix`.
    pub fn register_key_hook(&self, prefix: impl Into<Vec<u8>>, hook: Box<dyn KeyHook>) {
        let mut state = self.shared.state.lock();
        state.key_hooks.register(prefix, hook);
    }

    /// Record local activity from `ip` and return its current rate.
    pub fn observe_host(&self, ip: IpAddr) -> u32 {
        let mut state = self.shared.state.lock();
        state.hosts.update(ip, unix_now())
    }

    /// Current requests-per-minute figure for `ip`, if tracked.
    pub fn host_rate(&self, ip: IpAddr) -> Option<u32> {
        let state = self.shared.state.lock();
        state.hosts.find(ip).map(|entry| entry.rate(unix_now()))
    }

    /// Attach or update a free-text note on `ip`'s host entry.
    pub fn update_host_note(&self, ip: IpAddr, find: Option<&str>, text: &str) {
        let mut state = self.shared.state.lock();
        state.hosts.update_note(ip, unix_now(), find, text);
    }

    /// Address of the unicast listener, once running.
    pub fn unicast_addr(&self) -> Option<SocketAddr> {
        self.replication.unicast_addr()
    }

    /// State of the unicast plane.
    pub fn unicast_state(&self) -> PlaneState {
        self.replication.unicast_state()
    }

    /// State of the multicast plane.
    pub fn multicast_state(&self) -> PlaneState {
        self.replication.multicast_state()
    }
}

impl Drop for CacheNode {
    fn drop(&mut self) {
        self.stop();
    }
}
