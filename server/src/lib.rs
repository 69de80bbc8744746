//! meshcache cache node.
//!
//! A replicated, persistent cache for clusters of mail-filtering daemons.
//! Each node holds an authoritative local store (see `cache-store`) and
//! opportunistically broadcasts mutations to peers over a multicast group
//! and/or an explicit unicast peer list (see `protocol-mesh` for the wire
//! format). Convergence is best-effort: no consensus, no anti-entropy, no
//! cross-node read-your-writes.

#![warn(clippy::all)]

pub mod banner;
pub mod config;
pub(crate) mod gc;
pub mod hooks;
pub mod hosts;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod replication;
pub mod signal;

pub use config::Config;
pub use hooks::{KeyHook, NodeHooks, NoHooks};
pub use node::{CacheNode, NodeError};
pub use replication::PlaneState;
