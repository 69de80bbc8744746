//! Node metrics.

use metriken::{metric, Counter};

// Replication receive path

#[metric(
    name = "frames_received",
    description = "Datagrams received across both replication planes"
)]
pub static FRAMES_RECEIVED: Counter = Counter::new();

#[metric(
    name = "frames_auth_dropped",
    description = "Frames dropped for a bad authentication tag"
)]
pub static FRAMES_AUTH_DROPPED: Counter = Counter::new();

#[metric(
    name = "frames_decode_dropped",
    description = "Frames dropped as malformed or carrying a reserved command"
)]
pub static FRAMES_DECODE_DROPPED: Counter = Counter::new();

#[metric(
    name = "frames_rate_dropped",
    description = "Frames dropped from sources over the configured rate limit"
)]
pub static FRAMES_RATE_DROPPED: Counter = Counter::new();

#[metric(
    name = "remote_puts",
    description = "Remote PUT commands applied locally"
)]
pub static REMOTE_PUTS: Counter = Counter::new();

#[metric(
    name = "remote_removes",
    description = "Remote REMOVE commands applied locally"
)]
pub static REMOTE_REMOVES: Counter = Counter::new();

#[metric(
    name = "remote_vetoed",
    description = "Remote commands vetoed by the application hook"
)]
pub static REMOTE_VETOED: Counter = Counter::new();

// Replication send path

#[metric(
    name = "frames_sent",
    description = "Frames transmitted to peers and the multicast group"
)]
pub static FRAMES_SENT: Counter = Counter::new();

// Public API

#[metric(name = "api_gets", description = "Local get operations")]
pub static GETS: Counter = Counter::new();

#[metric(name = "api_hits", description = "Local gets that found a row")]
pub static HITS: Counter = Counter::new();

#[metric(name = "api_misses", description = "Local gets that found nothing")]
pub static MISSES: Counter = Counter::new();

#[metric(name = "api_puts", description = "Local put operations")]
pub static PUTS: Counter = Counter::new();

#[metric(name = "api_removes", description = "Local remove operations")]
pub static REMOVES: Counter = Counter::new();

// Expiry sweeper

#[metric(name = "gc_sweeps", description = "Expiry sweeps completed")]
pub static GC_SWEEPS: Counter = Counter::new();

#[metric(name = "gc_rows_expired", description = "Rows deleted by expiry sweeps")]
pub static GC_ROWS_EXPIRED: Counter = Counter::new();
