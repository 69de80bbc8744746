//! Background expiry sweeper.
//!
//! One timer thread per node. Each interval it fires the `sweep` hook and
//! deletes expired rows under the node lock; the lock is held only for the
//! delete statement itself. Shutdown goes through a condition variable so
//! the thread exits promptly instead of sleeping out its interval.

use crate::metrics;
use crate::node::{unix_now, Shared};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct GcThread {
    signal: Arc<(Mutex<bool>, Condvar)>,
    handle: JoinHandle<()>,
}

pub(crate) struct GarbageCollector {
    shared: Arc<Shared>,
    interval: Duration,
    inner: Mutex<Option<GcThread>>,
}

impl GarbageCollector {
    pub(crate) fn new(shared: Arc<Shared>, interval: Duration) -> Self {
        GarbageCollector {
            shared,
            interval,
            inner: Mutex::new(None),
        }
    }

    /// Spawn the sweeper thread. No-op when already running.
    pub(crate) fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            return;
        }

        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let shared = self.shared.clone();
        let interval = self.interval;
        let thread_signal = signal.clone();

        let handle = std::thread::Builder::new()
            .name("mesh-gc".to_string())
            .spawn(move || sweep_loop(shared, interval, thread_signal))
            .expect("failed to spawn gc thread");

        *inner = Some(GcThread { signal, handle });
    }

    /// Signal the sweeper and join it. No-op when not running.
    pub(crate) fn stop(&self) {
        let thread = self.inner.lock().take();
        if let Some(thread) = thread {
            let (lock, cvar) = &*thread.signal;
            *lock.lock() = true;
            cvar.notify_all();
            let _ = thread.handle.join();
        }
    }

    /// Discard thread bookkeeping without joining. For a duplicated
    /// process, whose inherited handle names a thread that does not exist.
    pub(crate) fn forget_thread(&self) {
        self.inner.lock().take();
    }
}

fn sweep_loop(shared: Arc<Shared>, interval: Duration, signal: Arc<(Mutex<bool>, Condvar)>) {
    let (lock, cvar) = &*signal;
    loop {
        {
            let deadline = Instant::now() + interval;
            let mut stop = lock.lock();
            while !*stop {
                if cvar.wait_until(&mut stop, deadline).timed_out() {
                    break;
                }
            }
            if *stop {
                return;
            }
        }

        let now = unix_now();
        shared.hooks.sweep(now);

        let state = shared.state.lock();
        match state.store.expire_before(now) {
            Ok(swept) => {
                metrics::GC_SWEEPS.increment();
                if swept > 0 {
                    metrics::GC_ROWS_EXPIRED.add(swept as u64);
                    debug!(swept = swept as u64, "expiry sweep");
                }
            }
            Err(e) => warn!(error = %e, "expiry sweep failed"),
        }
    }
}
