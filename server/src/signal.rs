//! Signal handling for graceful shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Install SIGINT/SIGTERM handlers for graceful shutdown.
///
/// Returns a flag that flips to `true` on the first signal. A second signal
/// exits immediately, for operators whose node is wedged mid-drain.
pub fn shutdown_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = flag.clone();

    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            tracing::warn!("second shutdown signal, exiting now");
            std::process::exit(1);
        }
        tracing::info!("shutdown signal received, draining");
    })
    .expect("failed to install signal handler");

    flag
}
