//! Graceful shutdown support via atomic flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

static FLAG: LazyLock<Arc<AtomicBool>> = LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// Set once SIGINT or SIGTERM arrives
pub fn is_shutdown_requested() -> bool {
    FLAG.load(Ordering::Relaxed)
}

/// Route SIGINT and SIGTERM to the shutdown flag.
///
/// A second signal while the flag is already set terminates immediately.
pub fn install_signal_handlers() -> std::io::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register_conditional_shutdown(sig, 130, Arc::clone(&FLAG))?;
        signal_hook::flag::register(sig, Arc::clone(&FLAG))?;
    }
    Ok(())
}
