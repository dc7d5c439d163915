use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Installs a Ctrl-C handler and returns the flag it sets.
///
/// The executor checks the flag between actions, so the action in progress
/// always finishes before the run stops.
pub fn setup_shutdown_signal() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let signal_clone = Arc::clone(&shutdown_signal);

    ctrlc::set_handler(move || {
        signal_clone.store(true, Ordering::SeqCst);
        eprintln!("\nInterrupt received, stopping after the current file...");
    })?;

    Ok(shutdown_signal)
}
