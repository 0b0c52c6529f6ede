use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;

/// Shared stop flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sets the token on SIGINT/SIGTERM/SIGQUIT. A second signal while the
    /// token is already set exits the process with status 1.
    pub fn register_signals(&self) -> io::Result<()> {
        for sig in TERM_SIGNALS {
            // registration order matters: the shutdown check must run before the flag is set
            flag::register_conditional_shutdown(*sig, 1, Arc::clone(&self.cancelled))?;
            flag::register(*sig, Arc::clone(&self.cancelled))?;
        }
        Ok(())
    }
}
