use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;

/// Cancellation token polled by the reactor loop. The SIGINT handler does
/// nothing but flip it.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

static SIGNAL_TOKEN: OnceCell<ShutdownToken> = OnceCell::new();

extern "C" fn handle_sigint(_signum: libc::c_int) {
    if let Some(token) = SIGNAL_TOKEN.get() {
        token.flag.store(true, Ordering::SeqCst);
    }
}

pub fn install_sigint_handler(token: &ShutdownToken) {
    let _ = SIGNAL_TOKEN.set(token.clone());
    let handler = handle_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}
