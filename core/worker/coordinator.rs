use crate::sync::atomic::{AtomicBool, Ordering};

/// Tells every worker in a pool when to stop.
///
#[derive(Debug, Default)]
pub struct Coordinator {
    shutdown: AtomicBool,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_run(&self) -> bool {
        !self.should_shutdown()
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst)
    }
}
