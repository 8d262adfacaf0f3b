// Worker module
// Stands in for the process hosting connection tasks

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::connection::Worker;
use crate::logger;

/// Worker notified when a connection task hits a fatal error.
///
/// Connection tasks are isolated, so a fatal error only ends the task that
/// raised it. The worker records the recycle request for the shutdown log.
#[derive(Debug, Default)]
pub struct TaskWorker {
    recycled: AtomicUsize,
}

impl TaskWorker {
    pub const fn new() -> Self {
        Self {
            recycled: AtomicUsize::new(0),
        }
    }

    /// Number of fatal errors reported so far
    pub fn recycled(&self) -> usize {
        self.recycled.load(Ordering::SeqCst)
    }
}

impl Worker for TaskWorker {
    fn shutdown(&self) {
        let count = self.recycled.fetch_add(1, Ordering::SeqCst) + 1;
        logger::log_warning(&format!(
            "[Worker] Connection task ended by a fatal error ({count} so far)"
        ));
    }
}
