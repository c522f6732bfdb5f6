use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Runs deferred tasks on the tokio worker pool, separate from whatever
/// task called [`Scheduler::after`]. Used for the verification deadline
/// (C6) and the registry janitor cadence (C2).
#[derive(Clone)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    /// Binds the scheduler to the ambient tokio runtime. Panics outside of
    /// one, same as any other `tokio::spawn` call site.
    pub fn new() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedules `task` to run after `dur`. The returned handle can cancel
    /// it; a task that has already fired ignores a later `cancel`, and a
    /// task cancelled before firing never runs, even if the cancellation
    /// races the timer.
    pub fn after<F>(&self, dur: Duration, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_for_task = cancelled.clone();

        let join = self.handle.spawn(async move {
            tokio::time::sleep(dur).await;
            if cancelled_for_task.swap(true, Ordering::SeqCst) {
                trace!("scheduled task fired after cancellation; no-op");
                return;
            }
            task();
        });

        TaskHandle { cancelled, join }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// A cancel handle for a task scheduled with [`Scheduler::after`].
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Idempotent. Cancelling a task that already fired, or cancelling
    /// twice, has no effect beyond the first call.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.join.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    #[tokio::test]
    async fn task_fires_after_delay() {
        let sched = Scheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        let _handle = sched.after(Duration::from_millis(10), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_task_never_runs() {
        let sched = Scheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        let handle = sched.after(Duration::from_millis(30), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        handle.cancel();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_after_fire_is_a_no_op() {
        let sched = Scheduler::new();
        let fired = Arc::new(AtomicU32::new(0));
        let f = fired.clone();
        let handle = sched.after(Duration::from_millis(5), move || {
            f.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.cancel();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
