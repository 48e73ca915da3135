use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Shortest period a repeating task runs at
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Shared timer pool for entity timeouts and heartbeats.
///
/// Wraps a tokio runtime handle so callers decide which runtime (and, in
/// tests, which paused clock) drives the timers. No filter owns a thread.
#[derive(Clone, Debug)]
pub struct Scheduler {
    handle: Handle,
}

impl Scheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler bound to the runtime of the calling task.
    ///
    /// Panics outside a tokio runtime, like `Handle::current`.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Run `task` once after `delay`.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        TimerHandle(join.abort_handle())
    }

    /// Run `task` immediately and then every `period` until it returns false
    /// or the handle is cancelled. Periods below one millisecond are raised to
    /// it.
    pub fn schedule_with_fixed_delay<F>(&self, period: Duration, mut task: F) -> TimerHandle
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let join = self.handle.spawn(async move {
            let mut ticker = interval(period);

            // A slow pass pushes the next one back instead of bursting
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !task() {
                    break;
                }
            }
        });
        TimerHandle(join.abort_handle())
    }
}

/// Cancellation handle for a scheduled task.
///
/// Cancelling is best effort: a task already running finishes its pass.
#[derive(Debug)]
pub struct TimerHandle(AbortHandle);

impl TimerHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}
