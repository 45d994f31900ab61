//! Periodic Scheduling
//!
//! The control loop runs as a cancellable repeating task. Cancelling the
//! [`TaskHandle`] guarantees the task is never started again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// What a repeating task wants after running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// Body of a repeating task
pub type RepeatingTask = Box<dyn FnMut() -> TickFlow + Send>;

/// Revocation handle for a scheduled task
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke the task; it will not be started again
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Something that runs tasks repeatedly
pub trait Scheduler: Send + Sync {
    /// Run `task` every `interval` until it returns `TickFlow::Stop` or the
    /// returned handle is cancelled
    fn schedule_repeating(&self, interval: Duration, task: RepeatingTask) -> TaskHandle;
}

// ============================================================================
// Thread Scheduler
// ============================================================================

/// Fixed-interval timer running each task on its own thread
///
/// Deadlines are computed from the start instant so late ticks do not
/// accumulate drift.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule_repeating(&self, interval: Duration, mut task: RepeatingTask) -> TaskHandle {
        let handle = TaskHandle::new();
        let worker = handle.clone();

        let spawned = thread::Builder::new()
            .name("phoneline-control".to_string())
            .spawn(move || {
                let start = Instant::now();
                let mut ticks: u32 = 0;
                loop {
                    if worker.is_cancelled() {
                        break;
                    }
                    if task() == TickFlow::Stop {
                        worker.cancel();
                        break;
                    }
                    ticks = ticks.saturating_add(1);
                    let deadline = start + interval * ticks;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                }
                log::debug!("control task finished after {} ticks", ticks);
            });

        if let Err(err) = spawned {
            log::warn!("could not start control thread: {}", err);
            handle.cancel();
        }
        handle
    }
}

// ============================================================================
// Manual Scheduler
// ============================================================================

/// Runs tasks only when asked, once per [`ManualScheduler::run_pending`]
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<Vec<(TaskHandle, RepeatingTask)>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("tasks", &self.tasks.lock().len())
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every live task once; returns how many ran
    pub fn run_pending(&self) -> usize {
        // Tasks may schedule or cancel other tasks while running
        let mut current = std::mem::take(&mut *self.tasks.lock());
        let mut ran = 0;

        current.retain_mut(|(handle, task)| {
            if handle.is_cancelled() {
                return false;
            }
            ran += 1;
            if task() == TickFlow::Stop {
                handle.cancel();
                return false;
            }
            !handle.is_cancelled()
        });

        let mut tasks = self.tasks.lock();
        current.append(&mut tasks);
        *tasks = current;
        ran
    }

    /// Tasks that have not been cancelled
    pub fn live_tasks(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|(handle, _)| !handle.is_cancelled())
            .count()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&self, _interval: Duration, task: RepeatingTask) -> TaskHandle {
        let handle = TaskHandle::new();
        self.tasks.lock().push((handle.clone(), task));
        handle
    }
}
