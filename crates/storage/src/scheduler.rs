//! Background task scheduler.
//!
//! A fixed pool of worker threads draining a FIFO queue. Scan-path
//! snapshot saves run here so the raft thread is never blocked on a full
//! region scan; long-running tasks receive a [`CancellationToken`] and
//! must check it at their suspension points.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::error;

use basalt_core::{Error, Result};

/// Shared cancellation flag for a background task.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

type Task = Box<dyn FnOnce() + Send>;

struct SchedulerInner {
    queue: Mutex<VecDeque<Task>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    active_tasks: AtomicUsize,
}

/// Fixed worker pool with FIFO execution order.
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    /// Spawn `num_threads` workers named `<name>-0`, `<name>-1`, ...
    pub fn new(name: &str, num_threads: usize) -> Self {
        let inner = Arc::new(SchedulerInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            active_tasks: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let inner = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || worker_loop(&inner))
                .expect("failed to spawn background worker thread");
            workers.push(handle);
        }

        TaskScheduler {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueue a task. Fails once the scheduler has shut down.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(Error::internal("task scheduler is shut down"));
        }
        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(Box::new(task));
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until every queued and in-flight task has finished.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while !queue.is_empty() || self.inner.active_tasks.load(Ordering::Acquire) > 0 {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Signal workers to exit after draining the queue, and join them.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        {
            // Hold the queue lock while notifying so a worker between its
            // shutdown check and its wait cannot miss the wakeup.
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decrements `active_tasks` and wakes drain waiters even if the task
/// panicked; a leaked count would hang `drain()` forever.
struct ActiveTaskGuard<'a> {
    inner: &'a SchedulerInner,
}

impl Drop for ActiveTaskGuard<'_> {
    fn drop(&mut self) {
        let prev = self.inner.active_tasks.fetch_sub(1, Ordering::Release);
        if prev == 1 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &SchedulerInner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(task) = queue.pop_front() {
                    inner.active_tasks.fetch_add(1, Ordering::Release);
                    break task;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let guard = ActiveTaskGuard { inner };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
        if result.is_err() {
            error!("background task panicked");
        }
        drop(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    #[test]
    fn test_tasks_run_and_drain() {
        let scheduler = TaskScheduler::new("test-worker", 2);
        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            scheduler
                .submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        scheduler.drain();
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_fifo_order_single_worker() {
        let scheduler = TaskScheduler::new("test-fifo", 1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..8 {
            let order = Arc::clone(&order);
            scheduler
                .submit(move || {
                    order.lock().push(i);
                })
                .unwrap();
        }
        scheduler.drain();
        assert_eq!(*order.lock(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let scheduler = TaskScheduler::new("test-shutdown", 1);
        scheduler.shutdown();
        assert!(scheduler.submit(|| {}).is_err());
    }

    #[test]
    fn test_panicking_task_does_not_wedge_drain() {
        let scheduler = TaskScheduler::new("test-panic", 1);
        scheduler.submit(|| panic!("boom")).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        {
            let ran = Arc::clone(&ran);
            scheduler
                .submit(move || {
                    ran.store(true, Ordering::SeqCst);
                })
                .unwrap();
        }
        scheduler.drain();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        let seen = token.clone();
        assert!(!seen.is_canceled());
        token.cancel();
        assert!(seen.is_canceled());
    }

    #[test]
    fn test_drain_waits_for_inflight_task() {
        let scheduler = TaskScheduler::new("test-inflight", 1);
        let done = Arc::new(AtomicBool::new(false));
        {
            let done = Arc::clone(&done);
            scheduler
                .submit(move || {
                    std::thread::sleep(Duration::from_millis(50));
                    done.store(true, Ordering::SeqCst);
                })
                .unwrap();
        }
        scheduler.drain();
        assert!(done.load(Ordering::SeqCst));
    }
}
