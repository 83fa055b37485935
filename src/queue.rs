//! Worker-thread task queue for asynchronous bulk operations.
//!
//! A `TaskQueue` owns a fixed pool of worker threads draining one unbounded
//! channel. Tasks are boxed closures; `spawn_after` parks a timer thread that
//! feeds the task into the channel once the delay elapses, so backoff waits
//! never occupy a worker.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use tracing::debug;

type Task = Box<dyn FnOnce() + Send>;

struct QueueInner {
    /// `None` once `shutdown` has run; new spawns are rejected.
    tx: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Cloneable handle to a shared worker pool.
///
/// Dropping all handles does not stop the workers; call `shutdown` to drain
/// and join them. Tasks submitted after shutdown are rejected, and callers
/// must handle that by completing their work inline.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (tx, rx) = channel::unbounded::<Task>();

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("rowkv-queue-{i}"))
                .spawn(move || {
                    for task in rx {
                        task();
                    }
                    debug!(worker = i, "task queue worker exiting");
                })
                .unwrap_or_else(|e| panic!("failed to spawn queue worker: {e}"));
            workers.push(handle);
        }

        TaskQueue {
            inner: Arc::new(QueueInner {
                tx: Mutex::new(Some(tx)),
                workers: Mutex::new(workers),
            }),
        }
    }

    /// Submit a task. Returns false if the queue has been shut down, in
    /// which case the task is dropped unrun.
    pub fn spawn(&self, task: impl FnOnce() + Send + 'static) -> bool {
        let guard = self.inner.tx.lock().expect("task queue lock poisoned");
        match guard.as_ref() {
            Some(tx) => tx.send(Box::new(task)).is_ok(),
            None => false,
        }
    }

    /// Submit a task to run after `delay`. The timer rides a throwaway
    /// thread holding a channel handle, so a timer armed before `shutdown`
    /// still delivers its task and `shutdown` waits for it.
    pub fn spawn_after(&self, delay: Duration, task: impl FnOnce() + Send + 'static) -> bool {
        let guard = self.inner.tx.lock().expect("task queue lock poisoned");
        let Some(tx) = guard.as_ref() else {
            return false;
        };

        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name("rowkv-queue-timer".to_string())
            .spawn(move || {
                thread::sleep(delay);
                let task: Task = Box::new(task);
                if tx.send(task).is_err() {
                    debug!("task queue closed before delayed task ran");
                }
            });
        spawned.is_ok()
    }

    /// Close the channel, let the workers drain what was already queued,
    /// and join them. Idempotent.
    pub fn shutdown(&self) {
        let tx = self
            .inner
            .tx
            .lock()
            .expect("task queue lock poisoned")
            .take();
        drop(tx);

        let workers = std::mem::take(
            &mut *self
                .inner
                .workers
                .lock()
                .expect("task queue lock poisoned"),
        );
        for handle in workers {
            if handle.join().is_err() {
                debug!("task queue worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn runs_spawned_tasks() {
        let queue = TaskQueue::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            assert!(queue.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        queue.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn spawn_after_waits_for_the_delay() {
        let queue = TaskQueue::new(1);
        let (tx, rx) = channel::bounded(1);
        let start = Instant::now();
        assert!(queue.spawn_after(Duration::from_millis(20), move || {
            let _ = tx.send(start.elapsed());
        }));
        let elapsed = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("delayed task never ran");
        assert!(elapsed >= Duration::from_millis(20));
        queue.shutdown();
    }

    #[test]
    fn spawn_after_shutdown_is_rejected() {
        let queue = TaskQueue::new(1);
        queue.shutdown();
        assert!(!queue.spawn(|| {}));
        assert!(!queue.spawn_after(Duration::from_millis(1), || {}));
        // A second shutdown is a no-op.
        queue.shutdown();
    }
}
