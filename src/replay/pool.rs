//! Fixed worker pool for pooled replay
//!
//! Workers are scoped threads, so they can borrow the handler and whatever it
//! borrows (store, column family handles) without reference counting. The
//! dispatcher feeds them through a bounded [`TaskQueue`].

use crate::error::{ReplayError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error};

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Bounded multi-consumer FIFO
///
/// `push` blocks while the queue is full and `pop` blocks while it is empty.
/// Once closed, pushes are refused and pops drain what is left.
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> TaskQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue `item`, waiting for room. Returns false if the queue is closed.
    pub fn push(&self, item: T) -> bool {
        let mut state = self.state.lock();
        while state.items.len() >= self.capacity && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Dequeue the oldest item, waiting for one. `None` once closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Refuse further pushes; queued items are still handed out
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Close and discard everything not yet picked up, returning the count
    pub fn abort(&self) -> usize {
        let dropped = {
            let mut state = self.state.lock();
            state.closed = true;
            let dropped = state.items.len();
            state.items.clear();
            dropped
        };
        self.not_empty.notify_all();
        self.not_full.notify_all();
        dropped
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Counters for one pool run
#[derive(Debug, Default)]
pub struct PoolStats {
    pub tasks_completed: AtomicU64,
    pub task_panics: AtomicU64,
    pub task_time_ns: AtomicU64,
}

/// Run `produce` on the calling thread while `num_threads` workers apply
/// `work` to everything it pushes.
///
/// When `produce` returns the queue is closed and the workers drain it before
/// this returns. If `produce` fails with [`ReplayError::Cancelled`], queued
/// items that no worker has started are discarded instead.
pub fn run_pooled<T, R, P, W>(
    num_threads: usize,
    queue_depth: usize,
    stats: &PoolStats,
    produce: P,
    work: W,
) -> Result<R>
where
    T: Send,
    P: FnOnce(&TaskQueue<T>) -> Result<R>,
    W: Fn(T) + Sync,
{
    let queue = TaskQueue::new(queue_depth);
    let queue = &queue;
    let work = &work;

    std::thread::scope(|scope| {
        for worker_id in 0..num_threads {
            let spawned = std::thread::Builder::new()
                .name(format!("kvreplay-worker-{}", worker_id))
                .spawn_scoped(scope, move || worker_loop(worker_id, queue, stats, work));
            if let Err(e) = spawned {
                queue.abort();
                error!(worker_id, error = %e, "Failed to spawn replay worker");
                return Err(ReplayError::Io(e));
            }
        }
        debug!(num_threads, queue_depth, "Replay workers started");

        let result = produce(queue);
        match &result {
            Err(e) if e.is_cancelled() => {
                let dropped = queue.abort();
                debug!(dropped, "Discarded queued records after cancellation");
            }
            _ => queue.close(),
        }
        result
    })
}

fn worker_loop<T, W: Fn(T)>(worker_id: usize, queue: &TaskQueue<T>, stats: &PoolStats, work: &W) {
    while let Some(task) = queue.pop() {
        let task_start = Instant::now();
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| work(task)))
            .map(|_| {
                stats.tasks_completed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap_or_else(|_| {
                error!(worker_id, "Replay task panicked");
                stats.task_panics.fetch_add(1, Ordering::Relaxed);
            });
        stats
            .task_time_ns
            .fetch_add(task_start.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }
    debug!(worker_id, "Replay worker stopped");
}
