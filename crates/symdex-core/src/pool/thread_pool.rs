//! # Thread Pool
//!
//! A fixed-size pool of worker threads draining a single task queue.
//!
//! Posting a task returns a [`TaskHandle`] whose result can be awaited. A
//! pool with zero threads runs every task synchronously on the poster, which
//! makes the whole indexer single-threaded and deterministic.
//!
//! ## Shutdown
//!
//! The pool is owned (usually through an `Arc` held by an `IndexContext`),
//! never global. Dropping it enqueues one stop sentinel per live worker and
//! joins every thread it ever spawned, so no worker outlives the pool.
//!
//! ```rust
//! use symdex_core::pool::ThreadPool;
//!
//! let pool = ThreadPool::new(2);
//! let handle = pool.post_task(|| 40 + 2);
//! assert_eq!(handle.join().unwrap(), 42);
//! ```

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{IndexError, IndexResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum QueueItem
{
    Run(Job),
    Stop,
}

#[derive(Default)]
struct Queue
{
    items: Mutex<VecDeque<QueueItem>>,
    available: Condvar,
}

impl Queue
{
    fn push(&self, item: QueueItem)
    {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Worker loop: wait while empty, pop one item, run it unlocked.
    fn drain(&self)
    {
        loop {
            let item = {
                let mut items = self.items.lock();
                loop {
                    if let Some(item) = items.pop_front() {
                        break item;
                    }
                    self.available.wait(&mut items);
                }
            };
            match item {
                QueueItem::Stop => return,
                QueueItem::Run(job) => job(),
            }
        }
    }
}

struct Workers
{
    live: usize,
    spawned: usize,
    handles: Vec<JoinHandle<()>>,
}

/// Pool of worker threads. See the module documentation.
pub struct ThreadPool
{
    queue: Arc<Queue>,
    workers: Mutex<Workers>,
}

impl ThreadPool
{
    /// Create a pool with `threads` workers (zero means synchronous).
    #[must_use]
    pub fn new(threads: usize) -> Self
    {
        let pool = Self {
            queue: Arc::new(Queue::default()),
            workers: Mutex::new(Workers {
                live: 0,
                spawned: 0,
                handles: Vec::new(),
            }),
        };
        pool.set_thread_count(threads);
        pool
    }

    /// Number of live worker threads.
    pub fn thread_count(&self) -> usize
    {
        self.workers.lock().live
    }

    /// Grow or shrink the pool.
    ///
    /// Growing spawns new workers. Shrinking enqueues one stop sentinel per
    /// thread to remove; a worker exits when it pops a sentinel, after any
    /// tasks queued before it.
    pub fn set_thread_count(&self, threads: usize)
    {
        let mut workers = self.workers.lock();
        workers.handles.retain(|handle| !handle.is_finished());

        if threads > workers.live {
            for _ in workers.live..threads {
                let queue = Arc::clone(&self.queue);
                let name = format!("symdex-worker-{}", workers.spawned);
                match thread::Builder::new().name(name).spawn(move || queue.drain()) {
                    Ok(handle) => {
                        workers.handles.push(handle);
                        workers.spawned += 1;
                        workers.live += 1;
                    }
                    Err(err) => {
                        warn!("Failed to spawn pool worker, continuing with {} threads: {err}", workers.live);
                        break;
                    }
                }
            }
        } else {
            for _ in threads..workers.live {
                self.queue.push(QueueItem::Stop);
            }
            workers.live = threads;
        }
        debug!("Thread pool resized to {} workers", workers.live);
    }

    /// Post a task to the pool.
    ///
    /// With zero threads the task runs right here and the returned handle is
    /// already complete. Otherwise the task is queued and this never blocks.
    /// A panic inside the task is captured and reported by
    /// [`TaskHandle::join`] as `IndexError::TaskPanicked`.
    pub fn post_task<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let job = move || run_captured(task, &sender);

        if self.thread_count() == 0 {
            job();
        } else {
            self.queue.push(QueueItem::Run(Box::new(job)));
        }
        TaskHandle { receiver }
    }
}

impl Drop for ThreadPool
{
    fn drop(&mut self)
    {
        self.set_thread_count(0);
        let handles = std::mem::take(&mut self.workers.get_mut().handles);
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("Pool worker exited with a panic");
            }
        }
    }
}

fn run_captured<T, F>(task: F, sender: &Sender<thread::Result<T>>)
where
    F: FnOnce() -> T,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(task));
    // The poster may have dropped its handle; the result is simply discarded.
    let _ = sender.send(outcome);
}

/// Awaitable result of a posted task.
#[must_use = "dropping a TaskHandle discards the task result"]
pub struct TaskHandle<T>
{
    receiver: Receiver<thread::Result<T>>,
}

impl<T> TaskHandle<T>
{
    /// Whether the result is available without blocking.
    pub fn is_ready(&self) -> bool
    {
        !self.receiver.is_empty()
    }

    /// Block until the task has run and return its result.
    ///
    /// ## Errors
    ///
    /// Returns `IndexError::TaskPanicked` if the task panicked, or if the pool
    /// was torn down before the task could run.
    pub fn join(self) -> IndexResult<T>
    {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(IndexError::TaskPanicked(panic_message(payload.as_ref()))),
            Err(_) => Err(IndexError::TaskPanicked("task dropped before it ran".to_string())),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String
{
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
