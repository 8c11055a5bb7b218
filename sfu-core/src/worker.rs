//! The fixed-size worker pool every peer is pinned to for its lifetime
//! (spec.md §4.12, §5): one OS thread per worker, a thread-local buffer
//! pool, and a channel-based job queue so cross-worker posting (one peer's
//! thread handing a closure to another peer's thread) never blocks on a
//! mutex. Sized from config, falling back to `available_parallelism()` or
//! 4 when that can't be determined, per spec.md §4.12.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use sfu_shared::pool::{BufferPool, PoolConfig};

type Job = Box<dyn FnOnce() + Send>;

const FALLBACK_WORKER_COUNT: usize = 4;

struct Worker {
    sender: Option<Sender<Job>>,
    queued: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// `thread_count` of 0 means "pick for me": hardware concurrency, or
    /// [`FALLBACK_WORKER_COUNT`] if that can't be read.
    pub fn new(thread_count: usize, pool_config: PoolConfig) -> Self {
        let thread_count = if thread_count == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(FALLBACK_WORKER_COUNT)
        } else {
            thread_count
        };

        let mut workers = Vec::with_capacity(thread_count);
        for idx in 0..thread_count {
            let (tx, rx) = mpsc::channel::<Job>();
            let queued = Arc::new(AtomicUsize::new(0));
            let queued_in_thread = queued.clone();
            let pool_config = pool_config.clone();
            let handle = std::thread::Builder::new()
                .name(format!("sfu-worker-{idx}"))
                .spawn(move || {
                    // one buffer pool per worker, never shared across threads
                    let _buffers = BufferPool::new(pool_config);
                    for job in rx {
                        job();
                        queued_in_thread.fetch_sub(1, Ordering::SeqCst);
                    }
                })
                .expect("failed to spawn sfu worker thread");
            workers.push(Worker { sender: Some(tx), queued, handle: Some(handle) });
        }
        Self { workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Index of the worker currently carrying the fewest queued jobs; new
    /// peers are pinned to whichever worker this names at join time.
    pub fn least_loaded(&self) -> usize {
        self.workers
            .iter()
            .enumerate()
            .min_by_key(|(_, w)| w.queued.load(Ordering::SeqCst))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Posts a closure onto the named worker's queue. Used both for a
    /// peer's own thread and for cross-worker posting (spec.md §5: a
    /// subscriber on worker B asking a publisher on worker A to run
    /// something, rather than locking shared state).
    pub fn post(&self, worker: usize, job: impl FnOnce() + Send + 'static) {
        let w = &self.workers[worker];
        w.queued.fetch_add(1, Ordering::SeqCst);
        if let Some(sender) = &w.sender {
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Close every channel first so each worker's `for job in rx` loop
        // observes the hang-up and exits before we join its thread.
        for w in &mut self.workers {
            w.sender.take();
        }
        for w in &mut self.workers {
            if let Some(handle) = w.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
