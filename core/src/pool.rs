//! Fixed-size worker pool with per-task scratch arenas.
//!
//! Jobs flow through an unbounded channel to `W` OS threads. Each worker
//! owns a bump arena that is handed to the job and reset when the job
//! returns, so per-task allocations never outlive the task.

use std::thread::JoinHandle;

use bumpalo::Bump;
use crossbeam_channel::{unbounded, Sender};
use log::debug;

type Job = Box<dyn FnOnce(&Bump) + Send + 'static>;

/// Clamp the requested worker count: 0 means the default of four, at
/// least one, at most sixteen.
pub fn clamp_workers(requested: u32) -> usize {
    match requested {
        0 => 4,
        t if t < 2 => 1,
        t if t > 16 => 16,
        t => t as usize,
    }
}

pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> WorkerPool {
        let (sender, receiver) = unbounded::<Job>();

        let workers = (0..size)
            .map(|index| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("declass-worker-{index}"))
                    .spawn(move || {
                        let mut scratch = Bump::new();
                        while let Ok(job) = receiver.recv() {
                            job(&scratch);
                            scratch.reset();
                        }
                    })
                    .expect("can't spawn worker thread")
            })
            .collect();

        debug!("worker pool started with {size} threads");
        WorkerPool {
            sender: Some(sender),
            workers,
        }
    }

    /// Queue a job; never blocks.
    pub fn enqueue(&self, job: impl FnOnce(&Bump) + Send + 'static) {
        if let Some(sender) = &self.sender {
            // send only fails when all workers are gone
            let _ = sender.send(Box::new(job));
        }
    }

    /// Block until every queued job has completed, then stop the workers.
    pub fn join(mut self) {
        // dropping the sender closes the channel; workers drain it first
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn clamping_table() {
        let cases = [(0u32, 4), (1, 1), (2, 2), (8, 8), (16, 16), (17, 16), (100, 16)];
        for (requested, expected) in cases {
            assert_eq!(clamp_workers(requested), expected, "t = {requested}");
        }
    }

    #[test]
    fn join_waits_for_all_jobs() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.enqueue(move |_arena| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn jobs_get_a_usable_arena() {
        let pool = WorkerPool::new(2);
        let total = Arc::new(AtomicUsize::new(0));
        for i in 0..10usize {
            let total = Arc::clone(&total);
            pool.enqueue(move |arena| {
                let value = arena.alloc(i);
                total.fetch_add(*value, Ordering::SeqCst);
            });
        }
        pool.join();
        assert_eq!(total.load(Ordering::SeqCst), 45);
    }
}
