//! Kernel dispatcher
//!
//! The engine's "device" is a dedicated rayon pool. A kernel is a closure
//! over a thread id; [`Dispatcher::dispatch`] runs it for every id in
//! `0..n` and returns only once all invocations have finished, so the
//! control thread never observes a half-written buffer.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::ComputeError;

/// Runs data-parallel kernels on a private thread pool
pub struct Dispatcher {
    pool: ThreadPool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher with `worker_threads` threads (0 = rayon default)
    pub fn new(worker_threads: usize) -> Result<Self, ComputeError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|i| format!("cloudproj-device-{}", i))
            .build()
            .map_err(|e| ComputeError::InvalidConfig(format!("cannot start device threads: {}", e)))?;
        log::debug!("Dispatcher started with {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    /// Number of device threads
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `kernel(tid)` for every `tid` in `0..n` and wait for completion
    pub fn dispatch<F>(&self, label: &str, n: usize, kernel: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        if n == 0 {
            return;
        }
        log::trace!("dispatch {} x{}", label, n);
        self.pool.install(|| (0..n).into_par_iter().for_each(kernel));
    }

    /// Run `kernel(tid)` for every `tid` and collect the results in order
    pub fn map<T, F>(&self, n: usize, kernel: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync,
    {
        self.pool.install(|| (0..n).into_par_iter().map(kernel).collect())
    }

    /// Run arbitrary work inside the device pool
    pub fn install<R, F>(&self, work: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(work)
    }
}
