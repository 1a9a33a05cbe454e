use std::sync::Arc;

use crate::device::Device;
use crate::error::{Error, Result};

// RuntimeContext — Device selection and shared runtime settings
//
// One RuntimeContext is threaded through every operator invocation. It
// carries the currently-selected device (operators allocate their outputs
// there) and the shared worker pool kernels use for intra-operator data
// parallelism. The pool is an explicit rayon thread pool sized once at
// construction; kernels enter it via `install`, which joins all spawned work
// before returning, so `run()` stays synchronous from the dispatch loop's
// perspective.
//
// Cloning a context is cheap and shares the pool — workbench clones run
// their kernels on the same workers.

/// Device and runtime settings shared by every operator invocation.
#[derive(Clone)]
pub struct RuntimeContext {
    device: Device,
    computing_threads: usize,
    pool: Arc<rayon::ThreadPool>,
}

impl RuntimeContext {
    /// Create a context for `device` with one worker per available core.
    pub fn new(device: Device) -> Result<Self> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_threads(device, threads)
    }

    /// Create a context with an explicit worker-thread count.
    pub fn with_threads(device: Device, computing_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(computing_threads.max(1))
            .build()
            .map_err(|e| Error::msg(format!("failed to build worker pool: {}", e)))?;
        Ok(RuntimeContext {
            device,
            computing_threads: computing_threads.max(1),
            pool: Arc::new(pool),
        })
    }

    /// The device operators dispatch on and allocate outputs for.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Number of worker threads in the shared pool.
    pub fn computing_threads(&self) -> usize {
        self.computing_threads
    }

    /// The shared worker pool for intra-operator data parallelism.
    pub fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("device", &self.device)
            .field("computing_threads", &self.computing_threads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_threads_clamps_to_one() {
        let ctx = RuntimeContext::with_threads(Device::cpu(), 0).unwrap();
        assert_eq!(ctx.computing_threads(), 1);
    }

    #[test]
    fn test_clone_shares_pool() {
        let ctx = RuntimeContext::with_threads(Device::cpu(), 2).unwrap();
        let clone = ctx.clone();
        assert!(Arc::ptr_eq(&ctx.pool, &clone.pool));
    }
}
