//! Bounded worker pool for background key recomputation
//!
//! Tree expansion must not block the UI thread on the case database, so
//! factories hand their recomputations to this pool.

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Default number of worker threads
pub const DEFAULT_WORKER_THREADS: usize = 10;

pub struct BackgroundLoader {
    pool: ThreadPool,
}

impl BackgroundLoader {
    pub fn new(threads: usize) -> CoreResult<Self> {
        if threads == 0 {
            return Err(CoreError::Configuration(
                "Background loader needs at least one thread".to_string(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("view-loader-{}", i))
            .build()
            .map_err(|e| CoreError::Configuration(format!("Failed to build worker pool: {}", e)))?;
        debug!(threads, "Background loader started");
        Ok(Self { pool })
    }

    pub fn with_default_threads() -> CoreResult<Self> {
        Self::new(DEFAULT_WORKER_THREADS)
    }

    /// Run `job` on a worker thread without waiting for it
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_default_pool_size() {
        let loader = BackgroundLoader::with_default_threads().unwrap();
        assert_eq!(loader.threads(), DEFAULT_WORKER_THREADS);
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(BackgroundLoader::new(0).is_err());
    }

    #[test]
    fn test_spawn_runs_on_worker() {
        let loader = BackgroundLoader::new(1).unwrap();
        let (tx, rx) = mpsc::channel();
        loader.spawn(move || {
            let name = std::thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        });
        assert_eq!(rx.recv().unwrap().as_deref(), Some("view-loader-0"));
    }
}
