//! Parallel processing configuration
//!
//! Generated CDO commands are independent of each other, so they are run
//! on Rayon's global thread pool. This module configures that pool.

use crate::errors::{Cmip5Error, Result};
use rayon::ThreadPoolBuilder;

/// Configuration for parallel processing
#[derive(Debug, Clone, Default)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Set up the global Rayon thread pool with the specified configuration.
    ///
    /// CDO is itself multi-threaded and I/O bound, so callers usually ask
    /// for fewer threads than cores.
    pub fn setup_global_pool(&self) -> Result<()> {
        if let Some(num_threads) = self.num_threads {
            ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("cmip5-worker-{}", i))
                .build_global()
                .map_err(|e| {
                    Cmip5Error::ThreadPoolError(format!(
                        "Failed to initialize thread pool with {} threads: {}",
                        num_threads, e
                    ))
                })?;

            tracing::debug!(num_threads, "configured worker pool");
        } else {
            tracing::debug!("using default worker pool");
        }

        Ok(())
    }

    /// Number of threads in the current pool
    pub fn current_threads(&self) -> usize {
        rayon::current_num_threads()
    }

    /// Use every available CPU core
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }
}

/// Get information about the current parallel configuration
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        available_parallelism: std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub available_parallelism: usize,
}

impl ParallelInfo {
    pub fn log(&self) {
        tracing::debug!(
            current_threads = self.current_threads,
            available_cores = self.available_cores,
            available_parallelism = self.available_parallelism,
            "parallel processing environment"
        );
    }
}
