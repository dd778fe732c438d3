use log::debug;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParallelError {
    #[error("Thread error: {0}")]
    ThreadError(String),

    #[error("Invalid thread count: {0}")]
    InvalidThreadCount(usize),
}

/// Configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Number of threads to use
    pub threads: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        ParallelConfig {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Runs per-item work on a dedicated thread pool
pub struct ParallelExecutor {
    pool: rayon::ThreadPool,
    config: ParallelConfig,
}

impl ParallelExecutor {
    /// Create a new parallel executor
    pub fn new(config: Option<ParallelConfig>) -> Result<Self, ParallelError> {
        let config = config.unwrap_or_default();
        if config.threads == 0 {
            return Err(ParallelError::InvalidThreadCount(0));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| {
                ParallelError::ThreadError(format!("Failed to build thread pool: {}", e))
            })?;

        Ok(ParallelExecutor { pool, config })
    }

    pub fn threads(&self) -> usize {
        self.config.threads
    }

    /// Applies `processor` to every item in parallel.
    ///
    /// Results keep the order of `items`. Any error fails the whole call;
    /// the successful results of other items are discarded.
    pub fn execute<T, U, F, E>(&self, items: &[T], processor: F) -> Result<Vec<U>, E>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> Result<U, E> + Send + Sync,
        E: Send,
    {
        debug!(
            "Processing {} items on {} threads",
            items.len(),
            self.config.threads
        );
        self.pool
            .install(|| items.par_iter().map(|item| processor(item)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_preserves_order() {
        let executor = ParallelExecutor::new(Some(ParallelConfig { threads: 3 })).unwrap();
        let items: Vec<u64> = (0..100).collect();
        let squares: Result<Vec<u64>, String> = executor.execute(&items, |&x| Ok(x * x));
        assert_eq!(squares.unwrap(), items.iter().map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn test_execute_propagates_error() {
        let executor = ParallelExecutor::new(Some(ParallelConfig { threads: 2 })).unwrap();
        let items = vec!["a", "b", "bad", "c"];
        let result: Result<Vec<String>, String> = executor.execute(&items, |s| {
            if *s == "bad" {
                Err(format!("cannot process {}", s))
            } else {
                Ok(s.to_uppercase())
            }
        });
        assert_eq!(result.unwrap_err(), "cannot process bad");
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(matches!(
            ParallelExecutor::new(Some(ParallelConfig { threads: 0 })),
            Err(ParallelError::InvalidThreadCount(0))
        ));
        assert!(ParallelExecutor::new(None).unwrap().threads() >= 1);
    }
}
