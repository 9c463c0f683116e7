//! Parallel processing strategies

use rayon::prelude::*;
use thiserror::Error;

/// Errors raised while setting up a worker pool
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker count must be at least 1")]
    ZeroWorkers,

    #[error("Failed to build thread pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Processing mode for a batch of independent jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Jobs run one after another on the calling thread
    #[default]
    Sequential,
    /// Jobs run on rayon's global pool
    Parallel,
    /// Jobs run on a dedicated pool of exactly this many threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Mode for a fixed pool of `workers` threads.
    ///
    /// One worker runs sequentially on the calling thread; zero is rejected.
    pub fn with_workers(workers: usize) -> Result<Self, PoolError> {
        match workers {
            0 => Err(PoolError::ZeroWorkers),
            1 => Ok(ProcessingMode::Sequential),
            n => Ok(ProcessingMode::ParallelWith(n)),
        }
    }

    /// Number of jobs that may run at the same time
    pub fn workers(&self) -> usize {
        match self {
            ProcessingMode::Sequential => 1,
            ProcessingMode::Parallel => num_cpus(),
            ProcessingMode::ParallelWith(n) => *n,
        }
    }

    fn pool(threads: usize) -> Result<rayon::ThreadPool, PoolError> {
        if threads == 0 {
            return Err(PoolError::ZeroWorkers);
        }
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("cumview-worker-{}", i))
            .build()?)
    }
}

/// Strategy for executing a function over a slice of jobs
pub trait ParallelStrategy {
    /// Map `f` over `items` and collect results in input order
    fn par_map<T, U, F>(&self, items: &[T], f: F) -> Result<Vec<U>, PoolError>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Sync + Send;

    /// Map a fallible `f` over `items`, stopping at the first error.
    ///
    /// Results are collected in input order. Once an error is seen no new
    /// items are started; jobs already running finish first. Pool setup
    /// failures are converted into `E`.
    fn try_map<T, U, E, F>(&self, items: &[T], f: F) -> Result<Vec<U>, E>
    where
        T: Sync,
        U: Send,
        E: From<PoolError> + Send,
        F: Fn(&T) -> Result<U, E> + Sync + Send;
}

impl ParallelStrategy for ProcessingMode {
    fn par_map<T, U, F>(&self, items: &[T], f: F) -> Result<Vec<U>, PoolError>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> U + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => Ok(items.iter().map(f).collect()),
            ProcessingMode::Parallel => Ok(items.par_iter().map(f).collect()),
            ProcessingMode::ParallelWith(threads) => {
                let pool = Self::pool(*threads)?;
                Ok(pool.install(|| items.par_iter().map(f).collect()))
            }
        }
    }

    fn try_map<T, U, E, F>(&self, items: &[T], f: F) -> Result<Vec<U>, E>
    where
        T: Sync,
        U: Send,
        E: From<PoolError> + Send,
        F: Fn(&T) -> Result<U, E> + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => items.iter().map(f).collect(),
            ProcessingMode::Parallel => items.par_iter().map(f).collect(),
            ProcessingMode::ParallelWith(threads) => {
                let pool = Self::pool(*threads)?;
                pool.install(|| items.par_iter().map(f).collect())
            }
        }
    }
}

/// Get the number of threads in rayon's global pool
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    enum JobError {
        Bad(usize),
        Pool,
    }

    impl From<PoolError> for JobError {
        fn from(_: PoolError) -> Self {
            JobError::Pool
        }
    }

    #[test]
    fn test_with_workers() {
        assert!(matches!(ProcessingMode::with_workers(0), Err(PoolError::ZeroWorkers)));
        assert_eq!(ProcessingMode::with_workers(1).unwrap(), ProcessingMode::Sequential);
        assert_eq!(ProcessingMode::with_workers(4).unwrap(), ProcessingMode::ParallelWith(4));
        assert_eq!(ProcessingMode::ParallelWith(4).workers(), 4);
        assert_eq!(ProcessingMode::default().workers(), 1);
    }

    #[test]
    fn test_par_map_preserves_order() {
        let items: Vec<usize> = (0..100).collect();
        for mode in [
            ProcessingMode::Sequential,
            ProcessingMode::Parallel,
            ProcessingMode::ParallelWith(3),
        ] {
            let out = mode.par_map(&items, |x| x * 2).unwrap();
            assert_eq!(out, items.iter().map(|x| x * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_try_map_stops_on_error() {
        let items: Vec<usize> = (0..10).collect();
        let seen = AtomicUsize::new(0);
        let out = ProcessingMode::Sequential.try_map(&items, |&x| {
            seen.fetch_add(1, Ordering::SeqCst);
            if x == 3 { Err(JobError::Bad(x)) } else { Ok(x) }
        });
        assert_eq!(out, Err(JobError::Bad(3)));
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_try_map_parallel_ok_and_err() {
        let items: Vec<usize> = (0..50).collect();
        let ok: Result<Vec<usize>, JobError> =
            ProcessingMode::ParallelWith(4).try_map(&items, |&x| Ok(x + 1));
        assert_eq!(ok.unwrap(), (1..51).collect::<Vec<_>>());

        let err = ProcessingMode::ParallelWith(4)
            .try_map(&items, |&x| if x == 7 { Err(JobError::Bad(x)) } else { Ok(x) });
        assert_eq!(err, Err(JobError::Bad(7)));
    }

    #[test]
    fn test_zero_thread_pool_is_an_error() {
        let items = [1, 2, 3];
        let out: Result<Vec<i32>, JobError> =
            ProcessingMode::ParallelWith(0).try_map(&items, |&x| Ok(x));
        assert_eq!(out, Err(JobError::Pool));
    }
}
