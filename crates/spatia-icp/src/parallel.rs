use rayon::prelude::*;
use thiserror::Error;

/// Errors that can occur when creating a worker pool.
#[derive(Error, Debug, PartialEq)]
pub enum WorkerPoolError {
    /// The thread pool failed to build.
    #[error("failed to build thread pool: {0}")]
    BuildError(String),

    /// The requested thread count is invalid.
    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),
}

/// A fixed-size pool of worker threads running fork-join loops.
///
/// Every loop partitions its range into at most [`WorkerPool::num_threads`]
/// contiguous chunks and blocks the calling thread until all of them are done.
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// Create a pool with `num_threads` workers.
    pub fn new(num_threads: usize) -> Result<Self, WorkerPoolError> {
        if num_threads == 0 {
            return Err(WorkerPoolError::InvalidThreadCount(num_threads));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("spatia-worker-{i}"))
            .build()
            .map_err(|e| WorkerPoolError::BuildError(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Create a pool with as many workers as the global rayon pool.
    pub fn with_default_threads() -> Result<Self, WorkerPoolError> {
        Self::new(rayon::current_num_threads())
    }

    /// Get the number of workers.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn chunk_len(&self, len: usize) -> usize {
        len.div_ceil(self.num_threads()).max(1)
    }

    /// Run `f(sub_begin, sub_end)` over contiguous partitions of `[begin, end)`.
    ///
    /// Partitions do not overlap and cover the range exactly once.
    pub fn parallelize_loop<F>(&self, begin: usize, end: usize, f: F)
    where
        F: Fn(usize, usize) + Sync + Send,
    {
        if begin >= end {
            return;
        }
        let chunk = self.chunk_len(end - begin);
        let num_chunks = (end - begin).div_ceil(chunk);

        self.pool.install(|| {
            (0..num_chunks).into_par_iter().for_each(|i| {
                let sub_begin = begin + i * chunk;
                let sub_end = (sub_begin + chunk).min(end);
                f(sub_begin, sub_end);
            });
        });
    }

    /// Run `f(offset, chunk)` over contiguous mutable partitions of `data`.
    ///
    /// `offset` is the index of the first element of `chunk` within `data`.
    pub fn parallelize_chunks_mut<T, F>(&self, data: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        if data.is_empty() {
            return;
        }
        let chunk = self.chunk_len(data.len());

        self.pool.install(|| {
            data.par_chunks_mut(chunk)
                .enumerate()
                .for_each(|(i, sub)| f(i * chunk, sub));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_invalid_thread_count() {
        assert_eq!(
            WorkerPool::new(0).err(),
            Some(WorkerPoolError::InvalidThreadCount(0))
        );
    }

    #[test]
    fn test_parallelize_loop_covers_range() -> Result<(), WorkerPoolError> {
        let pool = WorkerPool::new(3)?;
        let visits = (0..100).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>();
        let calls = AtomicUsize::new(0);

        pool.parallelize_loop(10, 100, |begin, end| {
            calls.fetch_add(1, Ordering::Relaxed);
            for v in &visits[begin..end] {
                v.fetch_add(1, Ordering::Relaxed);
            }
        });

        for (i, v) in visits.iter().enumerate() {
            let expected = usize::from(i >= 10);
            assert_eq!(v.load(Ordering::Relaxed), expected, "index {i}");
        }
        assert!(calls.load(Ordering::Relaxed) <= 3);
        Ok(())
    }

    #[test]
    fn test_parallelize_loop_empty_range() -> Result<(), WorkerPoolError> {
        let pool = WorkerPool::new(2)?;
        let calls = AtomicUsize::new(0);
        pool.parallelize_loop(5, 5, |_, _| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        Ok(())
    }

    #[test]
    fn test_parallelize_chunks_mut() -> Result<(), WorkerPoolError> {
        let pool = WorkerPool::new(4)?;
        let mut data = vec![0usize; 37];
        pool.parallelize_chunks_mut(&mut data, |offset, chunk| {
            for (i, d) in chunk.iter_mut().enumerate() {
                *d = offset + i;
            }
        });
        assert_eq!(data, (0..37).collect::<Vec<_>>());
        Ok(())
    }
}
