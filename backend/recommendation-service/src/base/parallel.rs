//! Fixed-size worker pool job distribution
//!
//! Every job index in `[0, n_jobs)` is handed to exactly one worker. Workers
//! pull indices from a shared atomic cursor, so there is no ordering between
//! workers. Errors never cancel outstanding work: the first error observed is
//! returned once every job has run.
//!
//! The executor owns no scratch state. Callers that need per-worker
//! temporaries allocate `n_workers` of them and address them by `worker_id`.
//! Thread pools are built once per worker count and reused by later calls.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static POOLS: Lazy<Mutex<HashMap<usize, Arc<ThreadPool>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Shared pool of exactly `n_workers` threads.
fn shared_pool(n_workers: usize) -> Result<Arc<ThreadPool>, ThreadPoolBuildError> {
    let mut pools = POOLS.lock();
    if let Some(pool) = pools.get(&n_workers) {
        return Ok(pool.clone());
    }
    let pool = Arc::new(
        ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .thread_name(move |i| format!("fit-{}-{}", n_workers, i))
            .build()?,
    );
    pools.insert(n_workers, pool.clone());
    Ok(pool)
}

/// Runs `f(worker_id, job_id)` for every job id in `[0, n_jobs)`.
///
/// With a single worker the jobs run in index order on the calling thread.
pub fn parallel<F, E>(n_jobs: usize, n_workers: usize, f: F) -> Result<(), E>
where
    F: Fn(usize, usize) -> Result<(), E> + Sync,
    E: Send + From<ThreadPoolBuildError>,
{
    if n_workers <= 1 || n_jobs <= 1 {
        let mut first_error = None;
        for job_id in 0..n_jobs {
            if let Err(e) = f(0, job_id) {
                first_error.get_or_insert(e);
            }
        }
        return first_error.map_or(Ok(()), Err);
    }

    let cursor = AtomicUsize::new(0);
    let first_error: Mutex<Option<E>> = Mutex::new(None);
    let pool = shared_pool(n_workers)?;
    pool.broadcast(|ctx| {
        let worker_id = ctx.index();
        loop {
            let job_id = cursor.fetch_add(1, Ordering::Relaxed);
            if job_id >= n_jobs {
                break;
            }
            if let Err(e) = f(worker_id, job_id) {
                first_error.lock().get_or_insert(e);
            }
        }
    });
    first_error.into_inner().map_or(Ok(()), Err)
}

/// Runs `f(worker_id, begin, end)` over contiguous half-open ranges of at most
/// `batch_size` jobs covering `[0, n_jobs)`.
pub fn batch_parallel<F, E>(n_jobs: usize, n_workers: usize, batch_size: usize, f: F) -> Result<(), E>
where
    F: Fn(usize, usize, usize) -> Result<(), E> + Sync,
    E: Send + From<ThreadPoolBuildError>,
{
    let batch_size = batch_size.max(1);
    let n_batches = n_jobs.div_ceil(batch_size);
    parallel(n_batches, n_workers, |worker_id, batch_id| {
        let begin = batch_id * batch_size;
        let end = (begin + batch_size).min(n_jobs);
        f(worker_id, begin, end)
    })
}
