//! Bounded worker pool.

use tracing::error;

/// A unit of work handed to the pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors from the pool's process-management layer.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),

    #[error("Worker pool rejected a job: {0}")]
    Rejected(String),
}

/// Executes jobs on at most `workers()` threads at once.
pub trait WorkerPool {
    fn workers(&self) -> usize;

    /// Queue `job` for execution. An error means the pool is unusable.
    fn submit(&self, job: Job) -> Result<(), PoolError>;
}

/// `rayon` thread pool.
pub struct RayonPool {
    pool: rayon::ThreadPool,
}

impl RayonPool {
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("memlog-worker-{}", i))
            .panic_handler(|_| error!("compression worker panicked"))
            .build()?;
        Ok(Self { pool })
    }
}

impl WorkerPool for RayonPool {
    fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn submit(&self, job: Job) -> Result<(), PoolError> {
        self.pool.spawn(job);
        Ok(())
    }
}
