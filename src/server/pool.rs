// ABOUTME: Bounded pool for simulated upstream work (submit processing, reports, MO acks)
// ABOUTME: Each job runs in its own task so a panic is logged and never reaches the caller

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::error;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Run `job` once a worker is free. Jobs beyond the pool size queue up.
    pub fn spawn<F>(&self, name: &'static str, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let workers = self.workers.clone();
        tokio::spawn(async move {
            let Ok(_worker) = workers.acquire_owned().await else {
                return;
            };
            if let Err(e) = tokio::spawn(job).await {
                if e.is_panic() {
                    error!(job = name, "worker job panicked");
                }
            }
        });
    }

    /// Workers currently running a job
    pub fn busy(&self) -> usize {
        self.size - self.workers.available_permits()
    }
}
