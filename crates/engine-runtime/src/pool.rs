use std::{future::Future, sync::Arc};
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinSet},
};

/// Runs tasks with at most `size` of them executing at once. Tasks beyond
/// the limit are spawned but wait for a permit before doing any work.
pub struct WorkerPool<T> {
    permits: Arc<Semaphore>,
    tasks: JoinSet<T>,
    size: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.tasks.spawn(async move {
            // The semaphore is never closed, so acquiring only waits.
            let _permit = permits.acquire_owned().await.ok();
            task.await
        });
    }

    /// Waits for every task. Outputs arrive in completion order. A panicked
    /// task aborts the rest.
    pub async fn join_all(mut self) -> Result<Vec<T>, JoinError> {
        let mut outputs = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    self.tasks.abort_all();
                    return Err(err);
                }
            }
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test]
    async fn never_exceeds_its_size() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut pool = WorkerPool::new(3);

        for i in 0..12usize {
            let running = running.clone();
            let peak = peak.clone();
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            });
        }
        assert_eq!(pool.len(), 12);

        let mut outputs = pool.join_all().await.unwrap();
        outputs.sort_unstable();
        assert_eq!(outputs, (0..12).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn zero_size_still_makes_progress() {
        let mut pool = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
        pool.spawn(async { 7 });
        assert_eq!(pool.join_all().await.unwrap(), vec![7]);
    }
}
