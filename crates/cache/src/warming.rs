//! Cache warming at process start
//!
//! Warm-up runs once, on a detached tokio task, and never blocks request
//! handling. Every job is spawned on its own task so that an error, a
//! timeout or even a panic in one job is logged and the remaining jobs
//! still run.

use crate::{CacheError, CacheResult};
use std::{
    future::Future,
    pin::Pin,
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Boxed warm-up job; resolves to the number of entries it warmed
pub type WarmingJob = Pin<Box<dyn Future<Output = CacheResult<usize>> + Send + 'static>>;

/// Cache warming task definition
#[derive(Debug, Clone)]
pub struct WarmingTask {
    /// Identifier used in logs and results
    pub id: String,
    /// Description of what this task warms
    pub description: String,
    /// Maximum time to spend on this warming task
    pub timeout: Duration,
}

impl WarmingTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of a single warm-up task
#[derive(Debug, Clone)]
pub struct WarmingResult {
    pub task_id: String,
    pub entries_warmed: usize,
    pub duration: Duration,
    pub error: Option<CacheError>,
}

impl WarmingResult {
    pub fn success(task_id: String, entries_warmed: usize, duration: Duration) -> Self {
        Self {
            task_id,
            entries_warmed,
            duration,
            error: None,
        }
    }

    pub fn failure(task_id: String, duration: Duration, error: CacheError) -> Self {
        Self {
            task_id,
            entries_warmed: 0,
            duration,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a whole warm-up run
#[derive(Debug, Clone, Default)]
pub struct WarmingReport {
    pub results: Vec<WarmingResult>,
}

impl WarmingReport {
    pub fn entries_warmed(&self) -> usize {
        self.results.iter().map(|r| r.entries_warmed).sum()
    }

    pub fn failed_tasks(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.task_id.as_str())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(WarmingResult::is_success)
    }
}

/// Run warm-up jobs sequentially on a detached task.
///
/// The returned handle can be awaited for the report or simply dropped.
pub fn spawn_startup_warmup(jobs: Vec<(WarmingTask, WarmingJob)>) -> JoinHandle<WarmingReport> {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut report = WarmingReport::default();

        for (task, job) in jobs {
            report.results.push(run_isolated(task, job).await);
        }

        info!(
            "Cache warm-up finished: {} entries warmed, {} failed tasks, {:?}",
            report.entries_warmed(),
            report.failed_tasks().len(),
            started.elapsed()
        );
        report
    })
}

async fn run_isolated(task: WarmingTask, job: WarmingJob) -> WarmingResult {
    let started = Instant::now();
    debug!("Running warm-up task '{}': {}", task.id, task.description);

    let handle = tokio::spawn(tokio::time::timeout(task.timeout, job));

    match handle.await {
        Ok(Ok(Ok(entries))) => {
            debug!("Warm-up task '{}' warmed {} entries", task.id, entries);
            WarmingResult::success(task.id, entries, started.elapsed())
        }
        Ok(Ok(Err(err))) => {
            warn!("Warm-up task '{}' failed: {}", task.id, err);
            WarmingResult::failure(task.id, started.elapsed(), err)
        }
        Ok(Err(_elapsed)) => {
            warn!("Warm-up task '{}' timed out after {:?}", task.id, task.timeout);
            let error = CacheError::Timeout(task.id.clone());
            WarmingResult::failure(task.id, started.elapsed(), error)
        }
        Err(join_error) => {
            error!("Warm-up task '{}' aborted: {}", task.id, join_error);
            let error = CacheError::Warming {
                task: task.id.clone(),
                message: join_error.to_string(),
            };
            WarmingResult::failure(task.id, started.elapsed(), error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job<F>(fut: F) -> WarmingJob
    where
        F: Future<Output = CacheResult<usize>> + Send + 'static,
    {
        Box::pin(fut)
    }

    #[tokio::test]
    async fn test_all_jobs_succeed() {
        let report = spawn_startup_warmup(vec![
            (WarmingTask::new("a", "first"), job(async { Ok(2) })),
            (WarmingTask::new("b", "second"), job(async { Ok(3) })),
        ])
        .await
        .unwrap();

        assert!(report.is_success());
        assert_eq!(report.entries_warmed(), 5);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let report = spawn_startup_warmup(vec![
            (
                WarmingTask::new("broken", "fails"),
                job(async {
                    Err(CacheError::Warming {
                        task: "broken".to_string(),
                        message: "database unavailable".to_string(),
                    })
                }),
            ),
            (WarmingTask::new("ok", "works"), job(async { Ok(1) })),
        ])
        .await
        .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed_tasks(), vec!["broken"]);
        assert_eq!(report.entries_warmed(), 1);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let report = spawn_startup_warmup(vec![
            (
                WarmingTask::new("panics", "panics"),
                job(async {
                    let fail = true;
                    if fail {
                        panic!("boom");
                    }
                    Ok(0)
                }),
            ),
            (WarmingTask::new("ok", "works"), job(async { Ok(4) })),
        ])
        .await
        .unwrap();

        assert_eq!(report.failed_tasks(), vec!["panics"]);
        assert_eq!(report.entries_warmed(), 4);
    }

    #[tokio::test]
    async fn test_timeout() {
        let report = spawn_startup_warmup(vec![(
            WarmingTask::new("slow", "sleeps").with_timeout(Duration::from_millis(20)),
            job(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            }),
        )])
        .await
        .unwrap();

        assert!(matches!(report.results[0].error, Some(CacheError::Timeout(_))));
    }
}
