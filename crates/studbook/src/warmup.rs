//! Startup cache warm-up
//!
//! Discovers relationships for the configured entity types, then
//! precomputes integrity results and both trees for the configured roots.

use std::sync::Arc;

use studbook_cache::{spawn_startup_warmup, CacheError, CacheResult, WarmingJob, WarmingReport, WarmingTask};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::WarmupConfig;
use crate::service::Studbook;

fn warming_error(task: &str, error: impl std::fmt::Display) -> CacheError {
    CacheError::Warming {
        task: task.to_string(),
        message: error.to_string(),
    }
}

impl Studbook {
    /// Spawn the warm-up on a detached task; never blocks the caller.
    ///
    /// Each step runs in isolation, so a failing entity type or root only
    /// shows up in the report and the logs.
    pub fn spawn_warmup(self: &Arc<Self>, plan: &WarmupConfig) -> JoinHandle<WarmingReport> {
        let mut jobs: Vec<(WarmingTask, WarmingJob)> = Vec::new();

        for entity in &plan.entities {
            let id = format!("relationships:{}", entity);
            let service = Arc::clone(self);
            let entity = entity.clone();
            let task_id = id.clone();
            let job: WarmingJob = Box::pin(async move {
                let relationships = service
                    .checker()
                    .catalog()
                    .relationships(&entity)
                    .await
                    .map_err(|e| warming_error(&task_id, e))?;
                CacheResult::Ok(relationships.descriptors.len())
            });
            jobs.push((WarmingTask::new(id, "discover relationships"), job));
        }

        if !plan.roots.is_empty() {
            let table = self.trees().layout().table.clone();
            let batch_size = self.checker().config().max_batch_size.max(1);
            for (n, chunk) in plan.roots.chunks(batch_size).enumerate() {
                let id = format!("integrity:{}:{}", table, n);
                let service = Arc::clone(self);
                let table = table.clone();
                let ids = chunk.to_vec();
                let task_id = id.clone();
                let job: WarmingJob = Box::pin(async move {
                    let results = service
                        .check_integrity_batch(&table, &ids)
                        .await
                        .map_err(|e| warming_error(&task_id, e))?;
                    CacheResult::Ok(results.len())
                });
                jobs.push((WarmingTask::new(id, "precompute integrity results"), job));
            }

            let id = "trees".to_string();
            let service = Arc::clone(self);
            let roots = plan.roots.clone();
            let depth = plan.tree_depth;
            let task_id = id.clone();
            let job: WarmingJob = Box::pin(async move {
                let mut warmed = 0;
                for root in roots {
                    let ancestors = service
                        .build_ancestor_tree(root, depth, None)
                        .await
                        .map_err(|e| warming_error(&task_id, e))?;
                    let descendants = service
                        .build_descendant_tree(root, depth, None)
                        .await
                        .map_err(|e| warming_error(&task_id, e))?;
                    warmed += [ancestors, descendants].iter().filter(|t| !t.is_empty()).count();
                }
                CacheResult::Ok(warmed)
            });
            jobs.push((WarmingTask::new(id, "precompute ancestor and descendant trees"), job));
        }

        info!("Spawning cache warm-up with {} tasks", jobs.len());
        spawn_startup_warmup(jobs)
    }
}
