//! Transactional deletion
//!
//! The dependency check, cascading deletes and the row delete share one
//! transaction. Cached integrity results are invalidated and observers are
//! notified only after the commit succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use super::checker::{validate_id, IntegrityChecker};
use super::types::{DeletionOutcome, DeletionSummary};
use crate::backends::{DatabaseRowExt, DatabaseTransaction, Executor, ParamList};
use crate::error::{ModelError, OrmResult};
use crate::relationships::EntityRelationships;

/// A committed deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedEntity {
    pub entity_type: String,
    pub id: i64,
    /// Values of the row's self-referencing links at deletion time
    pub linked_ids: Vec<i64>,
}

/// Notified after a deletion commits
#[async_trait]
pub trait DeletionObserver: Send + Sync {
    async fn entity_deleted(&self, event: &DeletedEntity);
}

enum Staged {
    Blocked(DeletionSummary),
    Deleted {
        summary: DeletionSummary,
        linked_ids: Vec<i64>,
        cascaded_rows: u64,
    },
}

pub struct DeletionService {
    checker: Arc<IntegrityChecker>,
    observers: Vec<Arc<dyn DeletionObserver>>,
}

impl DeletionService {
    pub fn new(checker: Arc<IntegrityChecker>) -> Self {
        Self {
            checker,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeletionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn checker(&self) -> &Arc<IntegrityChecker> {
        &self.checker
    }

    /// Delete a row unless non-cascading dependents reference it.
    ///
    /// Returns `deleted: false` with the blocking summary when dependents
    /// remain, and [`ModelError::NotFound`] when the row does not exist.
    pub async fn delete(&self, entity_type: &str, id: i64) -> OrmResult<DeletionOutcome> {
        validate_id(id)?;
        let relationships = self.checker.catalog().relationships(entity_type).await?;

        let mut tx = self.checker.pool().begin_transaction().await?;
        let staged = self.stage(tx.as_mut(), &relationships, id).await;

        match staged {
            Ok(Staged::Blocked(summary)) => {
                if let Err(e) = tx.rollback().await {
                    error!(entity_type, id, error = %e, "Rollback after blocked deletion failed");
                }
                info!(
                    entity_type,
                    id,
                    blocking = summary.blocking_dependencies,
                    "Deletion blocked by dependent records"
                );
                Ok(DeletionOutcome {
                    deleted: false,
                    summary,
                    cascaded_rows: 0,
                })
            }
            Ok(Staged::Deleted {
                summary,
                linked_ids,
                cascaded_rows,
            }) => {
                tx.commit().await?;

                self.checker.invalidate(entity_type, id);
                for &linked in &linked_ids {
                    self.checker.invalidate(entity_type, linked);
                }

                let event = DeletedEntity {
                    entity_type: entity_type.to_string(),
                    id,
                    linked_ids,
                };
                for observer in &self.observers {
                    observer.entity_deleted(&event).await;
                }

                info!(entity_type, id, cascaded_rows, "Entity deleted");
                Ok(DeletionOutcome {
                    deleted: true,
                    summary,
                    cascaded_rows,
                })
            }
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    error!(entity_type, id, error = %rollback_error, "Rollback after failed deletion failed");
                }
                Err(e)
            }
        }
    }

    async fn stage(
        &self,
        tx: &mut dyn DatabaseTransaction,
        relationships: &EntityRelationships,
        id: i64,
    ) -> OrmResult<Staged> {
        let dialect = self.checker.pool().dialect();
        let mut executor = Executor::Transaction(tx);
        let allow = &relationships.allow_list;
        let table = allow.table(&relationships.table)?;
        let primary_key = allow.column(&relationships.table, &relationships.primary_key)?;

        let link_fields = relationships.self_link_fields();
        let mut selected = vec![primary_key.clone()];
        for field in &link_fields {
            selected.push(allow.column(&relationships.table, field)?);
        }
        let mut params = ParamList::new(dialect);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            selected.join(", "),
            table,
            primary_key,
            params.push(id)
        );
        let row = executor
            .fetch_optional(&sql, params.values())
            .await?
            .ok_or_else(|| ModelError::NotFound(format!("{} {} not found", relationships.entity_type, id)))?;

        let mut linked_ids = Vec::new();
        for field in &link_fields {
            if let Some(linked) = row.get_optional_i64(field)? {
                if !linked_ids.contains(&linked) {
                    linked_ids.push(linked);
                }
            }
        }

        let warnings = self.checker.probe_single(&mut executor, relationships, id).await;
        let warnings = self
            .checker
            .with_exact_counts(&mut executor, relationships, id, warnings)
            .await;
        let summary = DeletionSummary::from_warnings(warnings);
        if !summary.can_delete {
            return Ok(Staged::Blocked(summary));
        }

        let mut cascaded_rows = 0;
        for warning in summary.warnings.iter().filter(|w| w.cascade_on_delete) {
            let mut params = ParamList::new(dialect);
            let sql = format!(
                "DELETE FROM {} WHERE {} = {}",
                allow.table(&warning.dependent_entity_type)?,
                allow.column(&warning.dependent_entity_type, &warning.dependent_field)?,
                params.push(id)
            );
            cascaded_rows += executor.execute(&sql, params.values()).await?;
        }

        let mut params = ParamList::new(dialect);
        let sql = format!("DELETE FROM {} WHERE {} = {}", table, primary_key, params.push(id));
        if executor.execute(&sql, params.values()).await? == 0 {
            return Err(ModelError::NotFound(format!(
                "{} {} not found",
                relationships.entity_type, id
            )));
        }

        Ok(Staged::Deleted {
            summary,
            linked_ids,
            cascaded_rows,
        })
    }
}
