use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use studbook_orm::{
    DatabasePool, DeletedEntity, DeletionObserver, DeletionService, IntegrityChecker,
    IntegrityConfig, ModelError, RelationshipCatalog,
};
use studbook_testing::prelude::*;

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<DeletedEntity>>,
}

#[async_trait]
impl DeletionObserver for RecordingObserver {
    async fn entity_deleted(&self, event: &DeletedEntity) {
        self.events.lock().unwrap().push(event.clone());
    }
}

struct Fixture {
    db: TestDatabase,
    pool: Arc<InstrumentedPool>,
    observer: Arc<RecordingObserver>,
    service: DeletionService,
}

async fn fixture() -> Fixture {
    init_test_tracing();
    let db = TestDatabase::kennel().await.unwrap();
    let pool = Arc::new(InstrumentedPool::new(db.pool()));
    let shared: Arc<dyn DatabasePool> = pool.clone();
    let catalog = Arc::new(RelationshipCatalog::new(Arc::new(kennel_schema())));
    let checker = Arc::new(IntegrityChecker::new(shared, catalog, IntegrityConfig::default()));
    let observer = Arc::new(RecordingObserver::default());
    let service = DeletionService::new(checker).with_observer(observer.clone());
    Fixture {
        db,
        pool,
        observer,
        service,
    }
}

#[tokio::test]
async fn test_delete_cascades_one_level() {
    let fx = fixture().await;
    let sire = AnimalBuilder::new("Rex").male().create(&fx.db).await.unwrap();
    let dam = AnimalBuilder::new("Bella").female().create(&fx.db).await.unwrap();
    let pup = AnimalBuilder::new("Pup").parents(sire, dam).create(&fx.db).await.unwrap();
    fx.db.insert_photo(pup).await.unwrap();
    fx.db.insert_photo(pup).await.unwrap();
    fx.db.insert_health_record(pup, "dewormed").await.unwrap();

    let outcome = fx.service.delete("animals", pup).await.unwrap();

    assert!(outcome.deleted);
    assert_eq!(outcome.cascaded_rows, 3);
    assert_eq!(outcome.summary.cascade_deletions, 3);
    assert!(!fx.db.record_exists("animals", pup).await.unwrap());
    assert_eq!(fx.db.count_records("photos", None).await.unwrap(), 0);
    assert_eq!(fx.db.count_records("health_records", None).await.unwrap(), 0);

    let events = fx.observer.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![DeletedEntity {
            entity_type: "animals".to_string(),
            id: pup,
            linked_ids: vec![sire, dam],
        }]
    );
}

#[tokio::test]
async fn test_blocked_delete_leaves_everything_in_place() {
    let fx = fixture().await;
    let sire = AnimalBuilder::new("Rex").male().create(&fx.db).await.unwrap();
    AnimalBuilder::new("Pup").father(sire).create(&fx.db).await.unwrap();
    fx.db.insert_photo(sire).await.unwrap();

    let outcome = fx.service.delete("animals", sire).await.unwrap();

    assert!(!outcome.deleted);
    assert!(!outcome.summary.can_delete);
    assert_eq!(outcome.summary.blocking_dependencies, 1);
    assert!(fx.db.record_exists("animals", sire).await.unwrap());
    assert_eq!(fx.db.count_records("photos", None).await.unwrap(), 1);
    assert!(fx.observer.events.lock().unwrap().is_empty());
    assert_eq!(fx.pool.count_matching("ROLLBACK"), 1);
}

#[tokio::test]
async fn test_deleting_missing_row_is_not_found() {
    let fx = fixture().await;
    let result = fx.service.delete("animals", 404).await;
    assert!(matches!(result, Err(ModelError::NotFound(_))));

    let result = fx.service.delete("animals", 0).await;
    assert!(matches!(result, Err(ModelError::Validation(_))));
}

#[tokio::test]
async fn test_parent_results_are_invalidated_after_commit() {
    let fx = fixture().await;
    let checker = fx.service.checker().clone();
    let sire = AnimalBuilder::new("Rex").male().create(&fx.db).await.unwrap();
    let pup = AnimalBuilder::new("Pup").father(sire).create(&fx.db).await.unwrap();

    assert_eq!(checker.check_integrity("animals", sire).await.unwrap().len(), 1);
    assert!(fx.service.delete("animals", pup).await.unwrap().deleted);

    assert!(checker.check_integrity("animals", sire).await.unwrap().is_empty());
    assert!(checker.check_integrity("animals", pup).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_commit_rolls_back_and_keeps_cache() {
    let fx = fixture().await;
    let checker = fx.service.checker().clone();
    let sire = AnimalBuilder::new("Rex").male().create(&fx.db).await.unwrap();
    let pup = AnimalBuilder::new("Pup").father(sire).create(&fx.db).await.unwrap();
    fx.db.insert_photo(pup).await.unwrap();
    checker.check_integrity("animals", sire).await.unwrap();

    fx.pool.fail_when_contains("COMMIT");
    let result = fx.service.delete("animals", pup).await;
    assert!(result.is_err());
    fx.pool.clear_failures();

    assert!(fx.db.record_exists("animals", pup).await.unwrap());
    assert_eq!(fx.db.count_records("photos", Some(("animal_id", pup))).await.unwrap(), 1);
    assert!(fx.observer.events.lock().unwrap().is_empty());

    fx.pool.reset();
    assert_eq!(checker.check_integrity("animals", sire).await.unwrap().len(), 1);
    assert_eq!(fx.pool.statement_count(), 0);
}

#[tokio::test]
async fn test_failure_mid_transaction_rolls_back() {
    let fx = fixture().await;
    let id = AnimalBuilder::new("Rex").create(&fx.db).await.unwrap();
    fx.db.insert_photo(id).await.unwrap();

    fx.pool.fail_when_contains("DELETE FROM \"animals\"");
    assert!(fx.service.delete("animals", id).await.is_err());
    fx.pool.clear_failures();

    assert!(fx.db.record_exists("animals", id).await.unwrap());
    assert_eq!(fx.db.count_records("photos", None).await.unwrap(), 1);
}
