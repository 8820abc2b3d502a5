use std::sync::Arc;

use studbook::prelude::*;
use studbook::WarmupConfig;
use studbook_testing::prelude::*;

async fn service_with(config: StudbookConfig) -> (TestDatabase, Studbook) {
    init_test_tracing();
    let db = TestDatabase::kennel().await.unwrap();
    let service = Studbook::new(db.pool(), Arc::new(kennel_schema()), &config);
    (db, service)
}

async fn service() -> (TestDatabase, Studbook) {
    service_with(StudbookConfig::default()).await
}

#[tokio::test]
async fn test_record_without_dependents_is_safe() {
    let (db, service) = service().await;
    let id = AnimalBuilder::new("Solo").create(&db).await.unwrap();

    assert!(service.check_integrity("animals", id).await.unwrap().is_empty());
    let (safe, warnings) = service.can_delete_safely("animals", id).await.unwrap();
    assert!(safe);
    assert!(warnings.is_empty());

    let summary = service.deletion_summary("animals", id).await.unwrap();
    assert!(summary.can_delete);
    assert_eq!(summary.total_dependents, 0);
}

#[tokio::test]
async fn test_summary_splits_cascading_and_blocking() {
    let (db, service) = service().await;
    let id = AnimalBuilder::new("Rex").create(&db).await.unwrap();
    db.insert_photo(id).await.unwrap();
    db.insert_photo(id).await.unwrap();
    db.insert_ownership(id, "Alice").await.unwrap();

    let summary = service.deletion_summary("animals", id).await.unwrap();
    assert!(!summary.can_delete);
    assert_eq!(summary.cascade_deletions, 2);
    assert_eq!(summary.blocking_dependencies, 1);
    assert_eq!(summary.total_dependents, 3);

    let outcome = service.delete_entity("animals", id).await.unwrap();
    assert!(!outcome.deleted);
    assert!(db.record_exists("animals", id).await.unwrap());
}

#[tokio::test]
async fn test_delete_refreshes_both_caches() {
    let (db, service) = service().await;
    let sire = AnimalBuilder::new("Rex").male().create(&db).await.unwrap();
    let pup = AnimalBuilder::new("Pup").father(sire).create(&db).await.unwrap();
    db.insert_photo(pup).await.unwrap();

    assert_eq!(service.check_integrity("animals", sire).await.unwrap().len(), 1);
    assert_eq!(service.check_integrity("animals", pup).await.unwrap().len(), 1);
    assert!(service.build_descendant_tree(sire, 2, None).await.unwrap().contains(pup));

    let outcome = service.delete_entity("animals", pup).await.unwrap();
    assert!(outcome.deleted);
    assert_eq!(outcome.cascaded_rows, 1);

    assert!(service.check_integrity("animals", pup).await.unwrap().is_empty());
    assert!(service.check_integrity("animals", sire).await.unwrap().is_empty());
    let tree = service.build_descendant_tree(sire, 2, None).await.unwrap();
    assert_eq!(tree.nodes.len(), 1);
}

#[tokio::test]
async fn test_ancestors_with_unknown_grandparents_stop_early() {
    let (db, service) = service().await;
    let sire = AnimalBuilder::new("Rex").male().create(&db).await.unwrap();
    let dam = AnimalBuilder::new("Bella").female().create(&db).await.unwrap();
    let pup = AnimalBuilder::new("Pup").parents(sire, dam).create(&db).await.unwrap();

    let tree = service.build_ancestor_tree(pup, 3, None).await.unwrap();
    assert_eq!(tree.depth_reached, 1);
    assert_eq!(tree.nodes.len(), 3);
    assert_eq!(tree.edges.len(), 2);
    for edge in &tree.edges {
        assert_eq!(edge.to, pup);
    }
}

#[tokio::test]
async fn test_relinking_a_parent_with_explicit_invalidation() {
    let (db, service) = service().await;
    let first = AnimalBuilder::new("First").male().create(&db).await.unwrap();
    let second = AnimalBuilder::new("Second").male().create(&db).await.unwrap();
    let pup = AnimalBuilder::new("Pup").father(first).create(&db).await.unwrap();

    assert!(service.build_descendant_tree(first, 1, None).await.unwrap().contains(pup));
    assert!(!service.build_descendant_tree(second, 1, None).await.unwrap().contains(pup));
    assert_eq!(service.check_integrity("animals", first).await.unwrap().len(), 1);

    service.invalidate_tree_cache_for(pup).await.unwrap();
    db.execute(&format!("UPDATE animals SET father_id = {} WHERE id = {}", second, pup))
        .await
        .unwrap();
    service.invalidate_tree_cache_for(pup).await.unwrap();

    assert!(!service.build_descendant_tree(first, 1, None).await.unwrap().contains(pup));
    assert!(service.build_descendant_tree(second, 1, None).await.unwrap().contains(pup));
    assert!(service.check_integrity("animals", first).await.unwrap().is_empty());
    assert_eq!(service.check_integrity("animals", second).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cache_stats_and_clear() {
    let (db, service) = service().await;
    let id = AnimalBuilder::new("Rex").create(&db).await.unwrap();

    service.check_integrity("animals", id).await.unwrap();
    service.check_integrity("animals", id).await.unwrap();
    service.build_ancestor_tree(id, 2, None).await.unwrap();

    let stats = service.cache_stats();
    assert_eq!(stats.integrity.total, 1);
    assert_eq!(stats.integrity.hits, 1);
    assert_eq!(stats.trees.valid, 1);
    assert_eq!(stats.combined().total, 2);

    service.clear_cache();
    assert_eq!(service.cache_stats().combined().total, 0);
    assert!(!service.invalidate_integrity("animals", id));
}

#[tokio::test]
async fn test_configured_limits_apply() {
    let mut config = StudbookConfig::default();
    config.max_batch_size = 2;
    config.max_tree_depth = 4;
    let (db, service) = service_with(config).await;
    let id = AnimalBuilder::new("Rex").create(&db).await.unwrap();

    let err = service.check_integrity_batch("animals", &[1, 2, 3]).await.unwrap_err();
    assert!(err.is_validation());
    let err = service.build_descendant_tree(id, 5, None).await.unwrap_err();
    assert!(err.is_validation());
    assert!(service.build_descendant_tree(id, 4, None).await.is_ok());

    let err = service.delete_entity("animals", 9999).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_warmup_fills_caches_and_isolates_failures() {
    let (db, service) = service().await;
    let sire = AnimalBuilder::new("Rex").male().create(&db).await.unwrap();
    let pup = AnimalBuilder::new("Pup").father(sire).create(&db).await.unwrap();
    let service = Arc::new(service);

    let plan = WarmupConfig {
        enabled: true,
        entities: vec!["animals".to_string(), "owners".to_string()],
        roots: vec![sire, pup],
        tree_depth: 2,
    };
    let report = service.spawn_warmup(&plan).await.unwrap();

    assert_eq!(report.failed_tasks(), vec!["relationships:owners"]);
    let stats = service.cache_stats();
    assert_eq!(stats.integrity.total, 2);
    assert_eq!(stats.trees.total, 4);

    let cached = service.build_ancestor_tree(pup, 2, None).await.unwrap();
    assert_eq!(service.cache_stats().trees.hits, 1);
    assert!(cached.contains(sire));
}

#[tokio::test]
async fn test_connect_needs_a_database_url() {
    let schema: Arc<dyn SchemaSource> = Arc::new(kennel_schema());
    let result = Studbook::connect(&StudbookConfig::default(), schema.clone()).await;
    assert!(matches!(result, Err(StudbookError::Config(_))));

    let config = StudbookConfig::default().with_database_url("sqlite::memory:");
    assert!(Studbook::connect(&config, schema).await.is_ok());
}
