use std::sync::Arc;

use studbook_orm::{
    DatabasePool, DeletionService, IntegrityChecker, IntegrityConfig, RelationshipCatalog,
};
use studbook_pedigree::{
    InvalidationCoordinator, PedigreeError, PedigreeSchema, Relation, TreeBuilder,
    TreeBuilderConfig, TreeKind, TreeResult,
};
use studbook_testing::prelude::*;

/// Three generations:
///
/// ```text
/// Duke (m) + Daisy (f)
///        |
///      Rex (m) + Bella (f)
///             |
///     Pup (M), Pup 2 (?)
///        |
///     Grandpup (x)
/// ```
struct Family {
    duke: i64,
    daisy: i64,
    rex: i64,
    bella: i64,
    pup: i64,
    pup2: i64,
    grandpup: i64,
}

struct Fixture {
    db: TestDatabase,
    pool: Arc<InstrumentedPool>,
    builder: Arc<TreeBuilder>,
    coordinator: Arc<InvalidationCoordinator>,
    family: Family,
}

async fn fixture() -> Fixture {
    init_test_tracing();
    let db = TestDatabase::kennel().await.unwrap();
    let dog = db.insert_breed("Labrador", Some("dog")).await.unwrap();

    let duke = AnimalBuilder::new("Duke").male().breed(dog).create(&db).await.unwrap();
    let daisy = AnimalBuilder::new("Daisy").female().breed(dog).create(&db).await.unwrap();
    let rex = AnimalBuilder::new("Rex").male().breed(dog).parents(duke, daisy).create(&db).await.unwrap();
    let bella = AnimalBuilder::new("Bella").female().breed(dog).create(&db).await.unwrap();
    let pup = AnimalBuilder::new("Pup").sex("M").breed(dog).parents(rex, bella).create(&db).await.unwrap();
    let pup2 = AnimalBuilder::new("Pup 2").breed(dog).parents(rex, bella).create(&db).await.unwrap();
    let grandpup = AnimalBuilder::new("Grandpup").sex("x").breed(dog).father(pup).create(&db).await.unwrap();

    let pool = Arc::new(InstrumentedPool::new(db.pool()));
    let shared: Arc<dyn DatabasePool> = pool.clone();
    let builder = Arc::new(TreeBuilder::new(
        shared,
        Arc::new(kennel_schema()),
        PedigreeSchema::default(),
        TreeBuilderConfig::default(),
    ));
    let coordinator = Arc::new(InvalidationCoordinator::new(builder.clone()));

    Fixture {
        db,
        pool,
        builder,
        coordinator,
        family: Family {
            duke,
            daisy,
            rex,
            bella,
            pup,
            pup2,
            grandpup,
        },
    }
}

fn assert_edges_are_closed(tree: &TreeResult) {
    for edge in &tree.edges {
        assert!(tree.contains(edge.from), "edge source {} is not a node", edge.from);
        assert!(tree.contains(edge.to), "edge target {} is not a node", edge.to);
        assert!(matches!(edge.relation, Relation::Father | Relation::Mother));
    }
    assert_eq!(tree.counts.nodes, tree.nodes.len());
    assert_eq!(tree.counts.edges, tree.edges.len());
}

fn edge_set(tree: &TreeResult) -> Vec<(i64, i64, Relation)> {
    let mut edges: Vec<_> = tree.edges.iter().map(|e| (e.from, e.to, e.relation)).collect();
    edges.sort();
    edges
}

#[tokio::test]
async fn test_ancestor_tree_stops_when_parents_run_out() {
    let fx = fixture().await;
    let f = &fx.family;

    fx.pool.reset();
    let tree = fx.builder.build_ancestor_tree(f.pup, 3, None).await.unwrap();

    // root, two levels, species lookup
    assert_eq!(fx.pool.statement_count(), 4);
    assert_eq!(tree.depth_reached, 2);
    assert_eq!(tree.nodes.keys().copied().collect::<Vec<_>>(), {
        let mut ids = vec![f.duke, f.daisy, f.rex, f.bella, f.pup];
        ids.sort();
        ids
    });

    let mut expected = vec![
        (f.rex, f.pup, Relation::Father),
        (f.bella, f.pup, Relation::Mother),
        (f.duke, f.rex, Relation::Father),
        (f.daisy, f.rex, Relation::Mother),
    ];
    expected.sort();
    assert_eq!(edge_set(&tree), expected);
    assert_edges_are_closed(&tree);

    assert_eq!(tree.summary.sex_counts["male"], 3);
    assert_eq!(tree.summary.sex_counts["female"], 2);
    assert_eq!(tree.summary.sex_counts["unknown"], 0);
    assert_eq!(tree.summary.species_counts["dog"], 5);
    assert_eq!(tree.summary.relation_counts["father"], 2);
    assert_eq!(tree.edge_examples.by_sex["male"].len(), 2);
    assert_eq!(tree.edge_examples.by_sex["female"].len(), 2);
    assert!(tree.summary.text.contains("5 nodes, 4 edges"));
}

#[tokio::test]
async fn test_depth_zero_returns_only_the_root() {
    let fx = fixture().await;
    let loner = AnimalBuilder::new("Solo").male().create(&fx.db).await.unwrap();

    fx.pool.reset();
    let tree = fx.builder.build_ancestor_tree(loner, 0, None).await.unwrap();
    assert_eq!(fx.pool.statement_count(), 1);
    assert_eq!(tree.nodes.len(), 1);
    assert!(tree.edges.is_empty());
    assert_eq!(tree.depth_reached, 0);
    assert_eq!(tree.summary.species_counts["unknown"], 1);

    let tree = fx.builder.build_descendant_tree(fx.family.rex, 0, None).await.unwrap();
    assert_eq!(tree.nodes.len(), 1);
    assert!(tree.edges.is_empty());
}

#[tokio::test]
async fn test_descendant_tree_uses_one_query_per_level() {
    let fx = fixture().await;
    let f = &fx.family;

    fx.pool.reset();
    let tree = fx.builder.build_descendant_tree(f.duke, 5, None).await.unwrap();

    // root, four levels (the last one empty), species lookup
    assert_eq!(fx.pool.statement_count(), 6);
    assert_eq!(tree.depth_reached, 3);
    assert_eq!(tree.nodes.len(), 5);
    assert!(!tree.contains(f.bella));

    let mut expected = vec![
        (f.duke, f.rex, Relation::Father),
        (f.rex, f.pup, Relation::Father),
        (f.rex, f.pup2, Relation::Father),
        (f.pup, f.grandpup, Relation::Father),
    ];
    expected.sort();
    assert_eq!(edge_set(&tree), expected);
    assert_edges_are_closed(&tree);
    assert_eq!(tree.summary.sex_counts["unknown"], 2);
}

#[tokio::test]
async fn test_descendants_through_both_parents() {
    let fx = fixture().await;
    let f = &fx.family;

    let tree = fx.builder.build_descendant_tree(f.bella, 2, None).await.unwrap();
    assert_eq!(tree.depth_reached, 2);
    assert!(tree.contains(f.pup) && tree.contains(f.pup2) && tree.contains(f.grandpup));
    assert!(!tree.contains(f.rex));
    assert_eq!(tree.summary.relation_counts["mother"], 2);
    assert_edges_are_closed(&tree);
}

#[tokio::test]
async fn test_missing_root_is_empty_and_not_cached() {
    let fx = fixture().await;

    let tree = fx.builder.build_ancestor_tree(9999, 3, None).await.unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.depth_reached, 0);
    assert!(fx.builder.cache().is_empty());
}

#[tokio::test]
async fn test_invalid_requests_issue_no_queries() {
    let fx = fixture().await;
    fx.pool.reset();

    let result = fx.builder.build_ancestor_tree(0, 3, None).await;
    assert!(matches!(result, Err(PedigreeError::Validation(_))));

    let result = fx.builder.build_descendant_tree(fx.family.rex, 11, None).await;
    assert!(matches!(result, Err(PedigreeError::Validation(_))));

    let result = fx.builder.build_ancestor_tree(fx.family.rex, 2, Some(&["password"])).await;
    assert!(matches!(result, Err(PedigreeError::Validation(_))));

    let result = fx.builder.build_ancestor_tree(fx.family.rex, 2, Some(&["name; DROP TABLE animals"])).await;
    assert!(result.unwrap_err().is_validation());

    assert_eq!(fx.pool.statement_count(), 0);
}

#[tokio::test]
async fn test_requested_fields_shape_nodes() {
    let fx = fixture().await;
    let f = &fx.family;

    let tree = fx.builder.build_ancestor_tree(f.pup, 1, None).await.unwrap();
    let keys: Vec<_> = tree.nodes[&f.pup].fields.keys().cloned().collect();
    assert_eq!(keys, vec!["breed_id", "name", "sex"]);

    let tree = fx.builder.build_ancestor_tree(f.pup, 1, Some(&["name"])).await.unwrap();
    assert_eq!(tree.nodes[&f.pup].fields.len(), 1);
    assert_eq!(tree.nodes[&f.rex].fields["name"], json!("Rex"));
    // sex is still classified when not requested
    assert_eq!(tree.summary.sex_counts["male"], 2);

    let value = serde_json::to_value(&tree).unwrap();
    TestAssertions::assert_json_contains(
        &value,
        &json!({"kind": "ancestors", "depth_reached": 1, "counts": {"nodes": 3, "edges": 2}}),
    )
    .unwrap();
}

#[tokio::test]
async fn test_trees_are_cached_per_fields() {
    let fx = fixture().await;
    let f = &fx.family;

    let first = fx.builder.build_ancestor_tree(f.pup, 2, None).await.unwrap();
    fx.pool.reset();
    let second = fx.builder.build_ancestor_tree(f.pup, 2, Some(&[])).await.unwrap();
    assert_eq!(fx.pool.statement_count(), 0);
    assert_eq!(first, second);

    fx.builder.build_ancestor_tree(f.pup, 2, Some(&["sex", "name"])).await.unwrap();
    assert!(fx.pool.statement_count() > 0);
    fx.pool.reset();
    fx.builder.build_ancestor_tree(f.pup, 2, Some(&["name", "sex"])).await.unwrap();
    assert_eq!(fx.pool.statement_count(), 0);
    assert_eq!(fx.builder.cache().len(), 2);
}

#[tokio::test]
async fn test_example_edges_are_capped() {
    let fx = fixture().await;
    let f = &fx.family;
    for i in 0..7 {
        AnimalBuilder::new(&format!("Litter {}", i)).father(f.duke).create(&fx.db).await.unwrap();
    }

    let tree = fx.builder.build_descendant_tree(f.duke, 1, None).await.unwrap();
    assert_eq!(tree.summary.relation_counts["father"], 8);
    assert_eq!(tree.edge_examples.by_sex["male"].len(), 5);
    assert_eq!(tree.edge_examples.by_species["dog"].len(), 5);
    TestAssertions::assert_in_range(tree.counts.edges, 8, 8).unwrap();
}

#[tokio::test]
async fn test_species_lookup_failure_degrades_to_unknown() {
    let fx = fixture().await;
    fx.pool.fail_when_contains("\"breeds\"");

    let tree = fx.builder.build_ancestor_tree(fx.family.pup, 2, None).await.unwrap();
    assert_eq!(tree.nodes.len(), 5);
    assert_eq!(tree.summary.species_counts.len(), 1);
    assert_eq!(tree.summary.species_counts["unknown"], 5);
}

#[tokio::test]
async fn test_invalidation_purges_parents() {
    let fx = fixture().await;
    let f = &fx.family;

    let before = fx.builder.build_descendant_tree(f.rex, 2, None).await.unwrap();
    let newcomer = AnimalBuilder::new("Newcomer").father(f.rex).create(&fx.db).await.unwrap();
    let stale = fx.builder.build_descendant_tree(f.rex, 2, None).await.unwrap();
    assert_eq!(before, stale);

    assert_eq!(fx.coordinator.invalidate_for(newcomer).await.unwrap(), 1);
    let fresh = fx.builder.build_descendant_tree(f.rex, 2, None).await.unwrap();
    assert!(fresh.contains(newcomer));
    assert_eq!(fresh.nodes.len(), before.nodes.len() + 1);
}

#[tokio::test]
async fn test_invalidation_leaves_entries_outside_the_depth_window() {
    let fx = fixture().await;
    let f = &fx.family;

    fx.builder.build_descendant_tree(f.rex, 8, None).await.unwrap();
    fx.builder.build_descendant_tree(f.rex, 2, Some(&["name"])).await.unwrap();
    let newcomer = AnimalBuilder::new("Newcomer").father(f.rex).create(&fx.db).await.unwrap();

    assert_eq!(fx.coordinator.invalidate_for(newcomer).await.unwrap(), 0);
    let stale = fx.builder.build_descendant_tree(f.rex, 8, None).await.unwrap();
    assert!(!stale.contains(newcomer));

    assert_eq!(fx.coordinator.purge_ids(&[f.rex]), 2);
    let fresh = fx.builder.build_descendant_tree(f.rex, 8, None).await.unwrap();
    assert!(fresh.contains(newcomer));
    assert_eq!(fresh.kind, TreeKind::Descendants);
}

#[tokio::test]
async fn test_deletion_purges_trees_of_parents() {
    let fx = fixture().await;
    let f = &fx.family;

    let catalog = Arc::new(RelationshipCatalog::new(Arc::new(kennel_schema())));
    let checker = Arc::new(IntegrityChecker::new(fx.db.pool(), catalog, IntegrityConfig::default()));
    let service = DeletionService::new(checker).with_observer(fx.coordinator.clone());

    let before = fx.builder.build_descendant_tree(f.pup, 1, None).await.unwrap();
    assert!(before.contains(f.grandpup));

    let outcome = service.delete("animals", f.grandpup).await.unwrap();
    assert!(outcome.deleted);

    let after = fx.builder.build_descendant_tree(f.pup, 1, None).await.unwrap();
    assert!(!after.contains(f.grandpup));
    assert_eq!(after.depth_reached, 0);
}

#[tokio::test]
async fn test_large_frontiers_are_split_into_chunks() {
    let fx = fixture().await;
    let f = &fx.family;
    let shared: Arc<dyn DatabasePool> = fx.pool.clone();
    let chunked = TreeBuilder::new(
        shared,
        Arc::new(kennel_schema()),
        PedigreeSchema::default(),
        TreeBuilderConfig::default().with_max_in_list(1),
    );

    fx.pool.reset();
    let whole = fx.builder.build_descendant_tree(f.duke, 3, None).await.unwrap();
    let single_statements = fx.pool.statement_count();

    fx.pool.reset();
    let split = chunked.build_descendant_tree(f.duke, 3, None).await.unwrap();
    let split_statements = fx.pool.statement_count();

    assert_eq!(
        split.nodes.keys().collect::<Vec<_>>(),
        whole.nodes.keys().collect::<Vec<_>>()
    );
    assert_eq!(edge_set(&split), edge_set(&whole));
    assert_eq!(split.depth_reached, 3);
    assert_edges_are_closed(&split);
    // the third level has two parents in its frontier
    assert_eq!(split_statements, single_statements + 1);

    let ancestors = chunked.build_ancestor_tree(f.grandpup, 3, None).await.unwrap();
    for id in [f.pup, f.rex, f.bella, f.duke, f.daisy] {
        assert!(ancestors.contains(id));
    }
    assert_eq!(ancestors.edges.len(), 5);
}
