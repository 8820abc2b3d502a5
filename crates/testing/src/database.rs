//! Database testing utilities
//!
//! Every [`TestDatabase`] is a private in-memory SQLite database, so tests
//! never share state and need no cleanup.

use std::sync::Arc;

use studbook_orm::backends::SqlitePool;
use studbook_orm::{
    CascadePolicy, DatabasePool, DatabaseRowExt, DeclaredRelation, ParamList, StaticSchema,
};

use crate::{TestError, TestResult};

/// Pedigree schema used throughout the tests.
///
/// `photos` and `health_records` cascade, `ownerships` is declared without
/// cascading, and `litters` is never declared so it is discovered in reverse.
pub const KENNEL_DDL: &[&str] = &[
    "CREATE TABLE breeds (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        species TEXT
    )",
    "CREATE TABLE animals (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        sex TEXT,
        breed_id INTEGER REFERENCES breeds(id),
        father_id INTEGER REFERENCES animals(id),
        mother_id INTEGER REFERENCES animals(id)
    )",
    "CREATE TABLE photos (
        id INTEGER PRIMARY KEY,
        animal_id INTEGER NOT NULL REFERENCES animals(id),
        url TEXT NOT NULL
    )",
    "CREATE TABLE health_records (
        id INTEGER PRIMARY KEY,
        animal_id INTEGER NOT NULL REFERENCES animals(id),
        note TEXT
    )",
    "CREATE TABLE ownerships (
        id INTEGER PRIMARY KEY,
        animal_id INTEGER NOT NULL REFERENCES animals(id),
        owner_name TEXT NOT NULL
    )",
    "CREATE TABLE litters (
        id INTEGER PRIMARY KEY,
        sire_id INTEGER REFERENCES animals(id),
        dam_id INTEGER REFERENCES animals(id),
        born_on TEXT
    )",
];

/// Schema description matching [`KENNEL_DDL`]
pub fn kennel_schema() -> StaticSchema {
    let cascade_all = CascadePolicy::none().with(studbook_orm::CascadeOption::All);
    let cascade_delete = CascadePolicy::none().with(studbook_orm::CascadeOption::Delete);

    StaticSchema::builder()
        .table("breeds", |t| t.column("name").column("species"))
        .table("animals", |t| {
            t.column("name")
                .column("sex")
                .foreign_key("breed_id", "breeds", "id")
                .foreign_key("father_id", "animals", "id")
                .foreign_key("mother_id", "animals", "id")
                .relation(
                    DeclaredRelation::has_many("offspring", "animals")
                        .with_foreign_key_hint(["father_id", "mother_id"]),
                )
                .relation(DeclaredRelation::has_many("photos", "photos").with_cascade(cascade_all))
                .relation(
                    DeclaredRelation::has_many("health_records", "health_records")
                        .with_cascade(cascade_delete),
                )
                .relation(DeclaredRelation::has_many("ownerships", "ownerships"))
                .relation(DeclaredRelation::has_one("breed", "breeds"))
        })
        .table("photos", |t| t.foreign_key("animal_id", "animals", "id").column("url"))
        .table("health_records", |t| {
            t.foreign_key("animal_id", "animals", "id").column("note")
        })
        .table("ownerships", |t| {
            t.foreign_key("animal_id", "animals", "id").column("owner_name")
        })
        .table("litters", |t| {
            t.foreign_key("sire_id", "animals", "id")
                .foreign_key("dam_id", "animals", "id")
                .column("born_on")
        })
        .build()
}

/// Test database manager
#[derive(Clone)]
pub struct TestDatabase {
    pool: Arc<dyn DatabasePool>,
}

impl TestDatabase {
    /// Empty in-memory database
    pub async fn new() -> TestResult<Self> {
        let pool = SqlitePool::in_memory().await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// In-memory database with the kennel schema applied
    pub async fn kennel() -> TestResult<Self> {
        let db = Self::new().await?;
        for statement in KENNEL_DDL {
            db.execute(statement).await?;
        }
        Ok(db)
    }

    pub fn pool(&self) -> Arc<dyn DatabasePool> {
        Arc::clone(&self.pool)
    }

    /// Execute a raw SQL statement (for test setup)
    pub async fn execute(&self, sql: &str) -> TestResult<u64> {
        Ok(self.pool.execute(sql, &[]).await?)
    }

    /// Insert a row and return its generated id
    pub async fn insert(&self, table: &str, values: &[(&str, studbook_orm::DatabaseValue)]) -> TestResult<i64> {
        let mut params = ParamList::new(self.pool.dialect());
        let columns: Vec<&str> = values.iter().map(|(column, _)| *column).collect();
        let placeholders = params.push_list(values.iter().map(|(_, value)| value.clone()));
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING id",
            table,
            columns.join(", "),
            placeholders
        );

        let row = self
            .pool
            .fetch_optional(&sql, params.values())
            .await?
            .ok_or_else(|| TestError::Setup(format!("Insert into {} returned no id", table)))?;
        Ok(row.get_i64("id")?)
    }

    /// Check if a row with the given id exists
    pub async fn record_exists(&self, table: &str, id: i64) -> TestResult<bool> {
        let mut params = ParamList::new(self.pool.dialect());
        let sql = format!("SELECT 1 AS found FROM {} WHERE id = {}", table, params.push(id));
        Ok(self.pool.fetch_optional(&sql, params.values()).await?.is_some())
    }

    /// Count rows in a table, optionally restricted to `column = value`
    pub async fn count_records(&self, table: &str, filter: Option<(&str, i64)>) -> TestResult<i64> {
        let mut params = ParamList::new(self.pool.dialect());
        let sql = match filter {
            Some((column, value)) => format!(
                "SELECT COUNT(*) AS total FROM {} WHERE {} = {}",
                table,
                column,
                params.push(value)
            ),
            None => format!("SELECT COUNT(*) AS total FROM {}", table),
        };

        let row = self
            .pool
            .fetch_optional(&sql, params.values())
            .await?
            .ok_or_else(|| TestError::Setup(format!("Count on {} returned no row", table)))?;
        Ok(row.get_i64("total")?)
    }

    pub async fn insert_breed(&self, name: &str, species: Option<&str>) -> TestResult<i64> {
        self.insert("breeds", &[("name", name.into()), ("species", species.into())])
            .await
    }

    pub async fn insert_photo(&self, animal_id: i64) -> TestResult<i64> {
        let url = format!("https://photos.example/{}.jpg", animal_id);
        self.insert("photos", &[("animal_id", animal_id.into()), ("url", url.into())])
            .await
    }

    pub async fn insert_health_record(&self, animal_id: i64, note: &str) -> TestResult<i64> {
        self.insert("health_records", &[("animal_id", animal_id.into()), ("note", note.into())])
            .await
    }

    pub async fn insert_ownership(&self, animal_id: i64, owner_name: &str) -> TestResult<i64> {
        self.insert(
            "ownerships",
            &[("animal_id", animal_id.into()), ("owner_name", owner_name.into())],
        )
        .await
    }

    pub async fn insert_litter(&self, sire_id: Option<i64>, dam_id: Option<i64>) -> TestResult<i64> {
        self.insert("litters", &[("sire_id", sire_id.into()), ("dam_id", dam_id.into())])
            .await
    }
}
