//! Factories for kennel test data

use studbook_orm::DatabaseValue;

use crate::{database::TestDatabase, TestResult};

/// Fluent builder for rows of the `animals` table
#[derive(Debug, Clone, Default)]
pub struct AnimalBuilder {
    name: String,
    sex: Option<String>,
    breed_id: Option<i64>,
    father_id: Option<i64>,
    mother_id: Option<i64>,
}

impl AnimalBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn male(self) -> Self {
        self.sex("male")
    }

    pub fn female(self) -> Self {
        self.sex("female")
    }

    pub fn sex(mut self, sex: &str) -> Self {
        self.sex = Some(sex.to_string());
        self
    }

    pub fn breed(mut self, breed_id: i64) -> Self {
        self.breed_id = Some(breed_id);
        self
    }

    pub fn father(mut self, father_id: i64) -> Self {
        self.father_id = Some(father_id);
        self
    }

    pub fn mother(mut self, mother_id: i64) -> Self {
        self.mother_id = Some(mother_id);
        self
    }

    pub fn parents(self, father_id: i64, mother_id: i64) -> Self {
        self.father(father_id).mother(mother_id)
    }

    /// Insert the animal and return its id
    pub async fn create(self, db: &TestDatabase) -> TestResult<i64> {
        let values: [(&str, DatabaseValue); 5] = [
            ("name", self.name.into()),
            ("sex", self.sex.into()),
            ("breed_id", self.breed_id.into()),
            ("father_id", self.father_id.into()),
            ("mother_id", self.mother_id.into()),
        ];
        db.insert("animals", &values).await
    }
}
