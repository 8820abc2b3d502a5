//! Pool wrapper that records statements and injects failures

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use studbook_orm::{
    DatabasePool, DatabaseRow, DatabaseTransaction, DatabaseValue, ModelError, OrmResult, SqlDialect,
};

#[derive(Default)]
struct Recorder {
    statements: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl Recorder {
    fn observe(&self, sql: &str) -> OrmResult<()> {
        self.statements.lock().push(sql.to_string());
        let failures = self.failures.lock();
        match failures.iter().find(|fragment| sql.contains(fragment.as_str())) {
            Some(fragment) => Err(ModelError::Query(format!(
                "Injected failure for statements containing '{}'",
                fragment
            ))),
            None => Ok(()),
        }
    }
}

/// Delegates to another pool, recording every statement it sees
pub struct InstrumentedPool {
    inner: Arc<dyn DatabasePool>,
    recorder: Arc<Recorder>,
}

impl InstrumentedPool {
    pub fn new(inner: Arc<dyn DatabasePool>) -> Self {
        Self {
            inner,
            recorder: Arc::new(Recorder::default()),
        }
    }

    /// Fail every later statement whose SQL contains `fragment`
    pub fn fail_when_contains(&self, fragment: &str) {
        self.recorder.failures.lock().push(fragment.to_string());
    }

    pub fn clear_failures(&self) {
        self.recorder.failures.lock().clear();
    }

    /// Statements seen so far, including failed ones
    pub fn statements(&self) -> Vec<String> {
        self.recorder.statements.lock().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.recorder.statements.lock().len()
    }

    /// Statements whose SQL contains `fragment`
    pub fn count_matching(&self, fragment: &str) -> usize {
        self.recorder
            .statements
            .lock()
            .iter()
            .filter(|sql| sql.contains(fragment))
            .count()
    }

    pub fn reset(&self) {
        self.recorder.statements.lock().clear();
    }
}

#[async_trait]
impl DatabasePool for InstrumentedPool {
    async fn begin_transaction(&self) -> OrmResult<Box<dyn DatabaseTransaction>> {
        let inner = self.inner.begin_transaction().await?;
        Ok(Box::new(InstrumentedTransaction {
            inner,
            recorder: Arc::clone(&self.recorder),
        }))
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        self.recorder.observe(sql)?;
        self.inner.execute(sql, params).await
    }

    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        self.recorder.observe(sql)?;
        self.inner.fetch_all(sql, params).await
    }

    async fn fetch_optional(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<Box<dyn DatabaseRow>>> {
        self.recorder.observe(sql)?;
        self.inner.fetch_optional(sql, params).await
    }

    async fn close(&self) -> OrmResult<()> {
        self.inner.close().await
    }

    fn dialect(&self) -> SqlDialect {
        self.inner.dialect()
    }
}

struct InstrumentedTransaction {
    inner: Box<dyn DatabaseTransaction>,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl DatabaseTransaction for InstrumentedTransaction {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        self.recorder.observe(sql)?;
        self.inner.execute(sql, params).await
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        self.recorder.observe(sql)?;
        self.inner.fetch_all(sql, params).await
    }

    async fn fetch_optional(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<Box<dyn DatabaseRow>>> {
        self.recorder.observe(sql)?;
        self.inner.fetch_optional(sql, params).await
    }

    async fn commit(self: Box<Self>) -> OrmResult<()> {
        self.recorder.observe("COMMIT")?;
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> OrmResult<()> {
        self.recorder.statements.lock().push("ROLLBACK".to_string());
        self.inner.rollback().await
    }
}
