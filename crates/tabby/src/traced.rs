//! Traced executor wrapper.
//!
//! Wraps any [`Executor`] and logs all statements via tracing.

use tabby_sql::Dialect;
use tracing::Instrument;

use crate::{BoxFuture, Executor, ExecutorError, ResultRow};

/// A wrapper around an executor that logs all statements via tracing.
///
/// This is a thin wrapper that delegates to the underlying executor but adds
/// `tracing::debug_span!` around each call.
///
/// # Example
///
/// ```ignore
/// use tabby::Traced;
///
/// let exec = Traced::new(pool);
/// // All statements are now logged at debug level
/// exec.execute("CREATE TABLE IF NOT EXISTS t (x INT)").await?;
/// ```
#[derive(Debug, Clone)]
pub struct Traced<E> {
    inner: E,
}

impl<E: Executor> Traced<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    /// Get the wrapped executor.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: Executor> Executor for Traced<E> {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, ExecutorError>> {
        let span = tracing::debug_span!(
            "db.execute",
            dialect = %self.inner.dialect(),
            sql = %sql,
            affected = tracing::field::Empty,
        );
        Box::pin(async move {
            let affected = self.inner.execute(sql).instrument(span.clone()).await?;
            span.record("affected", affected);
            Ok(affected)
        })
    }

    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<ResultRow>, ExecutorError>> {
        let span = tracing::debug_span!(
            "db.query",
            dialect = %self.inner.dialect(),
            sql = %sql,
            rows = tracing::field::Empty,
        );
        Box::pin(async move {
            let rows = self.inner.query(sql).instrument(span.clone()).await?;
            span.record("rows", rows.len());
            Ok(rows)
        })
    }

    fn insert_returning_id<'a>(
        &'a self,
        sql: &'a str,
        id_column: &'a str,
    ) -> BoxFuture<'a, Result<i64, ExecutorError>> {
        let span = tracing::debug_span!(
            "db.insert",
            dialect = %self.inner.dialect(),
            sql = %sql,
            id = tracing::field::Empty,
        );
        Box::pin(async move {
            let id = self
                .inner
                .insert_returning_id(sql, id_column)
                .instrument(span.clone())
                .await?;
            span.record("id", id);
            Ok(id)
        })
    }
}
