//! Statement execution.
//!
//! Everything that talks to a database goes through [`Executor`]. Statements
//! are fully rendered SQL strings (see [`tabby_sql::QueryBuilder`]) and
//! results come back as text, so the same code paths serve every backend.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tabby_sql::Dialect;
use thiserror::Error;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised by an executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("postgres error: {0}")]
    Postgres(tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("mysql error: {0}")]
    Mysql(mysql_async::Error),

    /// The statement violated a unique key or primary key.
    #[error("unique violation: {0}")]
    UniqueViolation(String),

    /// A result row did not hold what the caller asked for.
    #[error("row error: {0}")]
    Row(String),

    /// An in-memory or otherwise custom backend failed.
    #[error("{0}")]
    Other(String),
}

/// Trait for database handles that can run rendered statements.
///
/// This is implemented for `tokio_postgres::Client`,
/// `deadpool_postgres::Pool` and `mysql_async::Pool`.
pub trait Executor: Send + Sync {
    /// The dialect statements for this executor must be rendered in.
    fn dialect(&self) -> Dialect;

    /// Execute a statement, returning the number of rows affected.
    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, ExecutorError>>;

    /// Execute a query, returning all rows.
    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<ResultRow>, ExecutorError>>;

    /// Execute an `INSERT`, returning the value generated for `id_column`.
    fn insert_returning_id<'a>(
        &'a self,
        sql: &'a str,
        id_column: &'a str,
    ) -> BoxFuture<'a, Result<i64, ExecutorError>>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, ExecutorError>> {
        (**self).execute(sql)
    }

    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<ResultRow>, ExecutorError>> {
        (**self).query(sql)
    }

    fn insert_returning_id<'a>(
        &'a self,
        sql: &'a str,
        id_column: &'a str,
    ) -> BoxFuture<'a, Result<i64, ExecutorError>> {
        (**self).insert_returning_id(sql, id_column)
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, ExecutorError>> {
        (**self).execute(sql)
    }

    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<ResultRow>, ExecutorError>> {
        (**self).query(sql)
    }

    fn insert_returning_id<'a>(
        &'a self,
        sql: &'a str,
        id_column: &'a str,
    ) -> BoxFuture<'a, Result<i64, ExecutorError>> {
        (**self).insert_returning_id(sql, id_column)
    }
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, ExecutorError>> {
        (**self).execute(sql)
    }

    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<ResultRow>, ExecutorError>> {
        (**self).query(sql)
    }

    fn insert_returning_id<'a>(
        &'a self,
        sql: &'a str,
        id_column: &'a str,
    ) -> BoxFuture<'a, Result<i64, ExecutorError>> {
        (**self).insert_returning_id(sql, id_column)
    }
}

/// One result row. Every field is text or NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl ResultRow {
    pub fn new(columns: Arc<[String]>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        let (columns, values): (Vec<String>, Vec<Option<String>>) = pairs
            .into_iter()
            .map(|(c, v)| (c.to_string(), v.map(str::to_string)))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw text of a field; `None` if it is NULL or does not exist.
    pub fn text(&self, idx: impl ColumnIndex) -> Option<&str> {
        let i = idx.index(self)?;
        self.values.get(i)?.as_deref()
    }

    /// Convert a field, reporting missing columns and conversion failures.
    pub fn try_get<T: FromField>(&self, idx: impl ColumnIndex) -> Result<T, ExecutorError> {
        let Some(i) = idx.index(self) else {
            return Err(ExecutorError::Row(format!("no column {idx}")));
        };
        let raw = self.values.get(i).and_then(|v| v.as_deref());
        T::from_field(raw).map_err(|e| {
            let name = self.columns.get(i).map(String::as_str).unwrap_or("?");
            ExecutorError::Row(format!("column '{name}': {e}"))
        })
    }

    /// Convert a field, or `None` if that fails for any reason.
    pub fn get<T: FromField>(&self, idx: impl ColumnIndex) -> Option<T> {
        self.try_get(idx).ok()
    }
}

/// Something that addresses a field in a [`ResultRow`].
pub trait ColumnIndex: std::fmt::Display {
    fn index(&self, row: &ResultRow) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn index(&self, row: &ResultRow) -> Option<usize> {
        (*self < row.len()).then_some(*self)
    }
}

impl ColumnIndex for &str {
    fn index(&self, row: &ResultRow) -> Option<usize> {
        row.columns.iter().position(|c| c.eq_ignore_ascii_case(self))
    }
}

/// Conversion from a text field.
pub trait FromField: Sized {
    fn from_field(raw: Option<&str>) -> Result<Self, String>;
}

impl FromField for String {
    fn from_field(raw: Option<&str>) -> Result<Self, String> {
        raw.map(str::to_string).ok_or_else(|| "unexpected NULL".to_string())
    }
}

macro_rules! impl_from_field_int {
    ($($t:ty),*) => {
        $(
            impl FromField for $t {
                fn from_field(raw: Option<&str>) -> Result<Self, String> {
                    let raw = raw.ok_or_else(|| "unexpected NULL".to_string())?;
                    raw.trim().parse().map_err(|e| format!("'{raw}' is not an integer: {e}"))
                }
            }
        )*
    };
}

impl_from_field_int!(i32, i64, u32, u64);

impl<T: FromField> FromField for Option<T> {
    fn from_field(raw: Option<&str>) -> Result<Self, String> {
        match raw {
            None => Ok(None),
            Some(_) => T::from_field(raw).map(Some),
        }
    }
}

/// Whether `err` reports a unique-key violation.
pub fn is_unique_violation(err: &ExecutorError) -> bool {
    matches!(err, ExecutorError::UniqueViolation(_))
}
