//! Postgres executors.
//!
//! Statements go through the simple query protocol, which returns every
//! value as text. That matches [`ResultRow`] and sidesteps binary decoding of
//! `information_schema` domain types.

use std::sync::Arc;

use tabby_sql::{Dialect, Ident};
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, SimpleQueryMessage};

use crate::{BoxFuture, Executor, ExecutorError, ResultRow};

impl From<tokio_postgres::Error> for ExecutorError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            ExecutorError::UniqueViolation(err.to_string())
        } else {
            ExecutorError::Postgres(err)
        }
    }
}

async fn simple_execute(client: &Client, sql: &str) -> Result<u64, ExecutorError> {
    let messages = client.simple_query(sql).await?;
    Ok(messages
        .iter()
        .map(|m| match m {
            SimpleQueryMessage::CommandComplete(n) => *n,
            _ => 0,
        })
        .sum())
}

async fn simple_rows(client: &Client, sql: &str) -> Result<Vec<ResultRow>, ExecutorError> {
    let messages = client.simple_query(sql).await?;
    let mut rows = Vec::new();
    let mut columns: Option<Arc<[String]>> = None;
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            let cols = columns
                .get_or_insert_with(|| row.columns().iter().map(|c| c.name().to_string()).collect())
                .clone();
            let values = (0..row.len()).map(|i| row.get(i).map(str::to_string)).collect();
            rows.push(ResultRow::new(cols, values));
        }
    }
    Ok(rows)
}

async fn simple_insert_returning(
    client: &Client,
    sql: &str,
    id_column: &str,
) -> Result<i64, ExecutorError> {
    let sql = format!("{sql} RETURNING {}", Ident(Dialect::Postgres, id_column));
    let rows = simple_rows(client, &sql).await?;
    match rows.first() {
        Some(row) => row.try_get(0usize),
        None => Err(ExecutorError::Row("INSERT returned no row".to_string())),
    }
}

impl Executor for Client {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, ExecutorError>> {
        Box::pin(simple_execute(self, sql))
    }

    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<ResultRow>, ExecutorError>> {
        Box::pin(simple_rows(self, sql))
    }

    fn insert_returning_id<'a>(
        &'a self,
        sql: &'a str,
        id_column: &'a str,
    ) -> BoxFuture<'a, Result<i64, ExecutorError>> {
        Box::pin(simple_insert_returning(self, sql, id_column))
    }
}

impl Executor for deadpool_postgres::Pool {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, ExecutorError>> {
        Box::pin(async move {
            let conn = self.get().await?;
            let client: &Client = &conn;
            simple_execute(client, sql).await
        })
    }

    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<ResultRow>, ExecutorError>> {
        Box::pin(async move {
            let conn = self.get().await?;
            let client: &Client = &conn;
            simple_rows(client, sql).await
        })
    }

    fn insert_returning_id<'a>(
        &'a self,
        sql: &'a str,
        id_column: &'a str,
    ) -> BoxFuture<'a, Result<i64, ExecutorError>> {
        Box::pin(async move {
            let conn = self.get().await?;
            let client: &Client = &conn;
            simple_insert_returning(client, sql, id_column).await
        })
    }
}

/// Connect a single client, driving the connection on a spawned task.
pub async fn connect_client(url: &str) -> Result<Client, ExecutorError> {
    let (client, connection) = tokio_postgres::connect(url, tokio_postgres::NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("postgres connection error: {e}");
        }
    });
    Ok(client)
}

/// Build a connection pool for `url`.
pub fn create_pool(url: &str) -> Result<deadpool_postgres::Pool, crate::Error> {
    let config: tokio_postgres::Config = url
        .parse()
        .map_err(|e| crate::Error::configuration(format!("invalid postgres url: {e}")))?;
    let manager = deadpool_postgres::Manager::new(config, tokio_postgres::NoTls);
    deadpool_postgres::Pool::builder(manager)
        .build()
        .map_err(|e| crate::Error::configuration(format!("cannot build postgres pool: {e}")))
}
