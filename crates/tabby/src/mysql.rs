//! MySQL executor.

use std::sync::Arc;

use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool, Value};
use tabby_sql::Dialect;

use crate::{BoxFuture, Executor, ExecutorError, ResultRow};

/// `ER_DUP_ENTRY`
const DUPLICATE_ENTRY: u16 = 1062;

/// Run on every new connection. Literals are escaped for the default
/// string syntax, so backslash escapes must stay enabled.
const PIN_SQL_MODE: &str = "SET SESSION sql_mode = TRIM(BOTH ',' FROM \
    REPLACE(REPLACE(@@SESSION.sql_mode, 'NO_BACKSLASH_ESCAPES', ''), ',,', ','))";

impl From<mysql_async::Error> for ExecutorError {
    fn from(err: mysql_async::Error) -> Self {
        match &err {
            mysql_async::Error::Server(server) if server.code == DUPLICATE_ENTRY => {
                ExecutorError::UniqueViolation(server.message.clone())
            }
            _ => ExecutorError::Mysql(err),
        }
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::Int(n) => Some(n.to_string()),
        Value::UInt(n) => Some(n.to_string()),
        Value::Float(x) => Some(x.to_string()),
        Value::Double(x) => Some(x.to_string()),
        other => Some(other.as_sql(true).trim_matches('\'').to_string()),
    }
}

impl Executor for Pool {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, ExecutorError>> {
        Box::pin(async move {
            let mut conn = self.get_conn().await?;
            conn.query_drop(sql).await?;
            Ok(conn.affected_rows())
        })
    }

    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<ResultRow>, ExecutorError>> {
        Box::pin(async move {
            let mut conn = self.get_conn().await?;
            let rows: Vec<mysql_async::Row> = conn.query(sql).await?;

            let mut out = Vec::with_capacity(rows.len());
            let mut columns: Option<Arc<[String]>> = None;
            for row in &rows {
                let cols = columns
                    .get_or_insert_with(|| {
                        row.columns_ref()
                            .iter()
                            .map(|c| c.name_str().into_owned())
                            .collect()
                    })
                    .clone();
                let values = (0..row.len())
                    .map(|i| row.as_ref(i).and_then(value_text))
                    .collect();
                out.push(ResultRow::new(cols, values));
            }
            Ok(out)
        })
    }

    fn insert_returning_id<'a>(
        &'a self,
        sql: &'a str,
        _id_column: &'a str,
    ) -> BoxFuture<'a, Result<i64, ExecutorError>> {
        Box::pin(async move {
            let mut conn = self.get_conn().await?;
            conn.query_drop(sql).await?;
            let id = conn
                .last_insert_id()
                .ok_or_else(|| ExecutorError::Row("INSERT generated no id".to_string()))?;
            i64::try_from(id).map_err(|_| ExecutorError::Row(format!("generated id {id} overflows")))
        })
    }
}

/// Build a connection pool for `url`.
pub fn create_pool(url: &str) -> Result<Pool, crate::Error> {
    let opts = Opts::from_url(url)
        .map_err(|e| crate::Error::configuration(format!("invalid mysql url: {e}")))?;
    let opts = OptsBuilder::from_opts(opts).init(vec![PIN_SQL_MODE]);
    Ok(Pool::new(opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql_async::ServerError;

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&Value::NULL), None);
        assert_eq!(
            value_text(&Value::Bytes(b"shop.Order".to_vec())).as_deref(),
            Some("shop.Order")
        );
        assert_eq!(value_text(&Value::Int(-7)).as_deref(), Some("-7"));
        assert_eq!(value_text(&Value::UInt(42)).as_deref(), Some("42"));
        assert_eq!(value_text(&Value::Double(1.5)).as_deref(), Some("1.5"));
        assert_eq!(
            value_text(&Value::Date(2024, 2, 29, 13, 5, 9, 0)).as_deref(),
            Some("2024-02-29 13:05:09")
        );
    }

    fn server_error(code: u16) -> mysql_async::Error {
        mysql_async::Error::Server(ServerError {
            code,
            message: format!("Duplicate entry 'x' for key 'PRIMARY' ({code})"),
            state: "23000".to_string(),
        })
    }

    #[test]
    fn test_duplicate_entry_is_a_unique_violation() {
        let err = ExecutorError::from(server_error(DUPLICATE_ENTRY));
        assert!(matches!(err, ExecutorError::UniqueViolation(_)), "{err}");
        assert!(crate::is_unique_violation(&err));

        // ER_ROW_IS_REFERENCED_2 shares the SQLSTATE but is not a duplicate.
        let err = ExecutorError::from(server_error(1451));
        assert!(matches!(err, ExecutorError::Mysql(_)), "{err}");
    }

    #[test]
    fn test_create_pool_rejects_bad_url() {
        let err = create_pool("mysql://root@localhost:notaport/app").unwrap_err();
        assert!(matches!(err, crate::Error::Configuration(_)), "{err}");
    }
}
