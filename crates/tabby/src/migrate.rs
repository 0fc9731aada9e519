//! Idempotent, additive DDL.
//!
//! The planner checks `information_schema` before every statement and only
//! issues DDL for what is missing, so running it twice against the same
//! schema is a no-op the second time.

use tabby_schema::{
    ColumnDef, ColumnPlan, ID_COLUMN, INDEX_COLUMN, PARENT_ID_COLUMN, Relation, StorageType,
    TablePlan,
};
use tabby_sql::{Dialect, QueryBuilder, ShortName};

use crate::{Error, Executor, Result};

/// Brings tables and columns into existence.
///
/// The existence checks and the DDL that follows them are separate
/// statements. Only one migrator may run against a schema at a time; two
/// concurrent planners can both see a column as missing.
pub struct MigrationPlanner<'e> {
    executor: &'e dyn Executor,
    schema: String,
    ddl_count: usize,
}

impl<'e> MigrationPlanner<'e> {
    /// Bind to the executor's current schema.
    ///
    /// Fails with an integrity error unless the probe returns exactly one
    /// non-null value.
    pub async fn connect(executor: &'e dyn Executor) -> Result<Self> {
        let probe = executor.dialect().current_schema_query();
        let rows = executor.query(probe).await?;
        let schema = match rows.as_slice() {
            [row] if row.len() == 1 => row.try_get::<Option<String>>(0usize)?,
            _ => {
                return Err(Error::integrity(format!(
                    "expected exactly one row from `{probe}`, got {}",
                    rows.len()
                )));
            }
        };
        let Some(schema) = schema else {
            return Err(Error::integrity("no current schema is selected"));
        };

        tracing::debug!(schema, "migration planner connected");
        Ok(Self {
            executor,
            schema,
            ddl_count: 0,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    /// Number of DDL statements this planner has issued.
    pub fn ddl_count(&self) -> usize {
        self.ddl_count
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut q = QueryBuilder::new(self.dialect());
        q.sql("SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ")
            .string(self.schema.as_str())
            .sql(" AND table_name = ")
            .string(table);
        self.count(&q.build()).await.map(|n| n > 0)
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let mut q = QueryBuilder::new(self.dialect());
        q.sql("SELECT COUNT(*) FROM information_schema.columns WHERE table_schema = ")
            .string(self.schema.as_str())
            .sql(" AND table_name = ")
            .string(table)
            .sql(" AND column_name = ")
            .string(column);
        self.count(&q.build()).await.map(|n| n > 0)
    }

    async fn count(&self, sql: &str) -> Result<i64> {
        let rows = self.executor.query(sql).await?;
        match rows.as_slice() {
            [row] => Ok(row.try_get(0usize)?),
            _ => Err(Error::integrity(format!(
                "expected exactly one row from `{sql}`, got {}",
                rows.len()
            ))),
        }
    }

    /// Create the table for `plan` unless it exists. Returns whether DDL
    /// was issued.
    ///
    /// Only the surrogate key and parent link columns are created here;
    /// data columns are added with [`ensure_column`](Self::ensure_column).
    pub async fn ensure_table(&mut self, plan: &TablePlan) -> Result<bool> {
        if self.table_exists(plan.name.as_str()).await? {
            return Ok(false);
        }

        let sql = create_table_sql(self.dialect(), plan);
        self.executor.execute(&sql).await?;
        self.ddl_count += 1;
        tracing::info!(table = %plan.name, logical = %plan.logical, "created table");
        Ok(true)
    }

    /// Add `column` to `table` unless it exists. Returns whether DDL was
    /// issued.
    pub async fn ensure_column(&mut self, table: &ShortName, column: &ColumnPlan) -> Result<bool> {
        if self
            .column_exists(table.as_str(), column.name.as_str())
            .await?
        {
            return Ok(false);
        }

        let sql = add_column_sql(self.dialect(), table, column);
        self.executor.execute(&sql).await?;
        self.ddl_count += 1;
        tracing::info!(
            table = %table,
            column = %column.name,
            logical = %column.logical,
            "added column"
        );
        Ok(true)
    }
}

/// `CREATE TABLE IF NOT EXISTS` with the surrogate key and, for child
/// tables, the parent link.
pub fn create_table_sql(dialect: Dialect, plan: &TablePlan) -> String {
    let mut q = QueryBuilder::new(dialect);
    q.sql("CREATE TABLE IF NOT EXISTS ")
        .ident(plan.name.as_str())
        .sql(" (")
        .ident(ID_COLUMN)
        .sql(" ")
        .verbatim(dialect.surrogate_key_definition());

    if let Some(parent) = &plan.parent {
        q.sql(", ")
            .ident(PARENT_ID_COLUMN)
            .sql(" ")
            .verbatim(dialect.reference_type())
            .sql(" NOT NULL");
        match parent.relation {
            Relation::Singular => {
                q.sql(", UNIQUE (").ident(PARENT_ID_COLUMN).sql(")");
            }
            Relation::Repeated => {
                q.sql(", ")
                    .ident(INDEX_COLUMN)
                    .sql(" ")
                    .verbatim(StorageType::Int.to_sql(dialect))
                    .sql(" NOT NULL, UNIQUE (")
                    .ident_list([PARENT_ID_COLUMN, INDEX_COLUMN])
                    .sql(")");
            }
        }
        q.sql(", FOREIGN KEY (")
            .ident(PARENT_ID_COLUMN)
            .sql(") REFERENCES ")
            .ident(parent.table.as_str())
            .sql(" (")
            .ident(ID_COLUMN)
            .sql(") ON DELETE CASCADE ON UPDATE CASCADE");
    }

    q.sql(")");
    q.build()
}

/// `ALTER TABLE ... ADD COLUMN` for one column.
pub fn add_column_sql(dialect: Dialect, table: &ShortName, column: &ColumnPlan) -> String {
    let mut q = QueryBuilder::new(dialect);
    q.sql("ALTER TABLE ")
        .ident(table.as_str())
        .sql(" ADD COLUMN ")
        .ident(column.name.as_str())
        .sql(" ");
    column_definition(&mut q, &column.def);
    q.build()
}

/// Append the type, nullability and default of a column.
pub fn column_definition(q: &mut QueryBuilder, def: &ColumnDef) {
    let dialect = q.dialect();
    let type_sql = def.storage.to_sql(dialect);
    let expression_default = dialect.needs_expression_default(&type_sql);

    q.verbatim(type_sql);
    if !def.nullable {
        q.sql(" NOT NULL");
    }
    if let Some(default) = &def.default {
        if expression_default {
            q.sql(" DEFAULT (").string(default.as_str()).sql(")");
        } else {
            q.sql(" DEFAULT ").string(default.as_str());
        }
    }
}
