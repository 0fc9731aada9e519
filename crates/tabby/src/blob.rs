//! Whole-message storage.
//!
//! Besides the relational layout, a message can be stored as one row holding
//! its serialized form: JSON text, or a compact binary encoding that travels
//! to and from the server as base64.

use facet::Facet;
use tabby_schema::message_name;
use tabby_sql::QueryBuilder;

use crate::{Config, Error, Executor, Result};

/// Name of the blob table when none is configured.
pub const DEFAULT_BLOB_TABLE: &str = "tabby_message_blob";

/// Types that can be written to and read from a [`BlobStore`].
pub trait Message: for<'a> Facet<'a> {}

impl<T: for<'a> Facet<'a>> Message for T {}

/// How a message payload is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// JSON text in `json_data`.
    Json,
    /// postcard bytes in `binary_data`.
    Binary,
}

/// Stores serialized messages in a single table.
pub struct BlobStore<'e> {
    executor: &'e dyn Executor,
    table: String,
}

impl<'e> BlobStore<'e> {
    pub fn new(executor: &'e dyn Executor) -> Self {
        Self::with_table(executor, DEFAULT_BLOB_TABLE)
    }

    pub fn with_table(executor: &'e dyn Executor, table: impl Into<String>) -> Self {
        Self {
            executor,
            table: table.into(),
        }
    }

    pub fn from_config(executor: &'e dyn Executor, config: &Config) -> Self {
        Self::with_table(executor, config.blob_table())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the blob table if it does not exist.
    ///
    /// Exactly one of `binary_data` and `json_data` is set on every row.
    pub async fn init(&self) -> Result<()> {
        let dialect = self.executor.dialect();
        let mut q = QueryBuilder::new(dialect);
        q.sql("CREATE TABLE IF NOT EXISTS ")
            .ident(&self.table)
            .sql(" (")
            .ident("unique_id")
            .sql(" ")
            .verbatim(dialect.surrogate_key_definition())
            .sql(", ")
            .ident("message_type")
            .sql(" ")
            .verbatim(dialect.long_text_type())
            .sql(" NOT NULL, ")
            .ident("binary_data")
            .sql(" ")
            .verbatim(dialect.blob_type())
            .sql(" NULL, ")
            .ident("json_data")
            .sql(" ")
            .verbatim(dialect.long_text_type())
            .sql(" NULL, CHECK ((")
            .ident("binary_data")
            .sql(" IS NULL) <> (")
            .ident("json_data")
            .sql(" IS NULL)))");
        self.executor.execute(&q.build()).await?;
        Ok(())
    }

    /// Serialize and insert `message`, returning its id.
    pub async fn write_message<T: Message>(&self, message: &T, encoding: Encoding) -> Result<i64> {
        let message_type = message_name(<T as Facet<'static>>::SHAPE);
        let dialect = self.executor.dialect();

        let mut q = QueryBuilder::new(dialect);
        q.sql("INSERT INTO ").ident(&self.table).sql(" (");
        match encoding {
            Encoding::Json => {
                let json = facet_json::to_string(message)
                    .map_err(|e| Error::decode(format!("cannot encode {message_type} as JSON: {e}")))?;
                q.ident_list(["message_type", "json_data"])
                    .sql(") VALUES (")
                    .string(message_type)
                    .sql(", ")
                    .string(json);
            }
            Encoding::Binary => {
                let bytes = facet_postcard::to_vec(message).map_err(|e| {
                    Error::decode(format!("cannot encode {message_type} as postcard: {e}"))
                })?;
                let (open, close) = dialect.from_base64();
                q.ident_list(["message_type", "binary_data"])
                    .sql(") VALUES (")
                    .string(message_type)
                    .sql(", ")
                    .verbatim(open)
                    .string(crate::base64::encode(&bytes))
                    .verbatim(close);
            }
        }
        q.sql(")");

        let id = self
            .executor
            .insert_returning_id(&q.build(), "unique_id")
            .await?;
        tracing::debug!(id, message_type, ?encoding, "stored message");
        Ok(id)
    }

    /// Read back the message stored under `id`.
    pub async fn read_message<T: Message>(&self, id: i64) -> Result<T> {
        let expected = message_name(<T as Facet<'static>>::SHAPE);
        let dialect = self.executor.dialect();
        let (open, close) = dialect.to_base64();

        let mut q = QueryBuilder::new(dialect);
        q.sql("SELECT ")
            .ident("message_type")
            .sql(", ")
            .verbatim(open)
            .ident("binary_data")
            .verbatim(close)
            .sql(" AS ")
            .ident("binary_data")
            .sql(", ")
            .ident("json_data")
            .sql(" FROM ")
            .ident(&self.table)
            .sql(" WHERE ")
            .ident("unique_id")
            .sql(" = ")
            .int(id);
        let rows = self.executor.query(&q.build()).await?;

        let row = match rows.as_slice() {
            [row] => row,
            [] => return Err(Error::integrity(format!("no message with id {id}"))),
            _ => {
                return Err(Error::integrity(format!(
                    "{} messages with id {id}",
                    rows.len()
                )));
            }
        };

        let message_type: String = row.try_get("message_type")?;
        if message_type != expected {
            return Err(Error::structural(format!(
                "message {id} is a {message_type}, not a {expected}"
            )));
        }

        match (row.text("binary_data"), row.text("json_data")) {
            (Some(encoded), None) => {
                let bytes = crate::base64::decode(encoded)
                    .map_err(|e| Error::decode(format!("message {id}: bad base64: {e}")))?;
                facet_postcard::from_slice(&bytes)
                    .map_err(|e| Error::decode(format!("message {id}: bad postcard: {e}")))
            }
            (None, Some(json)) => facet_json::from_str(json)
                .map_err(|e| Error::decode(format!("message {id}: bad JSON: {e}"))),
            (None, None) => Err(Error::structural(format!("message {id} has no payload"))),
            (Some(_), Some(_)) => Err(Error::structural(format!(
                "message {id} has both a binary and a JSON payload"
            ))),
        }
    }
}
