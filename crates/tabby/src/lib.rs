//! Relational storage for nested message schemas.
//!
//! tabby maps reflectable message types onto tables and columns and keeps
//! the database in step with them:
//! - [`SchemaWalker`] walks a message tree and ensures one table per nested
//!   message or repeated field, one column per scalar field
//! - [`MigrationPlanner`] issues only the DDL that is missing, so
//!   synchronizing twice is a no-op
//! - [`NameResolver`] names every table and column by a short hash of its
//!   structural path, persisted so that names never change
//! - [`BlobStore`] stores whole messages as JSON or binary payloads
//!
//! # Messages
//!
//! Messages are `Facet` structs. Field tags default to the 1-based field
//! position and can be pinned with attributes:
//!
//! ```ignore
//! #[derive(facet::Facet)]
//! #[facet(tabby::message = "shop.v1.Order")]
//! struct Order {
//!     #[facet(tabby::tag = "1", tabby::max_len = "64")]
//!     reference: String,
//!     #[facet(tabby::tag = "2")]
//!     quantity: i32,
//!     #[facet(tabby::tag = "3")]
//!     lines: Vec<OrderLine>,
//!     #[facet(tabby::tag = "4")]
//!     note: Option<String>,
//! }
//!
//! inventory::submit!(tabby::MessageDef::new::<Order>());
//! ```
//!
//! # Synchronizing
//!
//! ```ignore
//! let exec = tabby::connect("mysql://root@localhost/app").await?;
//! let registry = Arc::new(NameRegistry::new(HashAlgorithm::default())?);
//! registry.init(&exec).await?;
//!
//! let mut walker = SchemaWalker::connect(&exec, registry).await?;
//! let report = walker.synchronize_all(&tabby::collect_messages()?).await?;
//! ```

mod blob;
mod config;
mod error;
mod executor;
pub mod hash;
mod migrate;
mod mysql;
mod names;
mod pg;
mod traced;
mod walker;

pub mod base64;

pub use blob::{BlobStore, DEFAULT_BLOB_TABLE, Encoding, Message};
pub use config::{CONFIG_FILE, Config, HashConfig};
pub use error::Error;
pub use executor::{
    BoxFuture, ColumnIndex, Executor, ExecutorError, FromField, ResultRow, is_unique_violation,
};
pub use hash::{AlgorithmDescriptor, HashAlgorithm, digest, name_key};
pub use migrate::{MigrationPlanner, add_column_sql, column_definition, create_table_sql};
pub use names::{DEFAULT_LOOKUP_TABLE, NameRegistry, NameResolver, ResolvedName};
pub use pg::connect_client;
pub use traced::Traced;
pub use walker::{SchemaWalker, SyncReport};

// Re-export attr grammar
pub use tabby_schema::{__attr, __parse_attr, Attr};

pub use tabby_schema::{
    ColumnDef, ColumnPlan, FieldKind, FieldSpec, MessageDef, NamePath, ParentLink, Relation,
    SchemaError, SchemaNode, StorageType, TablePlan, collect_messages, map_element, map_field,
    map_string_storage, message_name,
};
pub use tabby_sql::{Dialect, LogicalName, QueryBuilder, ShortName};

// Re-export inventory for message registration
pub use inventory;

/// Result type for tabby operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Open a traced executor for `url`, choosing the backend by URL scheme
/// (`mysql://`, `mariadb://`, `postgres://`, `postgresql://`), and check
/// that the database answers.
pub async fn connect(url: &str) -> Result<Traced<Box<dyn Executor>>> {
    let scheme = url
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| Error::configuration(format!("database url '{url}' has no scheme")))?;
    let dialect: Dialect = scheme.parse().map_err(Error::Configuration)?;

    let executor: Box<dyn Executor> = match dialect {
        Dialect::Mysql => {
            // mysql_async only understands the mysql scheme.
            let url = format!("mysql://{}", &url[scheme.len() + 3..]);
            Box::new(mysql::create_pool(&url)?)
        }
        Dialect::Postgres => Box::new(pg::create_pool(url)?),
    };

    let executor = Traced::new(executor);
    executor.query("SELECT 1").await?;
    tracing::debug!(%dialect, "connected");
    Ok(executor)
}
