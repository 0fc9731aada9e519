//! Durable logical-name to short-identifier resolution.
//!
//! Logical names (`shop.Order.3:2`) can exceed database identifier limits,
//! so every table and column is stored under a short content-addressed
//! identifier. The mapping is persisted in a lookup table and cached in two
//! tiers: a process-wide [`NameRegistry`] behind an async mutex, and a
//! per-caller map inside each [`NameResolver`].

use std::collections::HashMap;
use std::sync::Arc;

use tabby_sql::{LogicalName, QueryBuilder, ShortName};
use tokio::sync::Mutex;

use crate::hash::{AlgorithmDescriptor, name_key};
use crate::{Config, Error, Executor, HashAlgorithm, Result, is_unique_violation};

/// Name of the lookup table when none is configured.
pub const DEFAULT_LOOKUP_TABLE: &str = "tabby_name_lookup";

/// A logical name bound to its short identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub logical: LogicalName,
    pub short: ShortName,
    /// The algorithm that produced `short`, which may differ from the
    /// currently configured one for names persisted earlier.
    pub algorithm: AlgorithmDescriptor,
}

#[derive(Default)]
struct SharedNames {
    forward: HashMap<String, ResolvedName>,
    reverse: HashMap<String, LogicalName>,
}

impl SharedNames {
    fn collision(&self, short: &ShortName, logical: &str) -> Option<&LogicalName> {
        self.reverse
            .get(short.as_str())
            .filter(|bound| bound.as_str() != logical)
    }

    fn remember(&mut self, resolved: &ResolvedName) -> Result<()> {
        if let Some(bound) = self.collision(&resolved.short, resolved.logical.as_str()) {
            return Err(Error::integrity(format!(
                "short name {} is bound to both '{}' and '{}'",
                resolved.short, bound, resolved.logical
            )));
        }
        self.reverse
            .insert(resolved.short.to_string(), resolved.logical.clone());
        self.forward
            .insert(resolved.logical.to_string(), resolved.clone());
        Ok(())
    }
}

/// The process-wide name cache and the lookup table it fronts.
///
/// Share one registry per process behind an `Arc`; each task builds its own
/// [`NameResolver`] from it.
pub struct NameRegistry {
    algorithm: HashAlgorithm,
    descriptor: AlgorithmDescriptor,
    descriptor_json: String,
    table: String,
    shared: Mutex<SharedNames>,
}

impl NameRegistry {
    /// A registry using `algorithm` for new names and the default lookup table.
    pub fn new(algorithm: HashAlgorithm) -> Result<Self> {
        Self::with_table(algorithm, DEFAULT_LOOKUP_TABLE)
    }

    pub fn with_table(algorithm: HashAlgorithm, table: impl Into<String>) -> Result<Self> {
        algorithm.validate()?;
        let descriptor = algorithm.descriptor();
        let descriptor_json = descriptor.to_json()?;
        Ok(Self {
            algorithm,
            descriptor,
            descriptor_json,
            table: table.into(),
            shared: Mutex::new(SharedNames::default()),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_table(config.hash_algorithm()?, config.lookup_table())
    }

    pub fn algorithm(&self) -> &HashAlgorithm {
        &self.algorithm
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the lookup table if it does not exist.
    ///
    /// Logical names have no length limit, so rows are keyed by
    /// [`name_key`] of `real_name` rather than by the name itself.
    pub async fn init(&self, executor: &dyn Executor) -> Result<()> {
        let dialect = executor.dialect();
        let mut q = QueryBuilder::new(dialect);
        q.sql("CREATE TABLE IF NOT EXISTS ")
            .ident(&self.table)
            .sql(" (")
            .ident("real_name_key")
            .sql(" CHAR(64) NOT NULL PRIMARY KEY, ")
            .ident("real_name")
            .sql(" ")
            .verbatim(dialect.long_text_type())
            .sql(" NOT NULL, ")
            .ident("hash_name")
            .sql(" VARCHAR(64) NOT NULL, ")
            .ident("hash_algorithm")
            .sql(" VARCHAR(512) NOT NULL, UNIQUE (")
            .ident_list(["hash_name", "hash_algorithm"])
            .sql("))");
        executor.execute(&q.build()).await?;
        Ok(())
    }

    /// Drop every cached name. Persisted names are untouched.
    pub async fn clear(&self) {
        let mut shared = self.shared.lock().await;
        shared.forward.clear();
        shared.reverse.clear();
    }

    /// Number of cached names.
    pub async fn len(&self) -> usize {
        self.shared.lock().await.forward.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// The logical name a cached short identifier stands for.
    pub async fn reverse(&self, short: &str) -> Option<LogicalName> {
        self.shared.lock().await.reverse.get(short).cloned()
    }

    /// A resolver with an empty local tier, running statements on `executor`.
    pub fn resolver<'e>(self: &Arc<Self>, executor: &'e dyn Executor) -> NameResolver<'e> {
        NameResolver::new(executor, Arc::clone(self))
    }

    async fn lookup(&self, executor: &dyn Executor, logical: &str) -> Result<Option<ResolvedName>> {
        let mut q = QueryBuilder::new(executor.dialect());
        q.sql("SELECT ")
            .ident_list(["real_name", "hash_name", "hash_algorithm"])
            .sql(" FROM ")
            .ident(&self.table)
            .sql(" WHERE ")
            .ident("real_name_key")
            .sql(" = ")
            .string(name_key(logical));
        let rows = executor.query(&q.build()).await?;

        let row = match rows.as_slice() {
            [] => return Ok(None),
            [row] => row,
            _ => {
                return Err(Error::integrity(format!(
                    "{} rows in {} for '{logical}'",
                    rows.len(),
                    self.table
                )));
            }
        };

        let stored: String = row.try_get("real_name")?;
        if stored != logical {
            return Err(Error::integrity(format!(
                "row in {} keyed for '{logical}' holds '{stored}'",
                self.table
            )));
        }
        let short: String = row.try_get("hash_name")?;
        let algorithm: Option<String> = row.try_get("hash_algorithm")?;
        let algorithm = AlgorithmDescriptor::parse(algorithm.as_deref().unwrap_or_default())?;
        let short = ShortName::new(short);
        check_identifier(executor, &short).map_err(|reason| {
            Error::integrity(format!(
                "stored short name '{short}' for '{logical}' {reason}"
            ))
        })?;
        Ok(Some(ResolvedName {
            logical: LogicalName::new(logical.to_string()),
            short,
            algorithm,
        }))
    }

    async fn persist(
        &self,
        executor: &dyn Executor,
        logical: &str,
        shared: &SharedNames,
    ) -> Result<ResolvedName> {
        let short = self.algorithm.short_name(logical);
        check_identifier(executor, &short).map_err(|reason| {
            Error::configuration(format!(
                "{} short name for '{logical}' {reason}",
                self.algorithm.name()
            ))
        })?;
        if let Some(bound) = shared.collision(&short, logical) {
            return Err(Error::integrity(format!(
                "'{logical}' hashes to {short}, already bound to '{bound}'"
            )));
        }

        let mut q = QueryBuilder::new(executor.dialect());
        q.sql("INSERT INTO ")
            .ident(&self.table)
            .sql(" (")
            .ident_list(["real_name_key", "real_name", "hash_name", "hash_algorithm"])
            .sql(") VALUES (")
            .string(name_key(logical))
            .sql(", ")
            .string(logical)
            .sql(", ")
            .string(short.as_str())
            .sql(", ")
            .string(self.descriptor_json.as_str())
            .sql(")");

        match executor.execute(&q.build()).await {
            Ok(_) => {
                tracing::debug!(logical, short = %short, "persisted name");
                Ok(ResolvedName {
                    logical: LogicalName::new(logical.to_string()),
                    short,
                    algorithm: self.descriptor.clone(),
                })
            }
            Err(e) if is_unique_violation(&e) => {
                // Another process inserted first, or the identifier collides.
                match self.lookup(executor, logical).await? {
                    Some(stored) => {
                        tracing::warn!(
                            logical,
                            short = %stored.short,
                            "name was persisted concurrently, adopting stored identifier"
                        );
                        Ok(stored)
                    }
                    None => Err(Error::integrity(format!(
                        "'{logical}' hashes to {short}, which is already stored for another name"
                    ))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether `short` can name a table or column on `executor`'s database.
fn check_identifier(executor: &dyn Executor, short: &ShortName) -> std::result::Result<(), String> {
    let max = executor.dialect().max_identifier_len();
    match short.as_str().len() {
        0 => Err("is empty".to_string()),
        len if len > max => Err(format!(
            "is {len} bytes, over the {} limit of {max}",
            executor.dialect()
        )),
        _ => Ok(()),
    }
}

/// Resolves logical names to short identifiers.
///
/// Holds an unsynchronized local cache in front of the shared
/// [`NameRegistry`]. The registry lock is held from the cache check until
/// the name is cached, so a process never persists the same name twice.
pub struct NameResolver<'e> {
    executor: &'e dyn Executor,
    registry: Arc<NameRegistry>,
    local: HashMap<String, ResolvedName>,
}

impl<'e> NameResolver<'e> {
    pub fn new(executor: &'e dyn Executor, registry: Arc<NameRegistry>) -> Self {
        Self {
            executor,
            registry,
            local: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<NameRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &'e dyn Executor {
        self.executor
    }

    /// Short identifier for `logical`, persisting a new one if needed.
    pub async fn resolve(&mut self, logical: &str) -> Result<ShortName> {
        Ok(self.resolve_full(logical).await?.short)
    }

    /// Like [`resolve`](Self::resolve), returning the full binding.
    pub async fn resolve_full(&mut self, logical: &str) -> Result<ResolvedName> {
        if let Some(hit) = self.local.get(logical) {
            return Ok(hit.clone());
        }

        let registry = Arc::clone(&self.registry);
        let mut shared = registry.shared.lock().await;

        if let Some(hit) = shared.forward.get(logical) {
            tracing::debug!(logical, short = %hit.short, "shared name cache hit");
            let hit = hit.clone();
            self.local.insert(logical.to_string(), hit.clone());
            return Ok(hit);
        }

        let resolved = match registry.lookup(self.executor, logical).await? {
            Some(stored) => {
                tracing::debug!(logical, short = %stored.short, "adopted stored name");
                stored
            }
            None => registry.persist(self.executor, logical, &shared).await?,
        };

        shared.remember(&resolved)?;
        self.local.insert(logical.to_string(), resolved.clone());
        Ok(resolved)
    }
}
