//! Recursive synchronization of a message schema onto tables.

use std::sync::Arc;

use tabby_schema::{
    ColumnPlan, FieldKind, FieldSpec, NamePath, ParentLink, Relation, SchemaError, SchemaNode,
    TablePlan, VALUE_COLUMN, column_logical_name, map_element, map_field, value_logical_name,
};
use tabby_sql::ShortName;
use tracing::Instrument;

use crate::{BoxFuture, Executor, MigrationPlanner, NameRegistry, NameResolver, Result};

/// What one synchronization did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Every table visited, in the order it was ensured, with the data
    /// columns ensured on it.
    pub tables: Vec<TablePlan>,
    pub tables_created: usize,
    pub columns_added: usize,
}

impl SyncReport {
    /// Whether the schema was already fully in place.
    pub fn is_noop(&self) -> bool {
        self.tables_created == 0 && self.columns_added == 0
    }

    fn merge(&mut self, other: SyncReport) {
        self.tables.extend(other.tables);
        self.tables_created += other.tables_created;
        self.columns_added += other.columns_added;
    }
}

/// Walks message schemas and brings their tables and columns into
/// existence.
///
/// Every table is named by the short identifier of its [`NamePath`] from the
/// root message; every column by the short identifier of its field tag.
/// Statements are issued one at a time, in declaration order, with nested
/// messages synchronized before the siblings that follow them.
pub struct SchemaWalker<'e> {
    resolver: NameResolver<'e>,
    planner: MigrationPlanner<'e>,
}

impl<'e> SchemaWalker<'e> {
    /// Assemble a walker from parts. The resolver's lookup table must
    /// already exist; see [`NameRegistry::init`].
    pub fn new(resolver: NameResolver<'e>, planner: MigrationPlanner<'e>) -> Self {
        Self { resolver, planner }
    }

    /// Connect a planner on `executor` and resolve names through `registry`,
    /// creating the registry's lookup table if it is missing.
    pub async fn connect(executor: &'e dyn Executor, registry: Arc<NameRegistry>) -> Result<Self> {
        let planner = MigrationPlanner::connect(executor).await?;
        registry.init(executor).await?;
        Ok(Self::new(NameResolver::new(executor, registry), planner))
    }

    pub fn planner(&self) -> &MigrationPlanner<'e> {
        &self.planner
    }

    pub fn resolver_mut(&mut self) -> &mut NameResolver<'e> {
        &mut self.resolver
    }

    /// Bring every table and column of `root` into existence.
    ///
    /// Any failure aborts the walk; calling again resumes where it stopped.
    pub async fn synchronize(&mut self, root: &SchemaNode) -> Result<SyncReport> {
        root.validate()?;

        let span = tracing::info_span!("tabby.sync", message = %root.full_name);
        let mut report = SyncReport::default();
        self.walk(root, &root.full_name, NamePath::root(), None, &mut report)
            .instrument(span)
            .await?;

        tracing::info!(
            message = %root.full_name,
            tables = report.tables.len(),
            created = report.tables_created,
            added = report.columns_added,
            "synchronized"
        );
        Ok(report)
    }

    /// Synchronize several roots in order.
    pub async fn synchronize_all(&mut self, roots: &[SchemaNode]) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for root in roots {
            report.merge(self.synchronize(root).await?);
        }
        Ok(report)
    }

    fn walk<'a>(
        &'a mut self,
        node: &'a SchemaNode,
        root: &'a str,
        path: NamePath,
        parent: Option<ParentLink>,
        report: &'a mut SyncReport,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let slot = self.ensure_table(root, &path, parent, report).await?;
            let table = report.tables[slot].name.clone();
            let table_logical = report.tables[slot].logical.clone();

            for field in &node.fields {
                match &field.kind {
                    FieldKind::String | FieldKind::Int32 => {
                        let Some(def) = map_field(field) else {
                            continue;
                        };
                        let logical = column_logical_name(&table_logical, field.tag);
                        let column = ColumnPlan {
                            name: self.resolver.resolve(logical.as_str()).await?,
                            logical,
                            def,
                        };
                        self.ensure_column(&table, column, slot, report).await?;
                    }
                    FieldKind::Message(child) => {
                        let link = ParentLink {
                            table: table.clone(),
                            relation: Relation::Singular,
                        };
                        self.walk(child, root, path.child(field.tag), Some(link), report)
                            .await?;
                    }
                    FieldKind::Repeated(element) => {
                        let link = ParentLink {
                            table: table.clone(),
                            relation: Relation::Repeated,
                        };
                        let child_path = path.child(field.tag);
                        match element.as_ref() {
                            FieldKind::Message(child) => {
                                self.walk(child, root, child_path, Some(link), report)
                                    .await?;
                            }
                            _ => {
                                self.walk_repeated_scalar(node, field, root, child_path, link, report)
                                    .await?;
                            }
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// A repeated scalar gets a child table holding one `__value__` column.
    async fn walk_repeated_scalar(
        &mut self,
        node: &SchemaNode,
        field: &FieldSpec,
        root: &str,
        path: NamePath,
        link: ParentLink,
        report: &mut SyncReport,
    ) -> Result<()> {
        let def = map_element(field).ok_or_else(|| SchemaError::NestedRepeated {
            message: node.full_name.clone(),
            field: field.name.clone(),
        })?;

        let slot = self.ensure_table(root, &path, Some(link), report).await?;
        let table = report.tables[slot].name.clone();
        let column = ColumnPlan {
            name: ShortName::new(VALUE_COLUMN.to_string()),
            logical: value_logical_name(&report.tables[slot].logical),
            def,
        };
        self.ensure_column(&table, column, slot, report).await
    }

    /// Resolve and ensure the table at `path`, recording it in the report.
    /// Returns its slot in `report.tables`.
    async fn ensure_table(
        &mut self,
        root: &str,
        path: &NamePath,
        parent: Option<ParentLink>,
        report: &mut SyncReport,
    ) -> Result<usize> {
        let logical = path.table_name(root);
        let plan = TablePlan {
            name: self.resolver.resolve(logical.as_str()).await?,
            logical,
            parent,
            columns: Vec::new(),
        };
        if self.planner.ensure_table(&plan).await? {
            report.tables_created += 1;
        }
        report.tables.push(plan);
        Ok(report.tables.len() - 1)
    }

    async fn ensure_column(
        &mut self,
        table: &ShortName,
        column: ColumnPlan,
        slot: usize,
        report: &mut SyncReport,
    ) -> Result<()> {
        if self.planner.ensure_column(table, &column).await? {
            report.columns_added += 1;
        }
        report.tables[slot].columns.push(column);
        Ok(())
    }
}
