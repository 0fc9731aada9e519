//! Message schema model for tabby.
//!
//! This crate holds the types shared by reflection and synchronization:
//! the message tree ([`SchemaNode`], [`FieldSpec`], [`FieldKind`]), the
//! structural path that names every table ([`NamePath`]), the per-pass table
//! and column plans, and the column type mapper.

use std::fmt;

use facet::{Facet, Shape};
use tabby_sql::{Dialect, LogicalName, ShortName};

mod reflect;
pub use reflect::*;

mod typemap;
pub use typemap::*;

// Define the tabby attribute grammar using facet's macro.
// This generates:
// - `Attr` enum with all attribute variants
// - `__attr!` macro for parsing attributes
// - Re-exports for use as `tabby::message`, `tabby::tag`, etc.
facet::define_attr_grammar! {
    ns "tabby";
    crate_path ::tabby;

    /// Tabby message attribute types.
    pub enum Attr {
        /// Sets the full logical name of a message (container-level).
        ///
        /// Usage: `#[facet(tabby::message = "shop.v1.Order")]`
        Message(&'static str),

        /// Sets the numeric tag of a field (default: 1-based position).
        ///
        /// Usage: `#[facet(tabby::tag = "7")]`
        Tag(&'static str),

        /// Sets the maximum length of a string field (default: unbounded).
        ///
        /// Usage: `#[facet(tabby::max_len = "120")]`
        MaxLen(&'static str),

        /// Sets the declared default of a string field.
        ///
        /// Usage: `#[facet(tabby::default = "pending")]`
        Default(&'static str),

        /// Marks a field as a union member without wrapping it in `Option`.
        ///
        /// Usage: `#[facet(tabby::oneof)]`
        Oneof,
    }
}

/// Surrogate primary key present on every table.
pub const ID_COLUMN: &str = "__id__";

/// Reference from a child table to its parent's surrogate key.
pub const PARENT_ID_COLUMN: &str = "__parent_id__";

/// Ordinal position of an element inside a repeated field.
pub const INDEX_COLUMN: &str = "__index__";

/// Element value of a repeated scalar field.
pub const VALUE_COLUMN: &str = "__value__";

/// Errors produced while building or validating a message schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("type '{type_name}' is not a struct and cannot be used as a message")]
    NotAMessage { type_name: String },

    #[error("field '{field}' of message '{message}' has unsupported type '{type_name}'")]
    UnsupportedType {
        message: String,
        field: String,
        type_name: String,
    },

    #[error("field '{field}' of message '{message}': invalid {attr} value '{value}'")]
    InvalidAttr {
        message: String,
        field: String,
        attr: &'static str,
        value: String,
    },

    #[error("message '{message}' uses tag {tag} more than once")]
    DuplicateTag { message: String, tag: u32 },

    #[error("field '{field}' of message '{message}' has tag 0")]
    ZeroTag { message: String, field: String },

    #[error("message '{message}' contains itself")]
    Recursive { message: String },

    #[error("field '{field}' of message '{message}' is a repeated field of repeated values")]
    NestedRepeated { message: String, field: String },
}

/// A message type: its full logical name and its fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub full_name: String,
    pub fields: Vec<FieldSpec>,
}

impl SchemaNode {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field, builder-style.
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field_by_tag(&self, tag: u32) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Check that tags are non-zero and unique and that no repeated field
    /// repeats another, in this message and in every message nested under it.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if field.tag == 0 {
                return Err(SchemaError::ZeroTag {
                    message: self.full_name.clone(),
                    field: field.name.clone(),
                });
            }
            if !seen.insert(field.tag) {
                return Err(SchemaError::DuplicateTag {
                    message: self.full_name.clone(),
                    tag: field.tag,
                });
            }
            if let FieldKind::Repeated(element) = &field.kind
                && matches!(element.as_ref(), FieldKind::Repeated(_))
            {
                return Err(SchemaError::NestedRepeated {
                    message: self.full_name.clone(),
                    field: field.name.clone(),
                });
            }
            if let Some(nested) = field.kind.message() {
                nested.validate()?;
            }
        }
        Ok(())
    }
}

/// One field of a message.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub tag: u32,
    pub kind: FieldKind,
    /// Maximum string length; 0 means unbounded.
    pub max_length: u32,
    pub default: Option<String>,
    /// Whether the field belongs to a union (optional / oneof).
    pub in_union: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, tag: u32, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            tag,
            kind,
            max_length: 0,
            default: None,
            in_union: false,
        }
    }

    pub fn string(name: impl Into<String>, tag: u32) -> Self {
        Self::new(name, tag, FieldKind::String)
    }

    pub fn int32(name: impl Into<String>, tag: u32) -> Self {
        Self::new(name, tag, FieldKind::Int32)
    }

    pub fn message(name: impl Into<String>, tag: u32, node: SchemaNode) -> Self {
        Self::new(name, tag, FieldKind::Message(node))
    }

    pub fn repeated(name: impl Into<String>, tag: u32, element: FieldKind) -> Self {
        Self::new(name, tag, FieldKind::Repeated(Box::new(element)))
    }

    pub fn max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn in_union(mut self) -> Self {
        self.in_union = true;
        self
    }
}

/// The closed set of field kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Int32,
    Message(SchemaNode),
    /// A sequence of a scalar or message kind. Never wraps another
    /// `Repeated`.
    Repeated(Box<FieldKind>),
}

impl FieldKind {
    pub fn is_scalar(&self) -> bool {
        matches!(self, FieldKind::String | FieldKind::Int32)
    }

    /// The nested message, looking through one level of repetition.
    pub fn message(&self) -> Option<&SchemaNode> {
        match self {
            FieldKind::Message(node) => Some(node),
            FieldKind::Repeated(inner) => inner.message(),
            _ => None,
        }
    }
}

/// Ordered list of field tags leading from a root message to a nested one.
///
/// The root path is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NamePath(Vec<u32>);

impl NamePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, tag: u32) -> Self {
        let mut tags = self.0.clone();
        tags.push(tag);
        Self(tags)
    }

    pub fn tags(&self) -> &[u32] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Logical name of the table stored at this path under `root`,
    /// e.g. `shop.Order.3.1`.
    pub fn table_name(&self, root: &str) -> LogicalName {
        let mut name = root.to_string();
        for tag in &self.0 {
            name.push('.');
            name.push_str(&tag.to_string());
        }
        LogicalName::new(name)
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tag) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{tag}")?;
        }
        Ok(())
    }
}

/// Logical name of the column holding field `tag` in `table`.
pub fn column_logical_name(table: &LogicalName, tag: u32) -> LogicalName {
    LogicalName::new(format!("{table}:{tag}"))
}

/// Logical name of the element column of a repeated scalar table.
pub fn value_logical_name(table: &LogicalName) -> LogicalName {
    LogicalName::new(format!("{table}:{VALUE_COLUMN}"))
}

/// How a child table relates to its parent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// At most one child row per parent (singular nested message).
    Singular,
    /// Any number of child rows per parent, ordered by `__index__`.
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub table: ShortName,
    pub relation: Relation,
}

/// A table to bring into existence.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub name: ShortName,
    pub logical: LogicalName,
    pub parent: Option<ParentLink>,
    pub columns: Vec<ColumnPlan>,
}

/// A column to bring into existence.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub name: ShortName,
    pub logical: LogicalName,
    pub def: ColumnDef,
}

/// Storage definition of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub storage: StorageType,
    pub nullable: bool,
    pub default: Option<String>,
}

/// Column storage types the mapper produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    VarChar(u32),
    Text,
    LongText,
    Int,
}

impl StorageType {
    /// Render the type clause for a dialect.
    pub fn to_sql(self, dialect: Dialect) -> String {
        match (self, dialect) {
            (StorageType::VarChar(n), _) => format!("VARCHAR({n})"),
            (StorageType::Text, _) => "TEXT".to_string(),
            (StorageType::LongText, d) => d.long_text_type().to_string(),
            (StorageType::Int, Dialect::Mysql) => "INT".to_string(),
            (StorageType::Int, Dialect::Postgres) => "INTEGER".to_string(),
        }
    }
}

/// A registered message type.
///
/// Submit with `inventory::submit!(tabby::MessageDef::new::<MyMessage>());`
/// to make it part of [`collect_messages`].
pub struct MessageDef {
    pub shape: &'static Shape,
}

impl MessageDef {
    pub const fn new<T: Facet<'static>>() -> Self {
        Self { shape: T::SHAPE }
    }

    pub fn message_name(&self) -> &'static str {
        message_name(self.shape)
    }

    pub fn to_node(&self) -> Result<SchemaNode, SchemaError> {
        SchemaNode::from_shape(self.shape)
    }
}

inventory::collect!(MessageDef);

/// Reflect every registered message, sorted by full name.
pub fn collect_messages() -> Result<Vec<SchemaNode>, SchemaError> {
    let mut nodes = inventory::iter::<MessageDef>
        .into_iter()
        .map(MessageDef::to_node)
        .collect::<Result<Vec<_>, _>>()?;
    nodes.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    Ok(nodes)
}
