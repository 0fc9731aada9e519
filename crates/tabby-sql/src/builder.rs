//! Statement builder.

use std::fmt;

use crate::{Arg, Dialect};

/// One piece of a statement under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// Literal SQL text, emitted as-is.
    Sql(String),
    /// A typed argument, escaped at render time.
    Arg(Arg),
}

/// Accumulates SQL fragments and arguments, then renders one statement.
///
/// # Example
/// ```
/// use tabby_sql::{Dialect, QueryBuilder};
///
/// let mut q = QueryBuilder::new(Dialect::Mysql);
/// q.sql("SELECT ").ident("hash_name").sql(" FROM ").ident("names");
/// q.sql(" WHERE ").ident("real_name").sql(" = ").string("o'brien");
/// assert_eq!(
///     q.build(),
///     "SELECT `hash_name` FROM `names` WHERE `real_name` = 'o''brien'"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    dialect: Dialect,
    parts: Vec<Part>,
}

impl QueryBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            parts: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Append literal SQL text.
    pub fn sql(&mut self, fragment: impl Into<String>) -> &mut Self {
        let fragment = fragment.into();
        // Adjacent literal text is merged so parts stay alternating.
        if let Some(Part::Sql(last)) = self.parts.last_mut() {
            last.push_str(&fragment);
        } else {
            self.parts.push(Part::Sql(fragment));
        }
        self
    }

    /// Append a typed argument.
    pub fn arg(&mut self, arg: Arg) -> &mut Self {
        self.parts.push(Part::Arg(arg));
        self
    }

    pub fn ident(&mut self, name: impl AsRef<str>) -> &mut Self {
        self.arg(Arg::ident(name))
    }

    pub fn string(&mut self, s: impl Into<String>) -> &mut Self {
        self.arg(Arg::string(s))
    }

    pub fn int(&mut self, n: i64) -> &mut Self {
        self.arg(Arg::int(n))
    }

    pub fn verbatim(&mut self, s: impl Into<String>) -> &mut Self {
        self.arg(Arg::verbatim(s))
    }

    /// Append identifiers separated by `", "`.
    pub fn ident_list<I>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for (i, name) in names.into_iter().enumerate() {
            if i > 0 {
                self.sql(", ");
            }
            self.ident(name);
        }
        self
    }

    /// Render the statement, substituting every argument in order.
    pub fn build(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Sql(s) => out.push_str(s),
                Part::Arg(arg) => self.dialect.render_arg(arg, &mut out),
            }
        }
        out
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}
