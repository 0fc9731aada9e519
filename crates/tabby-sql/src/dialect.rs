//! Target database dialects.

use std::fmt::Write as _;

use crate::{Arg, Ident, Lit};

/// The SQL dialect statements are rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// MySQL 8 / MariaDB 10.
    Mysql,
    /// PostgreSQL with `standard_conforming_strings` on.
    Postgres,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Postgres => "postgres",
        }
    }

    /// The character identifiers are quoted with.
    pub fn identifier_quote(self) -> char {
        match self {
            Dialect::Mysql => '`',
            Dialect::Postgres => '"',
        }
    }

    /// Longest identifier the database accepts, in bytes.
    pub fn max_identifier_len(self) -> usize {
        match self {
            Dialect::Mysql => 64,
            Dialect::Postgres => 63,
        }
    }

    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote_ident(self, name: &str) -> String {
        Ident(self, name).to_string()
    }

    /// Quote and escape a string literal.
    pub fn escape_string(self, s: &str) -> String {
        Lit(self, s).to_string()
    }

    /// Append the rendered form of `arg` to `out`.
    pub fn render_arg(self, arg: &Arg, out: &mut String) {
        // Writing to a String cannot fail.
        let _ = match arg {
            Arg::Verbatim(s) => write!(out, "{s}"),
            Arg::Identifier(name) => write!(out, "{}", Ident(self, name)),
            Arg::StringLiteral(s) => write!(out, "{}", Lit(self, s)),
            Arg::IntegerLiteral(n) => write!(out, "{n}"),
        };
    }

    /// Statement returning the current schema (database) name as one row.
    pub fn current_schema_query(self) -> &'static str {
        match self {
            Dialect::Mysql => "SELECT DATABASE()",
            Dialect::Postgres => "SELECT current_schema()",
        }
    }

    /// Column definition of an auto-increment surrogate primary key.
    pub fn surrogate_key_definition(self) -> &'static str {
        match self {
            Dialect::Mysql => "BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY",
            Dialect::Postgres => "BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
        }
    }

    /// Type of a column referencing a surrogate key.
    pub fn reference_type(self) -> &'static str {
        "BIGINT"
    }

    /// Type of a nullable binary payload column.
    pub fn blob_type(self) -> &'static str {
        match self {
            Dialect::Mysql => "LONGBLOB",
            Dialect::Postgres => "BYTEA",
        }
    }

    /// Type of an unbounded text column.
    pub fn long_text_type(self) -> &'static str {
        match self {
            Dialect::Mysql => "LONGTEXT",
            Dialect::Postgres => "TEXT",
        }
    }

    /// SQL fragments wrapping a base64 text expression so that it evaluates
    /// to binary data.
    pub fn from_base64(self) -> (&'static str, &'static str) {
        match self {
            Dialect::Mysql => ("FROM_BASE64(", ")"),
            Dialect::Postgres => ("decode(", ", 'base64')"),
        }
    }

    /// SQL fragments wrapping a binary expression so that it evaluates to
    /// base64 text (76-character lines).
    pub fn to_base64(self) -> (&'static str, &'static str) {
        match self {
            Dialect::Mysql => ("TO_BASE64(", ")"),
            Dialect::Postgres => ("encode(", ", 'base64')"),
        }
    }

    /// Whether a literal default on a column of type `type_sql` must be
    /// written as a parenthesized expression.
    ///
    /// MySQL rejects plain literal defaults on TEXT and BLOB columns.
    pub fn needs_expression_default(self, type_sql: &str) -> bool {
        match self {
            Dialect::Mysql => type_sql.ends_with("TEXT") || type_sql.ends_with("BLOB"),
            Dialect::Postgres => false,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" | "mariadb" => Ok(Dialect::Mysql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(format!("unknown SQL dialect '{other}'")),
        }
    }
}
