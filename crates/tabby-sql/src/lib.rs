//! SQL dialects, escaping and statement building.
//!
//! Statements are assembled from literal SQL fragments interleaved with typed
//! [`Arg`]s, then rendered for one [`Dialect`]. Structural SQL (keywords, type
//! clauses) stays free-form, while every value that comes from a schema or a
//! message (names, defaults, payloads) goes through the dialect's escaping.

use std::fmt;

use strid::braid;

mod builder;
pub use builder::*;

mod dialect;
pub use dialect::*;

/// A short, storage-legal table or column identifier.
#[braid]
pub struct ShortName;

/// A full structural name, before shortening.
#[braid]
pub struct LogicalName;

/// A typed statement argument.
///
/// This is a closed set: every argument is rendered by [`Dialect::render_arg`]
/// and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Inserted unescaped. The caller vouches for it (type clauses, keywords).
    Verbatim(String),
    /// A table or column name, quoted as an identifier.
    Identifier(String),
    /// A string value, quoted as a string literal.
    StringLiteral(String),
    /// An integer value, rendered as a decimal numeral.
    IntegerLiteral(i64),
}

impl Arg {
    pub fn verbatim(s: impl Into<String>) -> Self {
        Arg::Verbatim(s.into())
    }

    pub fn ident(name: impl AsRef<str>) -> Self {
        Arg::Identifier(name.as_ref().to_owned())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Arg::StringLiteral(s.into())
    }

    pub fn int(n: i64) -> Self {
        Arg::IntegerLiteral(n)
    }
}

/// An identifier wrapper.
///
/// Display writes the value quoted for the dialect, doubling any embedded
/// quote character.
///
/// # Example
/// ```
/// use tabby_sql::{Dialect, Ident};
/// assert_eq!(format!("{}", Ident(Dialect::Mysql, "a`b")), "`a``b`");
/// assert_eq!(format!("{}", Ident(Dialect::Postgres, "bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub Dialect, pub T);

impl<T: AsRef<str>> fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quote = self.0.identifier_quote();
        write!(f, "{quote}")?;
        for c in self.1.as_ref().chars() {
            if c == quote {
                write!(f, "{quote}{quote}")?;
            } else {
                write!(f, "{c}")?;
            }
        }
        write!(f, "{quote}")
    }
}

/// A string literal wrapper.
///
/// Display writes the value quoted with single quotes and escaped per the
/// dialect's string rules. Single quotes are always doubled, so a MySQL
/// literal stays closed even when the server runs with
/// `NO_BACKSLASH_ESCAPES`.
///
/// # Example
/// ```
/// use tabby_sql::{Dialect, Lit};
/// assert_eq!(format!("{}", Lit(Dialect::Postgres, "it's")), "'it''s'");
/// assert_eq!(format!("{}", Lit(Dialect::Mysql, "it's")), "'it''s'");
/// assert_eq!(format!("{}", Lit(Dialect::Mysql, "C:\\dir")), "'C:\\\\dir'");
/// ```
pub struct Lit<T: AsRef<str>>(pub Dialect, pub T);

impl<T: AsRef<str>> fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'")?;
        match self.0 {
            Dialect::Mysql => {
                for c in self.1.as_ref().chars() {
                    match c {
                        '\0' => write!(f, "\\0")?,
                        '\n' => write!(f, "\\n")?,
                        '\r' => write!(f, "\\r")?,
                        '\\' => write!(f, "\\\\")?,
                        '\'' => write!(f, "''")?,
                        '\x1a' => write!(f, "\\Z")?,
                        c => write!(f, "{c}")?,
                    }
                }
            }
            Dialect::Postgres => {
                for c in self.1.as_ref().chars() {
                    if c == '\'' {
                        write!(f, "''")?;
                    } else {
                        write!(f, "{c}")?;
                    }
                }
            }
        }
        write!(f, "'")
    }
}
