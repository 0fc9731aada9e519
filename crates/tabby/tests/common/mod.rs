//! In-memory executor that understands the MySQL statements tabby emits.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Once};

use tabby::hash::name_key;
use tabby::{BoxFuture, Dialect, Executor, ExecutorError, ResultRow};

static TRACING: Once = Once::new();

/// Install a test subscriber once; `RUST_LOG` selects the verbosity.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRow {
    pub real_name: String,
    pub hash_name: String,
    pub hash_algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRow {
    pub id: i64,
    pub message_type: String,
    pub binary_data: Option<Vec<u8>>,
    pub json_data: Option<String>,
}

#[derive(Debug, Default)]
pub struct State {
    /// table name -> column names, in creation order
    pub tables: BTreeMap<String, Vec<String>>,
    pub statements: Vec<String>,
    pub ddl: Vec<String>,
    pub lookup: Vec<LookupRow>,
    pub blobs: Vec<BlobRow>,
    /// Written just before the next lookup insert, as if by another process.
    pub pending_race: Option<LookupRow>,
    /// Fail the DDL statement issued after this many have succeeded.
    pub fail_ddl_after: Option<usize>,
}

/// A fake MySQL database.
pub struct FakeDb {
    schema_rows: Vec<Option<String>>,
    state: Mutex<State>,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::with_schema_rows(vec![Some("app".to_string())])
    }

    /// Control what `SELECT DATABASE()` returns.
    pub fn with_schema_rows(schema_rows: Vec<Option<String>>) -> Self {
        init_tracing();
        Self {
            schema_rows,
            state: Mutex::new(State::default()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn ddl(&self) -> Vec<String> {
        self.with_state(|s| s.ddl.clone())
    }

    pub fn ddl_count(&self) -> usize {
        self.with_state(|s| s.ddl.len())
    }

    pub fn tables(&self) -> Vec<String> {
        self.with_state(|s| s.tables.keys().cloned().collect())
    }

    pub fn columns(&self, table: &str) -> Vec<String> {
        self.with_state(|s| s.tables.get(table).cloned().unwrap_or_default())
    }

    pub fn lookup_rows(&self) -> Vec<LookupRow> {
        self.with_state(|s| s.lookup.clone())
    }

    pub fn race_before_next_insert(&self, row: LookupRow) {
        self.with_state(|s| s.pending_race = Some(row));
    }

    pub fn fail_ddl_after(&self, succeeded: usize) {
        self.with_state(|s| s.fail_ddl_after = Some(succeeded));
    }

    fn run_query(&self, sql: &str) -> Result<Vec<ResultRow>, ExecutorError> {
        let tokens = tokenize(sql);
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());

        if sql == "SELECT 1" {
            return Ok(vec![ResultRow::from_pairs([("1", Some("1"))])]);
        }
        if sql == "SELECT DATABASE()" {
            return Ok(self
                .schema_rows
                .iter()
                .map(|s| ResultRow::from_pairs([("DATABASE()", s.as_deref())]))
                .collect());
        }
        if sql.starts_with("SELECT COUNT(*) FROM information_schema.tables") {
            let [schema, table] = strings::<2>(&tokens)?;
            let n = (schema == "app" && state.tables.contains_key(&table)) as i64;
            return Ok(vec![count_row(n)]);
        }
        if sql.starts_with("SELECT COUNT(*) FROM information_schema.columns") {
            let [schema, table, column] = strings::<3>(&tokens)?;
            let n = (schema == "app"
                && state
                    .tables
                    .get(&table)
                    .is_some_and(|cols| cols.contains(&column))) as i64;
            return Ok(vec![count_row(n)]);
        }
        if sql.starts_with("SELECT `real_name`, `hash_name`, `hash_algorithm`") {
            let [key] = strings::<1>(&tokens)?;
            return Ok(state
                .lookup
                .iter()
                .filter(|r| name_key(&r.real_name) == key)
                .map(|r| {
                    ResultRow::from_pairs([
                        ("real_name", Some(r.real_name.as_str())),
                        ("hash_name", Some(r.hash_name.as_str())),
                        ("hash_algorithm", Some(r.hash_algorithm.as_str())),
                    ])
                })
                .collect());
        }
        if sql.starts_with("SELECT `message_type`, TO_BASE64(") {
            let id: i64 = sql
                .rsplit("= ")
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| unsupported(sql))?;
            return Ok(state
                .blobs
                .iter()
                .filter(|b| b.id == id)
                .map(|b| {
                    let binary = b.binary_data.as_deref().map(tabby::base64::encode);
                    ResultRow::from_pairs([
                        ("message_type", Some(b.message_type.as_str())),
                        ("binary_data", binary.as_deref()),
                        ("json_data", b.json_data.as_deref()),
                    ])
                })
                .collect());
        }
        Err(unsupported(sql))
    }

    fn run_execute(&self, sql: &str) -> Result<u64, ExecutorError> {
        let tokens = tokenize(sql);
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());

        // Re-creating an existing table changes nothing and is not DDL work.
        if sql.starts_with("CREATE TABLE IF NOT EXISTS ")
            && idents(&tokens)
                .first()
                .is_some_and(|table| state.tables.contains_key(table))
        {
            return Ok(0);
        }

        if sql.starts_with("CREATE TABLE IF NOT EXISTS ") || sql.starts_with("ALTER TABLE ") {
            if state.fail_ddl_after == Some(state.ddl.len()) {
                state.fail_ddl_after = None;
                return Err(ExecutorError::Other("injected DDL failure".to_string()));
            }
            state.ddl.push(sql.to_string());
        }

        if sql.starts_with("CREATE TABLE IF NOT EXISTS ") {
            let idents = idents(&tokens);
            let table = idents.first().cloned().ok_or_else(|| unsupported(sql))?;
            let mut columns = vec![idents.get(1).cloned().unwrap_or_default()];
            for surrogate in ["__parent_id__", "__index__"] {
                if idents.iter().any(|i| i == surrogate) {
                    columns.push(surrogate.to_string());
                }
            }
            state.tables.entry(table).or_insert(columns);
            return Ok(0);
        }

        if sql.starts_with("ALTER TABLE ") {
            let idents = idents(&tokens);
            let (Some(table), Some(column)) = (idents.first(), idents.get(1)) else {
                return Err(unsupported(sql));
            };
            let Some(columns) = state.tables.get_mut(table) else {
                return Err(ExecutorError::Other(format!("no table {table}")));
            };
            if columns.contains(column) {
                return Err(ExecutorError::Other(format!("duplicate column {column}")));
            }
            columns.push(column.clone());
            return Ok(0);
        }

        if sql.starts_with("INSERT INTO ") {
            if let Some(race) = state.pending_race.take() {
                state.lookup.push(race);
            }
            let [key, real_name, hash_name, hash_algorithm] = strings::<4>(&tokens)?;
            if key != name_key(&real_name) {
                return Err(ExecutorError::Other(format!("wrong key for '{real_name}'")));
            }
            let conflict = state.lookup.iter().any(|r| {
                name_key(&r.real_name) == key
                    || (r.hash_name == hash_name && r.hash_algorithm == hash_algorithm)
            });
            if conflict {
                return Err(ExecutorError::UniqueViolation(format!(
                    "Duplicate entry for '{real_name}'"
                )));
            }
            state.lookup.push(LookupRow {
                real_name,
                hash_name,
                hash_algorithm,
            });
            return Ok(1);
        }

        Err(unsupported(sql))
    }

    fn run_insert(&self, sql: &str) -> Result<i64, ExecutorError> {
        let tokens = tokenize(sql);
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());

        let [message_type, payload] = strings::<2>(&tokens)?;
        let id = state.blobs.len() as i64 + 1;
        let row = if idents(&tokens).iter().any(|i| i == "json_data") {
            BlobRow {
                id,
                message_type,
                binary_data: None,
                json_data: Some(payload),
            }
        } else {
            let bytes = tabby::base64::decode(&payload)
                .map_err(|e| ExecutorError::Other(format!("FROM_BASE64: {e}")))?;
            BlobRow {
                id,
                message_type,
                binary_data: Some(bytes),
                json_data: None,
            }
        };
        state.blobs.push(row);
        Ok(id)
    }
}

impl Executor for FakeDb {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<u64, ExecutorError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.run_execute(sql)
        })
    }

    fn query<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<ResultRow>, ExecutorError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.run_query(sql)
        })
    }

    fn insert_returning_id<'a>(
        &'a self,
        sql: &'a str,
        _id_column: &'a str,
    ) -> BoxFuture<'a, Result<i64, ExecutorError>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.run_insert(sql)
        })
    }
}

fn count_row(n: i64) -> ResultRow {
    let n = n.to_string();
    ResultRow::from_pairs([("COUNT(*)", Some(n.as_str()))])
}

fn unsupported(sql: &str) -> ExecutorError {
    ExecutorError::Other(format!("fake database cannot run: {sql}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Ident(String),
    Str(String),
}

fn idents(tokens: &[Token]) -> Vec<String> {
    tokens
        .iter()
        .filter_map(|t| match t {
            Token::Ident(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

fn strings<const N: usize>(tokens: &[Token]) -> Result<[String; N], ExecutorError> {
    let found: Vec<String> = tokens
        .iter()
        .filter_map(|t| match t {
            Token::Str(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    found
        .try_into()
        .map_err(|v: Vec<String>| ExecutorError::Other(format!("expected {N} literals, got {v:?}")))
}

/// Split out backtick identifiers and single-quoted strings, undoing
/// MySQL quoting.
pub fn tokenize(sql: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => {
                let mut ident = String::new();
                while let Some(c) = chars.next() {
                    if c == '`' {
                        if chars.peek() == Some(&'`') {
                            chars.next();
                            ident.push('`');
                        } else {
                            break;
                        }
                    } else {
                        ident.push(c);
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '\'' => {
                let mut s = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('0') => s.push('\0'),
                            Some('n') => s.push('\n'),
                            Some('r') => s.push('\r'),
                            Some('Z') => s.push('\x1a'),
                            Some(other) => s.push(other),
                            None => break,
                        },
                        '\'' => {
                            if chars.peek() == Some(&'\'') {
                                chars.next();
                                s.push('\'');
                            } else {
                                break;
                            }
                        }
                        c => s.push(c),
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ => {}
        }
    }
    tokens
}
