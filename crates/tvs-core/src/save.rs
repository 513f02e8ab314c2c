//! Statement plumbing for saving edit state to a SQL database.
//!
//! The edit model emits plain SQL text through [`SqlExecutor`]; the store
//! crate supplies the database-backed executor. Multi-row inserts are built by
//! [`BatchInsert`], which splits value lists so no statement exceeds the
//! configured length.

use crate::PersistError;

/// Default cap on the length of a single generated statement.
pub const DEFAULT_MAX_STATEMENT_LENGTH: usize = 1_000_000;

/// Runs one SQL statement and returns the affected row count.
pub trait SqlExecutor {
    fn execute(&mut self, sql: &str) -> Result<usize, PersistError>;
}

/// Records statements instead of running them.
impl SqlExecutor for Vec<String> {
    fn execute(&mut self, sql: &str) -> Result<usize, PersistError> {
        self.push(sql.to_string());
        Ok(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    pub max_statement_length: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            max_statement_length: DEFAULT_MAX_STATEMENT_LENGTH,
        }
    }
}

impl SaveOptions {
    pub fn with_max_statement_length(mut self, max_statement_length: usize) -> Self {
        self.max_statement_length = max_statement_length;
        self
    }
}

/// Accumulates value tuples for one `INSERT INTO table (columns) VALUES ...`.
pub struct BatchInsert<'a> {
    prefix: String,
    statement: String,
    rows: usize,
    max_length: usize,
    executor: &'a mut dyn SqlExecutor,
}

impl<'a> BatchInsert<'a> {
    pub fn new(
        executor: &'a mut dyn SqlExecutor,
        table: &str,
        columns: &str,
        options: SaveOptions,
    ) -> Self {
        let prefix = format!("INSERT INTO {table} ({columns}) VALUES ");
        Self {
            statement: prefix.clone(),
            prefix,
            rows: 0,
            max_length: options.max_statement_length,
            executor,
        }
    }

    /// Appends one tuple; `values` is the comma-separated content without
    /// parentheses. Flushes first if the tuple would overflow the statement.
    pub fn push(&mut self, values: &str) -> Result<(), PersistError> {
        let added = values.len() + if self.rows == 0 { 2 } else { 3 };
        if self.rows > 0 && self.statement.len() + added > self.max_length {
            self.flush()?;
        }
        if self.rows > 0 {
            self.statement.push(',');
        }
        self.statement.push('(');
        self.statement.push_str(values);
        self.statement.push(')');
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), PersistError> {
        if self.rows == 0 {
            return Ok(());
        }
        self.executor.execute(&self.statement)?;
        self.statement.clear();
        self.statement.push_str(&self.prefix);
        self.rows = 0;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), PersistError> {
        self.flush()
    }
}

/// Quotes text as a SQL string literal.
pub fn sql_text(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn sql_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Comma-separated key list for an `IN (...)` clause.
pub fn sql_key_list<T: std::fmt::Display>(keys: impl IntoIterator<Item = T>) -> String {
    keys.into_iter()
        .map(|key| key.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
