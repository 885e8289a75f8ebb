//! The lowest layer of the execution pipeline.
//!
//! A [`Backend`] executes statements directly against a database. It knows
//! nothing about interceptors: the [`Connection`](crate::Connection) owns the
//! interceptor stack and only hands a backend reference to the interceptor on
//! top of it. Anything that calls a backend directly therefore bypasses
//! capture, which is how EXPLAIN requests stay out of the query log.

mod postgres;
mod stub;


pub use postgres::PgBackend;
pub use stub::{StubBackend, StubResponse};

use crate::capture::ExplainOptions;
use crate::error::CaptureResult;
use crate::sql;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;

/// Bound parameters of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// One parameter set, one execution.
    Single(Vec<Value>),
    /// The same statement applied to many parameter sets.
    Many(Vec<Vec<Value>>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Single(Vec::new())
    }
}

/// A statement submitted for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::Single(params),
        }
    }

    pub fn many(sql: impl Into<String>, param_sets: Vec<Vec<Value>>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::Many(param_sets),
        }
    }

    /// Whether this is a batch ("many") execution.
    pub fn is_batch(&self) -> bool {
        matches!(self.params, Params::Many(_))
    }

    /// Copy of this statement with different SQL text and the same parameters.
    pub fn with_sql(&self, sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: self.params.clone(),
        }
    }
}

/// One result row: column names plus decoded values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the named column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }
}

/// Outcome of a successful execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl Execution {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        let rows_affected = rows.len() as u64;
        Self {
            rows,
            rows_affected,
        }
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected,
        }
    }
}

/// A database that can execute statements without any interception.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short vendor name shown in reports (`postgresql`, `stub`, ...).
    fn vendor(&self) -> &str;

    /// Execute a statement directly.
    ///
    /// For batch statements the returned rows are the concatenation of each
    /// run's rows and `rows_affected` is the sum.
    async fn execute(&self, statement: &Statement) -> CaptureResult<Execution>;

    /// Build the vendor's EXPLAIN prefix (e.g. `EXPLAIN (FORMAT JSON)`).
    ///
    /// Called once when a capture session is constructed, so unsupported
    /// formats or options fail before any query runs.
    fn explain_prefix(&self, options: &ExplainOptions) -> CaptureResult<String>;

    /// The statement text with parameters rendered as literals.
    ///
    /// Batch statements keep their placeholders. Falls back to the raw text
    /// when the parameters cannot be spliced in.
    fn literal_sql(&self, statement: &Statement) -> String {
        match &statement.params {
            Params::Single(params) => sql::resolve_literal(&statement.sql, params)
                .unwrap_or_else(|| statement.sql.clone()),
            Params::Many(_) => statement.sql.clone(),
        }
    }
}
