//! # capture-queries
//!
//! Count, time and explain the SQL statements a piece of code runs.
//!
//! ## Features
//!
//! - **Hookable connection**: statements go through a [`Connection`] whose top
//!   [`Interceptor`] decides how they run
//! - **Query capture**: [`CaptureQueries`] records each statement with its
//!   literal SQL and execution time into a bounded log
//! - **Repeated runs**: measure a block `max_runs` times and get the total and
//!   median statement time
//! - **Query limits**: fail a test when more statements run than expected
//! - **EXPLAIN**: attach the plan of every SELECT, fetched on a side channel
//!   that is never captured itself
//!
//! ## Catching N+1 queries
//!
//! ```ignore
//! use capture_queries::{CaptureConfig, CaptureQueries, Connection, PgBackend, params};
//!
//! let conn = Connection::new(PgBackend::connect(&database_url).await?);
//! let mut capture = CaptureQueries::new(&conn, CaptureConfig::new().assert_limit(2))?;
//!
//! let scope = capture.enter()?;
//! let authors = conn.query("SELECT id FROM authors", &[]).await?;
//! for author in &authors {
//!     let id = author.values()[0].clone();
//!     conn.query("SELECT * FROM books WHERE author_id = $1", &[id]).await?;
//! }
//! scope.finish()?; // Err(QueryLimitExceeded) with more than one author
//! ```

pub mod backend;
pub mod capture;
pub mod connection;
pub mod error;
pub mod report;
pub mod sql;
pub mod value;

pub use backend::{Backend, Execution, Params, PgBackend, Row, Statement, StubBackend, StubResponse};
pub use capture::{
    CaptureConfig, CaptureQueries, CaptureScope, CaptureStats, DEFAULT_QUERIES_LIMIT,
    ExecutionInterceptor, ExplainEngine, ExplainOptions, ExplainValue, Iterations, QueryLog,
    QueryRecord, SessionState, Timer, measure,
};
pub use connection::{Connection, ConnectionConfig, InstallGuard, Interceptor, Next};
pub use error::{CaptureError, CaptureResult};
pub use report::{IterationReport, NoopPrinter, Printer, SeveralReport, SingleReport, SqlPrinter};
pub use value::Value;
