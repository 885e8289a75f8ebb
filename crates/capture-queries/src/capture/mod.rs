//! Capturing the statements executed on a [`Connection`](crate::Connection).
//!
//! This module provides:
//! - [`CaptureQueries`], a session that installs an interceptor, runs the
//!   measured code one or more times and reports the totals
//! - [`ExecutionInterceptor`], the interceptor that times and records statements
//! - [`ExplainEngine`], which explains SELECT statements on the side
//! - [`QueryLog`] and [`Timer`], the bounded log and the duration bookkeeping
//!
//! # Example
//!
//! ```rust,ignore
//! use capture_queries::{CaptureConfig, CaptureQueries, Connection, PgBackend};
//!
//! let conn = Connection::new(PgBackend::connect(&database_url).await?);
//! let mut capture = CaptureQueries::new(&conn, CaptureConfig::new().max_runs(10).assert_limit(20))?;
//!
//! while capture.next_iteration()?.is_some() {
//!     for author in conn.query("SELECT id FROM authors", &[]).await? {
//!         let id = author.values()[0].clone();
//!         conn.query("SELECT * FROM books WHERE author_id = $1", &[id]).await?;
//!     }
//! }
//! ```

mod config;
mod explain;
mod interceptor;
mod log;
mod session;
mod timer;

#[cfg(test)]
mod tests;

pub use config::CaptureConfig;
pub use explain::{ExplainEngine, ExplainOptions, ExplainValue};
pub use interceptor::ExecutionInterceptor;
pub use log::{DEFAULT_QUERIES_LIMIT, QueryLog, QueryRecord};
pub use session::{CaptureQueries, CaptureScope, CaptureStats, Iterations, SessionState};
pub use timer::{Timer, measure};
