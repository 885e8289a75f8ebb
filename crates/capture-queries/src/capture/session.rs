use super::config::CaptureConfig;
use super::explain::ExplainEngine;
use super::interceptor::ExecutionInterceptor;
use super::log::QueryRecord;
use crate::connection::{Connection, InstallGuard, Interceptor};
use crate::error::{CaptureError, CaptureResult};
use crate::report::{IterationReport, Printer, SeveralReport, SingleReport, SqlPrinter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a [`CaptureQueries`] session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed; nothing installed yet.
    Idle,
    /// The interceptor is installed and statements are being captured.
    Active,
    /// The interceptor is gone. A closed session cannot be reused.
    Closed,
}

/// Aggregate statistics of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    /// Iterations started so far.
    pub iterations: usize,
    /// Statements in the query log.
    pub queries_count: usize,
    /// Sum of all statement execution times.
    pub total_elapsed: Duration,
    /// Median statement execution time; `None` if nothing ran.
    pub median_elapsed: Option<Duration>,
}

/// Counts, times and optionally explains the statements run on a connection.
///
/// One session supports three ways of measuring, all sharing the same
/// interceptor, log and timer:
///
/// - iterate: [`next_iteration`](Self::next_iteration) or
///   [`iterations`](Self::iterations), running the body `max_runs` times;
/// - run a closure `max_runs` times with [`run`](Self::run);
/// - open a scope with [`enter`](Self::enter) and close it with
///   [`CaptureScope::finish`].
///
/// # Example
///
/// ```rust,ignore
/// let mut capture = CaptureQueries::new(&conn, CaptureConfig::new().assert_limit(2))?;
/// let scope = capture.enter()?;
/// conn.execute("SELECT * FROM authors", &[]).await?;
/// conn.execute("SELECT * FROM books WHERE author_id = $1", &params![1]).await?;
/// scope.finish()?;
/// ```
pub struct CaptureQueries {
    connection: Connection,
    config: CaptureConfig,
    interceptor: Arc<ExecutionInterceptor>,
    printer: Box<dyn Printer>,
    state: SessionState,
    current_iteration: usize,
    guard: Option<InstallGuard>,
}

impl CaptureQueries {
    /// Create a session on `connection`.
    ///
    /// Explain options are validated here, so a bad option name fails before
    /// any statement runs.
    pub fn new(connection: &Connection, config: CaptureConfig) -> CaptureResult<Self> {
        config.validate()?;

        let mut interceptor = ExecutionInterceptor::new(connection.config().queries_limit);
        if let Some(options) = &config.explain {
            interceptor = interceptor.with_explain(ExplainEngine::new(connection.raw(), options)?);
        }
        let printer = SqlPrinter::from_config(connection.vendor(), &config);

        Ok(Self {
            connection: connection.clone(),
            config,
            interceptor: Arc::new(interceptor),
            printer: Box::new(printer),
            state: SessionState::Idle,
            current_iteration: 0,
            guard: None,
        })
    }

    /// Replace the default [`SqlPrinter`].
    pub fn with_printer<P: Printer + 'static>(mut self, printer: P) -> Self {
        self.printer = Box::new(printer);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Iterations started so far (0 before the first).
    pub fn current_iteration(&self) -> usize {
        self.current_iteration
    }

    /// Number of captured statements.
    pub fn len(&self) -> usize {
        self.interceptor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptor.is_empty()
    }

    /// The `index`-th captured statement, `None` when out of range.
    pub fn get(&self, index: usize) -> Option<QueryRecord> {
        self.interceptor.get(index)
    }

    /// Snapshot of every captured statement, in execution order.
    pub fn records(&self) -> Vec<QueryRecord> {
        self.interceptor.records()
    }

    pub fn stats(&self) -> CaptureStats {
        let state = self.interceptor.lock();
        CaptureStats {
            iterations: self.current_iteration,
            queries_count: state.log.len(),
            total_elapsed: state.timer.total(),
            median_elapsed: state.timer.median(),
        }
    }

    /// Advance the iteration protocol.
    ///
    /// Returns the 1-based number of the iteration that is starting, or
    /// `None` once `max_runs` iterations have completed. The call that
    /// returns `None` closes the session: it reports the totals and checks
    /// the query limit, returning [`CaptureError::QueryLimitExceeded`] when
    /// it is exceeded.
    ///
    /// ```rust,ignore
    /// while let Some(_) = capture.next_iteration()? {
    ///     load_dashboard(&conn).await?;
    /// }
    /// ```
    pub fn next_iteration(&mut self) -> CaptureResult<Option<usize>> {
        match self.state {
            SessionState::Idle => self.activate()?,
            SessionState::Active => {}
            SessionState::Closed => return Err(CaptureError::SessionClosed),
        }

        if self.current_iteration > 0 {
            let report = IterationReport {
                iteration: self.current_iteration,
                queries_count: self.interceptor.iteration_count(),
                elapsed: self.interceptor.iteration_elapsed(),
            };
            tracing::debug!(
                target: "capture_queries",
                iteration = report.iteration,
                queries = report.queries_count,
                "iteration finished"
            );
            self.printer.print_iteration(&report);
        }

        self.interceptor.clear_iteration();

        if self.current_iteration < self.config.max_runs {
            self.current_iteration += 1;
            return Ok(Some(self.current_iteration));
        }

        self.deactivate();
        let stats = self.stats();
        self.printer.print_several(&SeveralReport {
            iterations: self.current_iteration,
            queries_count: stats.queries_count,
            total_elapsed: stats.total_elapsed,
            median_elapsed: stats.median_elapsed,
            records: self.records(),
        });
        self.check_limit(stats.queries_count)?;
        Ok(None)
    }

    /// Iterate `max_runs` times.
    ///
    /// A thin wrapper over [`next_iteration`](Self::next_iteration) for use
    /// in `for` loops.
    ///
    /// # Panics
    ///
    /// Panics when the query limit is exceeded at the end of the last
    /// iteration, or when the session was already closed. Use
    /// `next_iteration` to get these as errors instead.
    pub fn iterations(&mut self) -> Iterations<'_> {
        Iterations {
            session: self,
            done: false,
        }
    }

    /// Run `body` `max_runs` times, returning the last run's value.
    ///
    /// If `body` fails, the session closes immediately without reporting and
    /// the error is returned as is.
    pub async fn run<F, Fut, T, E>(&mut self, mut body: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CaptureError>,
    {
        let mut last = None;
        while let Some(iteration) = self.next_iteration()? {
            match body(iteration).await {
                Ok(value) => last = Some(value),
                Err(err) => {
                    self.abort();
                    return Err(err);
                }
            }
        }
        last.ok_or_else(|| CaptureError::SessionClosed.into())
    }

    /// Start a single-shot measurement.
    ///
    /// A scope always measures exactly once; with `max_runs > 1` a warning is
    /// logged and the extra runs are ignored.
    pub fn enter(&mut self) -> CaptureResult<CaptureScope<'_>> {
        if self.config.max_runs > 1 {
            tracing::warn!(
                target: "capture_queries",
                max_runs = self.config.max_runs,
                "a capture scope measures once; max_runs > 1 is not used"
            );
        }
        self.activate()?;
        self.interceptor.clear_iteration();
        self.current_iteration = 1;
        Ok(CaptureScope {
            session: self,
            finished: false,
        })
    }

    fn activate(&mut self) -> CaptureResult<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Active => return Err(CaptureError::AlreadyActive),
            SessionState::Closed => return Err(CaptureError::SessionClosed),
        }
        let interceptor: Arc<dyn Interceptor> = self.interceptor.clone();
        self.guard = Some(self.connection.install(interceptor));
        self.state = SessionState::Active;
        tracing::debug!(
            target: "capture_queries",
            vendor = self.connection.vendor(),
            max_runs = self.config.max_runs,
            explain = self.interceptor.explains(),
            "capture started"
        );
        Ok(())
    }

    fn deactivate(&mut self) {
        self.guard.take();
        self.state = SessionState::Closed;
    }

    /// Close after the measured code failed: no report, no limit check.
    fn abort(&mut self) {
        self.deactivate();
        tracing::debug!(
            target: "capture_queries",
            iteration = self.current_iteration,
            "capture aborted by caller error"
        );
    }

    fn close_single(&mut self) -> CaptureResult<CaptureStats> {
        self.deactivate();
        let stats = self.stats();
        self.printer.print_single(&SingleReport {
            queries_count: stats.queries_count,
            elapsed: self.interceptor.iteration_elapsed(),
            records: self.records(),
        });
        self.check_limit(stats.queries_count)?;
        Ok(stats)
    }

    fn check_limit(&self, queries_count: usize) -> CaptureResult<()> {
        match self.config.assert_limit {
            Some(limit) if queries_count > limit => Err(CaptureError::QueryLimitExceeded {
                count: queries_count,
                limit,
            }),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for CaptureQueries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureQueries")
            .field("connection", &self.connection)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("current_iteration", &self.current_iteration)
            .field("queries", &self.len())
            .finish_non_exhaustive()
    }
}

/// `for` loop adapter returned by [`CaptureQueries::iterations`].
pub struct Iterations<'s> {
    session: &'s mut CaptureQueries,
    done: bool,
}

impl Iterator for Iterations<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.done {
            return None;
        }
        match self.session.next_iteration() {
            Ok(Some(iteration)) => Some(iteration),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                panic!("{err}");
            }
        }
    }
}

impl std::iter::FusedIterator for Iterations<'_> {}

/// An open single-shot measurement.
///
/// Dropping the scope without calling [`finish`](Self::finish) (for example
/// when the measured code returns early with `?` or panics) uninstalls the
/// interceptor and closes the session without reporting.
#[must_use = "dropping the scope ends the measurement without a report"]
pub struct CaptureScope<'s> {
    session: &'s mut CaptureQueries,
    finished: bool,
}

impl CaptureScope<'_> {
    /// Statements captured so far.
    pub fn len(&self) -> usize {
        self.session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.session.is_empty()
    }

    pub fn records(&self) -> Vec<QueryRecord> {
        self.session.records()
    }

    /// Close the measurement: uninstall, report, and check the query limit.
    pub fn finish(mut self) -> CaptureResult<CaptureStats> {
        self.finished = true;
        self.session.close_single()
    }
}

impl Drop for CaptureScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.session.abort();
        }
    }
}
