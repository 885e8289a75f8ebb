use super::explain::ExplainEngine;
use super::log::{QueryLog, QueryRecord};
use super::timer::{self, Timer};
use crate::backend::{Execution, Statement};
use crate::connection::{Interceptor, Next};
use crate::sql;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Timer and log shared by an interceptor and the session that owns it.
#[derive(Debug)]
pub(crate) struct CaptureState {
    pub(crate) timer: Timer,
    pub(crate) log: QueryLog,
}

/// Records every statement it sees into a bounded [`QueryLog`].
///
/// Each statement is timed, its SQL resolved to literal form, and (when an
/// [`ExplainEngine`] is attached) SELECT statements are explained first.
/// Statements that fail are logged with `tracing` and not recorded.
#[derive(Debug)]
pub struct ExecutionInterceptor {
    state: Mutex<CaptureState>,
    explain: Option<ExplainEngine>,
}

impl ExecutionInterceptor {
    /// Create an interceptor keeping at most `queries_limit` records.
    pub fn new(queries_limit: usize) -> Self {
        Self {
            state: Mutex::new(CaptureState {
                timer: Timer::new(),
                log: QueryLog::new(queries_limit),
            }),
            explain: None,
        }
    }

    /// Explain SELECT statements before running them.
    pub fn with_explain(mut self, engine: ExplainEngine) -> Self {
        self.explain = Some(engine);
        self
    }

    pub fn explains(&self) -> bool {
        self.explain.is_some()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach anything derived before execution to a finished record.
    fn update_query(&self, record: QueryRecord, explain: Option<String>) -> QueryRecord {
        match explain {
            Some(explain) => record.with_explain(explain),
            None => record,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().log.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<QueryRecord> {
        self.lock().log.get(index).cloned()
    }

    pub fn records(&self) -> Vec<QueryRecord> {
        self.lock().log.to_vec()
    }

    pub fn iteration_count(&self) -> usize {
        self.lock().timer.per_iteration_count()
    }

    pub fn iteration_elapsed(&self) -> Duration {
        self.lock().timer.per_iteration_elapsed()
    }

    pub fn clear_iteration(&self) {
        self.lock().timer.clear_iteration();
    }
}

#[async_trait]
impl Interceptor for ExecutionInterceptor {
    async fn intercept(&self, next: Next<'_>, statement: &Statement) -> Option<Execution> {
        let explain = match &self.explain {
            Some(engine) if sql::is_select(&statement.sql) => {
                Some(engine.explain(statement).await)
            }
            _ => None,
        };

        let (result, elapsed) = timer::measure(next.run(statement)).await;
        let execution = match result {
            Ok(execution) => execution,
            Err(err) => {
                tracing::warn!(
                    target: "capture_queries",
                    vendor = next.vendor(),
                    error = %err,
                    sql = %statement.sql,
                    "statement failed during capture; not recorded"
                );
                return None;
            }
        };

        let record = QueryRecord::new(next.literal_sql(statement), elapsed);
        let record = self.update_query(record, explain);

        let mut state = self.lock();
        state.timer.record(elapsed);
        state.log.push(record);
        drop(state);

        Some(execution)
    }
}
