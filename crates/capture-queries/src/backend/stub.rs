use super::{Backend, Execution, Params, Row, Statement};
use crate::capture::ExplainOptions;
use crate::error::{CaptureError, CaptureResult};
use crate::sql;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Canned outcome for statements matched by a [`StubBackend`] rule.
#[derive(Debug, Clone, PartialEq)]
pub enum StubResponse {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Affected(u64),
    Error(String),
}

impl StubResponse {
    pub fn rows<C, S>(columns: C, rows: Vec<Vec<Value>>) -> Self
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StubResponse::Rows {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// One text column, one row per line.
    pub fn text_rows(column: &str, lines: &[&str]) -> Self {
        Self::rows(
            [column],
            lines.iter().map(|line| vec![Value::from(*line)]).collect(),
        )
    }

    fn into_execution(self) -> CaptureResult<Execution> {
        match self {
            StubResponse::Rows { columns, rows } => {
                let columns: Arc<[String]> = columns.into();
                Ok(Execution::with_rows(
                    rows.into_iter()
                        .map(|values| Row::new(columns.clone(), values))
                        .collect(),
                ))
            }
            StubResponse::Affected(n) => Ok(Execution::affected(n)),
            StubResponse::Error(message) => Err(CaptureError::execution(message)),
        }
    }
}

/// An in-memory [`Backend`] for tests and demos.
///
/// Responses are chosen by the first rule whose needle occurs in the SQL.
/// Unmatched statements get defaults: a one-line `stub plan` for EXPLAIN, no
/// rows for other SELECTs and `RETURNING` statements, one affected row for
/// everything else. Every call is logged and available through
/// [`executed`](Self::executed).
#[derive(Debug, Default)]
pub struct StubBackend {
    rules: Vec<(String, StubResponse)>,
    latency: Option<Duration>,
    executed: Mutex<Vec<Statement>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `needle` with `response`.
    pub fn respond(mut self, needle: impl Into<String>, response: StubResponse) -> Self {
        self.rules.push((needle.into(), response));
        self
    }

    /// Fail statements containing `needle`.
    pub fn fail_on(self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.respond(needle, StubResponse::Error(message.into()))
    }

    /// Sleep this long before answering each statement.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Every statement received so far, in order.
    pub fn executed(&self) -> Vec<Statement> {
        self.log().clone()
    }

    fn log(&self) -> MutexGuard<'_, Vec<Statement>> {
        self.executed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn response_for(&self, sql: &str) -> StubResponse {
        let rule = self
            .rules
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()));
        if let Some((_, response)) = rule {
            return response.clone();
        }
        if sql::starts_with_keyword(sql.trim(), "explain") {
            StubResponse::text_rows("QUERY PLAN", &["stub plan"])
        } else if sql::returns_rows(sql) {
            StubResponse::rows(Vec::<String>::new(), Vec::new())
        } else {
            StubResponse::Affected(1)
        }
    }
}

#[async_trait]
impl Backend for StubBackend {
    fn vendor(&self) -> &str {
        "stub"
    }

    async fn execute(&self, statement: &Statement) -> CaptureResult<Execution> {
        self.log().push(statement.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match &statement.params {
            Params::Single(_) => self.response_for(&statement.sql).into_execution(),
            Params::Many(param_sets) => {
                let mut total = Execution::default();
                for _ in param_sets {
                    let execution = self.response_for(&statement.sql).into_execution()?;
                    total.rows.extend(execution.rows);
                    total.rows_affected += execution.rows_affected;
                }
                Ok(total)
            }
        }
    }

    fn explain_prefix(&self, options: &ExplainOptions) -> CaptureResult<String> {
        options.validate()?;
        let mut parts: Vec<String> = options
            .options()
            .iter()
            .map(|(name, value)| format!("{} {value}", name.to_uppercase()))
            .collect();
        if let Some(format) = options.format_name() {
            parts.push(format!("FORMAT {}", format.to_uppercase()));
        }
        if parts.is_empty() {
            Ok("EXPLAIN".to_string())
        } else {
            Ok(format!("EXPLAIN ({})", parts.join(", ")))
        }
    }
}
