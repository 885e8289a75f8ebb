use super::*;
use crate::backend::{StubBackend, StubResponse};
use crate::connection::{Connection, ConnectionConfig};
use crate::error::CaptureError;
use crate::params;
use crate::report::{IterationReport, Printer, SeveralReport, SingleReport};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Shared helpers ──

/// Collects formatted `tracing` output for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Printed {
    Iteration(IterationReport),
    Single(SingleReport),
    Several(SeveralReport),
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Printed>>>);

impl Recorder {
    fn events(&self) -> Vec<Printed> {
        self.0.lock().unwrap().clone()
    }

    fn iterations(&self) -> Vec<IterationReport> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Printed::Iteration(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

impl Printer for Recorder {
    fn print_iteration(&mut self, report: &IterationReport) {
        self.0.lock().unwrap().push(Printed::Iteration(report.clone()));
    }

    fn print_single(&mut self, report: &SingleReport) {
        self.0.lock().unwrap().push(Printed::Single(report.clone()));
    }

    fn print_several(&mut self, report: &SeveralReport) {
        self.0.lock().unwrap().push(Printed::Several(report.clone()));
    }
}

fn stub_connection() -> (Connection, Arc<StubBackend>) {
    stub_connection_with(StubBackend::new(), ConnectionConfig::default())
}

fn stub_connection_with(
    backend: StubBackend,
    config: ConnectionConfig,
) -> (Connection, Arc<StubBackend>) {
    let backend = Arc::new(backend);
    (Connection::with_config(backend.clone(), config), backend)
}

fn session(conn: &Connection, config: CaptureConfig) -> (CaptureQueries, Recorder) {
    let recorder = Recorder::default();
    let capture = CaptureQueries::new(conn, config)
        .unwrap()
        .with_printer(recorder.clone());
    (capture, recorder)
}

// ── Timer and log ──

#[test]
fn timer_keeps_session_history_across_iterations() {
    let mut timer = Timer::new();
    timer.record(Duration::from_millis(3));
    timer.record(Duration::from_millis(1));
    assert_eq!(timer.per_iteration_count(), 2);
    assert_eq!(timer.per_iteration_elapsed(), Duration::from_millis(4));

    timer.clear_iteration();
    timer.record(Duration::from_millis(2));

    assert_eq!(timer.per_iteration_count(), 1);
    assert_eq!(timer.all_durations().len(), 3);
    assert_eq!(timer.total(), Duration::from_millis(6));
    assert_eq!(timer.median(), Some(Duration::from_millis(2)));
}

#[test]
fn timer_median_of_even_count_and_empty() {
    let mut timer = Timer::new();
    assert_eq!(timer.median(), None);
    assert_eq!(timer.total(), Duration::ZERO);

    for ms in [4, 1, 2, 3] {
        timer.record(Duration::from_millis(ms));
    }
    assert_eq!(timer.median(), Some(Duration::from_micros(2500)));
}

#[tokio::test]
async fn measure_returns_outcome_and_elapsed() {
    let (ok, elapsed) = measure(async {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok::<_, CaptureError>(7)
    })
    .await;
    assert_eq!(ok.unwrap(), 7);
    assert!(elapsed >= Duration::from_millis(2));

    let (err, _) = measure(async { Err::<(), _>(CaptureError::execution("boom")) }).await;
    assert!(err.is_err());
}

#[test]
fn query_log_evicts_oldest_when_full() {
    let mut log = QueryLog::new(2);
    for sql in ["SELECT 1", "SELECT 2", "SELECT 3"] {
        log.push(QueryRecord::new(sql, Duration::ZERO));
    }
    assert_eq!(log.len(), 2);
    assert_eq!(log.evicted(), 1);
    assert_eq!(log.get(0).unwrap().sql, "SELECT 2");
    assert_eq!(log.iter().last().unwrap().sql, "SELECT 3");

    assert_eq!(QueryLog::new(0).capacity(), 1);
    assert_eq!(QueryLog::default().capacity(), DEFAULT_QUERIES_LIMIT);
}

// ── Configuration ──

#[test]
fn explain_option_names_are_validated() {
    assert!(ExplainOptions::new().option("analyze", true).validate().is_ok());
    assert!(ExplainOptions::new().option("generic-plan", true).validate().is_ok());

    for bad in ["", "a b", "x;DROP", "a--b", "costs)"] {
        let err = ExplainOptions::new().option(bad, true).validate().unwrap_err();
        assert!(err.is_config(), "{bad:?} should be rejected");
        assert!(err.to_string().contains("Invalid option name"));
    }
}

#[test]
fn invalid_configuration_fails_at_construction() {
    let (conn, backend) = stub_connection();

    let err = CaptureQueries::new(&conn, CaptureConfig::new().max_runs(0)).unwrap_err();
    assert!(err.is_config());

    let options = ExplainOptions::new().option("verbose; --", true);
    let err = CaptureQueries::new(&conn, CaptureConfig::new().explain_with(options)).unwrap_err();
    assert!(err.is_config());

    assert!(backend.executed().is_empty());
    assert_eq!(conn.interceptor_depth(), 0);
}

#[test]
fn config_defaults_and_quiet() {
    let config = CaptureConfig::default();
    assert_eq!(config.assert_limit, None);
    assert_eq!(config.max_runs, 1);
    assert!(config.verbose);
    assert!(!config.advanced_verbose);
    assert!(!config.show_queries);
    assert!(config.explain.is_none());

    let quiet = CaptureConfig::new().show_queries(true).quiet();
    assert!(!quiet.verbose && !quiet.show_queries && !quiet.advanced_verbose);
}

// ── Iteration protocol ──

#[tokio::test]
async fn repeated_runs_report_each_iteration_and_totals() {
    let (conn, _) = stub_connection();
    let (mut capture, recorder) = session(&conn, CaptureConfig::new().max_runs(3));

    let mut seen = Vec::new();
    while let Some(iteration) = capture.next_iteration().unwrap() {
        seen.push(iteration);
        conn.execute("SELECT 1", &[]).await.unwrap();
        conn.execute("UPDATE t SET a = 1", &[]).await.unwrap();
    }

    assert_eq!(seen, vec![1, 2, 3]);
    assert_eq!(capture.state(), SessionState::Closed);
    assert_eq!(capture.len(), 6);

    let iterations = recorder.iterations();
    assert_eq!(iterations.len(), 3);
    assert!(iterations.iter().all(|r| r.queries_count == 2));
    assert_eq!(
        iterations.iter().map(|r| r.iteration).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    match recorder.events().last() {
        Some(Printed::Several(report)) => {
            assert_eq!(report.iterations, 3);
            assert_eq!(report.queries_count, 6);
            assert_eq!(report.records.len(), 6);
            assert!(report.median_elapsed.is_some());
        }
        other => panic!("expected a several report, got {other:?}"),
    }
}

#[tokio::test]
async fn interceptor_is_installed_only_while_active() {
    let (conn, _) = stub_connection();
    let (mut capture, _) = session(&conn, CaptureConfig::new());

    assert_eq!(capture.state(), SessionState::Idle);
    conn.execute("SELECT 0", &[]).await.unwrap();
    assert_eq!(conn.interceptor_depth(), 0);

    assert_eq!(capture.next_iteration().unwrap(), Some(1));
    assert_eq!(capture.state(), SessionState::Active);
    assert_eq!(conn.interceptor_depth(), 1);
    conn.execute("SELECT 1", &[]).await.unwrap();

    assert_eq!(capture.next_iteration().unwrap(), None);
    assert_eq!(conn.interceptor_depth(), 0);
    conn.execute("SELECT 2", &[]).await.unwrap();

    assert_eq!(capture.len(), 1);
    assert_eq!(capture.get(0).unwrap().sql, "SELECT 1");
}

#[tokio::test]
async fn limit_is_checked_once_at_close() {
    let (conn, _) = stub_connection();

    let (mut capture, _) = session(&conn, CaptureConfig::new().max_runs(2).assert_limit(4));
    while capture.next_iteration().unwrap().is_some() {
        conn.execute("SELECT 1", &[]).await.unwrap();
        conn.execute("SELECT 2", &[]).await.unwrap();
    }
    assert_eq!(capture.stats().queries_count, 4);

    let (mut capture, recorder) = session(&conn, CaptureConfig::new().max_runs(2).assert_limit(3));
    assert_eq!(capture.next_iteration().unwrap(), Some(1));
    conn.execute("SELECT 1", &[]).await.unwrap();
    conn.execute("SELECT 2", &[]).await.unwrap();
    assert_eq!(capture.next_iteration().unwrap(), Some(2));
    conn.execute("SELECT 1", &[]).await.unwrap();
    conn.execute("SELECT 2", &[]).await.unwrap();

    let err = capture.next_iteration().unwrap_err();
    assert!(err.is_limit_exceeded());
    assert_eq!(err.to_string(), "4 not less than or equal to 3 queries");
    // The summary is printed before the assertion fails.
    assert!(matches!(recorder.events().last(), Some(Printed::Several(_))));
    assert_eq!(conn.interceptor_depth(), 0);
}

#[tokio::test]
async fn empty_measurement_has_zero_totals_and_no_median() {
    let (conn, _) = stub_connection();
    let (mut capture, recorder) = session(&conn, CaptureConfig::new().assert_limit(0));

    while capture.next_iteration().unwrap().is_some() {}

    let stats = capture.stats();
    assert_eq!(stats.queries_count, 0);
    assert_eq!(stats.total_elapsed, Duration::ZERO);
    assert_eq!(stats.median_elapsed, None);
    assert!(capture.is_empty());
    assert!(matches!(
        recorder.events().last(),
        Some(Printed::Several(SeveralReport { median_elapsed: None, .. }))
    ));
}

#[tokio::test]
async fn closed_session_cannot_be_reused() {
    let (conn, _) = stub_connection();
    let (mut capture, _) = session(&conn, CaptureConfig::new());
    while capture.next_iteration().unwrap().is_some() {}

    assert!(matches!(capture.next_iteration(), Err(CaptureError::SessionClosed)));
    assert!(matches!(capture.enter(), Err(CaptureError::SessionClosed)));
}

#[tokio::test]
async fn iterator_adapter_runs_max_runs_times() {
    let (conn, _) = stub_connection();
    let (mut capture, recorder) = session(&conn, CaptureConfig::new().max_runs(4));

    let mut runs = 0;
    for _ in capture.iterations() {
        runs += 1;
        conn.execute("SELECT 1", &[]).await.unwrap();
    }

    assert_eq!(runs, 4);
    assert_eq!(capture.stats().iterations, 4);
    assert_eq!(recorder.iterations().len(), 4);
}

#[tokio::test]
#[should_panic(expected = "2 not less than or equal to 1 queries")]
async fn iterator_adapter_panics_when_limit_exceeded() {
    let (conn, _) = stub_connection();
    let (mut capture, _) = session(&conn, CaptureConfig::new().max_runs(2).assert_limit(1));

    for _ in capture.iterations() {
        conn.execute("SELECT 1", &[]).await.unwrap();
    }
}

// ── Closure and scope styles ──

#[tokio::test]
async fn run_calls_body_max_runs_times_and_returns_last_value() {
    let (conn, _) = stub_connection();
    let (mut capture, recorder) = session(&conn, CaptureConfig::new().max_runs(3));

    let value = capture
        .run(|iteration| {
            let conn = conn.clone();
            async move {
                conn.execute("SELECT 1", &[]).await?;
                Ok::<_, CaptureError>(iteration * 10)
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 30);
    assert_eq!(capture.len(), 3);
    assert_eq!(recorder.iterations().len(), 3);
}

#[derive(Debug)]
enum BodyError {
    Capture(CaptureError),
    Caller(&'static str),
}

impl From<CaptureError> for BodyError {
    fn from(err: CaptureError) -> Self {
        BodyError::Capture(err)
    }
}

#[tokio::test]
async fn run_aborts_without_report_when_body_fails() {
    let (conn, _) = stub_connection();
    let (mut capture, recorder) = session(&conn, CaptureConfig::new().max_runs(3).assert_limit(0));

    let result = capture
        .run(|iteration| {
            let conn = conn.clone();
            async move {
                conn.execute("SELECT 1", &[]).await?;
                if iteration == 2 {
                    return Err(BodyError::Caller("caller failed"));
                }
                Ok(())
            }
        })
        .await;

    assert!(matches!(result, Err(BodyError::Caller("caller failed"))));
    assert_eq!(capture.state(), SessionState::Closed);
    assert_eq!(capture.current_iteration(), 2);
    assert_eq!(conn.interceptor_depth(), 0);
    assert!(!recorder.events().iter().any(|e| matches!(e, Printed::Several(_))));
}

#[tokio::test]
async fn scope_reports_single_measurement() {
    let (conn, _) = stub_connection();
    let (mut capture, recorder) = session(&conn, CaptureConfig::new().assert_limit(2));

    let scope = capture.enter().unwrap();
    conn.execute("SELECT 1", &[]).await.unwrap();
    conn.execute("SELECT 2", &[]).await.unwrap();
    assert_eq!(scope.len(), 2);
    let stats = scope.finish().unwrap();

    assert_eq!(stats.queries_count, 2);
    assert_eq!(stats.iterations, 1);
    assert_eq!(capture.state(), SessionState::Closed);
    match recorder.events().as_slice() {
        [Printed::Single(report)] => {
            assert_eq!(report.queries_count, 2);
            assert_eq!(report.records[1].sql, "SELECT 2");
        }
        other => panic!("expected one single report, got {other:?}"),
    }
}

#[tokio::test]
async fn scope_finish_fails_over_limit() {
    let (conn, _) = stub_connection();
    let (mut capture, _) = session(&conn, CaptureConfig::new().assert_limit(1));

    let scope = capture.enter().unwrap();
    conn.execute("SELECT 1", &[]).await.unwrap();
    conn.execute("SELECT 2", &[]).await.unwrap();

    let err = scope.finish().unwrap_err();
    assert!(matches!(err, CaptureError::QueryLimitExceeded { count: 2, limit: 1 }));
}

#[tokio::test]
async fn dropped_scope_uninstalls_without_report() {
    let (conn, _) = stub_connection();
    let (mut capture, recorder) = session(&conn, CaptureConfig::new().assert_limit(0));

    {
        let _scope = capture.enter().unwrap();
        conn.execute("SELECT 1", &[]).await.unwrap();
    }

    assert_eq!(conn.interceptor_depth(), 0);
    assert_eq!(capture.state(), SessionState::Closed);
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn scope_ignores_extra_runs_and_warns() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let (conn, _) = stub_connection();
    let (mut capture, recorder) = session(&conn, CaptureConfig::new().max_runs(5));

    let scope = capture.enter().unwrap();
    conn.execute("SELECT 1", &[]).await.unwrap();
    scope.finish().unwrap();

    assert_eq!(capture.current_iteration(), 1);
    assert_eq!(recorder.events().len(), 1);

    let output = logs.contents();
    assert!(output.contains("WARN"), "{output}");
    assert!(output.contains("max_runs > 1 is not used"), "{output}");
    assert!(output.contains("max_runs=5"), "{output}");
}

#[tokio::test]
async fn scope_with_single_run_does_not_warn() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let (conn, _) = stub_connection();
    let (mut capture, _) = session(&conn, CaptureConfig::new());
    capture.enter().unwrap().finish().unwrap();

    assert!(!logs.contents().contains("max_runs"));
}

// ── Interception ──

#[tokio::test]
async fn failed_statements_are_not_recorded() {
    let backend = StubBackend::new().fail_on("FROM missing", "relation does not exist");
    let (conn, stub) = stub_connection_with(backend, ConnectionConfig::default());
    let (mut capture, _) = session(&conn, CaptureConfig::new().assert_limit(1));

    let scope = capture.enter().unwrap();
    conn.execute("SELECT 1", &[]).await.unwrap();
    let err = conn.execute("SELECT * FROM missing", &[]).await.unwrap_err();
    assert!(err.is_no_result());
    scope.finish().unwrap();

    assert_eq!(capture.len(), 1);
    assert_eq!(stub.executed().len(), 2);

    // Without an interceptor the driver error reaches the caller unchanged.
    let err = conn.execute("SELECT * FROM missing", &[]).await.unwrap_err();
    assert!(matches!(err, CaptureError::Execution(_)));
}

#[tokio::test]
async fn records_show_literal_parameters_and_batches_stay_raw() {
    let (conn, _) = stub_connection();
    let (mut capture, _) = session(&conn, CaptureConfig::new());

    let scope = capture.enter().unwrap();
    conn.execute("SELECT * FROM books WHERE author_id = $1 AND title = $2", &params![7, "it's"])
        .await
        .unwrap();
    conn.execute_many("INSERT INTO tags VALUES ($1)", vec![params![1], params![2]])
        .await
        .unwrap();
    let records = scope.records();
    scope.finish().unwrap();

    assert_eq!(
        records[0].sql,
        "SELECT * FROM books WHERE author_id = 7 AND title = 'it''s'"
    );
    assert_eq!(records[1].sql, "INSERT INTO tags VALUES ($1)");
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn intercepted_statements_return_backend_rows() {
    let backend = StubBackend::new().respond(
        "FROM authors",
        StubResponse::rows(["id", "name"], vec![params![1, "Ann"], params![2, "Bo"]]),
    );
    let (conn, _) = stub_connection_with(backend, ConnectionConfig::default());
    let (mut capture, _) = session(&conn, CaptureConfig::new());

    let scope = capture.enter().unwrap();
    let rows = conn.query("SELECT id, name FROM authors", &[]).await.unwrap();
    scope.finish().unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get("name"), Some(&crate::Value::from("Bo")));
}

#[tokio::test]
async fn query_log_capacity_comes_from_connection() {
    let config = ConnectionConfig::new().with_queries_limit(2);
    let (conn, _) = stub_connection_with(StubBackend::new(), config);
    let (mut capture, _) = session(&conn, CaptureConfig::new());

    let scope = capture.enter().unwrap();
    for i in 1..=3 {
        conn.execute(&format!("SELECT {i}"), &[]).await.unwrap();
    }
    scope.finish().unwrap();

    let records = capture.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].sql, "SELECT 2");
    assert_eq!(capture.stats().queries_count, 2);
}

#[tokio::test]
async fn nested_sessions_only_top_captures() {
    let (conn, _) = stub_connection();
    let (mut outer, _) = session(&conn, CaptureConfig::new());
    let (mut inner, _) = session(&conn, CaptureConfig::new());

    let outer_scope = outer.enter().unwrap();
    conn.execute("SELECT 'outer 1'", &[]).await.unwrap();

    let inner_scope = inner.enter().unwrap();
    assert_eq!(conn.interceptor_depth(), 2);
    conn.execute("SELECT 'inner'", &[]).await.unwrap();
    inner_scope.finish().unwrap();

    conn.execute("SELECT 'outer 2'", &[]).await.unwrap();
    assert_eq!(outer_scope.len(), 2);
    outer_scope.finish().unwrap();

    assert_eq!(inner.len(), 1);
    assert_eq!(inner.get(0).unwrap().sql, "SELECT 'inner'");
    assert_eq!(
        outer.records().iter().map(|r| r.sql.as_str()).collect::<Vec<_>>(),
        vec!["SELECT 'outer 1'", "SELECT 'outer 2'"]
    );
    assert_eq!(conn.interceptor_depth(), 0);
}

#[tokio::test]
async fn elapsed_time_covers_execution() {
    let backend = StubBackend::new().with_latency(Duration::from_millis(5));
    let (conn, _) = stub_connection_with(backend, ConnectionConfig::default());
    let (mut capture, _) = session(&conn, CaptureConfig::new());

    let scope = capture.enter().unwrap();
    conn.execute("SELECT 1", &[]).await.unwrap();
    let stats = scope.finish().unwrap();

    assert!(stats.total_elapsed >= Duration::from_millis(5));
    assert!(capture.get(0).unwrap().elapsed >= Duration::from_millis(5));
}

// ── Explain ──

#[tokio::test]
async fn explain_attaches_plans_to_selects_only() {
    let (conn, stub) = stub_connection();
    let (mut capture, _) = session(&conn, CaptureConfig::new().explain());

    let scope = capture.enter().unwrap();
    conn.execute("SELECT * FROM t WHERE id = $1", &params![1]).await.unwrap();
    conn.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
    scope.finish().unwrap();

    let records = capture.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].explain.as_deref(), Some("stub plan"));
    assert_eq!(records[1].explain, None);

    let executed = stub.executed();
    assert_eq!(executed.len(), 3);
    assert_eq!(executed[0].sql, "EXPLAIN SELECT * FROM t WHERE id = $1");
    assert_eq!(executed[0].params, executed[1].params);
}

#[tokio::test]
async fn explain_uses_options_and_flattens_rows() {
    let backend = StubBackend::new().respond(
        "EXPLAIN (ANALYZE true, FORMAT TEXT)",
        StubResponse::text_rows("QUERY PLAN", &["Sort", "  -> Seq Scan on t"]),
    );
    let (conn, _) = stub_connection_with(backend, ConnectionConfig::default());
    let options = ExplainOptions::new().format("text").option("analyze", true);
    let (mut capture, _) = session(&conn, CaptureConfig::new().explain_with(options));

    let scope = capture.enter().unwrap();
    conn.execute("SELECT * FROM t ORDER BY a", &[]).await.unwrap();
    scope.finish().unwrap();

    assert_eq!(
        capture.get(0).unwrap().explain.as_deref(),
        Some("Sort\n  -> Seq Scan on t")
    );
}

#[tokio::test]
async fn explain_renders_json_plans() {
    let plan = serde_json::json!([{"Plan": {"Node Type": "Result"}}]);
    let backend = StubBackend::new().respond(
        "FORMAT JSON",
        StubResponse::rows(["QUERY PLAN"], vec![vec![crate::Value::Json(plan.clone())]]),
    );
    let (conn, _) = stub_connection_with(backend, ConnectionConfig::default());
    let options = ExplainOptions::new().format("json");
    let (mut capture, _) = session(&conn, CaptureConfig::new().explain_with(options));

    let scope = capture.enter().unwrap();
    conn.execute("SELECT 1", &[]).await.unwrap();
    scope.finish().unwrap();

    assert_eq!(capture.get(0).unwrap().explain, Some(plan.to_string()));
}

#[tokio::test]
async fn explain_failure_does_not_affect_the_query() {
    let backend = StubBackend::new().fail_on("EXPLAIN", "syntax error");
    let (conn, _) = stub_connection_with(backend, ConnectionConfig::default());
    let (mut capture, _) = session(&conn, CaptureConfig::new().explain().assert_limit(1));

    let scope = capture.enter().unwrap();
    conn.execute("SELECT 1", &[]).await.unwrap();
    let stats = scope.finish().unwrap();

    assert_eq!(stats.queries_count, 1);
    assert_eq!(capture.get(0).unwrap().explain.as_deref(), Some(""));
}

#[tokio::test]
async fn explain_is_skipped_for_non_literal_selects() {
    let (conn, stub) = stub_connection();
    let (mut capture, _) = session(&conn, CaptureConfig::new().explain());

    let scope = capture.enter().unwrap();
    conn.execute("WITH x AS (SELECT 1) SELECT * FROM x", &[]).await.unwrap();
    scope.finish().unwrap();

    assert_eq!(capture.get(0).unwrap().explain, None);
    assert_eq!(stub.executed().len(), 1);
}

#[tokio::test]
async fn explained_selects_are_logged_once_each() {
    let (conn, stub) = stub_connection();
    let (mut capture, _) = session(&conn, CaptureConfig::new().explain());

    let scope = capture.enter().unwrap();
    conn.execute("INSERT INTO t VALUES (1)", &[]).await.unwrap();
    conn.execute("SELECT * FROM t", &[]).await.unwrap();
    conn.execute("select id from t", &[]).await.unwrap();
    let stats = scope.finish().unwrap();

    assert_eq!(stats.queries_count, 3);
    assert!(capture.records().iter().all(|r| !r.sql.starts_with("EXPLAIN")));
    assert_eq!(stub.executed().len(), 5);
}

// ── Styles agree ──

async fn traffic(conn: &Connection) {
    conn.execute("INSERT INTO t VALUES ($1)", &params![1]).await.unwrap();
    conn.execute("SELECT * FROM t WHERE id = $1", &params![1]).await.unwrap();
    conn.execute("SELECT count(*) FROM t", &[]).await.unwrap();
}

#[tokio::test]
async fn all_invocation_styles_record_the_same_statements() {
    let (conn, _) = stub_connection();

    let (mut iterated, _) = session(&conn, CaptureConfig::new());
    while iterated.next_iteration().unwrap().is_some() {
        traffic(&conn).await;
    }

    let (mut closure, _) = session(&conn, CaptureConfig::new());
    closure
        .run(|_| {
            let conn = conn.clone();
            async move {
                traffic(&conn).await;
                Ok::<_, CaptureError>(())
            }
        })
        .await
        .unwrap();

    let (mut scoped, _) = session(&conn, CaptureConfig::new());
    let scope = scoped.enter().unwrap();
    traffic(&conn).await;
    scope.finish().unwrap();

    let sql = |c: &CaptureQueries| c.records().into_iter().map(|r| r.sql).collect::<Vec<_>>();
    assert_eq!(sql(&iterated).len(), 3);
    assert_eq!(sql(&iterated), sql(&closure));
    assert_eq!(sql(&iterated), sql(&scoped));
    assert_eq!(sql(&scoped)[0], "INSERT INTO t VALUES (1)");
}

#[tokio::test]
async fn panicking_block_still_uninstalls() {
    let (conn, _) = stub_connection();
    let (mut capture, recorder) = session(&conn, CaptureConfig::new());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _scope = capture.enter().unwrap();
        panic!("measured code panicked");
    }));

    assert!(result.is_err());
    assert_eq!(conn.interceptor_depth(), 0);
    assert_eq!(capture.state(), SessionState::Closed);
    assert!(recorder.events().is_empty());
}
