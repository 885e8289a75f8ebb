//! The shared, hookable execution pipeline.
//!
//! A [`Connection`] owns a [`Backend`] and a stack of installed
//! [`Interceptor`]s. Every statement submitted through the connection is
//! handed to the interceptor on top of the stack, which decides how to run it
//! through [`Next`]. With an empty stack statements go straight to the
//! backend.

use crate::backend::{Backend, Execution, Row, Statement};
use crate::capture::DEFAULT_QUERIES_LIMIT;
use crate::error::{CaptureError, CaptureResult};
use crate::value::Value;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Configuration of a shared connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How many statements a capture session on this connection keeps.
    pub queries_limit: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            queries_limit: DEFAULT_QUERIES_LIMIT,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the query log capacity used by capture sessions.
    pub fn with_queries_limit(mut self, limit: usize) -> Self {
        self.queries_limit = limit.max(1);
        self
    }
}

/// Observes (and runs) every statement executed while it is installed.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Handle one statement.
    ///
    /// Implementations run the statement with [`Next::run`] and return its
    /// result unchanged. Returning `None` signals that the statement failed
    /// and the failure was handled here.
    async fn intercept(&self, next: Next<'_>, statement: &Statement) -> Option<Execution>;
}

/// The real execution primitive, as seen from inside an interceptor.
pub struct Next<'a> {
    backend: &'a dyn Backend,
}

impl<'a> Next<'a> {
    fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Execute the statement on the backend.
    pub async fn run(&self, statement: &Statement) -> CaptureResult<Execution> {
        self.backend.execute(statement).await
    }

    /// Statement text with parameters resolved to literals.
    pub fn literal_sql(&self, statement: &Statement) -> String {
        self.backend.literal_sql(statement)
    }

    pub fn vendor(&self) -> &str {
        self.backend.vendor()
    }
}

#[derive(Default)]
struct InterceptorStack {
    entries: Mutex<Vec<(u64, Arc<dyn Interceptor>)>>,
    next_id: AtomicU64,
}

impl InterceptorStack {
    fn lock(&self) -> MutexGuard<'_, Vec<(u64, Arc<dyn Interceptor>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, interceptor: Arc<dyn Interceptor>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, interceptor));
        id
    }

    fn remove(&self, id: u64) {
        let mut entries = self.lock();
        match entries.iter().rposition(|(entry_id, _)| *entry_id == id) {
            Some(pos) => {
                if pos + 1 != entries.len() {
                    tracing::warn!(
                        target: "capture_queries",
                        depth = entries.len(),
                        position = pos,
                        "interceptor uninstalled out of LIFO order"
                    );
                }
                entries.remove(pos);
            }
            None => {
                tracing::warn!(target: "capture_queries", id, "interceptor was not installed");
            }
        }
    }

    fn top(&self) -> Option<Arc<dyn Interceptor>> {
        self.lock().last().map(|(_, interceptor)| interceptor.clone())
    }

    fn depth(&self) -> usize {
        self.lock().len()
    }
}

struct Inner {
    backend: Arc<dyn Backend>,
    stack: InterceptorStack,
    config: ConnectionConfig,
}

/// A cheaply cloneable handle to a backend plus its interceptor stack.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Wrap a backend with the default configuration.
    pub fn new<B: Backend + 'static>(backend: B) -> Self {
        Self::with_config(Arc::new(backend), ConnectionConfig::default())
    }

    pub fn with_config(backend: Arc<dyn Backend>, config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                stack: InterceptorStack::default(),
                config,
            }),
        }
    }

    pub fn vendor(&self) -> &str {
        self.inner.backend.vendor()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// The backend, for statements that must bypass every interceptor.
    pub fn raw(&self) -> Arc<dyn Backend> {
        self.inner.backend.clone()
    }

    /// Number of interceptors currently installed.
    pub fn interceptor_depth(&self) -> usize {
        self.inner.stack.depth()
    }

    /// Push `interceptor` on top of the stack until the guard is dropped.
    pub fn install(&self, interceptor: Arc<dyn Interceptor>) -> InstallGuard {
        let id = self.inner.stack.push(interceptor);
        tracing::debug!(
            target: "capture_queries",
            id,
            depth = self.inner.stack.depth(),
            "interceptor installed"
        );
        InstallGuard {
            connection: self.clone(),
            id,
        }
    }

    /// Execute a single statement.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> CaptureResult<Execution> {
        self.run(Statement::new(sql, params.to_vec())).await
    }

    /// Execute a statement and return its rows.
    pub async fn query(&self, sql: &str, params: &[Value]) -> CaptureResult<Vec<Row>> {
        Ok(self.execute(sql, params).await?.rows)
    }

    /// Execute one statement once per parameter set.
    pub async fn execute_many(
        &self,
        sql: &str,
        param_sets: Vec<Vec<Value>>,
    ) -> CaptureResult<Execution> {
        self.run(Statement::many(sql, param_sets)).await
    }

    /// Submit a statement through the pipeline.
    ///
    /// When an interceptor swallowed the statement's failure, the caller gets
    /// [`CaptureError::NoResult`] instead of the driver error.
    pub async fn run(&self, statement: Statement) -> CaptureResult<Execution> {
        let backend = self.inner.backend.as_ref();
        match self.inner.stack.top() {
            None => backend.execute(&statement).await,
            Some(interceptor) => {
                let execution = interceptor.intercept(Next::new(backend), &statement).await;
                execution.ok_or(CaptureError::NoResult { sql: statement.sql })
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("vendor", &self.vendor())
            .field("config", &self.inner.config)
            .field("interceptors", &self.interceptor_depth())
            .finish()
    }
}

/// Keeps an interceptor installed; uninstalls it on drop.
#[must_use = "the interceptor is uninstalled as soon as the guard is dropped"]
pub struct InstallGuard {
    connection: Connection,
    id: u64,
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        self.connection.inner.stack.remove(self.id);
        tracing::debug!(
            target: "capture_queries",
            id = self.id,
            depth = self.connection.interceptor_depth(),
            "interceptor uninstalled"
        );
    }
}
