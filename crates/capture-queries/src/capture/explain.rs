use crate::backend::{Backend, Row, Statement};
use crate::error::{CaptureError, CaptureResult};
use crate::sql;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

static OPTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w-]+$").expect("valid option-name pattern"));

/// Value of a named EXPLAIN option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplainValue {
    Bool(bool),
    Text(String),
}

impl fmt::Display for ExplainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplainValue::Bool(v) => write!(f, "{v}"),
            ExplainValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ExplainValue {
    fn from(v: bool) -> Self {
        ExplainValue::Bool(v)
    }
}

impl From<&str> for ExplainValue {
    fn from(v: &str) -> Self {
        ExplainValue::Text(v.to_string())
    }
}

impl From<String> for ExplainValue {
    fn from(v: String) -> Self {
        ExplainValue::Text(v)
    }
}

/// Output format and options for the EXPLAIN issued before each SELECT.
///
/// Which formats and option names are accepted depends on the backend; see
/// [`Backend::explain_prefix`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplainOptions {
    format: Option<String>,
    options: BTreeMap<String, ExplainValue>,
}

impl ExplainOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output format (`text`, `json`, ...).
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Add a named option such as `analyze` or `buffers`.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<ExplainValue>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn format_name(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn options(&self) -> &BTreeMap<String, ExplainValue> {
        &self.options
    }

    /// Whether explain rows should be rendered as JSON.
    pub fn is_json(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }

    /// Reject option names that could smuggle SQL into the prefix.
    ///
    /// Each name must consist of word characters and hyphens only, and must
    /// not contain `--`.
    pub fn validate(&self) -> CaptureResult<()> {
        for name in self.options.keys() {
            if !OPTION_NAME.is_match(name) || name.contains("--") {
                return Err(CaptureError::config(format!(
                    "Invalid option name: {name:?}."
                )));
            }
        }
        Ok(())
    }
}

/// Runs EXPLAIN for SELECT statements over the backend directly.
///
/// Holding the backend rather than the connection means explain requests never
/// pass through an interceptor, so they are neither timed nor logged and can't
/// trigger further explains.
pub struct ExplainEngine {
    backend: Arc<dyn Backend>,
    prefix: String,
    json: bool,
}

impl ExplainEngine {
    /// Validate `options` and build the vendor prefix up front.
    pub fn new(backend: Arc<dyn Backend>, options: &ExplainOptions) -> CaptureResult<Self> {
        options.validate()?;
        let prefix = backend.explain_prefix(options)?;
        Ok(Self {
            backend,
            prefix,
            json: options.is_json(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The plan for `statement`, one line per result row.
    ///
    /// Empty for non-SELECT statements and when the explain itself fails;
    /// failures are logged, never returned.
    pub async fn explain(&self, statement: &Statement) -> String {
        if !sql::is_select(&statement.sql) {
            return String::new();
        }

        let explain = statement.with_sql(format!("{} {}", self.prefix, statement.sql));
        match self.backend.execute(&explain).await {
            Ok(execution) => self.format_rows(&execution.rows).join("\n"),
            Err(err) => {
                tracing::warn!(
                    target: "capture_queries",
                    error = %err,
                    sql = %statement.sql,
                    "explain failed; continuing without a plan"
                );
                String::new()
            }
        }
    }

    fn format_rows(&self, rows: &[Row]) -> Vec<String> {
        rows.iter()
            .map(|row| match row.values() {
                [single] if single.as_str().is_some() => single.to_string(),
                values => values
                    .iter()
                    .map(|value| {
                        if self.json {
                            value.to_json().to_string()
                        } else {
                            value.to_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .collect()
    }
}

impl fmt::Debug for ExplainEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplainEngine")
            .field("vendor", &self.backend.vendor())
            .field("prefix", &self.prefix)
            .field("json", &self.json)
            .finish()
    }
}
