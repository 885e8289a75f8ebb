use super::explain::ExplainOptions;
use crate::error::{CaptureError, CaptureResult};

/// Configuration for a capture session.
///
/// By default a session runs once, prints a one-line summary, and asserts
/// nothing.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Maximum number of queries allowed. `None` disables the check (default).
    pub assert_limit: Option<usize>,
    /// How many times the measured code runs when iterating.
    pub max_runs: usize,
    /// Print the final summary.
    pub verbose: bool,
    /// Print a line after every iteration.
    pub advanced_verbose: bool,
    /// Print every captured statement.
    pub show_queries: bool,
    /// Explain SELECT statements with these options.
    pub explain: Option<ExplainOptions>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            assert_limit: None,
            max_runs: 1,
            verbose: true,
            advanced_verbose: false,
            show_queries: false,
            explain: None,
        }
    }
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the session when more than `limit` queries are captured.
    pub fn assert_limit(mut self, limit: usize) -> Self {
        self.assert_limit = Some(limit);
        self
    }

    /// Run the measured code `runs` times.
    pub fn max_runs(mut self, runs: usize) -> Self {
        self.max_runs = runs;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn advanced_verbose(mut self, advanced_verbose: bool) -> Self {
        self.advanced_verbose = advanced_verbose;
        self
    }

    pub fn show_queries(mut self, show_queries: bool) -> Self {
        self.show_queries = show_queries;
        self
    }

    /// Print nothing at all.
    pub fn quiet(self) -> Self {
        self.verbose(false)
            .advanced_verbose(false)
            .show_queries(false)
    }

    /// Explain every SELECT with default options.
    pub fn explain(self) -> Self {
        self.explain_with(ExplainOptions::new())
    }

    pub fn explain_with(mut self, options: ExplainOptions) -> Self {
        self.explain = Some(options);
        self
    }

    pub(crate) fn validate(&self) -> CaptureResult<()> {
        if self.max_runs == 0 {
            return Err(CaptureError::config("max_runs must be at least 1"));
        }
        if let Some(options) = &self.explain {
            options.validate()?;
        }
        Ok(())
    }
}
