//! Reports handed from a capture session to a [`Printer`].
//!
//! The session only builds these structs. Turning them into text is the
//! printer's job; [`SqlPrinter`] is the default.

mod printer;


pub use printer::SqlPrinter;

use crate::capture::QueryRecord;
use serde::Serialize;
use std::time::Duration;

/// Outcome of one iteration of a repeated measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationReport {
    /// 1-based iteration number.
    pub iteration: usize,
    pub queries_count: usize,
    pub elapsed: Duration,
}

/// Outcome of a single-shot measurement (scope or one run).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleReport {
    pub queries_count: usize,
    pub elapsed: Duration,
    pub records: Vec<QueryRecord>,
}

/// Outcome of a repeated measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeveralReport {
    pub iterations: usize,
    pub queries_count: usize,
    pub total_elapsed: Duration,
    /// `None` when no statement completed.
    pub median_elapsed: Option<Duration>,
    pub records: Vec<QueryRecord>,
}

/// Receives reports from a capture session.
pub trait Printer: Send {
    /// Called after each iteration of a repeated measurement.
    fn print_iteration(&mut self, report: &IterationReport) {
        let _ = report;
    }

    /// Called once when a single-shot measurement closes.
    fn print_single(&mut self, report: &SingleReport);

    /// Called once when a repeated measurement closes.
    fn print_several(&mut self, report: &SeveralReport);
}

/// A printer that prints nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPrinter;

impl Printer for NoopPrinter {
    fn print_single(&mut self, _report: &SingleReport) {}

    fn print_several(&mut self, _report: &SeveralReport) {}
}
