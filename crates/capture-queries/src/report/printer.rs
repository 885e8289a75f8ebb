use super::{IterationReport, Printer, SeveralReport, SingleReport};
use crate::capture::{CaptureConfig, QueryRecord};
use colored::Colorize;
use sqlformat::{FormatOptions, QueryParams};
use std::fmt;
use std::io::Write;

/// Transaction-control statements left out of the printed query list.
const EXCLUDED: &[&str] = &["BEGIN", "COMMIT", "ROLLBACK"];

const KEYWORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "AS", "ASC", "BEGIN", "BETWEEN", "BY", "CASE", "COMMIT", "CREATE",
    "CROSS", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE", "END", "EXISTS", "EXPLAIN", "FROM",
    "FULL", "GROUP", "HAVING", "ILIKE", "IN", "INNER", "INSERT", "INTO", "IS", "JOIN", "LEFT",
    "LIKE", "LIMIT", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "RETURNING", "RIGHT",
    "ROLLBACK", "SELECT", "SET", "TABLE", "THEN", "UNION", "UPDATE", "VALUES", "WHEN", "WHERE",
    "WITH",
];

/// Prints capture reports as plain text.
///
/// ```text
/// Test №1 | Queries count: 2 | Execution time: 0.000412s
/// Tests count: 1  |  Total queries count: 2  |  Total execution time: 0.00041s  |  Median time one test is: 0.000206s  |  Vendor: postgresql
/// ```
pub struct SqlPrinter {
    vendor: String,
    verbose: bool,
    advanced_verbose: bool,
    show_queries: bool,
    colorize: bool,
    out: Box<dyn Write + Send>,
}

impl SqlPrinter {
    /// Create a printer writing summaries to stdout.
    pub fn new(vendor: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            verbose: true,
            advanced_verbose: false,
            show_queries: false,
            colorize: true,
            out: Box::new(std::io::stdout()),
        }
    }

    /// Create a printer with the verbosity flags of a session config.
    pub fn from_config(vendor: impl Into<String>, config: &CaptureConfig) -> Self {
        Self::new(vendor)
            .verbose(config.verbose)
            .advanced_verbose(config.advanced_verbose)
            .show_queries(config.show_queries)
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

    /// Highlight SQL keywords with ANSI colors (on by default).
    pub fn colorize(mut self, colorize: bool) -> Self {
        self.colorize = colorize;
        self
    }

    /// Send output somewhere other than stdout.
    pub fn with_writer<W: Write + Send + 'static>(mut self, out: W) -> Self {
        self.out = Box::new(out);
        self
    }

    /// The per-iteration line, if advanced verbosity is on.
    pub fn render_iteration(&self, report: &IterationReport) -> Option<String> {
        if !self.advanced_verbose {
            return None;
        }
        let lead = if report.iteration == 1 { "\n\n" } else { "" };
        Some(format!(
            "{lead}Test №{} | Queries count: {} | Execution time: {:.6}s\n",
            report.iteration,
            report.queries_count,
            report.elapsed.as_secs_f64()
        ))
    }

    pub fn render_single(&self, report: &SingleReport) -> String {
        let mut out = String::new();
        if self.show_queries {
            out.push_str(&self.render_queries(&report.records));
            out.push('\n');
        }
        if self.verbose {
            out.push_str(&format!(
                "\nQueries count: {}  |  Execution time: {:.6}s  |  Vendor: {}\n\n",
                report.queries_count,
                report.elapsed.as_secs_f64(),
                self.vendor
            ));
        }
        out
    }

    pub fn render_several(&self, report: &SeveralReport) -> String {
        let mut out = String::new();
        if self.verbose && !self.advanced_verbose && !self.show_queries {
            out.push_str("\n\n");
        }
        if self.show_queries {
            out.push_str(&self.render_queries(&report.records));
            out.push('\n');
        }
        if self.verbose {
            let median = match report.median_elapsed {
                Some(median) => {
                    format!("Median time one test is: {:.6}s  |  ", median.as_secs_f64())
                }
                None => String::new(),
            };
            out.push_str(&format!(
                "Tests count: {}  |  Total queries count: {}  |  Total execution time: {:.5}s  |  {median}Vendor: {}\n\n",
                report.iterations,
                report.queries_count,
                report.total_elapsed.as_secs_f64(),
                self.vendor
            ));
        }
        out
    }

    /// Numbered, formatted listing of the captured statements.
    pub fn render_queries(&self, records: &[QueryRecord]) -> String {
        let entries: Vec<String> = records
            .iter()
            .filter(|record| !is_excluded(&record.sql))
            .enumerate()
            .map(|(idx, record)| {
                let sql = format_sql(&record.sql);
                let sql = if self.colorize { highlight(&sql) } else { sql };
                format!(
                    "№[{}] time=[{:.6}]{}\n{sql}",
                    idx + 1,
                    record.elapsed.as_secs_f64(),
                    format_explain(record.explain.as_deref())
                )
            })
            .collect();
        format!("\n\n{}\n\n", entries.join("\n\n\n"))
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Err(err) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::debug!(target: "capture_queries", error = %err, "failed to write report");
        }
    }
}

impl Printer for SqlPrinter {
    fn print_iteration(&mut self, report: &IterationReport) {
        if let Some(line) = self.render_iteration(report) {
            self.write(&line);
        }
    }

    fn print_single(&mut self, report: &SingleReport) {
        let text = self.render_single(report);
        self.write(&text);
    }

    fn print_several(&mut self, report: &SeveralReport) {
        let text = self.render_several(report);
        self.write(&text);
    }
}

impl fmt::Debug for SqlPrinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlPrinter")
            .field("vendor", &self.vendor)
            .field("verbose", &self.verbose)
            .field("advanced_verbose", &self.advanced_verbose)
            .field("show_queries", &self.show_queries)
            .field("colorize", &self.colorize)
            .finish_non_exhaustive()
    }
}

fn is_excluded(sql: &str) -> bool {
    let sql = sql.trim();
    EXCLUDED.iter().any(|kw| kw.eq_ignore_ascii_case(sql))
}

pub(super) fn format_sql(sql: &str) -> String {
    let options = FormatOptions {
        uppercase: Some(true),
        ..FormatOptions::default()
    };
    sqlformat::format(sql, &QueryParams::None, &options)
}

pub(super) fn format_explain(explain: Option<&str>) -> String {
    match explain {
        None => String::new(),
        Some(explain) if explain.lines().count() > 1 => format!(" explain=[\n{explain}\n]"),
        Some(explain) => format!(" explain=[{explain}]"),
    }
}

fn highlight(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() * 2);
    let mut chars = sql.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c == '\'' {
            let mut end = sql.len();
            for (idx, c) in chars.by_ref() {
                if c == '\'' {
                    end = idx + 1;
                    break;
                }
            }
            out.push_str(&sql[start..end].green().to_string());
        } else if c.is_alphabetic() || c == '_' {
            let mut end = start + c.len_utf8();
            while let Some(&(idx, c)) = chars.peek() {
                if !(c.is_alphanumeric() || c == '_') {
                    break;
                }
                end = idx + c.len_utf8();
                chars.next();
            }
            let word = &sql[start..end];
            if KEYWORDS.iter().any(|kw| kw.eq_ignore_ascii_case(word)) {
                out.push_str(&word.blue().bold().to_string());
            } else {
                out.push_str(word);
            }
        } else {
            out.push(c);
        }
    }
    out
}
