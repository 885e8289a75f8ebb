use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::time::Duration;

/// Default number of statements kept in a query log.
pub const DEFAULT_QUERIES_LIMIT: usize = 9000;

/// One captured statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRecord {
    /// Statement text, with parameters rendered as literals when possible.
    pub sql: String,
    /// Wall-clock time of the real execution (explain excluded).
    #[serde(rename = "time", serialize_with = "secs_f64")]
    pub elapsed: Duration,
    /// Query plan, only for explained SELECT statements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<String>,
}

impl QueryRecord {
    pub fn new(sql: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            sql: sql.into(),
            elapsed,
            explain: None,
        }
    }

    pub fn with_explain(mut self, explain: impl Into<String>) -> Self {
        self.explain = Some(explain.into());
        self
    }
}

fn secs_f64<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(elapsed.as_secs_f64())
}

/// Bounded, execution-ordered record of captured statements.
///
/// When full, the oldest record is evicted to make room.
#[derive(Debug, Clone)]
pub struct QueryLog {
    records: VecDeque<QueryRecord>,
    capacity: usize,
    evicted: usize,
}

impl QueryLog {
    /// Create a log holding at most `capacity` records (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            evicted: 0,
        }
    }

    pub fn push(&mut self, record: QueryRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.evicted += 1;
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records dropped because the log was full.
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    pub fn get(&self, index: usize) -> Option<&QueryRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryRecord> {
        self.records.iter()
    }

    pub fn to_vec(&self) -> Vec<QueryRecord> {
        self.records.iter().cloned().collect()
    }
}

impl Default for QueryLog {
    fn default() -> Self {
        Self::new(DEFAULT_QUERIES_LIMIT)
    }
}
