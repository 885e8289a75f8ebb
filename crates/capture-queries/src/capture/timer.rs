use std::future::Future;
use std::time::{Duration, Instant};

/// Time an async operation.
///
/// The duration is returned alongside the outcome; callers decide whether it
/// belongs in a [`Timer`]. Failed operations are never recorded.
pub async fn measure<F, T, E>(operation: F) -> (Result<T, E>, Duration)
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = operation.await;
    (result, start.elapsed())
}

/// Accumulated execution times for one capture session.
///
/// `all_durations` covers the whole session; the per-iteration history is
/// cleared at every iteration boundary.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    all_durations: Vec<Duration>,
    iteration_durations: Vec<Duration>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful operation.
    pub fn record(&mut self, elapsed: Duration) {
        self.all_durations.push(elapsed);
        self.iteration_durations.push(elapsed);
    }

    /// Sum of the durations recorded in the current iteration.
    pub fn per_iteration_elapsed(&self) -> Duration {
        self.iteration_durations.iter().sum()
    }

    /// Number of operations recorded in the current iteration.
    pub fn per_iteration_count(&self) -> usize {
        self.iteration_durations.len()
    }

    /// Forget the current iteration without touching the session history.
    pub fn clear_iteration(&mut self) {
        self.iteration_durations.clear();
    }

    pub fn all_durations(&self) -> &[Duration] {
        &self.all_durations
    }

    /// Sum of every recorded duration.
    pub fn total(&self) -> Duration {
        self.all_durations.iter().sum()
    }

    /// Median of every recorded duration, `None` if nothing was recorded.
    pub fn median(&self) -> Option<Duration> {
        if self.all_durations.is_empty() {
            return None;
        }
        let mut sorted = self.all_durations.clone();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 1 {
            Some(sorted[mid])
        } else {
            Some((sorted[mid - 1] + sorted[mid]) / 2)
        }
    }
}
