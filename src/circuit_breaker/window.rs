use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Aggregate of the outcomes currently inside the sampling window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub successes: u64,
    pub failures: u64,
    pub total: u64,
    /// failures / total, 0.0 when the window is empty
    pub failure_ratio: f64,
}

#[derive(Debug, Clone)]
struct Bucket {
    started_at: Instant,
    successes: u64,
    failures: u64,
}

/// Success/failure tallies over a rolling time window.
///
/// The window is split into fixed-width buckets. A bucket is evicted once its
/// start is `sampling_duration` or more in the past; eviction happens lazily
/// whenever the counter is touched.
#[derive(Debug, Clone)]
pub struct SlidingWindowCounter {
    sampling_duration: Duration,
    bucket_width: Duration,
    buckets: VecDeque<Bucket>,
}

impl SlidingWindowCounter {
    pub fn new(sampling_duration: Duration, bucket_count: u32) -> Self {
        let bucket_count = bucket_count.max(1);
        let bucket_width = (sampling_duration / bucket_count).max(Duration::from_millis(1));

        Self {
            sampling_duration,
            bucket_width,
            buckets: VecDeque::with_capacity(bucket_count as usize + 1),
        }
    }

    pub fn record_success(&mut self, now: Instant) {
        self.current_bucket(now).successes += 1;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.current_bucket(now).failures += 1;
    }

    /// Totals over the live buckets
    pub fn health(&mut self, now: Instant) -> HealthSnapshot {
        self.evict(now);

        let (successes, failures) = self
            .buckets
            .iter()
            .fold((0, 0), |(s, f), b| (s + b.successes, f + b.failures));
        let total = successes + failures;
        let failure_ratio = if total == 0 {
            0.0
        } else {
            failures as f64 / total as f64
        };

        HealthSnapshot {
            successes,
            failures,
            total,
            failure_ratio,
        }
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn sampling_duration(&self) -> Duration {
        self.sampling_duration
    }

    fn current_bucket(&mut self, now: Instant) -> &mut Bucket {
        self.evict(now);

        let needs_new = match self.buckets.back() {
            Some(last) => now.saturating_duration_since(last.started_at) >= self.bucket_width,
            None => true,
        };
        if needs_new {
            self.buckets.push_back(Bucket {
                started_at: now,
                successes: 0,
                failures: 0,
            });
        }

        // Non-empty: a bucket was pushed above if there was none.
        let idx = self.buckets.len() - 1;
        &mut self.buckets[idx]
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.saturating_duration_since(front.started_at) >= self.sampling_duration {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window() {
        let mut window = SlidingWindowCounter::new(Duration::from_secs(10), 10);
        let health = window.health(Instant::now());
        assert_eq!(health.total, 0);
        assert_eq!(health.failure_ratio, 0.0);
    }

    #[test]
    fn test_counts_within_window() {
        let start = Instant::now();
        let mut window = SlidingWindowCounter::new(Duration::from_secs(10), 10);

        window.record_success(start);
        window.record_failure(start + Duration::from_millis(500));
        window.record_failure(start + Duration::from_secs(3));
        window.record_success(start + Duration::from_secs(7));

        let health = window.health(start + Duration::from_secs(8));
        assert_eq!(health.successes, 2);
        assert_eq!(health.failures, 2);
        assert_eq!(health.total, 4);
        assert_eq!(health.failure_ratio, 0.5);
    }

    #[test]
    fn test_old_buckets_are_evicted() {
        let start = Instant::now();
        let mut window = SlidingWindowCounter::new(Duration::from_secs(10), 10);

        window.record_failure(start);
        window.record_failure(start + Duration::from_secs(1));
        window.record_success(start + Duration::from_secs(6));

        // First bucket falls out at t=10s, second at t=11s
        let health = window.health(start + Duration::from_secs(10));
        assert_eq!(health.failures, 1);
        assert_eq!(health.successes, 1);

        let health = window.health(start + Duration::from_secs(11));
        assert_eq!(health.failures, 0);
        assert_eq!(health.total, 1);

        let health = window.health(start + Duration::from_secs(30));
        assert_eq!(health.total, 0);
    }

    #[test]
    fn test_total_is_sum_of_buckets() {
        let start = Instant::now();
        let mut window = SlidingWindowCounter::new(Duration::from_secs(1), 4);

        for i in 0..20u64 {
            let at = start + Duration::from_millis(i * 40);
            if i % 3 == 0 {
                window.record_failure(at);
            } else {
                window.record_success(at);
            }
        }

        let health = window.health(start + Duration::from_millis(790));
        assert_eq!(health.total, health.successes + health.failures);
        assert_eq!(health.total, 20);
        assert_eq!(health.failures, 7);
    }

    #[test]
    fn test_clear() {
        let now = Instant::now();
        let mut window = SlidingWindowCounter::new(Duration::from_secs(10), 10);
        window.record_failure(now);
        window.clear();
        assert_eq!(window.health(now).total, 0);
    }
}
