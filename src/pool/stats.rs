use std::time::{Duration, Instant};

/// Per-endpoint statistics tracked by the pool (spec §3 "Endpoint Statistics").
#[derive(Debug, Clone)]
pub struct EndpointStats {
    pub success_count: u64,
    pub failure_count: u64,
    pub rate_limited_count: u64,
    pub avg_latency: Duration,
    pub current_failures: u32,
    pub last_rate_limited: Option<Instant>,
}

impl Default for EndpointStats {
    fn default() -> Self {
        Self {
            success_count: 0,
            failure_count: 0,
            rate_limited_count: 0,
            avg_latency: Duration::ZERO,
            current_failures: 0,
            last_rate_limited: None,
        }
    }
}

const EMA_WEIGHT: f64 = 0.3;

impl EndpointStats {
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            return 1.0;
        }
        self.success_count as f64 / total as f64
    }

    pub fn total_attempts(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.success_count += 1;
        self.current_failures = 0;
        self.update_latency(latency);
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.current_failures += 1;
    }

    pub fn record_rate_limited(&mut self, now: Instant) {
        self.rate_limited_count += 1;
        self.last_rate_limited = Some(now);
    }

    fn update_latency(&mut self, sample: Duration) {
        if self.avg_latency.is_zero() {
            self.avg_latency = sample;
            return;
        }
        let old = self.avg_latency.as_secs_f64();
        let new = sample.as_secs_f64();
        let ema = EMA_WEIGHT * new + (1.0 - EMA_WEIGHT) * old;
        self.avg_latency = Duration::from_secs_f64(ema.max(0.0));
    }

    /// `score = 100*success_rate - 10*avg_latency - 5*current_failures`.
    pub fn performance_score(&self) -> f64 {
        100.0 * self.success_rate()
            - 10.0 * self.avg_latency.as_secs_f64()
            - 5.0 * self.current_failures as f64
    }
}
