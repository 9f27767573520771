use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::RateLimiterConfig;

/// Per-client adaptive rate limiter state, guarded by its own mutex since
/// background health checks may drive it concurrently with the client's
/// normal call path.
pub struct RateLimiter {
    config: RateLimiterConfig,
    inner: Mutex<Inner>,
}

struct Inner {
    current_rate: f64,
    error_count: u32,
    rate_limit_errors: u32,
    last_success_time: Instant,
    last_request_time: Option<Instant>,
    cooldown_until: Option<Instant>,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    rate_limited_requests: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterStats {
    pub current_rate: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub error_count: u32,
    pub rate_limit_errors: u32,
    pub circuit_breaker_active: bool,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let now = Instant::now();
        let current_rate = config.initial_rate;
        Self {
            config,
            inner: Mutex::new(Inner {
                current_rate,
                error_count: 0,
                rate_limit_errors: 0,
                last_success_time: now,
                last_request_time: None,
                cooldown_until: None,
                total_requests: 0,
                successful_requests: 0,
                failed_requests: 0,
                rate_limited_requests: 0,
            }),
        }
    }

    /// Non-blocking admission check. Returns false if the caller is still
    /// in cooldown or less than `1/current_rate` seconds (plus jitter)
    /// have elapsed since the last admitted call.
    pub async fn acquire(&self) -> bool {
        let mut state = self.inner.lock().await;
        let now = Instant::now();

        if let Some(cooldown_until) = state.cooldown_until {
            if now < cooldown_until {
                debug!(
                    "rate limiter in cooldown for {:.1}s",
                    (cooldown_until - now).as_secs_f64()
                );
                return false;
            }
        }

        let min_interval = Duration::from_secs_f64(1.0 / state.current_rate);
        let jitter = Duration::from_secs_f64(
            rand::rng().random_range(0.0..=min_interval.as_secs_f64() * self.config.jitter_factor),
        );
        let effective_interval = min_interval + jitter;

        if let Some(last) = state.last_request_time {
            if now.duration_since(last) < effective_interval {
                return false;
            }
        }

        state.last_request_time = Some(now);
        state.total_requests += 1;
        true
    }

    /// Applies the outcome of a completed call to the limiter's rate and
    /// circuit-breaker state.
    pub async fn update(&self, success: bool, rate_limited: bool) {
        let mut state = self.inner.lock().await;
        let now = Instant::now();

        if success {
            state.error_count = state.error_count.saturating_sub(1);
            state.rate_limit_errors = 0;
            state.last_success_time = now;
            state.successful_requests += 1;
            if state.successful_requests % 10 == 0 {
                state.current_rate =
                    (state.current_rate * self.config.increase_factor).min(self.config.max_rate);
                debug!("rate limiter increasing rate to {:.2}/s", state.current_rate);
            }
            return;
        }

        state.error_count += 1;
        state.failed_requests += 1;

        if rate_limited {
            state.rate_limited_requests += 1;
            state.rate_limit_errors += 1;
            state.current_rate = (state.current_rate * 0.3).max(self.config.min_rate);
            warn!("rate limited: reducing rate to {:.2}/s", state.current_rate);
        } else {
            state.current_rate =
                (state.current_rate * self.config.decrease_factor).max(self.config.min_rate);
            debug!("reducing rate to {:.2}/s after failure", state.current_rate);
        }

        if state.error_count >= self.config.circuit_breaker_threshold {
            let exponent = state.error_count - self.config.circuit_breaker_threshold;
            let base = (30.0 * 2f64.powi(exponent as i32)).min(self.config.max_backoff_time);
            let jitter = rand::rng().random_range(0.0..=base * self.config.jitter_factor);
            let mut cooldown = base + jitter;
            if state.rate_limit_errors >= 2 {
                cooldown *= 1.5;
            }
            state.cooldown_until = Some(now + Duration::from_secs_f64(cooldown));
            warn!("circuit breaker tripped: cooling down for {:.1}s", cooldown);
            state.error_count = (state.error_count / 2).max(1);
        }
    }

    /// Applies a rate-limit failure and returns the backoff to wait before
    /// the next attempt, derived the same way as the circuit breaker
    /// cooldown but independent of whether it tripped.
    pub async fn handle_rate_limit_error(&self) -> Duration {
        self.update(false, true).await;

        let state = self.inner.lock().await;
        let now = Instant::now();
        if let Some(cooldown_until) = state.cooldown_until {
            if now < cooldown_until {
                return cooldown_until - now;
            }
        }

        let base = (5.0 * 2f64.powi(state.rate_limit_errors as i32)).min(self.config.max_backoff_time);
        let jitter = rand::rng().random_range(0.0..=base * self.config.jitter_factor);
        Duration::from_secs_f64(base + jitter)
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let state = self.inner.lock().await;
        let now = Instant::now();
        RateLimiterStats {
            current_rate: state.current_rate,
            total_requests: state.total_requests,
            successful_requests: state.successful_requests,
            failed_requests: state.failed_requests,
            rate_limited_requests: state.rate_limited_requests,
            error_count: state.error_count,
            rate_limit_errors: state.rate_limit_errors,
            circuit_breaker_active: state.cooldown_until.map(|c| now < c).unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimiterConfig {
        RateLimiterConfig::default()
    }

    #[tokio::test]
    async fn first_acquire_succeeds() {
        let limiter = RateLimiter::new(config());
        assert!(limiter.acquire().await);
    }

    #[tokio::test]
    async fn rate_stays_within_bounds_on_repeated_failure() {
        let limiter = RateLimiter::new(config());
        for _ in 0..50 {
            limiter.update(false, false).await;
        }
        let stats = limiter.stats().await;
        assert!(stats.current_rate >= config().min_rate);
        assert!(stats.current_rate <= config().max_rate);
    }

    #[tokio::test]
    async fn rate_stays_within_bounds_on_repeated_success() {
        let limiter = RateLimiter::new(config());
        for _ in 0..200 {
            limiter.update(true, false).await;
        }
        let stats = limiter.stats().await;
        assert!(stats.current_rate <= config().max_rate);
    }

    #[tokio::test]
    async fn circuit_breaker_trips_after_threshold() {
        let limiter = RateLimiter::new(config());
        limiter.update(false, false).await;
        limiter.update(false, false).await;
        let stats = limiter.stats().await;
        assert!(stats.circuit_breaker_active);
        assert!(!limiter.acquire().await);
    }

    #[tokio::test]
    async fn rate_limit_error_more_aggressive_than_plain_failure() {
        let a = RateLimiter::new(config());
        let b = RateLimiter::new(config());
        a.update(false, false).await;
        b.update(false, true).await;
        let sa = a.stats().await;
        let sb = b.stats().await;
        assert!(sb.current_rate <= sa.current_rate);
    }
}
