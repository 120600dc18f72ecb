use std::time::Duration;

const BACKOFF_FACTOR: u32 = 2;

/// Each sleep is scaled by a random factor in `[JITTER_MIN, JITTER_MAX)` so
/// writers that lost the same race do not retry in lockstep.
const JITTER_MIN: f64 = 0.9;
const JITTER_MAX: f64 = 1.1;

/// Bound on optimistic-concurrency retries.
///
/// Only lost races are retried; backend faults escalate on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy with no sleeping between attempts. Used by tests and embedders
    /// that drive their own pacing.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt number `attempt` (1-based). The first attempt never waits.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = BACKOFF_FACTOR.saturating_pow(attempt - 2);
        self.initial_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// `backoff(attempt)` scaled by a random jitter factor.
    pub fn jittered(&self, attempt: u32) -> Duration {
        self.backoff(attempt).mul_f64(jitter_factor())
    }

    pub(crate) async fn wait(&self, attempt: u32) {
        let delay = self.jittered(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn jitter_factor() -> f64 {
    let mut bytes = [0_u8; 4];
    rand::fill(&mut bytes);
    let unit = f64::from(u32::from_le_bytes(bytes)) / (f64::from(u32::MAX) + 1.0);
    JITTER_MIN + unit * (JITTER_MAX - JITTER_MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_has_no_delay() {
        assert_eq!(RetryPolicy::default().backoff(1), Duration::ZERO);
    }

    #[test]
    fn delay_doubles_until_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(400));
        assert_eq!(policy.backoff(5), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };
        let base = policy.backoff(3);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let delay = policy.jittered(3);
            assert!(delay >= base.mul_f64(JITTER_MIN), "{delay:?}");
            assert!(delay <= base.mul_f64(JITTER_MAX), "{delay:?}");
            seen.insert(delay);
        }
        // Lockstep retries would produce a single value.
        assert!(seen.len() > 1);
        assert_eq!(policy.jittered(1), Duration::ZERO);
    }

    #[test]
    fn immediate_never_waits() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(3), Duration::ZERO);
    }
}
