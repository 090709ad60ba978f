//! Exponential backoff computation for failed queue tasks.

use chrono::Duration;
use conductor_types::config::RetryPolicy;

/// Delay before the `retry_count`-th retry attempt (1-based).
///
/// `base * 2^(retry_count - 1)`, capped at the policy's `max_delay_secs`.
/// Saturates instead of overflowing for absurd retry counts.
pub fn retry_delay(policy: &RetryPolicy, retry_count: u32) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(63);
    let factor = 1u64 << exponent;
    let secs = policy
        .base_delay_secs
        .saturating_mul(factor)
        .min(policy.max_delay_secs);
    Duration::seconds(secs as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base: u64, cap: u64) -> RetryPolicy {
        RetryPolicy {
            base_delay_secs: base,
            max_delay_secs: cap,
        }
    }

    #[test]
    fn test_doubling_schedule() {
        let p = policy(60, 3600);
        assert_eq!(retry_delay(&p, 1).num_seconds(), 60);
        assert_eq!(retry_delay(&p, 2).num_seconds(), 120);
        assert_eq!(retry_delay(&p, 3).num_seconds(), 240);
        assert_eq!(retry_delay(&p, 4).num_seconds(), 480);
    }

    #[test]
    fn test_cap_applies() {
        let p = policy(60, 3600);
        // 60 * 2^6 = 3840 > 3600
        assert_eq!(retry_delay(&p, 7).num_seconds(), 3600);
        assert_eq!(retry_delay(&p, 20).num_seconds(), 3600);
    }

    #[test]
    fn test_zero_retry_count_treated_as_first() {
        let p = policy(60, 3600);
        assert_eq!(retry_delay(&p, 0).num_seconds(), 60);
    }

    #[test]
    fn test_huge_retry_count_saturates() {
        let p = policy(60, 3600);
        assert_eq!(retry_delay(&p, u32::MAX).num_seconds(), 3600);
    }

    #[test]
    fn test_custom_policy() {
        let p = policy(5, 600);
        assert_eq!(retry_delay(&p, 1).num_seconds(), 5);
        assert_eq!(retry_delay(&p, 8).num_seconds(), 600);
    }
}
