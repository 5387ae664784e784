use std::fmt;
use std::time::Duration;

use crate::retry::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    /// Persistent failure: advance past the chunk without retrying it.
    Skip,
    Abort { reason: AbortReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    ConsecutiveFailures(u32),
    TotalRetries(u32),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ConsecutiveFailures(n) => write!(f, "{n} consecutive failures"),
            AbortReason::TotalRetries(n) => write!(f, "{n} total retries"),
        }
    }
}

/// Decide what follows a failed chunk.
///
/// - `consecutive`: consecutive failures including this one.
/// - `total`: session-wide retries including this one.
/// - `persistent`: the failure matched a persistent signature; counters are
///   not consulted.
/// - `rand_u64`: RNG for jitter, only called when `cfg.jitter` is set.
pub fn decide_retry(
    cfg: &RetryConfig,
    consecutive: u32,
    total: u32,
    persistent: bool,
    rand_u64: impl Fn() -> u64,
) -> RetryDecision {
    if persistent {
        return RetryDecision::Skip;
    }
    if consecutive >= cfg.max_consecutive_failures {
        return RetryDecision::Abort {
            reason: AbortReason::ConsecutiveFailures(consecutive),
        };
    }
    if total >= cfg.max_total_retries {
        return RetryDecision::Abort {
            reason: AbortReason::TotalRetries(total),
        };
    }

    // Linear backoff: base * consecutive.
    let raw = cfg.base_delay.saturating_mul(consecutive.max(1));
    let raw = clamp(raw, cfg.max_delay);
    if !cfg.jitter {
        return RetryDecision::Retry { delay: raw };
    }
    let raw_ms = u64::try_from(raw.as_millis()).unwrap_or(u64::MAX);
    let half = raw_ms / 2;
    let jitter_ms = if half == 0 { 0 } else { rand_u64() % (half + 1) };
    RetryDecision::Retry {
        delay: Duration::from_millis(raw_ms - half + jitter_ms),
    }
}

fn clamp(delay: Duration, max: Duration) -> Duration {
    if delay > max { max } else { delay }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_upper_half() {
        let cfg = RetryConfig {
            jitter: true,
            ..RetryConfig::default()
        };
        let RetryDecision::Retry { delay } = decide_retry(&cfg, 2, 2, false, || u64::MAX) else {
            panic!("expected retry");
        };
        assert!(delay >= Duration::from_millis(500) && delay <= Duration::from_millis(1000));
    }
}
