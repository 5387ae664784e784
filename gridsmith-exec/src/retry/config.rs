use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Circuit-breaker bounds and backoff for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_consecutive_failures: u32,
    /// Hard cap over the whole session; never reset by a success.
    pub max_total_retries: u32,
    #[serde(with = "duration_ms", rename = "baseDelayMs")]
    pub base_delay: Duration,
    #[serde(with = "duration_ms", rename = "maxDelayMs")]
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            max_total_retries: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.maxConsecutiveFailures",
                problem: "must be at least 1".into(),
            });
        }
        if self.max_total_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.maxTotalRetries",
                problem: "must be at least 1".into(),
            });
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigError::Invalid {
                field: "retry.baseDelayMs",
                problem: format!(
                    "{}ms exceeds maxDelayMs {}ms",
                    self.base_delay.as_millis(),
                    self.max_delay.as_millis()
                ),
            });
        }
        Ok(())
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
